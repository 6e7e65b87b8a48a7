//! Render engine boundary
//!
//! The real-time render callback belongs to an external collaborator that
//! pulls audio through the graph at a hardware-driven rate. The control
//! context only starts, pauses and prepares it; node attach/detach is safe
//! while it is paused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::error::{EngineError, Result};
use crate::graph::NodeId;

/// Control surface of the external render engine
pub trait RenderEngine: Send {
    /// Allocate resources for the current graph; called before a restart
    fn prepare(&mut self);

    /// Begin pulling audio through the graph
    fn start(&mut self) -> Result<()>;

    /// Suspend the render callback, keeping resources
    fn pause(&mut self);

    /// Suspend the render callback and release resources
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Most recent output level of a node in [0, 1]
    fn output_level(&self, _node: NodeId) -> f32 {
        0.0
    }
}

#[derive(Debug, Default)]
struct OfflineState {
    running: bool,
    prepared: bool,
    start_calls: u32,
    pause_calls: u32,
    prepare_calls: u32,
    failures_remaining: u32,
    levels: HashMap<NodeId, f32>,
}

/// In-process render engine that renders nothing
///
/// Clones share state, so a test or simulation can keep a handle after
/// moving the engine into an `AudioEngine`, inject start failures, and set
/// meter levels.
#[derive(Debug, Clone, Default)]
pub struct OfflineRenderEngine {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineRenderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OfflineState> {
        // A poisoned lock only means a test thread panicked mid-update
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` calls to `start` fail
    pub fn fail_next_starts(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    /// Set the meter reading reported for a node
    pub fn set_level(&self, node: NodeId, level: f32) {
        self.lock().levels.insert(node, level.clamp(0.0, 1.0));
    }

    pub fn start_calls(&self) -> u32 {
        self.lock().start_calls
    }

    pub fn pause_calls(&self) -> u32 {
        self.lock().pause_calls
    }

    pub fn prepare_calls(&self) -> u32 {
        self.lock().prepare_calls
    }

    pub fn is_prepared(&self) -> bool {
        self.lock().prepared
    }
}

impl RenderEngine for OfflineRenderEngine {
    fn prepare(&mut self) {
        let mut state = self.lock();
        state.prepared = true;
        state.prepare_calls += 1;
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.start_calls += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(EngineError::RenderStartFailed {
                reason: "injected start failure".to_string(),
            });
        }
        state.running = true;
        debug!("[RENDER] Offline engine started");
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.lock();
        state.running = false;
        state.pause_calls += 1;
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.running = false;
        state.prepared = false;
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    fn output_level(&self, node: NodeId) -> f32 {
        self.lock().levels.get(&node).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_pause_cycle() {
        let mut engine = OfflineRenderEngine::new();
        assert!(!engine.is_running());
        engine.start().unwrap();
        assert!(engine.is_running());
        engine.pause();
        assert!(!engine.is_running());
        assert_eq!(engine.pause_calls(), 1);
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let mut engine = OfflineRenderEngine::new();
        let handle = engine.clone();
        handle.fail_next_starts(1);

        assert!(engine.start().is_err());
        assert!(!engine.is_running());
        assert!(engine.start().is_ok());
        assert_eq!(handle.start_calls(), 2);
    }

    #[test]
    fn test_stop_releases_preparation() {
        let mut engine = OfflineRenderEngine::new();
        engine.prepare();
        assert!(engine.is_prepared());
        engine.stop();
        assert!(!engine.is_prepared());
    }
}
