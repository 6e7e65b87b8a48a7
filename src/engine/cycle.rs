//! Cycle/Loop Controller
//!
//! Detects the loop boundary on each tick and performs the transport-safe
//! jump back to the cycle start. The jump only resets and reschedules
//! sources; it never touches graph connections, so it stays cheap under
//! rapid repeats.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{AudioEngine, TransportState};
use crate::error::{EngineError, Result};

/// Loop bounds in seconds, with `end >= start + minimum length`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleRegion {
    start: f64,
    end: f64,
}

impl CycleRegion {
    /// Validate and create a cycle region
    pub fn new(start: f64, end: f64, min_length: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < start + min_length {
            return Err(EngineError::InvalidCycleRegion {
                start,
                end,
                min_length,
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Boundary detection state for cycling playback
#[derive(Debug, Clone)]
pub struct CycleController {
    region: Option<CycleRegion>,
    enabled: bool,
    /// Set when playback (re)started before the trigger point
    armed: bool,
    last_jump_time: Option<f64>,
    tolerance: f64,
    cooldown: f64,
}

impl CycleController {
    pub fn new(tolerance: f64, cooldown: f64) -> Self {
        Self {
            region: None,
            enabled: false,
            armed: false,
            last_jump_time: None,
            tolerance,
            cooldown,
        }
    }

    pub fn region(&self) -> Option<CycleRegion> {
        self.region
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn last_jump_time(&self) -> Option<f64> {
        self.last_jump_time
    }

    /// Replace the loop bounds and re-arm for the given position
    pub fn set_region(&mut self, region: CycleRegion, position: f64) {
        self.region = Some(region);
        self.arm(position);
    }

    /// Flip cycling on or off; returns the new state
    pub fn toggle(&mut self, position: f64) -> bool {
        self.enabled = !self.enabled;
        self.arm(position);
        self.enabled
    }

    /// Arm the boundary check if `position` lies before the trigger point
    ///
    /// Playback started past the cycle end plays through.
    pub fn arm(&mut self, position: f64) {
        self.armed = self
            .region
            .is_some_and(|region| position < region.end - self.tolerance);
    }

    /// Boundary check for one tick
    ///
    /// Returns the jump target when the loop must wrap. The cooldown only
    /// holds off repeats near the end; a position past `end + tolerance`
    /// always wraps.
    pub fn check(&self, now: f64, position: f64, playing: bool, frozen: bool) -> Option<f64> {
        if !self.enabled || !playing || frozen || !self.armed {
            return None;
        }
        let region = self.region?;
        let overshot = position > region.end + self.tolerance;
        if let Some(last) = self.last_jump_time {
            if now - last < self.cooldown && !overshot {
                return None;
            }
        }
        (position >= region.end - self.tolerance).then_some(region.start)
    }

    /// Note a completed jump at wall-clock time `now`
    pub fn record_jump(&mut self, now: f64) {
        self.last_jump_time = Some(now);
        self.armed = true;
    }
}

impl AudioEngine {
    /// Move the playhead of a running transport without touching topology
    ///
    /// Every source is reset rather than just stopped so no buffered tail
    /// from the old position survives, then all tracks are rescheduled and
    /// started together `jump_lead` seconds ahead. The transport is anchored
    /// at that same start time and holds at `target` until then.
    pub(super) fn relocate(&mut self, now: f64, target: f64) {
        self.frozen = true;
        let resume = self.state.transport.state();
        let start_at = now + self.config.jump_lead;

        self.render.pause();
        self.state.topology.reset_all_players();
        self.state.transport.seek(start_at, target);

        match self.render.start() {
            Ok(()) => {
                self.reschedule_all(target);
                self.start_all_players(start_at);
                debug!(
                    "[CYCLE] Relocated to {:.3}s, sources start at {:.3}",
                    target, start_at
                );
            }
            Err(e) => self.handle_start_failure(now, resume, e),
        }

        self.frozen = false;
    }

    /// Jump back to the cycle start
    pub(super) fn transport_safe_jump(&mut self, now: f64, target: f64) {
        info!("[CYCLE] Loop jump to {:.3}s", target);
        self.relocate(now, target);
        if self.state.transport.state() != TransportState::Stopped {
            self.cycle.record_jump(now);
        }
    }
}
