//! Safe Mutation Coordinator
//!
//! Every topology change runs as freeze -> drain -> mutate -> restart ->
//! reschedule so the render side never consumes a half-built graph. A
//! render engine that fails to restart hands over to the startup retry
//! state machine, which is polled from the tick instead of sleeping.

use log::{error, info, warn};

use super::{AudioEngine, EngineState, TransportState};
use crate::error::{EngineError, Result};

/// Progress of the render engine startup retry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartupState {
    /// No start failure outstanding
    Idle,
    /// A start failed; another attempt is due at `retry_at`
    Waiting {
        /// Attempts made so far
        attempt: u32,
        retry_at: f64,
        /// Transport state to restore once the engine runs
        resume: TransportState,
    },
    /// Every attempt failed
    GaveUp { attempts: u32 },
}

/// Bounded retry of render engine starts, driven by the tick
#[derive(Debug, Clone)]
pub struct StartupRetry {
    state: StartupState,
    retry_delay: f64,
    max_attempts: u32,
}

impl StartupRetry {
    pub fn new(retry_delay: f64, max_attempts: u32) -> Self {
        Self {
            state: StartupState::Idle,
            retry_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, StartupState::Waiting { .. })
    }

    pub fn has_given_up(&self) -> bool {
        matches!(self.state, StartupState::GaveUp { .. })
    }

    /// Register a failed start at `now`
    pub fn record_failure(&mut self, now: f64, resume: TransportState) -> StartupState {
        let attempts = match self.state {
            StartupState::Waiting { attempt, .. } => attempt + 1,
            _ => 1,
        };
        self.state = if attempts >= self.max_attempts {
            StartupState::GaveUp { attempts }
        } else {
            StartupState::Waiting {
                attempt: attempts,
                retry_at: now + self.retry_delay,
                resume,
            }
        };
        self.state
    }

    /// Transport state to restore if a retry is due at `now`
    pub fn due(&self, now: f64) -> Option<TransportState> {
        match self.state {
            StartupState::Waiting {
                retry_at, resume, ..
            } if now >= retry_at => Some(resume),
            _ => None,
        }
    }

    /// Change what a pending retry resumes into
    pub fn set_resume(&mut self, state: TransportState) {
        if let StartupState::Waiting { resume, .. } = &mut self.state {
            *resume = state;
        }
    }

    pub fn reset(&mut self) {
        self.state = StartupState::Idle;
    }
}

/// Coarse render engine status as seen by the control context
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineStatus {
    Running,
    Idle,
    Retrying { attempt: u32, retry_at: f64 },
    Unavailable { attempts: u32 },
}

impl AudioEngine {
    /// Run a topology change under the freeze/drain/restart protocol
    ///
    /// The render engine is restarted even when `mutate` fails, so a
    /// rejected edit never leaves audio paused.
    pub(super) fn safe_mutation<T>(
        &mut self,
        operation: &str,
        mutate: impl FnOnce(&mut EngineState) -> Result<T>,
    ) -> Result<T> {
        self.frozen = true;
        let was_running = self.render.is_running();
        if was_running {
            self.render.pause();
            self.state.topology.stop_all_players();
        }

        let outcome = mutate(&mut self.state);
        if let Err(e) = &outcome {
            warn!("[MUTATION] {} failed: {}", operation, e);
        }

        if was_running {
            let now = self.clock.now();
            let resume = self.state.transport.state();
            if self.try_start_render(now, resume) && self.state.transport.is_running() {
                let position = self.state.transport.tick(now).time;
                self.reschedule_all(position);
                self.start_all_players(now);
            }
        }

        self.frozen = false;
        outcome
    }

    /// Prepare and start the render engine, handing failures to the retry machine
    pub(super) fn try_start_render(&mut self, now: f64, resume: TransportState) -> bool {
        self.render.prepare();
        match self.render.start() {
            Ok(()) => {
                self.startup.reset();
                true
            }
            Err(e) => {
                self.handle_start_failure(now, resume, e);
                false
            }
        }
    }

    /// Bring transport in line with a render engine that is not running
    pub(super) fn handle_start_failure(
        &mut self,
        now: f64,
        resume: TransportState,
        cause: EngineError,
    ) {
        self.state.transport.force_stopped(now);
        self.state.topology.stop_all_players();
        match self.startup.record_failure(now, resume) {
            StartupState::Waiting {
                attempt, retry_at, ..
            } => warn!(
                "[MUTATION] Render engine start failed (attempt {}): {}; retrying at {:.3}",
                attempt, cause, retry_at
            ),
            StartupState::GaveUp { attempts } => error!(
                "[MUTATION] Render engine unavailable after {} attempt(s): {}",
                attempts, cause
            ),
            StartupState::Idle => {}
        }
    }

    /// Retry a failed start when due and restore the pending transport state
    pub(super) fn poll_startup(&mut self, now: f64) {
        let Some(resume) = self.startup.due(now) else {
            return;
        };
        if !self.try_start_render(now, resume) {
            return;
        }
        info!("[MUTATION] Render engine started on retry, resuming {}", resume);
        let started = match resume {
            TransportState::Playing => self.state.transport.play(now),
            TransportState::Recording => self.state.transport.record(now),
            TransportState::Stopped | TransportState::Paused => false,
        };
        if started {
            self.begin_playback(now);
        }
    }

    /// Current render engine status
    pub fn engine_status(&self) -> EngineStatus {
        match self.startup.state() {
            StartupState::GaveUp { attempts } => EngineStatus::Unavailable { attempts },
            StartupState::Waiting {
                attempt, retry_at, ..
            } => EngineStatus::Retrying { attempt, retry_at },
            StartupState::Idle if self.render.is_running() => EngineStatus::Running,
            StartupState::Idle => EngineStatus::Idle,
        }
    }

    /// `Err(EngineUnavailable)` once every start attempt has failed
    pub fn check_engine(&self) -> Result<()> {
        match self.startup.state() {
            StartupState::GaveUp { attempts } => Err(EngineError::EngineUnavailable { attempts }),
            _ => Ok(()),
        }
    }
}
