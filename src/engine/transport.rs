//! Transport Clock
//!
//! Single source of truth for playback position. While running, position
//! is derived from wall-clock time as `now - anchor + paused_offset`; the
//! musical (bar/beat) position is a projection recomputed on every tick and
//! never fed back into the time position.

use std::fmt;

use log::{debug, warn};

use crate::model::TimeSignature;

/// Transport states representing the current playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Transport is stopped (default state); position is retained
    #[default]
    Stopped,
    /// Audio is actively playing
    Playing,
    /// Playback is suspended and resumes from the same position
    Paused,
    /// Audio is playing and being recorded
    Recording,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
            TransportState::Recording => write!(f, "Recording"),
        }
    }
}

/// Bar/beat projection of a time position (1-based bar and beat)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat_in_bar: u32,
    /// Progress through the current beat in [0, 1)
    pub fractional_beat: f64,
}

impl Default for MusicalPosition {
    fn default() -> Self {
        Self {
            bar: 1,
            beat_in_bar: 1,
            fractional_beat: 0.0,
        }
    }
}

impl fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{:03}",
            self.bar,
            self.beat_in_bar,
            (self.fractional_beat * 1000.0) as u32
        )
    }
}

/// Playback position as linear time plus its musical projection
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackPosition {
    /// Seconds from the start of the timeline
    pub time: f64,
    pub musical: MusicalPosition,
}

/// Transport state machine and position clock
///
/// Every method that depends on the passage of time takes `now` explicitly,
/// so the clock can be driven by any time source.
#[derive(Debug, Clone)]
pub struct TransportClock {
    state: TransportState,
    /// Wall-clock time at which the current run started
    anchor: f64,
    /// Timeline position the current run started from
    paused_offset: f64,
    tempo: f64,
    time_signature: TimeSignature,
    position: PlaybackPosition,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new(120.0, TimeSignature::default())
    }
}

impl TransportClock {
    /// Create a stopped transport at position zero
    ///
    /// # Example
    /// ```
    /// use cadence::engine::{TransportClock, TransportState};
    /// use cadence::model::TimeSignature;
    ///
    /// let transport = TransportClock::new(120.0, TimeSignature::default());
    /// assert_eq!(transport.state(), TransportState::Stopped);
    /// ```
    pub fn new(tempo: f64, time_signature: TimeSignature) -> Self {
        Self {
            state: TransportState::Stopped,
            anchor: 0.0,
            paused_offset: 0.0,
            tempo,
            time_signature,
            position: PlaybackPosition::default(),
        }
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Start playback from the retained position
    ///
    /// State transitions: Stopped/Paused -> Playing. Returns true when the
    /// state changed.
    ///
    /// # Example
    /// ```
    /// use cadence::engine::TransportClock;
    ///
    /// let mut transport = TransportClock::default();
    /// transport.seek(10.0, 4.0);
    /// transport.play(10.0);
    /// assert_eq!(transport.current_position(12.5), 6.5);
    /// ```
    pub fn play(&mut self, now: f64) -> bool {
        match self.state {
            TransportState::Stopped | TransportState::Paused => {
                self.anchor = now;
                self.state = TransportState::Playing;
                debug!("[TRANSPORT] Play from {:.3}s", self.paused_offset);
                true
            }
            TransportState::Playing => {
                debug!("[TRANSPORT] Already playing");
                false
            }
            TransportState::Recording => {
                warn!("[TRANSPORT] Cannot play while recording - stop recording first");
                false
            }
        }
    }

    /// Pause playback, keeping the position
    ///
    /// State transitions: Playing -> Paused
    pub fn pause(&mut self, now: f64) -> bool {
        match self.state {
            TransportState::Playing => {
                self.paused_offset = self.current_position(now);
                self.state = TransportState::Paused;
                debug!("[TRANSPORT] Paused at {:.3}s", self.paused_offset);
                true
            }
            other => {
                debug!("[TRANSPORT] Pause ignored while {}", other);
                false
            }
        }
    }

    /// Stop playback or recording without rewinding
    ///
    /// State transitions: Playing/Recording/Paused -> Stopped
    pub fn stop(&mut self, now: f64) -> bool {
        if self.state == TransportState::Stopped {
            return false;
        }
        self.paused_offset = self.current_position(now);
        self.state = TransportState::Stopped;
        self.refresh(now);
        debug!("[TRANSPORT] Stopped at {:.3}s", self.paused_offset);
        true
    }

    /// Start recording
    ///
    /// State transitions:
    /// - Playing -> Recording (punch-in, position continues)
    /// - Stopped/Paused -> Recording (starts the clock from the retained position)
    pub fn record(&mut self, now: f64) -> bool {
        match self.state {
            TransportState::Playing => {
                self.state = TransportState::Recording;
                debug!(
                    "[TRANSPORT] Recording (punch-in) at {:.3}s",
                    self.current_position(now)
                );
                true
            }
            TransportState::Stopped | TransportState::Paused => {
                self.anchor = now;
                self.state = TransportState::Recording;
                debug!("[TRANSPORT] Recording started at {:.3}s", self.paused_offset);
                true
            }
            TransportState::Recording => {
                debug!("[TRANSPORT] Already recording");
                false
            }
        }
    }

    /// Stop recording
    ///
    /// State transitions: Recording -> Stopped
    pub fn stop_recording(&mut self, now: f64) -> bool {
        if self.state != TransportState::Recording {
            debug!("[TRANSPORT] Not recording");
            return false;
        }
        self.stop(now)
    }

    /// Move the playhead, clamped to >= 0
    ///
    /// While running, the clock is re-anchored so position continues from
    /// the target without a state change.
    pub fn seek(&mut self, now: f64, position: f64) {
        let target = if position.is_finite() {
            position.max(0.0)
        } else {
            0.0
        };
        self.anchor = now;
        self.paused_offset = target;
        self.refresh(now);
        debug!("[TRANSPORT] Seek to {:.3}s", target);
    }

    /// Drop to Stopped from any state, retaining the position
    ///
    /// Used when the audio side could not follow a transition and the
    /// transport must be brought back in line with it.
    pub fn force_stopped(&mut self, now: f64) {
        if self.is_running() {
            self.paused_offset = self.current_position(now);
        }
        self.state = TransportState::Stopped;
        self.refresh(now);
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// Timeline position in seconds at wall-clock time `now`
    pub fn current_position(&self, now: f64) -> f64 {
        if self.is_running() {
            (now - self.anchor + self.paused_offset).max(self.paused_offset)
        } else {
            self.paused_offset
        }
    }

    /// Recompute the position and its musical projection
    pub fn tick(&mut self, now: f64) -> PlaybackPosition {
        self.refresh(now);
        self.position
    }

    /// Position as of the last tick or transport change
    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    fn refresh(&mut self, now: f64) {
        let time = self.current_position(now);
        self.position = PlaybackPosition {
            time,
            musical: self.musical_position(time),
        };
    }

    /// Project a time position onto bars and beats
    ///
    /// The beat unit is the time signature's denominator; tempo counts those
    /// units per minute.
    ///
    /// # Example
    /// ```
    /// use cadence::engine::TransportClock;
    ///
    /// let transport = TransportClock::default(); // 120 bpm, 4/4
    /// let pos = transport.musical_position(2.25);
    /// assert_eq!((pos.bar, pos.beat_in_bar), (2, 1));
    /// assert!((pos.fractional_beat - 0.5).abs() < 1e-9);
    /// ```
    pub fn musical_position(&self, time: f64) -> MusicalPosition {
        if self.tempo <= 0.0 || self.time_signature.numerator == 0 {
            return MusicalPosition::default();
        }
        let beats = time.max(0.0) * self.tempo / 60.0;
        let per_bar = self.time_signature.numerator as f64;
        let whole_beats = beats.floor();
        MusicalPosition {
            bar: (whole_beats / per_bar).floor() as u32 + 1,
            beat_in_bar: (whole_beats % per_bar) as u32 + 1,
            fractional_beat: beats - whole_beats,
        }
    }

    /// Update tempo and meter; affects only the musical projection
    pub fn set_tempo(&mut self, tempo: f64, time_signature: TimeSignature) {
        self.tempo = tempo;
        self.time_signature = time_signature;
        self.position.musical = self.musical_position(self.position.time);
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.state == TransportState::Recording
    }

    /// True while the clock advances (playing or recording)
    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            TransportState::Playing | TransportState::Recording
        )
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ------------------------------------------------------------------------
    // State Transition Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_state_is_stopped() {
        let transport = TransportClock::default();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.current_position(5.0), 0.0);
    }

    #[test]
    fn test_play_advances_with_clock() {
        let mut transport = TransportClock::default();
        assert!(transport.play(100.0));
        assert_relative_eq!(transport.current_position(101.5), 1.5);
    }

    #[test]
    fn test_pause_and_resume_keeps_offset() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        assert!(transport.pause(2.0));
        assert_eq!(transport.state(), TransportState::Paused);

        // Time passes while paused
        assert_relative_eq!(transport.current_position(10.0), 2.0);

        transport.play(10.0);
        assert_relative_eq!(transport.current_position(11.0), 3.0);
    }

    #[test]
    fn test_stop_does_not_rewind() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        assert!(transport.stop(4.0));
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_relative_eq!(transport.current_position(9.0), 4.0);
    }

    #[test]
    fn test_record_from_playing_and_stop_recording() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        assert!(transport.record(1.0));
        assert!(transport.is_recording());
        assert_relative_eq!(transport.current_position(2.0), 2.0);

        assert!(transport.stop_recording(3.0));
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_relative_eq!(transport.current_position(3.0), 3.0);
    }

    #[test]
    fn test_play_while_recording_blocked() {
        let mut transport = TransportClock::default();
        transport.record(0.0);
        assert!(!transport.play(1.0));
        assert!(transport.is_recording());
    }

    #[test]
    fn test_double_play_no_op() {
        let mut transport = TransportClock::default();
        assert!(transport.play(0.0));
        assert!(!transport.play(5.0));
        // Anchor must not move on a redundant play
        assert_relative_eq!(transport.current_position(5.0), 5.0);
    }

    #[test]
    fn test_stop_recording_when_not_recording() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        assert!(!transport.stop_recording(1.0));
        assert!(transport.is_playing());
    }

    // ------------------------------------------------------------------------
    // Seek Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_seek_negative_clamped() {
        let mut transport = TransportClock::default();
        transport.seek(0.0, -10.0);
        assert_eq!(transport.current_position(0.0), 0.0);
    }

    #[test]
    fn test_seek_while_playing_reanchors() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        transport.seek(3.0, 20.0);
        assert!(transport.is_playing());
        assert_relative_eq!(transport.current_position(4.0), 21.0);
    }

    #[test]
    fn test_force_stopped_retains_position() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        transport.force_stopped(1.25);
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_relative_eq!(transport.current_position(8.0), 1.25);
    }

    // ------------------------------------------------------------------------
    // Musical Projection Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_musical_position_origin() {
        let transport = TransportClock::default();
        assert_eq!(transport.musical_position(0.0), MusicalPosition::default());
    }

    #[test]
    fn test_musical_position_three_four() {
        let transport = TransportClock::new(
            60.0,
            TimeSignature {
                numerator: 3,
                denominator: 4,
            },
        );
        // 60 bpm: one beat per second, three beats per bar
        let pos = transport.musical_position(7.25);
        assert_eq!(pos.bar, 3);
        assert_eq!(pos.beat_in_bar, 2);
        assert_relative_eq!(pos.fractional_beat, 0.25);
    }

    #[test]
    fn test_tick_updates_projection() {
        let mut transport = TransportClock::default();
        transport.play(0.0);
        let pos = transport.tick(2.0);
        assert_relative_eq!(pos.time, 2.0);
        assert_eq!(pos.musical.bar, 2);
        assert_eq!(transport.position(), pos);
    }

    #[test]
    fn test_set_tempo_reprojects() {
        let mut transport = TransportClock::default();
        transport.seek(0.0, 2.0);
        assert_eq!(transport.position().musical.bar, 2);
        transport.set_tempo(60.0, TimeSignature::default());
        assert_eq!(transport.position().musical.bar, 1);
        assert_eq!(transport.position().musical.beat_in_bar, 3);
    }

    #[test]
    fn test_transport_state_display() {
        assert_eq!(format!("{}", TransportState::Stopped), "Stopped");
        assert_eq!(format!("{}", TransportState::Playing), "Playing");
        assert_eq!(format!("{}", TransportState::Paused), "Paused");
        assert_eq!(format!("{}", TransportState::Recording), "Recording");
    }
}
