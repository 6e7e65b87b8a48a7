//! Tracks, mixer settings and sends

use serde::{Deserialize, Serialize};

use super::{BusId, Region, TrackId};

/// Three-band equalizer gains in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EqSettings {
    pub low_db: f32,
    pub mid_db: f32,
    pub high_db: f32,
}

/// Per-track mixer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Fader level in [0, 1]
    pub volume: f32,
    /// Stereo position in [-1, 1]
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub record_enabled: bool,
    pub input_monitoring: bool,
    pub eq: EqSettings,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            mute: false,
            solo: false,
            record_enabled: false,
            input_monitoring: false,
            eq: EqSettings::default(),
        }
    }
}

/// Settings for the optional pitch/time stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePitch {
    /// Playback rate multiplier (1.0 = unchanged)
    pub rate: f32,
    /// Pitch shift in cents
    pub pitch_cents: f32,
}

impl Default for TimePitch {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch_cents: 0.0,
        }
    }
}

impl TimePitch {
    /// True when the stage leaves the signal untouched
    pub fn is_neutral(&self) -> bool {
        self.rate == 1.0 && self.pitch_cents == 0.0
    }
}

/// A routing edge from the owning track to an auxiliary bus
///
/// Sends are not nodes. They exist as an entry in the topology's
/// connection table plus a per-destination gain on the track's tap stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub bus: BusId,
    /// Send level in [0, 1]
    pub level: f32,
    /// Tap the signal before the track fader instead of after pan
    #[serde(default)]
    pub pre_fader: bool,
}

impl Send {
    /// Post-fader send at the given level
    pub fn new(bus: BusId, level: f32) -> Self {
        Self {
            bus,
            level,
            pre_fader: false,
        }
    }
}

/// A track as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    /// Regions in timeline order
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub mixer: MixerSettings,
    #[serde(default)]
    pub sends: Vec<Send>,
    #[serde(default)]
    pub time_pitch: TimePitch,
}

impl Track {
    /// Create an empty track with default mixer settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            regions: Vec::new(),
            mixer: MixerSettings::default(),
            sends: Vec::new(),
            time_pitch: TimePitch::default(),
        }
    }

    /// Builder: append a region
    pub fn with_region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    /// Find the send addressed to a bus
    pub fn send_to(&self, bus: BusId) -> Option<&Send> {
        self.sends.iter().find(|s| s.bus == bus)
    }

    /// Timeline position where the last region ends (0 for an empty track)
    pub fn end_time(&self) -> f64 {
        self.regions
            .iter()
            .map(|r| r.end_time())
            .fold(0.0, f64::max)
    }
}
