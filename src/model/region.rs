//! Timeline regions
//!
//! Regions are immutable value records. An edit produces a new record with
//! the same id, which the engine detects through snapshot diffing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::RegionId;
use crate::error::{EngineError, Result};

/// A placement of an audio source on a track's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Stable identity across edits
    #[serde(default)]
    pub id: RegionId,
    /// Audio source reference (file path, resolved by the source loader)
    pub source: PathBuf,
    /// Timeline position in seconds
    pub start_time: f64,
    /// Length on the timeline in seconds (must be > 0)
    pub duration: f64,
    /// Offset into the source at which the region begins, in seconds
    #[serde(default)]
    pub offset_within_source: f64,
    /// Fade-in length in seconds
    #[serde(default)]
    pub fade_in: f64,
    /// Fade-out length in seconds
    #[serde(default)]
    pub fade_out: f64,
    /// Linear region gain
    #[serde(default = "unity")]
    pub gain: f32,
    /// Repeat the source window until the region's duration is filled
    #[serde(default)]
    pub is_looped: bool,
}

fn unity() -> f32 {
    1.0
}

impl Region {
    /// Create a region with no offset, fades or loop
    pub fn new(source: impl Into<PathBuf>, start_time: f64, duration: f64) -> Self {
        Self {
            id: RegionId::new(),
            source: source.into(),
            start_time,
            duration,
            offset_within_source: 0.0,
            fade_in: 0.0,
            fade_out: 0.0,
            gain: 1.0,
            is_looped: false,
        }
    }

    /// Builder: set the offset into the source
    pub fn with_offset(mut self, offset_within_source: f64) -> Self {
        self.offset_within_source = offset_within_source;
        self
    }

    /// Builder: set fade lengths
    pub fn with_fades(mut self, fade_in: f64, fade_out: f64) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    /// Builder: mark the region as looped
    pub fn looped(mut self) -> Self {
        self.is_looped = true;
        self
    }

    /// Timeline position where the region ends
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Check the record-level invariants that do not need the source
    ///
    /// The `offset_within_source < source_duration` half of the invariant is
    /// checked by the scheduler once the source has been opened.
    pub fn validate(&self) -> Result<()> {
        if !(self.duration > 0.0) {
            return Err(EngineError::InvalidRegion {
                region: self.id.to_string(),
                reason: format!("duration must be positive, got {}", self.duration),
            });
        }
        if !(self.offset_within_source >= 0.0) {
            return Err(EngineError::InvalidRegion {
                region: self.id.to_string(),
                reason: format!(
                    "offset within source must be non-negative, got {}",
                    self.offset_within_source
                ),
            });
        }
        if !self.start_time.is_finite() {
            return Err(EngineError::InvalidRegion {
                region: self.id.to_string(),
                reason: "start time is not finite".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_time() {
        let region = Region::new("a.wav", 2.0, 3.0);
        assert_eq!(region.end_time(), 5.0);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let region = Region::new("a.wav", 0.0, 0.0);
        assert!(region.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_offset() {
        let region = Region::new("a.wav", 0.0, 1.0).with_offset(-0.5);
        let err = region.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REGION");
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{ "source": "kick.wav", "start_time": 1.0, "duration": 2.0 }"#;
        let region: Region = serde_json::from_str(json).unwrap();
        assert_eq!(region.gain, 1.0);
        assert!(!region.is_looped);
        assert_eq!(region.offset_within_source, 0.0);
    }
}
