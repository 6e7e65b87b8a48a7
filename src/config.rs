//! Engine configuration
//!
//! Tuning constants for the control context. Every field has a default, so
//! a config file only needs to name what it overrides.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tuning for the transport tick, loop jumps and engine startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render sample rate in Hz
    pub sample_rate: u32,
    /// Period of the position tick in milliseconds
    pub tick_interval_ms: u64,
    /// Clock-drift tolerance at the cycle end, in seconds
    pub cycle_tolerance: f64,
    /// Minimum time between two loop jumps, in seconds
    pub cycle_cooldown: f64,
    /// Forward offset applied to the restart time after a loop jump, in seconds
    pub jump_lead: f64,
    /// Shortest allowed cycle region, in seconds
    pub min_cycle_length: f64,
    /// Delay before retrying a failed render engine start, in seconds
    pub startup_retry_delay: f64,
    /// Total start attempts (initial attempt included) before giving up
    pub startup_max_attempts: u32,
    /// Bound for the three-band EQ gains, in dB
    pub max_eq_gain_db: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            tick_interval_ms: 16,
            cycle_tolerance: 0.002,
            cycle_cooldown: 0.1,
            jump_lead: 0.005,
            min_cycle_length: 0.1,
            startup_retry_delay: 0.1,
            startup_max_attempts: 2,
            max_eq_gain_db: 12.0,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Tick period in seconds
    pub fn tick_interval(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(EngineError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be positive");
        }
        // Negated comparisons so NaN is rejected too
        let timings = [
            self.cycle_tolerance,
            self.cycle_cooldown,
            self.jump_lead,
            self.startup_retry_delay,
        ];
        if timings.iter().any(|t| !(*t >= 0.0) || t.is_infinite()) {
            return invalid("timings must be finite and non-negative");
        }
        if !(self.min_cycle_length > self.cycle_tolerance) || self.min_cycle_length.is_infinite() {
            return invalid("min_cycle_length must exceed cycle_tolerance");
        }
        if !(self.max_eq_gain_db >= 0.0) || self.max_eq_gain_db.is_infinite() {
            return invalid("max_eq_gain_db must be finite and non-negative");
        }
        if self.startup_max_attempts == 0 {
            return invalid("startup_max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), 0.016);
    }

    #[test_case(EngineConfig { cycle_cooldown: f64::NAN, ..EngineConfig::default() } ; "nan cooldown")]
    #[test_case(EngineConfig { jump_lead: -0.001, ..EngineConfig::default() } ; "negative jump lead")]
    #[test_case(EngineConfig { startup_retry_delay: f64::INFINITY, ..EngineConfig::default() } ; "infinite retry delay")]
    #[test_case(EngineConfig { min_cycle_length: f64::NAN, ..EngineConfig::default() } ; "nan min cycle length")]
    #[test_case(EngineConfig { min_cycle_length: 0.001, ..EngineConfig::default() } ; "min cycle within tolerance")]
    #[test_case(EngineConfig { max_eq_gain_db: f32::NAN, ..EngineConfig::default() } ; "nan eq bound")]
    fn test_invalid_values_rejected(config: EngineConfig) {
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cycle_cooldown": 0.25, "startup_max_attempts": 3 }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cycle_cooldown, 0.25);
        assert_eq!(config.startup_max_attempts, 3);
        assert_eq!(config.sample_rate, 48000);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "tick_interval_ms": 0 }}"#).unwrap();

        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
