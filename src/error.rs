//! Error handling for Cadence
//!
//! Errors fall into three groups: recoverable-transient (render engine
//! start, unreadable sources), structural-inconsistency (deferred routing)
//! and caller-misuse (unknown ids). None of them are raised from the tick
//! path; they are logged there and only surface through the control API.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{BusId, EffectId, TrackId};

/// Result type alias for Cadence operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    // Caller Misuse
    #[error("Unknown track: {id}")]
    UnknownTrack { id: TrackId },

    #[error("Unknown bus: {id}")]
    UnknownBus { id: BusId },

    #[error("Unknown effect {effect} on bus {bus}")]
    UnknownEffect { bus: BusId, effect: EffectId },

    #[error("No send from track {track} to bus {bus}")]
    UnknownSend { track: TrackId, bus: BusId },

    #[error("Duplicate id: {id}")]
    DuplicateEntity { id: String },

    // Timeline Errors
    #[error("Invalid cycle region {start:.3}s..{end:.3}s (minimum length {min_length:.3}s)")]
    InvalidCycleRegion {
        start: f64,
        end: f64,
        min_length: f64,
    },

    #[error("Invalid region {region}: {reason}")]
    InvalidRegion { region: String, reason: String },

    // Source Errors
    #[error("Cannot open audio source {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    // Render Engine Errors
    #[error("Render engine failed to start: {reason}")]
    RenderStartFailed { reason: String },

    #[error("Render engine unavailable after {attempts} attempts")]
    EngineUnavailable { attempts: u32 },

    // Graph Errors
    #[error("Unknown graph node: {node}")]
    UnknownNode { node: usize },

    #[error("Connecting node {from} to node {to} would create a feedback loop")]
    FeedbackLoop { from: usize, to: usize },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::UnknownTrack { .. } => "UNKNOWN_TRACK",
            EngineError::UnknownBus { .. } => "UNKNOWN_BUS",
            EngineError::UnknownEffect { .. } => "UNKNOWN_EFFECT",
            EngineError::UnknownSend { .. } => "UNKNOWN_SEND",
            EngineError::DuplicateEntity { .. } => "DUPLICATE_ENTITY",
            EngineError::InvalidCycleRegion { .. } => "INVALID_CYCLE_REGION",
            EngineError::InvalidRegion { .. } => "INVALID_REGION",
            EngineError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            EngineError::RenderStartFailed { .. } => "RENDER_START_FAILED",
            EngineError::EngineUnavailable { .. } => "ENGINE_UNAVAILABLE",
            EngineError::UnknownNode { .. } => "UNKNOWN_NODE",
            EngineError::FeedbackLoop { .. } => "FEEDBACK_LOOP",
            EngineError::InvalidConfig { .. } => "INVALID_CONFIG",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Wav(_) => "WAV_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is transient and the operation may succeed later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::SourceUnavailable { .. }
                | EngineError::RenderStartFailed { .. }
                | EngineError::Wav(_)
                | EngineError::Io(_)
        )
    }

    /// Check if this error was caused by addressing an entity that does not exist
    pub fn is_caller_misuse(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownTrack { .. }
                | EngineError::UnknownBus { .. }
                | EngineError::UnknownEffect { .. }
                | EngineError::UnknownSend { .. }
                | EngineError::DuplicateEntity { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EngineError::UnknownTrack { id: TrackId::new() };
        assert_eq!(err.error_code(), "UNKNOWN_TRACK");
        assert!(err.is_caller_misuse());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_transient_errors_are_recoverable() {
        let err = EngineError::RenderStartFailed {
            reason: "device busy".to_string(),
        };
        assert!(err.is_recoverable());

        let err = EngineError::EngineUnavailable { attempts: 2 };
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "ENGINE_UNAVAILABLE");
    }
}
