//! Audio source probing
//!
//! The scheduler only needs to know how long a source is and at which rate
//! its frames run. Opening a source is the one blocking operation on the
//! control context; failures are reported per source and never retried here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use hound::WavReader;

use crate::error::{EngineError, Result};

/// What the scheduler needs to know about an opened source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub sample_rate: u32,
    /// Length in frames (samples per channel)
    pub frames: u64,
}

impl SourceInfo {
    pub fn new(sample_rate: u32, frames: u64) -> Self {
        Self {
            sample_rate,
            frames,
        }
    }

    /// Build from a duration in seconds
    pub fn from_duration(sample_rate: u32, seconds: f64) -> Self {
        Self {
            sample_rate,
            frames: (seconds.max(0.0) * sample_rate as f64).round() as u64,
        }
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// Convert seconds to a frame position in this source
    pub fn frames_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

/// Opens region sources
pub trait SourceLoader {
    fn open(&self, path: &Path) -> Result<SourceInfo>;
}

/// Reads WAV headers from disk
#[derive(Debug, Clone, Default)]
pub struct WavSourceLoader {
    base_dir: Option<PathBuf>,
}

impl WavSourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative source paths against a directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl SourceLoader for WavSourceLoader {
    fn open(&self, path: &Path) -> Result<SourceInfo> {
        let resolved = self.resolve(path);
        let reader = WavReader::open(&resolved).map_err(|e| EngineError::SourceUnavailable {
            path: resolved.clone(),
            reason: e.to_string(),
        })?;
        let spec = reader.spec();
        // duration() is already per-channel
        Ok(SourceInfo::new(spec.sample_rate, reader.duration() as u64))
    }
}

/// Fixed table of sources, for tests and offline simulation
#[derive(Debug, Clone, Default)]
pub struct InMemorySourceLoader {
    sources: HashMap<PathBuf, SourceInfo>,
}

impl InMemorySourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a source
    pub fn with_source(mut self, path: impl Into<PathBuf>, info: SourceInfo) -> Self {
        self.insert(path, info);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, info: SourceInfo) {
        self.sources.insert(path.into(), info);
    }
}

impl SourceLoader for InMemorySourceLoader {
    fn open(&self, path: &Path) -> Result<SourceInfo> {
        self.sources
            .get(path)
            .copied()
            .ok_or_else(|| EngineError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "not registered".to_string(),
            })
    }
}
