//! Project snapshot
//!
//! The unit the engine is (re)built from. Persistence belongs to the
//! project model; the engine only reads snapshots, optionally from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Bus, BusId, Track, TrackId};
use crate::error::Result;

/// Musical meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

/// Read-only view of a project handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub name: String,
    /// Beats per minute
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    /// Tracks in display order
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Buses in display order
    #[serde(default)]
    pub buses: Vec<Bus>,
    #[serde(default = "default_master_volume")]
    pub master_volume: f32,
}

fn default_tempo() -> f64 {
    120.0
}

fn default_master_volume() -> f32 {
    1.0
}

impl Default for ProjectSnapshot {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            tempo: default_tempo(),
            time_signature: TimeSignature::default(),
            tracks: Vec::new(),
            buses: Vec::new(),
            master_volume: default_master_volume(),
        }
    }
}

impl ProjectSnapshot {
    /// Load a snapshot from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let snapshot = serde_json::from_reader(BufReader::new(file))?;
        Ok(snapshot)
    }

    /// Builder: append a track
    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    /// Builder: append a bus
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.buses.push(bus);
        self
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.iter().find(|b| b.id == id)
    }

    pub fn bus_mut(&mut self, id: BusId) -> Option<&mut Bus> {
        self.buses.iter_mut().find(|b| b.id == id)
    }

    /// End of the last region on any track
    pub fn end_time(&self) -> f64 {
        self.tracks.iter().map(Track::end_time).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;

    #[test]
    fn test_end_time_spans_all_tracks() {
        let project = ProjectSnapshot::default()
            .with_track(Track::new("A").with_region(Region::new("a.wav", 0.0, 4.0)))
            .with_track(Track::new("B").with_region(Region::new("b.wav", 2.0, 4.0)));
        assert_eq!(project.end_time(), 6.0);
    }

    #[test]
    fn test_empty_project_defaults() {
        let project: ProjectSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(project.tempo, 120.0);
        assert_eq!(project.time_signature, TimeSignature::default());
        assert_eq!(project.end_time(), 0.0);
    }
}
