//! Cadence - Transport and Routing Engine
//!
//! The real-time core of a digital audio workstation: it owns the playback
//! position, builds and mutates the per-track and per-bus routing graph,
//! schedules timeline regions onto source nodes, and makes sure topology
//! changes never glitch a graph the render callback may be consuming.
//!
//! # Architecture
//!
//! Everything runs on a single control context:
//! - `engine::TransportClock`: play/pause/stop/record state and position
//! - `engine::RegionScheduler`: region -> segment reads from any position
//! - `engine::GraphTopology`: track/bus chains, sends, effect chains
//! - `AudioEngine`: safe mutations, loop jumps and startup retry on top
//!
//! The render callback itself belongs to an external `RenderEngine`.
//!
//! # Example
//! ```
//! use cadence::engine::{InMemorySourceLoader, ManualClock, OfflineRenderEngine, SourceInfo};
//! use cadence::model::{ProjectSnapshot, Region, Track};
//! use cadence::{AudioEngine, EngineConfig};
//!
//! let loader = InMemorySourceLoader::new()
//!     .with_source("drums.wav", SourceInfo::from_duration(48000, 8.0));
//! let clock = ManualClock::new();
//! let mut engine = AudioEngine::new(
//!     EngineConfig::default(),
//!     clock.clone(),
//!     OfflineRenderEngine::new(),
//!     loader,
//! )
//! .unwrap();
//!
//! let project = ProjectSnapshot::default()
//!     .with_track(Track::new("Drums").with_region(Region::new("drums.wav", 0.0, 8.0)));
//! engine.load_project(project).unwrap();
//! engine.play().unwrap();
//!
//! clock.advance(1.0);
//! assert_eq!(engine.tick().time, 1.0);
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;

pub use config::EngineConfig;
pub use engine::{AudioEngine, EngineState, PlaybackPosition, TransportState};
pub use error::{EngineError, Result};
