//! Processing node payloads
//!
//! Every stage in the routing graph is a tagged variant. Parameter
//! application dispatches on the tag; nothing inspects concrete types at
//! runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::model::{BusId, EffectKind, EqSettings, RegionId, TimePitch, TrackId};

/// Which project entity a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOwner {
    Track(TrackId),
    Bus(BusId),
    Master,
}

/// A segment read submitted to a source node
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSegment {
    pub region: RegionId,
    pub source: PathBuf,
    /// Read position within the source, in seconds
    pub source_offset: f64,
    /// Read position within the source, in frames
    pub start_frame: u64,
    /// Number of frames to read
    pub frame_count: u64,
    /// Sample rate of the source the frame counts refer to
    pub sample_rate: u32,
    /// Seconds after the player's start time at which the segment begins
    pub delay: f64,
    /// Effective fade-in length from the segment start
    pub fade_in: f64,
    /// Fade-out length at the segment end
    pub fade_out: f64,
    pub gain: f32,
}

impl ScheduledSegment {
    /// Length of the segment in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }
}

/// Playback state of a source node
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    /// Playing, with the engine time at which output begins
    Playing { start_at: f64 },
}

/// Segment queue and play state of a track's source node
#[derive(Debug, Clone, Default)]
pub struct SourcePlayer {
    segments: Vec<ScheduledSegment>,
    state: PlayerState,
    generation: u32,
}

impl SourcePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a segment; segments play in submission order
    pub fn schedule(&mut self, segment: ScheduledSegment) {
        self.segments.push(segment);
    }

    /// Start output at the given engine time
    pub fn play(&mut self, start_at: f64) {
        self.state = PlayerState::Playing { start_at };
    }

    /// Stop output and drop every queued segment
    pub fn stop(&mut self) {
        self.segments.clear();
        self.state = PlayerState::Stopped;
    }

    /// Stop and discard any buffered audio so no stale tail is rendered
    pub fn reset(&mut self) {
        self.stop();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayerState::Playing { .. })
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn segments(&self) -> &[ScheduledSegment] {
        &self.segments
    }

    /// Number of resets performed on this player
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Opaque processing unit behind an effect stage
#[derive(Debug, Clone, PartialEq)]
pub struct EffectUnit {
    pub kind: EffectKind,
    /// Parameter values after clamping by the applier table
    pub values: BTreeMap<String, f64>,
}

impl EffectUnit {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }
}

/// Typed processing stage
#[derive(Debug, Clone)]
pub enum NodeKind {
    Source(SourcePlayer),
    TimePitch(TimePitch),
    Equalizer(EqSettings),
    /// Track fader; `muted` carries the resolved solo/mute state
    Gain { level: f32, muted: bool },
    Pan { pan: f32 },
    Effect(EffectUnit),
    BusInput { gain: f32 },
    BusOutput { gain: f32, muted: bool },
    Master { volume: f32 },
}

impl NodeKind {
    /// Short name for logs and inspection output
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "source",
            NodeKind::TimePitch(_) => "time-pitch",
            NodeKind::Equalizer(_) => "equalizer",
            NodeKind::Gain { .. } => "gain",
            NodeKind::Pan { .. } => "pan",
            NodeKind::Effect(unit) => unit.kind.as_str(),
            NodeKind::BusInput { .. } => "bus-input",
            NodeKind::BusOutput { .. } => "bus-output",
            NodeKind::Master { .. } => "master",
        }
    }
}

/// A node in the routing graph
#[derive(Debug, Clone)]
pub struct ProcessingNode {
    pub owner: NodeOwner,
    pub kind: NodeKind,
}

impl ProcessingNode {
    pub fn new(owner: NodeOwner, kind: NodeKind) -> Self {
        Self { owner, kind }
    }

    /// Linear gain this stage applies to its output, if it is a level stage
    pub fn output_gain(&self) -> Option<f32> {
        match &self.kind {
            NodeKind::Gain { level, muted } | NodeKind::BusOutput { gain: level, muted } => {
                Some(if *muted { 0.0 } else { *level })
            }
            NodeKind::BusInput { gain } => Some(*gain),
            NodeKind::Master { volume } => Some(*volume),
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<&SourcePlayer> {
        match &self.kind {
            NodeKind::Source(player) => Some(player),
            _ => None,
        }
    }

    pub fn as_source_mut(&mut self) -> Option<&mut SourcePlayer> {
        match &mut self.kind {
            NodeKind::Source(player) => Some(player),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            NodeOwner::Track(id) => write!(f, "track {} {}", id, self.kind.label()),
            NodeOwner::Bus(id) => write!(f, "bus {} {}", id, self.kind.label()),
            NodeOwner::Master => write!(f, "{}", self.kind.label()),
        }
    }
}
