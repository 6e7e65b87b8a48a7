//! Project Model Mirror
//!
//! Read-only snapshot records handed to the engine by the project/editing
//! collaborators. The engine never mutates these in place; it diffs
//! successive snapshots and keeps its graph mirror consistent with them.

mod bus;
mod diff;
mod project;
mod region;
mod track;

pub use bus::{Bus, EffectKind, EffectStage};
pub use diff::{BusDelta, ProjectDelta, RegionDelta, SendDelta, TrackDelta};
pub use project::{ProjectSnapshot, TimeSignature};
pub use region::Region;
pub use track::{EqSettings, MixerSettings, Send, TimePitch, Track};

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of a track
    TrackId
);
entity_id!(
    /// Identity of an auxiliary bus
    BusId
);
entity_id!(
    /// Identity of a timeline region
    RegionId
);
entity_id!(
    /// Identity of an effect stage within a bus
    EffectId
);
