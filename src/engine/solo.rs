//! Solo/Mute Resolver
//!
//! A track is silent when it is muted itself, or when any track is soloed
//! and it is not one of them. The result is applied to gain stages only;
//! muting never touches connections.

use std::collections::HashMap;

use crate::model::{Bus, BusId, Track, TrackId};

/// Effective mute for one track given whether any track is soloed
pub fn effective_mute(track: &Track, any_solo: bool) -> bool {
    track.mixer.mute || (any_solo && !track.mixer.solo)
}

/// Effective mute for every track
pub fn resolve_tracks(tracks: &[Track]) -> HashMap<TrackId, bool> {
    let any_solo = tracks.iter().any(|t| t.mixer.solo);
    tracks
        .iter()
        .map(|t| (t.id, effective_mute(t, any_solo)))
        .collect()
}

/// Effective mute for every bus, with bus solos scoped to buses
pub fn resolve_buses(buses: &[Bus]) -> HashMap<BusId, bool> {
    let any_solo = buses.iter().any(|b| b.solo);
    buses
        .iter()
        .map(|b| (b.id, b.mute || (any_solo && !b.solo)))
        .collect()
}
