//! Snapshot diffing
//!
//! Compares two project snapshots and classifies every difference as
//! structural (needs a safe mutation), mixer-level (applied directly) or
//! timeline (needs rescheduling).

use std::collections::HashMap;

use super::{Bus, BusId, EffectId, ProjectSnapshot, Region, RegionId, Send, Track, TrackId};

/// Region-set changes on one track, keyed by region id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionDelta {
    pub added: Vec<RegionId>,
    pub removed: Vec<RegionId>,
    /// Same id, different record (moved, trimmed, re-faded, ...)
    pub moved: Vec<RegionId>,
}

impl RegionDelta {
    /// Diff two region lists
    pub fn between(old: &[Region], new: &[Region]) -> Self {
        let old_by_id: HashMap<RegionId, &Region> = old.iter().map(|r| (r.id, r)).collect();
        let new_by_id: HashMap<RegionId, &Region> = new.iter().map(|r| (r.id, r)).collect();

        let mut delta = RegionDelta::default();
        for region in new {
            match old_by_id.get(&region.id) {
                None => delta.added.push(region.id),
                Some(previous) if *previous != region => delta.moved.push(region.id),
                Some(_) => {}
            }
        }
        for region in old {
            if !new_by_id.contains_key(&region.id) {
                delta.removed.push(region.id);
            }
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

/// Send changes on one track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendDelta {
    pub added: Vec<Send>,
    pub removed: Vec<BusId>,
    /// Sends whose only change is the level
    pub level_changed: Vec<Send>,
}

impl SendDelta {
    pub fn between(old: &[Send], new: &[Send]) -> Self {
        let mut delta = SendDelta::default();
        for send in new {
            match old.iter().find(|s| s.bus == send.bus) {
                None => delta.added.push(*send),
                Some(previous) if previous.pre_fader != send.pre_fader => {
                    // Moving the tap point is a rewire
                    delta.removed.push(send.bus);
                    delta.added.push(*send);
                }
                Some(previous) if previous.level != send.level => {
                    delta.level_changed.push(*send)
                }
                Some(_) => {}
            }
        }
        for send in old {
            if !new.iter().any(|s| s.bus == send.bus) {
                delta.removed.push(send.bus);
            }
        }
        delta
    }

    /// True when the track's routing has to be rewired
    pub fn is_structural(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_structural() && self.level_changed.is_empty()
    }
}

/// Changes to a track present in both snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDelta {
    pub id: TrackId,
    pub mixer_changed: bool,
    pub time_pitch_changed: bool,
    pub sends: SendDelta,
    pub regions: RegionDelta,
}

impl TrackDelta {
    pub fn between(old: &Track, new: &Track) -> Self {
        Self {
            id: new.id,
            mixer_changed: old.mixer != new.mixer,
            time_pitch_changed: old.time_pitch != new.time_pitch,
            sends: SendDelta::between(&old.sends, &new.sends),
            regions: RegionDelta::between(&old.regions, &new.regions),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.mixer_changed
            && !self.time_pitch_changed
            && self.sends.is_empty()
            && self.regions.is_empty()
    }
}

/// Changes to a bus present in both snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct BusDelta {
    pub id: BusId,
    /// Effects added, removed, reordered or toggled: the chain needs a rebuild
    pub chain_changed: bool,
    /// Effects whose parameters changed in place
    pub parameters_changed: Vec<EffectId>,
    /// Input/output gain, mute or solo changed
    pub levels_changed: bool,
}

impl BusDelta {
    pub fn between(old: &Bus, new: &Bus) -> Self {
        let shape = |bus: &Bus| {
            bus.effects
                .iter()
                .map(|e| (e.id, e.kind, e.enabled))
                .collect::<Vec<_>>()
        };
        let chain_changed = shape(old) != shape(new);

        let parameters_changed = new
            .effects
            .iter()
            .filter(|effect| {
                old.effect(effect.id)
                    .is_some_and(|previous| previous.parameters != effect.parameters)
            })
            .map(|effect| effect.id)
            .collect();

        let levels_changed = old.input_gain != new.input_gain
            || old.output_gain != new.output_gain
            || old.mute != new.mute
            || old.solo != new.solo;

        Self {
            id: new.id,
            chain_changed,
            parameters_changed,
            levels_changed,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.chain_changed && self.parameters_changed.is_empty() && !self.levels_changed
    }
}

/// Everything that differs between two project snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDelta {
    pub tracks_added: Vec<TrackId>,
    pub tracks_removed: Vec<TrackId>,
    pub tracks_changed: Vec<TrackDelta>,
    pub buses_added: Vec<BusId>,
    pub buses_removed: Vec<BusId>,
    pub buses_changed: Vec<BusDelta>,
    pub tempo_changed: bool,
    pub master_changed: bool,
}

impl ProjectDelta {
    pub fn between(old: &ProjectSnapshot, new: &ProjectSnapshot) -> Self {
        let mut delta = ProjectDelta {
            tempo_changed: old.tempo != new.tempo || old.time_signature != new.time_signature,
            master_changed: old.master_volume != new.master_volume,
            ..Default::default()
        };

        for track in &new.tracks {
            match old.track(track.id) {
                None => delta.tracks_added.push(track.id),
                Some(previous) => {
                    let track_delta = TrackDelta::between(previous, track);
                    if !track_delta.is_empty() {
                        delta.tracks_changed.push(track_delta);
                    }
                }
            }
        }
        for track in &old.tracks {
            if new.track(track.id).is_none() {
                delta.tracks_removed.push(track.id);
            }
        }

        for bus in &new.buses {
            match old.bus(bus.id) {
                None => delta.buses_added.push(bus.id),
                Some(previous) => {
                    let bus_delta = BusDelta::between(previous, bus);
                    if !bus_delta.is_empty() {
                        delta.buses_changed.push(bus_delta);
                    }
                }
            }
        }
        for bus in &old.buses {
            if new.bus(bus.id).is_none() {
                delta.buses_removed.push(bus.id);
            }
        }

        delta
    }

    /// True when applying this delta alters graph topology
    pub fn is_structural(&self) -> bool {
        !self.tracks_added.is_empty()
            || !self.tracks_removed.is_empty()
            || !self.buses_added.is_empty()
            || !self.buses_removed.is_empty()
            || self.buses_changed.iter().any(|b| b.chain_changed)
            || self.tracks_changed.iter().any(|t| t.sends.is_structural())
    }

    pub fn is_empty(&self) -> bool {
        self.tracks_added.is_empty()
            && self.tracks_removed.is_empty()
            && self.tracks_changed.is_empty()
            && self.buses_added.is_empty()
            && self.buses_removed.is_empty()
            && self.buses_changed.is_empty()
            && !self.tempo_changed
            && !self.master_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EffectKind, EffectStage};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_region_delta_detects_add_remove_move() {
        let a = Region::new("a.wav", 0.0, 1.0);
        let b = Region::new("b.wav", 1.0, 1.0);
        let c = Region::new("c.wav", 2.0, 1.0);

        let mut moved_b = b.clone();
        moved_b.start_time = 5.0;

        let delta = RegionDelta::between(&[a.clone(), b.clone()], &[moved_b, c.clone()]);
        assert_eq!(delta.added, vec![c.id]);
        assert_eq!(delta.removed, vec![a.id]);
        assert_eq!(delta.moved, vec![b.id]);
    }

    #[test]
    fn test_region_delta_identical_is_empty() {
        let regions = vec![Region::new("a.wav", 0.0, 1.0)];
        assert!(RegionDelta::between(&regions, &regions).is_empty());
    }

    #[test]
    fn test_send_level_change_is_not_structural() {
        let bus = BusId::new();
        let delta = SendDelta::between(&[Send::new(bus, 0.5)], &[Send::new(bus, 0.7)]);
        assert!(!delta.is_structural());
        assert_eq!(delta.level_changed.len(), 1);
    }

    #[test]
    fn test_send_tap_change_is_rewire() {
        let bus = BusId::new();
        let mut pre = Send::new(bus, 0.5);
        pre.pre_fader = true;
        let delta = SendDelta::between(&[Send::new(bus, 0.5)], &[pre]);
        assert!(delta.is_structural());
        assert_eq!(delta.removed, vec![bus]);
        assert_eq!(delta.added, vec![pre]);
    }

    #[test]
    fn test_bus_parameter_change_is_not_chain_change() {
        let effect = EffectStage::new(EffectKind::Reverb).with_param("wet_dry_mix", 30.0);
        let old = Bus::new("Verb").with_effect(effect.clone());
        let mut new = old.clone();
        new.effects[0].parameters.insert("wet_dry_mix".into(), 60.0);

        let delta = BusDelta::between(&old, &new);
        assert!(!delta.chain_changed);
        assert_eq!(delta.parameters_changed, vec![effect.id]);
    }

    #[test]
    fn test_bus_toggle_is_chain_change() {
        let old = Bus::new("Verb").with_effect(EffectStage::new(EffectKind::Reverb));
        let mut new = old.clone();
        new.effects[0].enabled = false;
        assert!(BusDelta::between(&old, &new).chain_changed);
    }

    #[test]
    fn test_project_delta_structural_classification() {
        let track = Track::new("A");
        let old = ProjectSnapshot::default().with_track(track.clone());

        let mut mixer_only = old.clone();
        mixer_only.tracks[0].mixer.volume = 0.2;
        let delta = ProjectDelta::between(&old, &mixer_only);
        assert!(!delta.is_structural());
        assert!(delta.tracks_changed[0].mixer_changed);

        let added = old.clone().with_track(Track::new("B"));
        let delta = ProjectDelta::between(&old, &added);
        assert!(delta.is_structural());
        assert_eq!(delta.tracks_added.len(), 1);

        assert!(ProjectDelta::between(&old, &old).is_empty());
    }
}
