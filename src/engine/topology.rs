//! Graph Topology Manager
//!
//! Builds and tears down the per-track and per-bus node chains, keeps the
//! send connection table, and rewires a bus's effect chain. This is the only
//! component that adds or removes graph edges.
//!
//! Track chain: source -> time/pitch -> equalizer -> gain -> pan -> {master, post-fader sends}
//! Pre-fader sends tap the equalizer output alongside the gain stage.
//! Bus chain: input -> enabled effects in list order -> output -> master

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use super::effects;
use crate::error::{EngineError, Result};
use crate::graph::{NodeGraph, NodeId, NodeKind, NodeOwner, ProcessingNode, SourcePlayer};
use crate::model::{Bus, BusId, EffectId, EffectStage, EqSettings, TimePitch, Track, TrackId};

/// Nodes owned by one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackNodes {
    pub source: NodeId,
    pub time_pitch: NodeId,
    pub equalizer: NodeId,
    pub gain: NodeId,
    pub pan: NodeId,
}

impl TrackNodes {
    /// All nodes in signal order
    pub fn all(&self) -> [NodeId; 5] {
        [
            self.source,
            self.time_pitch,
            self.equalizer,
            self.gain,
            self.pan,
        ]
    }
}

/// Nodes owned by one bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusNodes {
    pub input: NodeId,
    pub output: NodeId,
    /// Effect nodes in the bus's list order, enabled or not
    effects: Vec<(EffectId, NodeId)>,
}

impl BusNodes {
    pub fn effect_node(&self, effect: EffectId) -> Option<NodeId> {
        self.effects
            .iter()
            .find(|(id, _)| *id == effect)
            .map(|(_, node)| *node)
    }

    pub fn effect_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.effects.iter().map(|(_, node)| *node)
    }
}

/// Whether a send is carrying signal yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Active,
    /// The destination bus has no nodes yet; wired when it is created
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SendRoute {
    level: f32,
    pre_fader: bool,
}

/// Owner of the routing graph and the per-entity node maps
#[derive(Debug)]
pub struct GraphTopology {
    graph: NodeGraph,
    master: NodeId,
    tracks: HashMap<TrackId, TrackNodes>,
    buses: HashMap<BusId, BusNodes>,
    /// Connection table: every send, wired or deferred
    sends: HashMap<TrackId, BTreeMap<BusId, SendRoute>>,
}

impl GraphTopology {
    /// Create a graph holding only the master mixer
    pub fn new(master_volume: f32) -> Self {
        let mut graph = NodeGraph::new();
        let master = graph.attach(ProcessingNode::new(
            NodeOwner::Master,
            NodeKind::Master {
                volume: master_volume.clamp(0.0, 1.0),
            },
        ));
        Self {
            graph,
            master,
            tracks: HashMap::new(),
            buses: HashMap::new(),
            sends: HashMap::new(),
        }
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    /// Instantiate a track's chain, wire it in series and route its output
    pub fn create_track_nodes(&mut self, track: &Track) -> Result<TrackNodes> {
        if self.tracks.contains_key(&track.id) {
            return Err(EngineError::DuplicateEntity {
                id: track.id.to_string(),
            });
        }

        let owner = NodeOwner::Track(track.id);
        let mut attach = |kind| self.graph.attach(ProcessingNode::new(owner, kind));
        let nodes = TrackNodes {
            source: attach(NodeKind::Source(SourcePlayer::new())),
            time_pitch: attach(NodeKind::TimePitch(track.time_pitch)),
            equalizer: attach(NodeKind::Equalizer(track.mixer.eq)),
            gain: attach(NodeKind::Gain {
                level: track.mixer.volume.clamp(0.0, 1.0),
                muted: track.mixer.mute,
            }),
            pan: attach(NodeKind::Pan {
                pan: track.mixer.pan.clamp(-1.0, 1.0),
            }),
        };

        let chain = nodes.all();
        for pair in chain.windows(2) {
            self.graph.connect(pair[0], pair[1], 1.0)?;
        }
        self.tracks.insert(track.id, nodes);

        let table = self.sends.entry(track.id).or_default();
        for send in &track.sends {
            table.insert(
                send.bus,
                SendRoute {
                    level: send.level.clamp(0.0, 1.0),
                    pre_fader: send.pre_fader,
                },
            );
        }
        self.route_track_output(track.id)?;

        info!("[TOPOLOGY] Created nodes for track {}", track.id);
        Ok(nodes)
    }

    /// Tear down a track's nodes and send entries
    ///
    /// Idempotent: returns false when the track has no nodes.
    pub fn remove_track_nodes(&mut self, id: TrackId) -> bool {
        self.sends.remove(&id);
        let Some(nodes) = self.tracks.remove(&id) else {
            debug!("[TOPOLOGY] Track {} has no nodes to remove", id);
            return false;
        };
        for node in nodes.all() {
            if self.graph.is_attached(node) {
                self.graph.disconnect_input(node);
                self.graph.detach(node);
            }
        }
        info!("[TOPOLOGY] Removed nodes for track {}", id);
        true
    }

    /// Reconnect a track's tap stages to their full destination sets
    ///
    /// Each tap is rewired with a single fan-out reconnect so the main path
    /// never goes silent while a send is added or removed.
    fn route_track_output(&mut self, id: TrackId) -> Result<()> {
        let nodes = *self
            .tracks
            .get(&id)
            .ok_or(EngineError::UnknownTrack { id })?;

        let mut post = vec![(self.master, 1.0)];
        let mut pre = vec![(nodes.gain, 1.0)];
        if let Some(table) = self.sends.get(&id) {
            for (bus, route) in table {
                match self.buses.get(bus) {
                    Some(bus_nodes) if route.pre_fader => pre.push((bus_nodes.input, route.level)),
                    Some(bus_nodes) => post.push((bus_nodes.input, route.level)),
                    None => warn!(
                        "[TOPOLOGY] Send from track {} to bus {} deferred: bus not created",
                        id, bus
                    ),
                }
            }
        }

        self.graph.connect_fanout(nodes.equalizer, &pre)?;
        self.graph.connect_fanout(nodes.pan, &post)?;
        Ok(())
    }

    // ========================================================================
    // Sends
    // ========================================================================

    /// Add or replace a send from a track to a bus
    pub fn wire_send(
        &mut self,
        track: TrackId,
        bus: BusId,
        level: f32,
        pre_fader: bool,
    ) -> Result<SendStatus> {
        if !self.tracks.contains_key(&track) {
            return Err(EngineError::UnknownTrack { id: track });
        }
        self.sends.entry(track).or_default().insert(
            bus,
            SendRoute {
                level: level.clamp(0.0, 1.0),
                pre_fader,
            },
        );
        self.route_track_output(track)?;

        if self.buses.contains_key(&bus) {
            info!(
                "[TOPOLOGY] Send track {} -> bus {} at {:.2}",
                track, bus, level
            );
            Ok(SendStatus::Active)
        } else {
            Ok(SendStatus::Deferred)
        }
    }

    /// Change the level of an existing send without rewiring
    pub fn update_send_level(&mut self, track: TrackId, bus: BusId, level: f32) -> Result<()> {
        let level = level.clamp(0.0, 1.0);
        let route = self
            .sends
            .get_mut(&track)
            .and_then(|table| table.get_mut(&bus))
            .ok_or(EngineError::UnknownSend { track, bus })?;
        route.level = level;
        let pre_fader = route.pre_fader;

        if let (Some(nodes), Some(bus_nodes)) = (self.tracks.get(&track), self.buses.get(&bus)) {
            let tap = if pre_fader {
                nodes.equalizer
            } else {
                nodes.pan
            };
            self.graph.set_connection_gain(tap, bus_nodes.input, level);
        }
        Ok(())
    }

    /// Remove a send, leaving the track's other destinations connected
    pub fn remove_send(&mut self, track: TrackId, bus: BusId) -> Result<()> {
        let removed = self
            .sends
            .get_mut(&track)
            .and_then(|table| table.remove(&bus));
        if removed.is_none() {
            return Err(EngineError::UnknownSend { track, bus });
        }
        self.route_track_output(track)?;
        info!("[TOPOLOGY] Removed send track {} -> bus {}", track, bus);
        Ok(())
    }

    /// Status of a send, if one exists
    pub fn send_status(&self, track: TrackId, bus: BusId) -> Option<SendStatus> {
        self.sends.get(&track)?.get(&bus)?;
        Some(if self.buses.contains_key(&bus) {
            SendStatus::Active
        } else {
            SendStatus::Deferred
        })
    }

    // ========================================================================
    // Buses
    // ========================================================================

    /// Instantiate a bus's nodes and wire any sends that were waiting for it
    ///
    /// Returns the tracks whose deferred sends were connected.
    pub fn create_bus_nodes(&mut self, bus: &Bus) -> Result<Vec<TrackId>> {
        if self.buses.contains_key(&bus.id) {
            return Err(EngineError::DuplicateEntity {
                id: bus.id.to_string(),
            });
        }

        let owner = NodeOwner::Bus(bus.id);
        let input = self.graph.attach(ProcessingNode::new(
            owner,
            NodeKind::BusInput {
                gain: bus.input_gain.max(0.0),
            },
        ));
        let output = self.graph.attach(ProcessingNode::new(
            owner,
            NodeKind::BusOutput {
                gain: bus.output_gain.max(0.0),
                muted: bus.mute,
            },
        ));
        self.graph.connect(output, self.master, 1.0)?;
        self.buses.insert(
            bus.id,
            BusNodes {
                input,
                output,
                effects: Vec::new(),
            },
        );
        self.rebuild_bus_effect_chain(bus)?;

        let waiting: Vec<TrackId> = self
            .sends
            .iter()
            .filter(|(_, table)| table.contains_key(&bus.id))
            .map(|(track, _)| *track)
            .collect();
        for track in &waiting {
            self.route_track_output(*track)?;
            info!(
                "[TOPOLOGY] Connected deferred send track {} -> bus {}",
                track, bus.id
            );
        }

        info!("[TOPOLOGY] Created nodes for bus {}", bus.id);
        Ok(waiting)
    }

    /// Tear down a bus, removing every send that targets it first
    ///
    /// Returns the tracks whose sends were removed. Idempotent.
    pub fn remove_bus_nodes(&mut self, id: BusId) -> Vec<TrackId> {
        self.teardown_bus(id, true)
    }

    /// Tear down a bus but keep the sends that target it
    ///
    /// Those sends go back to deferred and are reconnected if a bus with
    /// the same id is created again. Returns the rerouted tracks.
    pub fn detach_bus_nodes(&mut self, id: BusId) -> Vec<TrackId> {
        self.teardown_bus(id, false)
    }

    fn teardown_bus(&mut self, id: BusId, drop_sends: bool) -> Vec<TrackId> {
        let nodes = self.buses.remove(&id);

        let mut rerouted = Vec::new();
        for (track, table) in self.sends.iter_mut() {
            let targets = if drop_sends {
                table.remove(&id).is_some()
            } else {
                table.contains_key(&id)
            };
            if targets {
                rerouted.push(*track);
            }
        }
        for track in &rerouted {
            if let Err(e) = self.route_track_output(*track) {
                warn!(
                    "[TOPOLOGY] Rerouting track {} after removing bus {} failed: {}",
                    track, id, e
                );
            }
        }

        let Some(nodes) = nodes else {
            debug!("[TOPOLOGY] Bus {} has no nodes to remove", id);
            return rerouted;
        };
        let owned: Vec<NodeId> = std::iter::once(nodes.input)
            .chain(nodes.effect_nodes())
            .chain(std::iter::once(nodes.output))
            .collect();
        for node in owned {
            if self.graph.is_attached(node) {
                self.graph.disconnect_input(node);
                self.graph.detach(node);
            }
        }
        if drop_sends {
            info!("[TOPOLOGY] Removed nodes for bus {}", id);
        } else {
            info!(
                "[TOPOLOGY] Removed nodes for bus {}, {} send(s) deferred",
                id,
                rerouted.len()
            );
        }
        rerouted
    }

    /// Rewire a bus as input -> enabled effects in list order -> output
    ///
    /// Effect nodes are created for new stages and detached for stages no
    /// longer in the list; disabled stages keep their node but are left
    /// unconnected.
    pub fn rebuild_bus_effect_chain(&mut self, bus: &Bus) -> Result<()> {
        let nodes = self
            .buses
            .get(&bus.id)
            .cloned()
            .ok_or(EngineError::UnknownBus { id: bus.id })?;

        self.graph.disconnect_output(nodes.input);
        for node in nodes.effect_nodes() {
            self.graph.disconnect_input(node);
            self.graph.disconnect_output(node);
        }

        for (effect, node) in &nodes.effects {
            if bus.effect(*effect).is_none() {
                self.graph.detach(*node);
                debug!("[TOPOLOGY] Bus {} dropped effect {}", bus.id, effect);
            }
        }

        let mut ordered = Vec::with_capacity(bus.effects.len());
        for stage in &bus.effects {
            let node = match nodes.effect_node(stage.id) {
                Some(node) => {
                    self.apply_stage(node, stage);
                    node
                }
                None => self.graph.attach(ProcessingNode::new(
                    NodeOwner::Bus(bus.id),
                    NodeKind::Effect(effects::instantiate(stage)),
                )),
            };
            ordered.push((stage.id, node));
        }

        let mut previous = nodes.input;
        for stage in bus.enabled_effects() {
            if let Some((_, node)) = ordered.iter().find(|(id, _)| *id == stage.id) {
                self.graph.connect(previous, *node, 1.0)?;
                previous = *node;
            }
        }
        self.graph.connect(previous, nodes.output, 1.0)?;

        if let Some(entry) = self.buses.get_mut(&bus.id) {
            entry.effects = ordered;
        }
        debug!(
            "[TOPOLOGY] Rebuilt bus {} chain with {} enabled effect(s)",
            bus.id,
            bus.enabled_effects().count()
        );
        Ok(())
    }

    /// Push a stage's parameters to its processing unit without rewiring
    pub fn apply_effect_parameters(&mut self, bus: BusId, stage: &EffectStage) -> Result<()> {
        let node = self
            .buses
            .get(&bus)
            .ok_or(EngineError::UnknownBus { id: bus })?
            .effect_node(stage.id)
            .ok_or(EngineError::UnknownEffect {
                bus,
                effect: stage.id,
            })?;
        self.apply_stage(node, stage);
        Ok(())
    }

    fn apply_stage(&mut self, node: NodeId, stage: &EffectStage) {
        if let Some(ProcessingNode {
            kind: NodeKind::Effect(unit),
            ..
        }) = self.graph.node_mut(node)
        {
            if unit.kind != stage.kind {
                *unit = effects::instantiate(stage);
            } else {
                effects::apply_parameters(unit, &stage.parameters);
            }
        }
    }

    // ========================================================================
    // Levels (no rewiring)
    // ========================================================================

    fn track_node_mut(&mut self, id: TrackId, pick: fn(&TrackNodes) -> NodeId) -> Result<&mut NodeKind> {
        let nodes = self.tracks.get(&id).ok_or(EngineError::UnknownTrack { id })?;
        let node = pick(nodes);
        self.graph
            .node_mut(node)
            .map(|n| &mut n.kind)
            .ok_or(EngineError::UnknownNode { node: node.index() })
    }

    pub fn set_track_volume(&mut self, id: TrackId, volume: f32) -> Result<()> {
        if let NodeKind::Gain { level, .. } = self.track_node_mut(id, |n| n.gain)? {
            *level = volume.clamp(0.0, 1.0);
        }
        Ok(())
    }

    /// Apply a resolved solo/mute state to the track's gain stage
    pub fn set_track_muted(&mut self, id: TrackId, is_muted: bool) -> Result<()> {
        if let NodeKind::Gain { muted, .. } = self.track_node_mut(id, |n| n.gain)? {
            *muted = is_muted;
        }
        Ok(())
    }

    pub fn set_track_pan(&mut self, id: TrackId, value: f32) -> Result<()> {
        if let NodeKind::Pan { pan } = self.track_node_mut(id, |n| n.pan)? {
            *pan = value.clamp(-1.0, 1.0);
        }
        Ok(())
    }

    pub fn set_track_eq(&mut self, id: TrackId, eq: EqSettings) -> Result<()> {
        if let NodeKind::Equalizer(settings) = self.track_node_mut(id, |n| n.equalizer)? {
            *settings = eq;
        }
        Ok(())
    }

    pub fn set_track_time_pitch(&mut self, id: TrackId, time_pitch: TimePitch) -> Result<()> {
        if let NodeKind::TimePitch(settings) = self.track_node_mut(id, |n| n.time_pitch)? {
            *settings = time_pitch;
        }
        Ok(())
    }

    /// Set a bus's output level and resolved mute state
    pub fn set_bus_output(&mut self, id: BusId, level: f32, is_muted: bool) -> Result<()> {
        let node = self
            .buses
            .get(&id)
            .ok_or(EngineError::UnknownBus { id })?
            .output;
        if let Some(ProcessingNode {
            kind: NodeKind::BusOutput { gain, muted },
            ..
        }) = self.graph.node_mut(node)
        {
            *gain = level.max(0.0);
            *muted = is_muted;
        }
        Ok(())
    }

    pub fn set_bus_input_gain(&mut self, id: BusId, level: f32) -> Result<()> {
        let node = self
            .buses
            .get(&id)
            .ok_or(EngineError::UnknownBus { id })?
            .input;
        if let Some(ProcessingNode {
            kind: NodeKind::BusInput { gain },
            ..
        }) = self.graph.node_mut(node)
        {
            *gain = level.max(0.0);
        }
        Ok(())
    }

    pub fn set_master_volume(&mut self, value: f32) {
        if let Some(ProcessingNode {
            kind: NodeKind::Master { volume },
            ..
        }) = self.graph.node_mut(self.master)
        {
            *volume = value.clamp(0.0, 1.0);
        }
    }

    // ========================================================================
    // Source Players
    // ========================================================================

    pub fn player(&self, id: TrackId) -> Option<&SourcePlayer> {
        let nodes = self.tracks.get(&id)?;
        self.graph.node(nodes.source)?.as_source()
    }

    pub fn player_mut(&mut self, id: TrackId) -> Option<&mut SourcePlayer> {
        let nodes = self.tracks.get(&id)?;
        self.graph.node_mut(nodes.source)?.as_source_mut()
    }

    /// Stop every source node, dropping queued segments
    pub fn stop_all_players(&mut self) {
        let sources: Vec<NodeId> = self.tracks.values().map(|n| n.source).collect();
        for source in sources {
            if let Some(player) = self.graph.node_mut(source).and_then(|n| n.as_source_mut()) {
                player.stop();
            }
        }
    }

    /// Stop and reset every source node, clearing buffered audio
    pub fn reset_all_players(&mut self) {
        let sources: Vec<NodeId> = self.tracks.values().map(|n| n.source).collect();
        for source in sources {
            if let Some(player) = self.graph.node_mut(source).and_then(|n| n.as_source_mut()) {
                player.reset();
            }
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    pub fn track_nodes(&self, id: TrackId) -> Option<&TrackNodes> {
        self.tracks.get(&id)
    }

    pub fn bus_nodes(&self, id: BusId) -> Option<&BusNodes> {
        self.buses.get(&id)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.keys().copied()
    }

    /// True when the track's signal can reach the bus input
    pub fn track_reaches_bus(&self, track: TrackId, bus: BusId) -> bool {
        match (self.tracks.get(&track), self.buses.get(&bus)) {
            (Some(nodes), Some(bus_nodes)) => self.graph.reaches(nodes.source, bus_nodes.input),
            _ => false,
        }
    }

    /// True when the track's final stage feeds the master mixer directly
    pub fn track_feeds_master(&self, track: TrackId) -> bool {
        self.tracks
            .get(&track)
            .is_some_and(|nodes| self.graph.connection_gain(nodes.pan, self.master).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EffectKind, EffectStage, Send};

    fn topology_with(track: &Track, bus: &Bus) -> GraphTopology {
        let mut topology = GraphTopology::new(1.0);
        topology.create_bus_nodes(bus).unwrap();
        topology.create_track_nodes(track).unwrap();
        topology
    }

    // ------------------------------------------------------------------------
    // Track Chains
    // ------------------------------------------------------------------------

    #[test]
    fn test_track_chain_in_series() {
        let track = Track::new("A");
        let mut topology = GraphTopology::new(1.0);
        let nodes = topology.create_track_nodes(&track).unwrap();

        let graph = topology.graph();
        assert_eq!(graph.outputs(nodes.source), vec![(nodes.time_pitch, 1.0)]);
        assert_eq!(graph.outputs(nodes.time_pitch), vec![(nodes.equalizer, 1.0)]);
        assert_eq!(graph.outputs(nodes.equalizer), vec![(nodes.gain, 1.0)]);
        assert_eq!(graph.outputs(nodes.gain), vec![(nodes.pan, 1.0)]);
        assert_eq!(graph.outputs(nodes.pan), vec![(topology.master(), 1.0)]);
    }

    #[test]
    fn test_duplicate_track_rejected() {
        let track = Track::new("A");
        let mut topology = GraphTopology::new(1.0);
        topology.create_track_nodes(&track).unwrap();
        let err = topology.create_track_nodes(&track).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_ENTITY");
    }

    #[test]
    fn test_remove_track_twice() {
        let track = Track::new("A");
        let mut topology = GraphTopology::new(1.0);
        topology.create_track_nodes(&track).unwrap();

        assert!(topology.remove_track_nodes(track.id));
        let nodes = topology.graph().node_count();
        let edges = topology.graph().edge_count();
        assert_eq!((nodes, edges), (1, 0));

        assert!(!topology.remove_track_nodes(track.id));
        assert_eq!(topology.graph().node_count(), nodes);
        assert_eq!(topology.graph().edge_count(), edges);
    }

    // ------------------------------------------------------------------------
    // Sends
    // ------------------------------------------------------------------------

    #[test]
    fn test_send_fans_out_to_master_and_bus() {
        let track = Track::new("A");
        let bus = Bus::new("Verb");
        let mut topology = topology_with(&track, &bus);

        let status = topology.wire_send(track.id, bus.id, 0.5, false).unwrap();
        assert_eq!(status, SendStatus::Active);

        let nodes = *topology.track_nodes(track.id).unwrap();
        let input = topology.bus_nodes(bus.id).unwrap().input;
        assert_eq!(
            topology.graph().outputs(nodes.pan),
            vec![(topology.master(), 1.0), (input, 0.5)]
        );
        assert!(topology.track_reaches_bus(track.id, bus.id));
        assert!(topology.track_feeds_master(track.id));

        topology.remove_send(track.id, bus.id).unwrap();
        assert!(!topology.track_reaches_bus(track.id, bus.id));
        assert!(topology.track_feeds_master(track.id));
    }

    #[test]
    fn test_send_level_update_keeps_wiring() {
        let track = Track::new("A");
        let bus = Bus::new("Verb");
        let mut topology = topology_with(&track, &bus);
        topology.wire_send(track.id, bus.id, 0.5, false).unwrap();
        let edges = topology.graph().edge_count();

        topology.update_send_level(track.id, bus.id, 0.25).unwrap();
        let pan = topology.track_nodes(track.id).unwrap().pan;
        let input = topology.bus_nodes(bus.id).unwrap().input;
        assert_eq!(topology.graph().connection_gain(pan, input), Some(0.25));
        assert_eq!(topology.graph().edge_count(), edges);
    }

    #[test]
    fn test_pre_fader_send_taps_equalizer() {
        let track = Track::new("A");
        let bus = Bus::new("Cue");
        let mut topology = topology_with(&track, &bus);
        topology.wire_send(track.id, bus.id, 0.8, true).unwrap();

        let nodes = *topology.track_nodes(track.id).unwrap();
        let input = topology.bus_nodes(bus.id).unwrap().input;
        assert_eq!(topology.graph().connection_gain(nodes.equalizer, input), Some(0.8));
        assert_eq!(topology.graph().connection_gain(nodes.pan, input), None);
        assert_eq!(topology.graph().connection_gain(nodes.equalizer, nodes.gain), Some(1.0));
    }

    #[test]
    fn test_send_to_missing_bus_is_deferred() {
        let bus = Bus::new("Late");
        let mut track = Track::new("A");
        track.sends.push(Send::new(bus.id, 0.6));

        let mut topology = GraphTopology::new(1.0);
        topology.create_track_nodes(&track).unwrap();
        assert_eq!(topology.send_status(track.id, bus.id), Some(SendStatus::Deferred));

        let rewired = topology.create_bus_nodes(&bus).unwrap();
        assert_eq!(rewired, vec![track.id]);
        assert_eq!(topology.send_status(track.id, bus.id), Some(SendStatus::Active));
        assert!(topology.track_reaches_bus(track.id, bus.id));
    }

    #[test]
    fn test_unknown_send_and_track() {
        let mut topology = GraphTopology::new(1.0);
        let err = topology
            .wire_send(TrackId::new(), BusId::new(), 0.5, false)
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_TRACK");

        let track = Track::new("A");
        topology.create_track_nodes(&track).unwrap();
        let err = topology.update_send_level(track.id, BusId::new(), 0.1).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_SEND");
    }

    #[test]
    fn test_remove_bus_tears_down_sends_first() {
        let track = Track::new("A");
        let bus = Bus::new("Verb");
        let mut topology = topology_with(&track, &bus);
        topology.wire_send(track.id, bus.id, 0.5, false).unwrap();

        let rerouted = topology.remove_bus_nodes(bus.id);
        assert_eq!(rerouted, vec![track.id]);
        assert!(topology.send_status(track.id, bus.id).is_none());
        let pan = topology.track_nodes(track.id).unwrap().pan;
        assert_eq!(topology.graph().outputs(pan), vec![(topology.master(), 1.0)]);

        assert!(topology.remove_bus_nodes(bus.id).is_empty());
    }

    #[test]
    fn test_detached_bus_leaves_send_deferred() {
        let track = Track::new("A");
        let bus = Bus::new("Verb");
        let mut topology = topology_with(&track, &bus);
        topology.wire_send(track.id, bus.id, 0.5, false).unwrap();

        assert_eq!(topology.detach_bus_nodes(bus.id), vec![track.id]);
        assert!(topology.bus_nodes(bus.id).is_none());
        assert_eq!(topology.send_status(track.id, bus.id), Some(SendStatus::Deferred));
        let pan = topology.track_nodes(track.id).unwrap().pan;
        assert_eq!(topology.graph().outputs(pan), vec![(topology.master(), 1.0)]);

        topology.create_bus_nodes(&bus).unwrap();
        assert_eq!(topology.send_status(track.id, bus.id), Some(SendStatus::Active));
        assert!(topology.track_reaches_bus(track.id, bus.id));
    }

    // ------------------------------------------------------------------------
    // Bus Effect Chains
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_bus_connects_input_to_output() {
        let bus = Bus::new("Dry");
        let mut topology = GraphTopology::new(1.0);
        topology.create_bus_nodes(&bus).unwrap();
        let nodes = topology.bus_nodes(bus.id).unwrap();
        assert_eq!(topology.graph().outputs(nodes.input), vec![(nodes.output, 1.0)]);
    }

    #[test]
    fn test_chain_skips_disabled_effects_in_order() {
        let eq = EffectStage::new(EffectKind::Equalizer);
        let comp = EffectStage::new(EffectKind::Compressor).with_enabled(false);
        let verb = EffectStage::new(EffectKind::Reverb);
        let bus = Bus::new("FX")
            .with_effect(eq.clone())
            .with_effect(comp.clone())
            .with_effect(verb.clone());

        let mut topology = GraphTopology::new(1.0);
        topology.create_bus_nodes(&bus).unwrap();
        let nodes = topology.bus_nodes(bus.id).unwrap().clone();
        let eq_node = nodes.effect_node(eq.id).unwrap();
        let comp_node = nodes.effect_node(comp.id).unwrap();
        let verb_node = nodes.effect_node(verb.id).unwrap();

        let graph = topology.graph();
        assert_eq!(graph.outputs(nodes.input), vec![(eq_node, 1.0)]);
        assert_eq!(graph.outputs(eq_node), vec![(verb_node, 1.0)]);
        assert_eq!(graph.outputs(verb_node), vec![(nodes.output, 1.0)]);
        assert!(graph.outputs(comp_node).is_empty());
        assert!(graph.inputs(comp_node).is_empty());
    }

    #[test]
    fn test_rebuild_after_reorder_and_removal() {
        let eq = EffectStage::new(EffectKind::Equalizer);
        let verb = EffectStage::new(EffectKind::Reverb);
        let mut bus = Bus::new("FX").with_effect(eq.clone()).with_effect(verb.clone());
        let mut topology = GraphTopology::new(1.0);
        topology.create_bus_nodes(&bus).unwrap();
        let eq_node = topology.bus_nodes(bus.id).unwrap().effect_node(eq.id).unwrap();

        bus.move_effect(verb.id, 0);
        topology.rebuild_bus_effect_chain(&bus).unwrap();
        let nodes = topology.bus_nodes(bus.id).unwrap().clone();
        let verb_node = nodes.effect_node(verb.id).unwrap();
        assert_eq!(topology.graph().outputs(nodes.input), vec![(verb_node, 1.0)]);
        assert_eq!(topology.graph().outputs(eq_node), vec![(nodes.output, 1.0)]);

        bus.remove_effect(eq.id);
        topology.rebuild_bus_effect_chain(&bus).unwrap();
        assert!(!topology.graph().is_attached(eq_node));
        assert_eq!(topology.graph().outputs(verb_node), vec![(nodes.output, 1.0)]);
    }

    #[test]
    fn test_apply_effect_parameters_in_place() {
        let verb = EffectStage::new(EffectKind::Reverb);
        let bus = Bus::new("FX").with_effect(verb.clone());
        let mut topology = GraphTopology::new(1.0);
        topology.create_bus_nodes(&bus).unwrap();
        let edges = topology.graph().edge_count();

        let updated = verb.clone().with_param("wet_dry_mix", 80.0);
        topology.apply_effect_parameters(bus.id, &updated).unwrap();

        let node = topology.bus_nodes(bus.id).unwrap().effect_node(verb.id).unwrap();
        match &topology.graph().node(node).unwrap().kind {
            NodeKind::Effect(unit) => assert_eq!(unit.values["wet_dry_mix"], 80.0),
            other => panic!("unexpected node {:?}", other),
        }
        assert_eq!(topology.graph().edge_count(), edges);
    }

    // ------------------------------------------------------------------------
    // Levels
    // ------------------------------------------------------------------------

    #[test]
    fn test_mute_does_not_disconnect() {
        let track = Track::new("A");
        let mut topology = GraphTopology::new(1.0);
        let nodes = topology.create_track_nodes(&track).unwrap();
        let edges = topology.graph().edge_count();

        topology.set_track_muted(track.id, true).unwrap();
        assert_eq!(topology.graph().node(nodes.gain).unwrap().output_gain(), Some(0.0));
        assert_eq!(topology.graph().edge_count(), edges);
    }

    #[test]
    fn test_levels_clamped() {
        let track = Track::new("A");
        let mut topology = GraphTopology::new(1.0);
        let nodes = topology.create_track_nodes(&track).unwrap();
        topology.set_track_volume(track.id, 3.0).unwrap();
        topology.set_track_pan(track.id, -4.0).unwrap();

        assert_eq!(topology.graph().node(nodes.gain).unwrap().output_gain(), Some(1.0));
        assert!(matches!(
            topology.graph().node(nodes.pan).unwrap().kind,
            NodeKind::Pan { pan } if pan == -1.0
        ));
        assert!(topology.set_track_volume(TrackId::new(), 0.5).is_err());
    }
}
