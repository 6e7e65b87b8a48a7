//! Routing Graph
//!
//! Directed graph of processing stages. Edge weights are per-destination
//! gains, which is how a send's level is carried on the track's tap stage.
//! Only the topology manager mutates edges; everyone else reads.

mod node;

pub use node::{
    EffectUnit, NodeKind, NodeOwner, PlayerState, ProcessingNode, ScheduledSegment, SourcePlayer,
};

use std::fmt;

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::error::{EngineError, Result};

/// Handle to a node in the graph; stays valid until the node is detached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NodeIndex);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}

/// The engine's processing graph
#[derive(Debug, Default)]
pub struct NodeGraph {
    graph: StableDiGraph<ProcessingNode, f32>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
        }
    }

    /// Attach a node; it has no connections until wired
    pub fn attach(&mut self, node: ProcessingNode) -> NodeId {
        NodeId(self.graph.add_node(node))
    }

    /// Disconnect a node's inputs and detach it
    ///
    /// Returns `None`, and changes nothing, when the node is not attached.
    pub fn detach(&mut self, id: NodeId) -> Option<ProcessingNode> {
        if !self.is_attached(id) {
            return None;
        }
        self.disconnect_input(id);
        self.graph.remove_node(id.0)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.graph.contains_node(id.0)
    }

    pub fn node(&self, id: NodeId) -> Option<&ProcessingNode> {
        self.graph.node_weight(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ProcessingNode> {
        self.graph.node_weight_mut(id.0)
    }

    /// Connect `from` to `to` with a gain, replacing the gain if already connected
    pub fn connect(&mut self, from: NodeId, to: NodeId, gain: f32) -> Result<()> {
        self.check_connectable(from, to)?;
        self.graph.update_edge(from.0, to.0, gain);
        Ok(())
    }

    /// Replace every output of `from` with the given destination set
    ///
    /// All destinations are validated before any edge changes, so the
    /// reconnect either happens as a whole or not at all.
    pub fn connect_fanout(&mut self, from: NodeId, destinations: &[(NodeId, f32)]) -> Result<()> {
        for (to, _) in destinations {
            self.check_connectable(from, *to)?;
        }
        self.disconnect_output(from);
        for (to, gain) in destinations {
            self.graph.update_edge(from.0, to.0, *gain);
        }
        Ok(())
    }

    /// Remove the edge between two nodes
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> bool {
        match self.graph.find_edge(from.0, to.0) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Remove every outgoing edge of a node, returning how many were removed
    pub fn disconnect_output(&mut self, id: NodeId) -> usize {
        self.disconnect_direction(id, Direction::Outgoing)
    }

    /// Remove every incoming edge of a node, returning how many were removed
    pub fn disconnect_input(&mut self, id: NodeId) -> usize {
        self.disconnect_direction(id, Direction::Incoming)
    }

    fn disconnect_direction(&mut self, id: NodeId, direction: Direction) -> usize {
        if !self.is_attached(id) {
            return 0;
        }
        let neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(id.0, direction).collect();
        let mut removed = 0;
        for other in neighbors {
            let edge = match direction {
                Direction::Outgoing => self.graph.find_edge(id.0, other),
                Direction::Incoming => self.graph.find_edge(other, id.0),
            };
            if let Some(edge) = edge {
                if self.graph.remove_edge(edge).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Update the gain of an existing connection
    pub fn set_connection_gain(&mut self, from: NodeId, to: NodeId, gain: f32) -> bool {
        let Some(edge) = self.graph.find_edge(from.0, to.0) else {
            return false;
        };
        match self.graph.edge_weight_mut(edge) {
            Some(weight) => {
                *weight = gain;
                true
            }
            None => false,
        }
    }

    /// Gain of the connection between two nodes, if connected
    pub fn connection_gain(&self, from: NodeId, to: NodeId) -> Option<f32> {
        let edge = self.graph.find_edge(from.0, to.0)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Direct destinations of a node with their gains
    pub fn outputs(&self, id: NodeId) -> Vec<(NodeId, f32)> {
        self.neighbors_with_gain(id, Direction::Outgoing)
    }

    /// Direct sources feeding a node with their gains
    pub fn inputs(&self, id: NodeId) -> Vec<(NodeId, f32)> {
        self.neighbors_with_gain(id, Direction::Incoming)
    }

    fn neighbors_with_gain(&self, id: NodeId, direction: Direction) -> Vec<(NodeId, f32)> {
        if !self.is_attached(id) {
            return Vec::new();
        }
        let mut result: Vec<(NodeId, f32)> = self
            .graph
            .neighbors_directed(id.0, direction)
            .filter_map(|other| {
                let (from, to) = match direction {
                    Direction::Outgoing => (id.0, other),
                    Direction::Incoming => (other, id.0),
                };
                let edge = self.graph.find_edge(from, to)?;
                let gain = *self.graph.edge_weight(edge)?;
                Some((NodeId(other), gain))
            })
            .collect();
        result.sort_by_key(|(node, _)| *node);
        result
    }

    /// True when signal from `from` can reach `to` through any path
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if !self.is_attached(from) || !self.is_attached(to) {
            return false;
        }
        has_path_connecting(&self.graph, from.0, to.0, None)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All attached nodes
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ProcessingNode)> + '_ {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx).map(|node| (NodeId(idx), node)))
    }

    /// All connections as (from, to, gain)
    pub fn edges(&self) -> Vec<(NodeId, NodeId, f32)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.graph.edge_endpoints(edge)?;
                let gain = *self.graph.edge_weight(edge)?;
                Some((NodeId(from), NodeId(to), gain))
            })
            .collect()
    }

    fn check_connectable(&self, from: NodeId, to: NodeId) -> Result<()> {
        for id in [from, to] {
            if !self.is_attached(id) {
                return Err(EngineError::UnknownNode { node: id.index() });
            }
        }
        if from == to || has_path_connecting(&self.graph, to.0, from.0, None) {
            return Err(EngineError::FeedbackLoop {
                from: from.index(),
                to: to.index(),
            });
        }
        Ok(())
    }
}
