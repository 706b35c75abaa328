//! The undirected stop graph a line plan is built on.
//!
//! Stops and edges keep the ids they were given in the input. Internally every stop also gets a
//! dense index, so that edge lookups between two stops go through an adjacency matrix.

use std::collections::HashMap;

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::InstanceError;

/// External id of a stop
pub type NodeId = u32;
/// External id of an edge
pub type EdgeId = u32;

/// Frequency bounds and costs attached to an edge
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct EdgeInfo {
    /// Minimum total frequency of lines using the edge
    pub f_min: u32,
    /// Maximum total frequency of lines using the edge
    pub f_max: u32,
    /// Cost per unit of frequency for a line using the edge
    pub cost: f64,
    pub length: f64,
}
impl EdgeInfo {
    /// Whether a total frequency of `load` lies within the edge's bounds
    pub fn admits(&self, load: u32) -> bool {
        self.f_min <= load && load <= self.f_max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub left: NodeId,
    pub right: NodeId,
    pub info: EdgeInfo,
}
impl Edge {
    /// The endpoint opposite to `v`, if `v` is an endpoint at all
    pub fn opposite(&self, v: NodeId) -> Option<NodeId> {
        if self.left == v {
            Some(self.right)
        } else if self.right == v {
            Some(self.left)
        } else {
            None
        }
    }
}

/// An indexed, weighted, undirected graph. Immutable apart from edge infos once built.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Stop ids, sorted; a stop's position is its dense index
    nodes: Vec<NodeId>,
    node_index: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeId, usize>,
    /// Dense stop index pair to position in `edges`
    adjacency: Array2<Option<usize>>,
    /// Sum of `f_max` over the incident edges, by dense index
    total_fmax: Vec<u32>,
}
impl Graph {
    /// Build a graph from its edges. Stops are exactly the edge endpoints.
    ///
    /// A second edge between an already connected pair of stops is dropped with a warning,
    /// since LinTim data sometimes lists both directions of a link.
    pub fn from_edges(edges: impl IntoIterator<Item = Edge>) -> Result<Self, InstanceError> {
        let candidates = edges.into_iter().collect_vec();
        let nodes = candidates.iter()
            .flat_map(|e| [e.left, e.right])
            .sorted_unstable()
            .dedup()
            .collect_vec();
        let node_index: HashMap<_, _> = nodes.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        let mut adjacency = Array2::from_elem((nodes.len(), nodes.len()), None);
        let mut kept = Vec::with_capacity(candidates.len());
        let mut edge_index = HashMap::with_capacity(candidates.len());
        for edge in candidates {
            if edge.left == edge.right {
                return Err(InstanceError::SelfLoop(edge.id));
            }
            if edge_index.contains_key(&edge.id) {
                return Err(InstanceError::DuplicateEdgeId(edge.id));
            }
            let (a, b) = (node_index[&edge.left], node_index[&edge.right]);
            if adjacency[[a, b]].is_some() {
                warn!(edge = edge.id, left = edge.left, right = edge.right, "ignoring parallel edge");
                continue;
            }
            adjacency[[a, b]] = Some(kept.len());
            adjacency[[b, a]] = Some(kept.len());
            edge_index.insert(edge.id, kept.len());
            kept.push(edge);
        }

        let mut graph = Self {
            total_fmax: vec![0; nodes.len()],
            nodes,
            node_index,
            edges: kept,
            edge_index,
            adjacency,
        };
        graph.recount_capacities();
        Ok(graph)
    }

    fn recount_capacities(&mut self) {
        self.total_fmax.iter_mut().for_each(|t| *t = 0);
        for edge in &self.edges {
            self.total_fmax[self.node_index[&edge.left]] += edge.info.f_max;
            self.total_fmax[self.node_index[&edge.right]] += edge.info.f_max;
        }
    }

    /// All stops, in ascending id order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains_node(&self, v: NodeId) -> bool {
        self.node_index.contains_key(&v)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_index.get(&id).map(|&i| &self.edges[i])
    }

    /// The edge connecting `u` and `v`, in either direction
    pub fn find_edge(&self, u: NodeId, v: NodeId) -> Option<&Edge> {
        let a = *self.node_index.get(&u)?;
        let b = *self.node_index.get(&v)?;
        self.adjacency[[a, b]].map(|i| &self.edges[i])
    }

    /// Cost of travelling from `u` to `v`, or zero if they are not adjacent
    pub fn edge_cost(&self, u: NodeId, v: NodeId) -> f64 {
        self.find_edge(u, v).map_or(0.0, |e| e.info.cost)
    }

    /// Sum of the maximum frequencies over all edges at `v`
    pub fn total_fmax(&self, v: NodeId) -> u32 {
        self.node_index.get(&v).map_or(0, |&i| self.total_fmax[i])
    }

    /// Rewrite every edge's info in place
    pub fn update_edge_infos(&mut self, mut f: impl FnMut(&mut EdgeInfo)) {
        self.edges.iter_mut().for_each(|e| f(&mut e.info));
        self.recount_capacities();
    }
}
