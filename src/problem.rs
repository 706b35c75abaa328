//! This module contains interfaces for the solver: it has the `Instance` struct, which describes a
//! line planning problem, and the `LineConcept` struct, which is what the solver returns.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{error::InstanceError, graph::{Edge, EdgeId, EdgeInfo, Graph, NodeId}};

/// One edge of an instance description
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EdgeDescription {
    pub id: EdgeId,
    pub left: NodeId,
    pub right: NodeId,
    #[serde(default)]
    pub length: f64,
    pub f_min: u32,
    pub f_max: u32,
    #[serde(default)]
    pub cost: f64,
}

/// A description of a line planning instance, as stored on disk
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InstanceDescription {
    /// The cost charged once per unit of frequency of every line
    pub c_fix: f64,
    pub edges: Vec<EdgeDescription>,
}

/// A line planning instance: the stop graph together with the fixed line cost
#[derive(Debug, Clone)]
pub struct Instance {
    pub graph: Graph,
    pub c_fix: f64,
}
impl Instance {
    /// Create a new instance from its description
    pub fn new(description: InstanceDescription) -> Result<Self, InstanceError> {
        let edges = description.edges.into_iter().map(|e| Edge {
            id: e.id,
            left: e.left,
            right: e.right,
            info: EdgeInfo { f_min: e.f_min, f_max: e.f_max, cost: e.cost, length: e.length },
        });
        Ok(Self { graph: Graph::from_edges(edges)?, c_fix: description.c_fix })
    }

    /// The description this instance can be saved as
    pub fn describe(&self) -> InstanceDescription {
        InstanceDescription {
            c_fix: self.c_fix,
            edges: self.graph.edges().iter().map(|e| EdgeDescription {
                id: e.id,
                left: e.left,
                right: e.right,
                length: e.info.length,
                f_min: e.info.f_min,
                f_max: e.info.f_max,
                cost: e.info.cost,
            }).collect(),
        }
    }

    pub fn edge_cost(&self, u: NodeId, v: NodeId) -> f64 {
        self.graph.edge_cost(u, v)
    }

    /// Lower every `f_max` to at most `clamp`, pulling `f_min` down with it where needed
    pub fn clamp_fmax(&mut self, clamp: u32) {
        self.graph.update_edge_infos(|info| {
            info.f_max = info.f_max.min(clamp);
            info.f_min = info.f_min.min(info.f_max);
        });
    }
}

/// A line with its frequency, given as a sequence of consecutive edges
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line {
    pub frequency: u32,
    pub edges: Vec<EdgeId>,
}
impl Line {
    /// Build a line from the stops it visits
    pub fn from_vertex_path(graph: &Graph, frequency: u32, path: &[NodeId]) -> Result<Self, InstanceError> {
        let edges = path.iter().tuple_windows()
            .map(|(&from, &to)| graph.find_edge(from, to)
                .map(|e| e.id)
                .ok_or(InstanceError::NoEdgeBetween { from, to }))
            .collect::<Result<_, _>>()?;
        Ok(Self { frequency, edges })
    }

    /// The stops this line visits, in order. A single-edge line runs from its left to its right stop.
    pub fn to_vertex_path(&self, graph: &Graph) -> Result<Vec<NodeId>, InstanceError> {
        let edges = self.edges.iter()
            .map(|&id| graph.edge(id).ok_or(InstanceError::UnknownEdge(id)))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(first) = edges.first() else {
            return Ok(vec![]);
        };
        // Start at the end of the first edge that is not shared with the second one
        let start = match edges.get(1) {
            Some(second) if second.opposite(first.left).is_some() => first.right,
            _ => first.left,
        };
        let mut path = vec![start];
        let mut last = start;
        for edge in edges {
            last = edge.opposite(last).ok_or(InstanceError::NoEdgeBetween { from: last, to: edge.left })?;
            path.push(last);
        }
        Ok(path)
    }
}

/// The cost of a line concept, split by origin
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineCosts {
    /// Contribution of `c_fix`
    pub fixed: f64,
    /// Contribution of edge usage
    pub edges: f64,
    pub total: f64,
}

/// An edge whose load lies outside its frequency bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadViolation {
    pub edge: EdgeId,
    pub load: u32,
    pub f_min: u32,
    pub f_max: u32,
}

/// A multiset of lines; the output of the solver
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineConcept {
    pub lines: Vec<Line>,
}
impl LineConcept {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    pub fn costs(&self, instance: &Instance) -> LineCosts {
        let mut costs = LineCosts::default();
        for line in &self.lines {
            let frequency = line.frequency as f64;
            costs.fixed += instance.c_fix * frequency;
            costs.edges += line.edges.iter()
                .filter_map(|&e| instance.graph.edge(e))
                .map(|e| e.info.cost * frequency)
                .sum::<f64>();
        }
        costs.total = costs.fixed + costs.edges;
        costs
    }

    /// Total frequency of lines using each edge
    pub fn edge_loads(&self) -> HashMap<EdgeId, u32> {
        let mut loads = HashMap::new();
        for line in &self.lines {
            for &e in &line.edges {
                *loads.entry(e).or_default() += line.frequency;
            }
        }
        loads
    }

    /// Every edge whose load is out of bounds, in the graph's edge order
    pub fn violations(&self, instance: &Instance) -> Vec<LoadViolation> {
        let loads = self.edge_loads();
        instance.graph.edges().iter().filter_map(|e| {
            let load = loads.get(&e.id).copied().unwrap_or(0);
            (!e.info.admits(load)).then_some(LoadViolation {
                edge: e.id,
                load,
                f_min: e.info.f_min,
                f_max: e.info.f_max,
            })
        }).collect()
    }

    /// Ensures every edge's load lies within `[f_min, f_max]`
    pub fn is_feasible(&self, instance: &Instance) -> bool {
        self.violations(instance).is_empty()
    }
}
