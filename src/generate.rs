//! Random instances for benchmarking and testing.
//!
//! Stops lie on a cycle (or a path), with a few short chords added so that the treewidth stays
//! small.

use crate::{
    decomposition::TreeDecomposition,
    graph::NodeId,
    problem::{EdgeDescription, Instance, InstanceDescription},
};

/// Shape of a generated instance
#[derive(Debug, Clone, Copy)]
pub struct GeneratorParams {
    pub stops: u32,
    /// Close the path into a cycle
    pub cycle: bool,
    /// Number of chords between stops at most three apart
    pub chords: u32,
    /// Largest `f_max` an edge may get
    pub max_frequency: u32,
}
impl GeneratorParams {
    pub fn new(stops: u32) -> Self {
        Self { stops, cycle: stops > 2, chords: stops / 4, max_frequency: 3 }
    }
}

/// A random instance description; stops are numbered from 1
pub fn random_description(params: &GeneratorParams, rng: &mut fastrand::Rng) -> InstanceDescription {
    let mut pairs: Vec<(NodeId, NodeId)> = (1..params.stops).map(|v| (v, v + 1)).collect();
    if params.cycle {
        pairs.push((params.stops, 1));
    }
    if params.stops > 4 {
        for _ in 0..params.chords {
            let from = rng.u32(1..=params.stops);
            let to = (from + rng.u32(2..=3) - 1) % params.stops + 1;
            if !pairs.iter().any(|&(a, b)| (a, b) == (from, to) || (a, b) == (to, from)) {
                pairs.push((from, to));
            }
        }
    }

    let edges = pairs.into_iter().zip(1..).map(|((left, right), id)| {
        let f_min = rng.u32(0..=1);
        let f_max = rng.u32(f_min.max(1)..=params.max_frequency.max(1));
        let length = (rng.f64() * 9.0 + 1.0).round();
        EdgeDescription { id, left, right, length, f_min, f_max, cost: length }
    }).collect();
    InstanceDescription { c_fix: rng.u32(1..=10) as f64, edges }
}

/// A random instance together with a decomposition from the minimum degree heuristic
pub fn random_instance(params: &GeneratorParams, rng: &mut fastrand::Rng) -> anyhow::Result<(Instance, TreeDecomposition)> {
    let instance = Instance::new(random_description(params, rng))?;
    let order = TreeDecomposition::min_degree_order(&instance.graph);
    let td = TreeDecomposition::from_elimination_order(&instance.graph, &order)?;
    Ok((instance, td))
}
