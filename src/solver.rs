//! Exact line planning by dynamic programming over a tree decomposition.
//!
//! The decomposition is walked as a nice tree decomposition, building one lazily evaluated cost
//! vector per step. Querying the root for the empty scheme then pulls exactly the sub-problems
//! the optimum depends on, and the recipe attached to the answer is replayed into lines.

use std::collections::BTreeSet;

use tracing::{debug, info, trace};

use crate::{
    config::SolverSettings,
    decomposition::{NiceVisitor, TreeDecomposition},
    error::SolveError,
    graph::NodeId,
    problem::{Instance, LineConcept},
};

mod choices;
mod instruction;
mod operators;
mod pattern;
mod reconstruct;
mod scheme;

use operators::CostVector;
use scheme::PathScheme;

/// The optimal line concept together with some statistics about the run
#[derive(Debug, Clone)]
pub struct Solution {
    pub cost: f64,
    pub line_concept: LineConcept,
    /// Width of the decomposition that was used
    pub width: usize,
    /// Schemes memoised over all cost vectors
    pub memo_entries: usize,
    /// Cost vectors built for the walk
    pub operators: usize,
}

/// Builds the chain of cost vectors while tracking the current bag
struct DpWalker<'a> {
    cost: CostVector<'a>,
    bag: BTreeSet<NodeId>,
}
impl<'a> NiceVisitor for DpWalker<'a> {
    fn introduce(mut self, v: NodeId) -> Self {
        self.bag.insert(v);
        trace!(stop = v, bag = self.bag.len(), "introduce");
        Self { cost: self.cost.introduce(v), bag: self.bag }
    }

    fn forget(mut self, v: NodeId) -> Self {
        self.bag.remove(&v);
        trace!(stop = v, bag = self.bag.len(), "forget");
        Self { cost: self.cost.forget(v, self.bag.clone()), bag: self.bag }
    }

    fn join(self, other: Self) -> Self {
        trace!(bag = self.bag.len(), "join");
        Self { cost: self.cost.join(other.cost), bag: self.bag }
    }
}

fn build<'a>(instance: &'a Instance, td: &TreeDecomposition) -> CostVector<'a> {
    td.nice_visit(&|| DpWalker { cost: CostVector::empty(instance), bag: BTreeSet::new() }).cost
}

/// Compute an optimal line concept for `instance` using the decomposition `td`
pub fn solve(instance: &Instance, td: &TreeDecomposition, settings: &SolverSettings) -> Result<Solution, SolveError> {
    if settings.validate_decomposition {
        td.validate(&instance.graph)?;
    }
    let size = td.max_bag_size();
    if size > settings.max_bag_size {
        return Err(SolveError::BagTooLarge { size, limit: settings.max_bag_size });
    }
    debug!(bags = td.bags().len(), width = td.width(), path = td.is_path(), "walking decomposition");

    let mut root = build(instance, td);
    let operators = root.operator_count();
    let best = root.get(&PathScheme::new());
    let memo_entries = root.memo_entries();
    info!(cost = best.cost, operators, memo_entries, "dynamic program finished");
    if !best.is_feasible() {
        return Err(SolveError::Infeasible);
    }

    let line_concept = best.reconstruct_line_concept(&instance.graph)?;
    debug!(lines = line_concept.lines.len(), "reconstructed line concept");
    Ok(Solution { cost: best.cost, line_concept, width: td.width(), memo_entries, operators })
}
