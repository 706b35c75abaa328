//! Build instructions and augmented costs: the bookkeeping that turns an optimal cost back into
//! concrete lines.

use std::{collections::BTreeSet, rc::Rc};

use tracing::trace;

use super::{
    pattern::{display_slots, Slot},
    reconstruct::LineDraft,
};
use crate::{
    error::ReconstructionError,
    graph::{Graph, NodeId},
    problem::{Instance, LineConcept},
};

/// A topology edit performed while moving from a child scheme to its parent scheme
#[derive(Debug, Clone, PartialEq)]
pub enum BuildInstruction {
    /// New line stubs lying entirely inside the bag, ending at the introduced stop
    Create { result: Vec<Slot>, frequency: u32 },
    /// The introduced `stop` is placed at `index` of an open fragment matching `initial`,
    /// extending it at an end or subdividing one of its edges
    Insert {
        initial: Vec<Slot>,
        result: Vec<Slot>,
        stop: NodeId,
        index: usize,
        frequency: u32,
    },
    /// Two fragments, one from each side of a join, are spliced at their shared stops
    Merge { left: Vec<Slot>, right: Vec<Slot>, frequency: u32 },
}
impl BuildInstruction {
    /// The change in cost caused by this instruction
    pub fn cost(&self, instance: &Instance) -> f64 {
        let cost = |a: Slot, b: Slot| match (a, b) {
            (Slot::Stop(u), Slot::Stop(v)) => instance.edge_cost(u, v),
            _ => 0.0,
        };
        match self {
            BuildInstruction::Create { result, frequency } => {
                let f = *frequency as f64;
                let edges: f64 = result.windows(2).map(|w| cost(w[0], w[1])).sum();
                f * edges + f * instance.c_fix
            }
            BuildInstruction::Insert { result, index, frequency, .. } => {
                let (f, i) = (*frequency as f64, *index);
                let mut delta = 0.0;
                if i > 0 {
                    delta += f * cost(result[i - 1], result[i]);
                }
                if i + 1 < result.len() {
                    delta += f * cost(result[i], result[i + 1]);
                }
                if i > 0 && i + 1 < result.len() {
                    // subdivision replaces the edge it splits
                    delta -= f * cost(result[i - 1], result[i + 1]);
                }
                delta
            }
            BuildInstruction::Merge { left, right, frequency } => {
                let f = *frequency as f64;
                // two partial lines become one
                let mut delta = -f * instance.c_fix;
                let mut i = usize::from(left[0].is_wildcard());
                let mut j = usize::from(right[0].is_wildcard());
                assert_meeting_point(left, right, i, j);
                while i + 1 < left.len() && j + 1 < right.len() {
                    if left[i + 1].is_wildcard() {
                        delta -= f * cost(right[j], right[j + 1]);
                        i += 2;
                        j += 1;
                    } else if right[j + 1].is_wildcard() {
                        delta -= f * cost(left[i], left[i + 1]);
                        i += 1;
                        j += 2;
                    } else {
                        delta -= f * cost(left[i], left[i + 1]);
                        i += 1;
                        j += 1;
                    }
                    if i < left.len() && j < right.len() {
                        assert_meeting_point(left, right, i, j);
                    }
                }
                delta
            }
        }
    }
}

/// Both merge halves must sit on the same stop after their wildcards are skipped
fn assert_meeting_point(left: &[Slot], right: &[Slot], i: usize, j: usize) {
    assert!(
        !left[i].is_wildcard() && left[i] == right[j],
        "merge halves {} and {} are misaligned at positions {i} and {j}",
        display_slots(left),
        display_slots(right),
    );
}

/// How the set of live bag stops changes at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BagChange {
    Add(NodeId),
    Remove(NodeId),
    Unchanged,
}

/// A cost together with the recipe that achieves it.
///
/// Nodes are shared between every parent that picked them, so the recipes form a DAG.
#[derive(Debug)]
pub struct AugmentedCost {
    pub cost: f64,
    pub instructions: Vec<BuildInstruction>,
    pub bag_change: BagChange,
    pub child: Option<Rc<AugmentedCost>>,
    /// Right-hand child of a join
    pub child2: Option<Rc<AugmentedCost>>,
}
impl AugmentedCost {
    /// A leaf result with no recipe
    pub fn new(cost: f64) -> Self {
        Self { cost, instructions: vec![], bag_change: BagChange::Unchanged, child: None, child2: None }
    }

    pub fn infinite() -> Self {
        Self::new(f64::INFINITY)
    }

    /// A result building on a single child, initially at the child's cost
    pub fn wrap(child: Rc<AugmentedCost>) -> Self {
        Self { child: Some(Rc::clone(&child)), ..Self::new(child.cost) }
    }

    /// A result combining both sides of a join, initially at their summed cost
    pub fn join(left: Rc<AugmentedCost>, right: Rc<AugmentedCost>) -> Self {
        Self {
            cost: left.cost + right.cost,
            child: Some(left),
            child2: Some(right),
            ..Self::new(0.0)
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.cost.is_finite()
    }

    /// Replay the recipe, producing the concrete lines as stop sequences
    pub fn reconstruct(&self) -> Result<LineDraft, ReconstructionError> {
        self.reconstruct_with(&mut BTreeSet::new())
    }

    /// Replay the recipe and read off the resulting line concept
    pub fn reconstruct_line_concept(&self, graph: &Graph) -> Result<LineConcept, ReconstructionError> {
        self.reconstruct()?.into_line_concept(graph)
    }

    /// `bag` holds the live stops and is updated as the recipe is replayed bottom-up
    fn reconstruct_with(&self, bag: &mut BTreeSet<NodeId>) -> Result<LineDraft, ReconstructionError> {
        let mut draft = match &self.child {
            Some(child) => child.reconstruct_with(bag)?,
            None => LineDraft::new(),
        };
        if let Some(child2) = &self.child2 {
            let mut right = child2.reconstruct_with(bag)?;
            let mut merged = LineDraft::new();
            for instruction in &self.instructions {
                if let BuildInstruction::Merge { left: lp, right: rp, frequency } = instruction {
                    merged.absorb(LineDraft::merge(&mut draft, &mut right, lp, rp, *frequency, bag)?);
                }
            }
            draft.absorb(right);
            draft.absorb(merged);
            return Ok(draft);
        }

        draft.apply_all(&self.instructions, bag)?;
        match self.bag_change {
            BagChange::Add(v) => {
                bag.insert(v);
            }
            BagChange::Remove(v) => {
                bag.remove(&v);
            }
            BagChange::Unchanged => {}
        }
        trace!(lines = draft.len(), bag = bag.len(), "replayed node");
        Ok(draft)
    }
}
