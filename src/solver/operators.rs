//! The dynamic programming transitions, one per step of the nice tree decomposition walk.
//!
//! Each [`CostVector`] lazily maps path schemes to the cheapest way of realising them in the part
//! of the graph below it, memoising every non-trivial answer.

use std::{
    collections::{BTreeSet, HashMap},
    rc::Rc,
};

use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::trace;

use super::{
    choices::SequenceOfChoices,
    instruction::{AugmentedCost, BagChange, BuildInstruction},
    pattern::{PathPattern, Slot},
    scheme::PathScheme,
};
use crate::{
    graph::{EdgeId, Graph, NodeId},
    problem::Instance,
};

/// The transition performed by a cost vector, with everything it captured
enum Transition<'a> {
    /// No stops at all
    Empty,
    Introduce { stop: NodeId, child: Box<CostVector<'a>> },
    /// `remaining` is the bag after `stop` left it
    Forget { stop: NodeId, remaining: BTreeSet<NodeId>, child: Box<CostVector<'a>> },
    Join { left: Box<CostVector<'a>>, right: Box<CostVector<'a>> },
}

/// A lazily evaluated, memoised cost function over path schemes
pub struct CostVector<'a> {
    instance: &'a Instance,
    transition: Transition<'a>,
    memo: HashMap<PathScheme, Rc<AugmentedCost>>,
}
impl<'a> CostVector<'a> {
    fn with(instance: &'a Instance, transition: Transition<'a>) -> Self {
        Self { instance, transition, memo: HashMap::new() }
    }

    /// The base case: only the empty scheme is achievable, at no cost
    pub fn empty(instance: &'a Instance) -> Self {
        Self::with(instance, Transition::Empty)
    }

    pub fn introduce(self, stop: NodeId) -> Self {
        Self::with(self.instance, Transition::Introduce { stop, child: Box::new(self) })
    }

    pub fn forget(self, stop: NodeId, remaining: BTreeSet<NodeId>) -> Self {
        Self::with(self.instance, Transition::Forget { stop, remaining, child: Box::new(self) })
    }

    pub fn join(self, other: Self) -> Self {
        Self::with(self.instance, Transition::Join { left: Box::new(self), right: Box::new(other) })
    }

    /// The cheapest way to produce `scheme`
    pub fn get(&mut self, scheme: &PathScheme) -> Rc<AugmentedCost> {
        if let Some(known) = self.memo.get(scheme) {
            return Rc::clone(known);
        }
        let (result, trivial) = self.compute(scheme);
        if !trivial {
            self.memo.insert(scheme.clone(), Rc::clone(&result));
        }
        result
    }

    fn compute(&mut self, scheme: &PathScheme) -> (Rc<AugmentedCost>, bool) {
        let instance = self.instance;
        match &mut self.transition {
            Transition::Empty => {
                let cost = if scheme.is_zero() { 0.0 } else { f64::INFINITY };
                (Rc::new(AugmentedCost::new(cost)), true)
            }
            Transition::Introduce { stop, child } => introduce(instance, *stop, child, scheme),
            Transition::Forget { stop, remaining, child } => {
                (forget(&instance.graph, *stop, remaining, child, scheme), false)
            }
            Transition::Join { left, right } => (join(instance, left, right, scheme), false),
        }
    }

    /// Number of memoised schemes in this cost vector and everything below it
    pub fn memo_entries(&self) -> usize {
        self.memo.len() + match &self.transition {
            Transition::Empty => 0,
            Transition::Introduce { child, .. } | Transition::Forget { child, .. } => child.memo_entries(),
            Transition::Join { left, right } => left.memo_entries() + right.memo_entries(),
        }
    }

    /// Number of cost vectors in this tree
    pub fn operator_count(&self) -> usize {
        1 + match &self.transition {
            Transition::Empty => 0,
            Transition::Introduce { child, .. } | Transition::Forget { child, .. } => child.operator_count(),
            Transition::Join { left, right } => left.operator_count() + right.operator_count(),
        }
    }
}

/// Keeps the first of several equally cheap candidates
fn keep_cheaper(best: &mut Rc<AugmentedCost>, candidate: Rc<AugmentedCost>) {
    if candidate.cost < best.cost {
        *best = candidate;
    }
}

/// `stop` joins the bag. Patterns through it are either created right here or reduce to the
/// pattern without it, which the child has to provide.
fn introduce(
    instance: &Instance,
    stop: NodeId,
    child: &mut CostVector<'_>,
    scheme: &PathScheme,
) -> (Rc<AugmentedCost>, bool) {
    let mut reduced = PathScheme::new();
    let mut instructions = vec![];
    let mut delta = 0.0;
    for (pattern, count) in scheme.iter() {
        let Some(pos) = pattern.position(stop) else {
            reduced.add(pattern.clone(), count);
            continue;
        };
        if !pattern.incident_edges_inside_bag(pos) {
            // an edge at `stop` would lead to a stop that was never in a bag with it
            return (Rc::new(AugmentedCost::infinite()), true);
        }
        let instruction = if pattern.contains_wildcard() {
            let mut initial = pattern.slots().to_vec();
            initial.remove(pos);
            reduced.add(PathPattern::new(initial.clone()), count);
            BuildInstruction::Insert {
                initial,
                result: pattern.slots().to_vec(),
                stop,
                index: pos,
                frequency: count,
            }
        } else {
            BuildInstruction::Create { result: pattern.slots().to_vec(), frequency: count }
        };
        delta += instruction.cost(instance);
        instructions.push(instruction);
    }

    let mut result = AugmentedCost::wrap(child.get(&reduced));
    result.cost += delta;
    result.instructions = instructions;
    result.bag_change = BagChange::Add(stop);
    (Rc::new(result), false)
}

/// Whether `pattern` puts `stop` next to a stop it shares no edge with
fn has_forbidden_edge(graph: &Graph, pattern: &PathPattern, stop: NodeId) -> bool {
    let Some(pos) = pattern.position(stop) else {
        return false;
    };
    let slots = pattern.slots();
    let before = pos.checked_sub(1).and_then(|i| slots.get(i));
    let after = slots.get(pos + 1);
    [before, after].into_iter().flatten()
        .filter_map(|s| s.stop())
        .any(|u| graph.find_edge(u, stop).is_none())
}

/// `stop` leaves the bag. Each pattern of the parent either avoids `stop` or hides it in one of
/// its wildcard stretches; every consistent combination is checked against the edge bounds at
/// `stop` and the capacity of the stops involved.
fn forget(
    graph: &Graph,
    stop: NodeId,
    remaining: &BTreeSet<NodeId>,
    child: &mut CostVector<'_>,
    scheme: &PathScheme,
) -> Rc<AugmentedCost> {
    let mut choices = SequenceOfChoices::new();
    for (pattern, count) in scheme.iter() {
        let variants = pattern.un_replace(stop).into_iter()
            .chain(pattern.bridges(stop))
            .filter(|p| !has_forbidden_edge(graph, p, stop))
            .unique();
        choices.choose(std::iter::once(pattern.clone()).chain(variants).collect(), count);
    }
    trace!(stop, patterns = scheme.len(), choices = %choices.total(), "forget");

    let open_end = PathPattern::new(vec![Slot::Stop(stop), Slot::Wildcard]);
    let pass_through = PathPattern::new(vec![Slot::Wildcard, Slot::Stop(stop), Slot::Wildcard]);
    let mut best = Rc::new(AugmentedCost::infinite());
    for choice in &choices {
        let mut base = PathScheme::new();
        let mut loads: HashMap<EdgeId, u32> = HashMap::new();
        let mut incidences: HashMap<NodeId, u32> = HashMap::new();
        for &(pattern, count) in choice.iter().flatten() {
            base.add(pattern.clone(), count);
            for (a, b) in pattern.edges() {
                if let (Slot::Stop(x), Slot::Stop(y)) = (a, b) {
                    if x == stop || y == stop {
                        if let Some(edge) = graph.find_edge(x, y) {
                            *loads.entry(edge.id).or_default() += count;
                        }
                    }
                }
                for u in [a, b].into_iter().filter_map(Slot::stop) {
                    *incidences.entry(u).or_default() += count;
                }
            }
        }

        let loads_admitted = remaining.iter()
            .filter_map(|&u| graph.find_edge(u, stop))
            .all(|edge| edge.info.admits(loads.get(&edge.id).copied().unwrap_or(0)));
        if !loads_admitted {
            continue;
        }
        if incidences.iter().any(|(&u, &n)| n > graph.total_fmax(u)) {
            continue;
        }

        // fragments ending at `stop` or passing through it with both sides already forgotten
        let allowance = graph.total_fmax(stop) - incidences.get(&stop).copied().unwrap_or(0);
        let cheapest = (0..=allowance)
            .flat_map(|open_ends| (0..=(allowance - open_ends) / 2).map(move |pass_throughs| (open_ends, pass_throughs)))
            .map(|(open_ends, pass_throughs)| {
                let mut below = base.clone();
                below.assign(open_end.clone(), open_ends);
                below.assign(pass_through.clone(), pass_throughs);
                child.get(&below)
            })
            .min_by_key(|candidate| OrderedFloat(candidate.cost));
        if let Some(candidate) = cheapest {
            keep_cheaper(&mut best, candidate);
        }
    }

    let mut result = AugmentedCost::wrap(best);
    result.bag_change = BagChange::Remove(stop);
    Rc::new(result)
}

/// What a join does with the fragments of one pattern
enum Disposition {
    Left(PathPattern),
    Right(PathPattern),
    /// Produced in two halves, one per side, spliced afterwards
    Merge { left: Vec<Slot>, right: Vec<Slot> },
}

/// Two subtrees with the same bag are combined. Every pattern's fragments come from the left,
/// from the right, or from halves on both sides.
fn join(
    instance: &Instance,
    left: &mut CostVector<'_>,
    right: &mut CostVector<'_>,
    scheme: &PathScheme,
) -> Rc<AugmentedCost> {
    let mut choices = SequenceOfChoices::new();
    for (pattern, count) in scheme.iter() {
        let mut options = vec![Disposition::Left(pattern.clone()), Disposition::Right(pattern.clone())];
        options.extend(pattern.nontrivial_splits().into_iter()
            .map(|(l, r)| Disposition::Merge { left: l, right: r }));
        choices.choose(options, count);
    }
    trace!(patterns = scheme.len(), choices = %choices.total(), "join");

    let mut best = Rc::new(AugmentedCost::infinite());
    for choice in &choices {
        let mut left_scheme = PathScheme::new();
        let mut right_scheme = PathScheme::new();
        let mut instructions = vec![];
        let mut delta = 0.0;
        for &(disposition, count) in choice.iter().flatten() {
            match disposition {
                Disposition::Left(p) => left_scheme.add(p.clone(), count),
                Disposition::Right(p) => right_scheme.add(p.clone(), count),
                Disposition::Merge { left: left_half, right: right_half } => {
                    left_scheme.add(PathPattern::new(left_half.clone()), count);
                    right_scheme.add(PathPattern::new(right_half.clone()), count);
                    let instruction = BuildInstruction::Merge {
                        left: left_half.clone(),
                        right: right_half.clone(),
                        frequency: count,
                    };
                    delta += instruction.cost(instance);
                    instructions.push(instruction);
                }
            }
        }

        let below_left = left.get(&left_scheme);
        if !below_left.is_feasible() {
            continue;
        }
        let mut candidate = AugmentedCost::join(below_left, right.get(&right_scheme));
        candidate.cost += delta;
        candidate.instructions = instructions;
        keep_cheaper(&mut best, Rc::new(candidate));
    }
    best
}
