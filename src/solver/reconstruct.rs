//! Concrete partial lines, rebuilt by replaying build instructions.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    instruction::BuildInstruction,
    pattern::{display_slots, match_path, Slot},
};
use crate::{
    error::ReconstructionError,
    graph::{Graph, NodeId},
    problem::{Line, LineConcept},
};

/// Stop sequences with their frequencies, each stored in its smaller orientation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDraft {
    paths: BTreeMap<Vec<NodeId>, u32>,
}

/// A stored path, oriented so that it matches a pattern
struct Matched {
    key: Vec<NodeId>,
    oriented: Vec<NodeId>,
    positions: Vec<usize>,
    count: u32,
}

impl LineDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut path: Vec<NodeId>, count: u32) {
        if count == 0 {
            return;
        }
        if path.iter().rev().lt(path.iter()) {
            path.reverse();
        }
        *self.paths.entry(path).or_default() += count;
    }

    pub fn absorb(&mut self, other: LineDraft) {
        other.paths.into_iter().for_each(|(p, c)| self.add(p, c));
    }

    /// Number of distinct stop sequences
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[NodeId], u32)> + '_ {
        self.paths.iter().map(|(p, &c)| (p.as_slice(), c))
    }

    fn take(&mut self, key: &[NodeId], count: u32) {
        if let Some(available) = self.paths.get_mut(key) {
            *available -= count;
            if *available == 0 {
                self.paths.remove(key);
            }
        }
    }

    /// Every stored path matching `pattern`, trying the stored orientation first
    fn matches<'a>(&'a self, pattern: &'a [Slot], bag: &'a BTreeSet<NodeId>) -> impl Iterator<Item = Matched> + 'a {
        self.paths.iter().filter_map(move |(key, &count)| {
            let reversed = key.iter().rev().copied().collect();
            [key.clone(), reversed].into_iter().find_map(|oriented| {
                let positions = match_path(pattern, &oriented, bag)?;
                Some(Matched { key: key.clone(), oriented, positions, count })
            })
        })
    }

    /// Replay the `Create` and `Insert` instructions of one node.
    ///
    /// Every instruction consumes paths present before the node, so a path extended by one
    /// instruction is never picked up again by another.
    pub fn apply_all(&mut self, instructions: &[BuildInstruction], bag: &BTreeSet<NodeId>) -> Result<(), ReconstructionError> {
        let mut produced = LineDraft::new();
        for instruction in instructions {
            match instruction {
                BuildInstruction::Create { result, frequency } => {
                    produced.add(result.iter().filter_map(|s| s.stop()).collect(), *frequency);
                }
                BuildInstruction::Insert { initial, stop, index, frequency, .. } => {
                    self.insert_stop(initial, *stop, *index, *frequency, bag, &mut produced)?;
                }
                BuildInstruction::Merge { .. } => {}
            }
        }
        self.absorb(produced);
        Ok(())
    }

    fn insert_stop(
        &mut self,
        initial: &[Slot],
        stop: NodeId,
        index: usize,
        frequency: u32,
        bag: &BTreeSet<NodeId>,
        produced: &mut LineDraft,
    ) -> Result<(), ReconstructionError> {
        let mut remaining = frequency;
        let mut consumed = vec![];
        for found in self.matches(initial, bag) {
            if remaining == 0 {
                break;
            }
            let mut extended = found.oriented;
            if index == initial.len() {
                extended.push(stop);
            } else {
                let at = found.positions.iter().position(|&p| p == index).ok_or_else(|| {
                    ReconstructionError::InsertPositionMissing { stop, pattern: display_slots(initial) }
                })?;
                extended.insert(at, stop);
            }
            let taken = found.count.min(remaining);
            remaining -= taken;
            produced.add(extended, taken);
            consumed.push((found.key, taken));
        }
        if remaining > 0 {
            return Err(ReconstructionError::NoMatchingPath(display_slots(initial)));
        }
        consumed.into_iter().for_each(|(key, taken)| self.take(&key, taken));
        Ok(())
    }

    /// Splice `frequency` units of paths matching `left_pattern` in `left` with paths matching
    /// `right_pattern` in `right`, consuming them from both drafts
    pub fn merge(
        left: &mut LineDraft,
        right: &mut LineDraft,
        left_pattern: &[Slot],
        right_pattern: &[Slot],
        frequency: u32,
        bag: &BTreeSet<NodeId>,
    ) -> Result<LineDraft, ReconstructionError> {
        let mut merged = LineDraft::new();
        let mut remaining = frequency;
        while remaining > 0 {
            let l = left.matches(left_pattern, bag).next()
                .ok_or_else(|| ReconstructionError::NoMatchingPath(display_slots(left_pattern)))?;
            let r = right.matches(right_pattern, bag).next()
                .ok_or_else(|| ReconstructionError::NoMatchingPath(display_slots(right_pattern)))?;
            let spliced = splice(left_pattern, &l, right_pattern, &r).ok_or_else(|| {
                ReconstructionError::SpliceMismatch {
                    left: display_slots(left_pattern),
                    right: display_slots(right_pattern),
                }
            })?;
            let common = l.count.min(r.count).min(remaining);
            left.take(&l.key, common);
            right.take(&r.key, common);
            merged.add(spliced, common);
            remaining -= common;
        }
        Ok(merged)
    }

    /// Read off the finished lines
    pub fn into_line_concept(self, graph: &Graph) -> Result<LineConcept, ReconstructionError> {
        let lines = self.iter()
            .map(|(path, frequency)| Line::from_vertex_path(graph, frequency, path))
            .collect::<Result<_, _>>()?;
        Ok(LineConcept::new(lines))
    }
}

/// Interleave two matched paths: hidden stretches of either side are copied over, shared stops
/// are emitted once
fn splice(left_pattern: &[Slot], left: &Matched, right_pattern: &[Slot], right: &Matched) -> Option<Vec<NodeId>> {
    let hidden = |pattern: &[Slot], m: &Matched, i: usize| {
        m.positions.get(i).is_some_and(|&p| pattern[p].is_wildcard())
    };
    let mut spliced = Vec::with_capacity(left.oriented.len() + right.oriented.len());
    let (mut i, mut j) = (0, 0);
    loop {
        while hidden(left_pattern, left, i) {
            spliced.push(left.oriented[i]);
            i += 1;
        }
        while hidden(right_pattern, right, j) {
            spliced.push(right.oriented[j]);
            j += 1;
        }
        if i >= left.oriented.len() && j >= right.oriented.len() {
            return Some(spliced);
        }
        let shared = *left.oriented.get(i)?;
        if right.oriented.get(j) != Some(&shared) {
            return None;
        }
        spliced.push(shared);
        i += 1;
        j += 1;
    }
}
