//! Path patterns: the shape of an open line fragment, restricted to the stops of the current bag.
//!
//! A pattern is a sequence of slots, each either a bag stop or a wildcard standing for a stretch
//! of already forgotten stops. A line has no direction, so a pattern and its reversal are the same
//! pattern; [`PathPattern`] always stores the lexicographically smaller of the two.

use std::{collections::BTreeSet, fmt};

use itertools::Itertools;

use crate::graph::NodeId;

/// One position of a path pattern.
///
/// The derived order places `Wildcard` below every stop, which fixes the canonical orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    /// The fragment continues through stops outside the bag
    Wildcard,
    Stop(NodeId),
}
impl Slot {
    pub fn is_wildcard(self) -> bool {
        self == Slot::Wildcard
    }

    pub fn stop(self) -> Option<NodeId> {
        match self {
            Slot::Stop(v) => Some(v),
            Slot::Wildcard => None,
        }
    }
}
impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Wildcard => write!(f, "?"),
            Slot::Stop(v) => write!(f, "{v}"),
        }
    }
}

/// Formats an oriented slot sequence the same way a pattern is displayed
pub fn display_slots(slots: &[Slot]) -> String {
    format!("[{}]", slots.iter().join(" "))
}

/// A reversal-folded path pattern
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathPattern {
    slots: Vec<Slot>,
}
impl PathPattern {
    /// Create the canonical pattern of an oriented slot sequence
    pub fn new(mut slots: Vec<Slot>) -> Self {
        if slots.iter().rev().lt(slots.iter()) {
            slots.reverse();
        }
        Self { slots }
    }

    /// A pattern made of stops only
    pub fn from_stops(stops: &[NodeId]) -> Self {
        Self::new(stops.iter().map(|&v| Slot::Stop(v)).collect())
    }

    /// The slots in canonical orientation
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Position of stop `v` in the canonical orientation
    pub fn position(&self, v: NodeId) -> Option<usize> {
        self.slots.iter().position(|&s| s == Slot::Stop(v))
    }

    pub fn contains_wildcard(&self) -> bool {
        self.slots.iter().any(|s| s.is_wildcard())
    }

    /// Adjacent slot pairs, wildcards included
    pub fn edges(&self) -> impl Iterator<Item = (Slot, Slot)> + '_ {
        self.slots.iter().copied().tuple_windows()
    }

    /// True iff no neighbour of position `pos` is a wildcard
    pub fn incident_edges_inside_bag(&self, pos: usize) -> bool {
        let before = pos.checked_sub(1).and_then(|i| self.slots.get(i));
        let after = self.slots.get(pos + 1);
        [before, after].into_iter().flatten().all(|s| !s.is_wildcard())
    }

    /// Every way of placing `v` into one of the wildcard stretches: the stretch becomes `v`,
    /// or `v` is attached directly before or after it
    pub fn un_replace(&self, v: NodeId) -> Vec<PathPattern> {
        self.wildcard_positions().flat_map(|i| {
            let mut replaced = self.slots.clone();
            replaced[i] = Slot::Stop(v);
            let mut before = self.slots.clone();
            before.insert(i, Slot::Stop(v));
            let mut after = self.slots.clone();
            after.insert(i + 1, Slot::Stop(v));
            [replaced, before, after].map(PathPattern::new)
        }).collect()
    }

    /// Every way of routing a wildcard stretch through `v` with hidden stops on both sides
    pub fn bridges(&self, v: NodeId) -> Vec<PathPattern> {
        self.wildcard_positions().map(|i| {
            let mut bridged = self.slots.clone();
            bridged.splice(i..=i, [Slot::Wildcard, Slot::Stop(v), Slot::Wildcard]);
            PathPattern::new(bridged)
        }).collect()
    }

    /// All `2^w - 2` ways to hand the `w` wildcards to two halves sharing every stop, with at
    /// least one wildcard on each side. The halves keep this pattern's orientation.
    pub fn nontrivial_splits(&self) -> Vec<(Vec<Slot>, Vec<Slot>)> {
        let wildcards = self.wildcard_positions().count() as u32;
        let Some(states) = 1u64.checked_shl(wildcards) else {
            return vec![];
        };
        (1..states.saturating_sub(1)).map(|state| {
            let mut bits = state;
            let mut left = Vec::with_capacity(self.slots.len());
            let mut right = Vec::with_capacity(self.slots.len());
            for &slot in &self.slots {
                if slot.is_wildcard() {
                    if bits & 1 == 1 {
                        left.push(slot);
                    } else {
                        right.push(slot);
                    }
                    bits >>= 1;
                } else {
                    left.push(slot);
                    right.push(slot);
                }
            }
            (left, right)
        }).collect()
    }

    fn wildcard_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().positions(|s| s.is_wildcard())
    }
}
impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", display_slots(&self.slots))
    }
}

/// Align an oriented pattern against a concrete stop sequence without reversing either.
///
/// Stops in `bag` must match the pattern's stops one to one, and every maximal run of stops
/// outside the bag must match a single wildcard. On success, returns for each position of `path`
/// the pattern position it was matched to.
pub fn match_path(pattern: &[Slot], path: &[NodeId], bag: &BTreeSet<NodeId>) -> Option<Vec<usize>> {
    let mut matched = Vec::with_capacity(path.len());
    let mut next = 0;
    let mut in_hidden_run = false;
    for &v in path {
        if bag.contains(&v) {
            in_hidden_run = false;
            if pattern.get(next) != Some(&Slot::Stop(v)) {
                return None;
            }
            matched.push(next);
            next += 1;
        } else if in_hidden_run {
            matched.push(next - 1);
        } else {
            in_hidden_run = true;
            if pattern.get(next) != Some(&Slot::Wildcard) {
                return None;
            }
            matched.push(next);
            next += 1;
        }
    }
    (next == pattern.len()).then_some(matched)
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use proptest::prelude::*;

    use super::*;

    const W: Slot = Slot::Wildcard;
    fn s(v: NodeId) -> Slot {
        Slot::Stop(v)
    }

    fn hash_of(p: &PathPattern) -> u64 {
        let mut hasher = DefaultHasher::new();
        p.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn reversal_is_the_same_pattern() {
        let forward = PathPattern::new(vec![s(1), s(2), s(3)]);
        let backward = PathPattern::new(vec![s(3), s(2), s(1)]);
        assert_eq!(forward, backward);
        assert_eq!(hash_of(&forward), hash_of(&backward));
        assert_eq!(forward.slots(), &[s(1), s(2), s(3)]);

        let open = PathPattern::new(vec![s(4), W]);
        assert_eq!(open.slots(), &[W, s(4)], "Ensure wildcards sort below stops");
    }

    #[test]
    fn incident_edges() {
        let p = PathPattern::new(vec![W, s(1), s(2), s(3)]);
        assert!(!p.incident_edges_inside_bag(1));
        assert!(p.incident_edges_inside_bag(2));
        assert!(p.incident_edges_inside_bag(3));
    }

    #[test]
    fn un_replace_variants() {
        let p = PathPattern::new(vec![s(1), W, s(2)]);
        let variants = p.un_replace(9);
        assert_eq!(variants, vec![
            PathPattern::new(vec![s(1), s(9), s(2)]),
            PathPattern::new(vec![s(1), s(9), W, s(2)]),
            PathPattern::new(vec![s(1), W, s(9), s(2)]),
        ]);
        assert_eq!(p.bridges(9), vec![PathPattern::new(vec![s(1), W, s(9), W, s(2)])]);
        assert!(PathPattern::from_stops(&[1, 2]).un_replace(9).is_empty());
    }

    #[test]
    fn split_counts() {
        let one = PathPattern::new(vec![s(1), W, s(2)]);
        assert!(one.nontrivial_splits().is_empty());

        let two = PathPattern::new(vec![W, s(1), W]);
        let splits = two.nontrivial_splits();
        assert_eq!(splits, vec![
            (vec![W, s(1)], vec![s(1), W]),
            (vec![s(1), W], vec![W, s(1)]),
        ]);

        let three = PathPattern::new(vec![W, s(1), W, s(2), W]);
        let splits = three.nontrivial_splits();
        assert_eq!(splits.len(), 6);
        for (left, right) in splits {
            let stops = |side: &[Slot]| side.iter().filter_map(|s| s.stop()).collect_vec();
            assert_eq!(stops(&left), vec![1, 2], "Ensure both halves keep every stop");
            assert_eq!(stops(&right), vec![1, 2]);
            assert_eq!(left.len() + right.len(), 2 * 2 + 3);
        }
    }

    #[test]
    fn path_matching() {
        let bag = BTreeSet::from([1, 2]);
        let pattern = [W, s(1), W, s(2)];
        assert_eq!(match_path(&pattern, &[7, 8, 1, 9, 2], &bag), Some(vec![0, 0, 1, 2, 3]));
        assert_eq!(match_path(&pattern, &[2, 9, 1, 7], &bag), None, "Ensure no reversal is attempted");
        assert_eq!(match_path(&pattern, &[1, 9, 2], &bag), None);
        assert_eq!(match_path(&pattern, &[7, 1, 9, 2, 8], &bag), None, "Ensure trailing stretches must match");
        assert_eq!(match_path(&[s(1), s(2)], &[1, 2], &bag), Some(vec![0, 1]));
    }

    fn slots() -> impl Strategy<Value = Vec<Slot>> {
        prop::collection::vec(prop_oneof![Just(W), (1u32..6).prop_map(Slot::Stop)], 2..7)
    }

    proptest! {
        #[test]
        fn canonical_form_ignores_direction(slots in slots()) {
            let mut reversed = slots.clone();
            reversed.reverse();
            let forward = PathPattern::new(slots);
            let backward = PathPattern::new(reversed);
            prop_assert_eq!(hash_of(&forward), hash_of(&backward));
            prop_assert_eq!(forward, backward);
        }
    }
}
