//! Path schemes: how many open line fragments of each pattern cross the bag boundary.

use std::{collections::BTreeMap, fmt};

use super::pattern::PathPattern;

/// A sparse multiset of path patterns; the dynamic programming state at a bag.
///
/// Counts of zero are never stored, so two schemes are equal exactly when every pattern has the
/// same count in both. The derived ordering walks both sorted maps side by side, which gives a
/// canonical total order for use as a memo key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathScheme {
    counts: BTreeMap<PathPattern, u32>,
}
impl PathScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increase the count of `pattern` by `count`
    pub fn add(&mut self, pattern: PathPattern, count: u32) {
        if count > 0 {
            *self.counts.entry(pattern).or_default() += count;
        }
    }

    /// Set the count of `pattern` to exactly `count`
    pub fn assign(&mut self, pattern: PathPattern, count: u32) {
        if count == 0 {
            self.counts.remove(&pattern);
        } else {
            self.counts.insert(pattern, count);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct patterns with a nonzero count
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathPattern, u32)> + '_ {
        self.counts.iter().map(|(p, &c)| (p, c))
    }
}
impl FromIterator<(PathPattern, u32)> for PathScheme {
    fn from_iter<I: IntoIterator<Item = (PathPattern, u32)>>(iter: I) -> Self {
        let mut scheme = Self::new();
        iter.into_iter().for_each(|(p, c)| scheme.add(p, c));
        scheme
    }
}
impl fmt::Display for PathScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (pattern, count)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pattern}: {count}")?;
        }
        write!(f, "}}")
    }
}
