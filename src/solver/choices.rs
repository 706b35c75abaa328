//! Enumerates every way to distribute counts over options, stage by stage.
//!
//! A stage has a list of options and a number of identical units. A choice for one stage is a
//! distribution of its units over its options; a choice for the whole sequence picks one
//! distribution per stage. The iterator visits every combination exactly once, behaving like a
//! mixed-radix counter whose digits are the per-stage distributions.

struct Stage<T> {
    options: Vec<T>,
    units: u32,
}

/// A sequence of independent distribution problems
pub struct SequenceOfChoices<T> {
    stages: Vec<Stage<T>>,
}
impl<T> Default for SequenceOfChoices<T> {
    fn default() -> Self {
        Self { stages: vec![] }
    }
}
impl<T> SequenceOfChoices<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage distributing `units` over `options`
    pub fn choose(&mut self, options: Vec<T>, units: u32) -> &mut Self {
        self.stages.push(Stage { options, units });
        self
    }

    /// Number of combinations the iterator will produce, saturating at `u128::MAX`
    pub fn total(&self) -> u128 {
        self.stages.iter()
            .map(|s| compositions(s.units, s.options.len()))
            .fold(1, u128::saturating_mul)
    }

    pub fn iter(&self) -> Choices<'_, T> {
        let state: Vec<Vec<u32>> = self.stages.iter().map(|stage| {
            let mut bins = vec![0; stage.options.len()];
            if let Some(first) = bins.first_mut() {
                *first = stage.units;
            }
            bins
        }).collect();
        // Units with nowhere to go leave nothing to enumerate
        let done = self.stages.iter().any(|s| s.options.is_empty() && s.units > 0);
        Choices { stages: &self.stages, state, done }
    }
}
impl<'a, T> IntoIterator for &'a SequenceOfChoices<T> {
    type Item = Choice<'a, T>;
    type IntoIter = Choices<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// For each stage, the options receiving a nonzero count together with that count
pub type Choice<'a, T> = Vec<Vec<(&'a T, u32)>>;

/// Iterator over all combinations of a [`SequenceOfChoices`]
pub struct Choices<'a, T> {
    stages: &'a [Stage<T>],
    state: Vec<Vec<u32>>,
    done: bool,
}
impl<'a, T> Iterator for Choices<'a, T> {
    type Item = Choice<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.stages.iter().zip(&self.state).map(|(stage, bins)| {
            stage.options.iter().zip(bins)
                .filter(|(_, n)| **n > 0)
                .map(|(option, &n)| (option, n))
                .collect()
        }).collect();

        let mut carry = true;
        for (stage, bins) in self.stages.iter().zip(self.state.iter_mut()) {
            carry = advance(bins, stage.units);
            if !carry {
                break;
            }
        }
        self.done = carry;
        Some(current)
    }
}

/// Step `bins` to the next distribution of `units`. Returns true when it wrapped around to the
/// first distribution.
fn advance(bins: &mut [u32], units: u32) -> bool {
    let Some(i) = bins.iter().position(|&n| n > 0) else {
        return true;
    };
    let n = bins[i];
    if i + 1 < bins.len() {
        bins[i] = 0;
        bins[0] += n - 1;
        bins[i + 1] += 1;
        false
    } else {
        bins[i] = 0;
        bins[0] = units;
        true
    }
}

/// Number of ways to put `units` identical units into `bins` labelled bins, saturating at
/// `u128::MAX`
fn compositions(units: u32, bins: usize) -> u128 {
    if bins == 0 {
        return u128::from(units == 0);
    }
    // C(units + bins - 1, bins - 1)
    let (n, k) = (units as u128 + bins as u128 - 1, bins as u128 - 1);
    (0..k)
        .try_fold(1u128, |acc, i| acc.checked_mul(n - i).map(|product| product / (i + 1)))
        .unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn single_stage_visits_every_distribution() {
        let mut choices = SequenceOfChoices::new();
        choices.choose(vec!['a', 'b', 'c'], 3);
        let all: Vec<_> = choices.iter().collect();
        assert_eq!(all.len(), 10, "Ensure C(5, 2) distributions are produced");
        assert_eq!(choices.total(), 10);

        let distinct: HashSet<Vec<(char, u32)>> = all.iter()
            .map(|c| c[0].iter().map(|&(&o, n)| (o, n)).collect())
            .collect();
        assert_eq!(distinct.len(), 10, "Ensure no distribution repeats");
        for choice in &all {
            assert_eq!(choice[0].iter().map(|&(_, n)| n).sum::<u32>(), 3);
        }
        assert_eq!(all[0][0], vec![(&'a', 3)]);
    }

    #[test]
    fn stages_multiply() {
        let mut choices = SequenceOfChoices::new();
        choices.choose(vec![1, 2], 2).choose(vec![3, 4, 5, 6], 1).choose(vec![7], 4);
        assert_eq!(choices.iter().count(), 3 * 4);
        assert_eq!(choices.total(), 12);
        // the iterator restarts from the beginning
        assert_eq!(choices.iter().count(), 12);
    }

    #[test]
    fn degenerate_sequences() {
        let empty = SequenceOfChoices::<u8>::new();
        assert_eq!(empty.iter().collect::<Vec<_>>(), vec![Vec::<Vec<(&u8, u32)>>::new()]);

        let mut nothing_to_place = SequenceOfChoices::new();
        nothing_to_place.choose(vec![1, 2], 0);
        assert_eq!(nothing_to_place.iter().count(), 1);

        let mut nowhere_to_go = SequenceOfChoices::<u8>::new();
        nowhere_to_go.choose(vec![], 2);
        assert_eq!(nowhere_to_go.iter().count(), 0);
        assert_eq!(nowhere_to_go.total(), 0);
    }

    #[test]
    fn huge_totals_saturate() {
        assert_eq!(compositions(1000, 200), u128::MAX, "Ensure a single stage saturates instead of overflowing");
        let mut choices = SequenceOfChoices::new();
        for _ in 0..3 {
            choices.choose((0..40).collect(), 60);
        }
        assert_eq!(choices.total(), u128::MAX, "Ensure the product over stages saturates");
        assert_eq!(compositions(4, 3), 15);
    }
}
