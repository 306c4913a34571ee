//! Query parameter combination generation.
//!
//! Given an endpoint's optional parameters (allowed values plus the names each
//! one conflicts with), produce every conflict-free combination of parameter
//! names and expand each into concrete name -> value assignments.
//!
//! The steps, in order:
//! 1. one maximal compatible set per "base" parameter (everything the base does
//!    not list as conflicting), deduplicated;
//! 2. the power set of each compatible set, deduplicated;
//! 3. a pairwise conflict filter in both directions, which also catches
//!    conflicts declared on one side only;
//! 4. the cartesian product of the remaining names' values.

use itertools::{Either, Itertools};
use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use tracing::debug;

/// One optional query parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSpec {
    pub conflicts: BTreeSet<String>,
    pub values: Vec<String>,
}

impl ParamSpec {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            conflicts: BTreeSet::new(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn conflicting_with<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Parameter name -> spec. Sorted keys keep generation deterministic.
pub type ParamIndex = BTreeMap<String, ParamSpec>;

/// Concrete parameter values for one call, ordered by name.
pub type Assignment = BTreeMap<String, String>;

/// Maximal compatible name sets, one per base parameter, deduplicated.
pub fn compatible_sets(index: &ParamIndex) -> Vec<Vec<String>> {
    index
        .values()
        .map(|base| {
            index
                .keys()
                .filter(|name| !base.conflicts.contains(*name))
                .cloned()
                .collect::<Vec<_>>()
        })
        .unique()
        .collect()
}

/// True when any two names in `combo` conflict, in either direction.
///
/// Every ordered pair is checked, including a name against itself.
pub fn has_conflict(index: &ParamIndex, combo: &[String]) -> bool {
    combo.iter().any(|name| {
        index.get(name).is_some_and(|spec| {
            combo
                .iter()
                .any(|other| spec.conflicts.contains(other.as_str()))
        })
    })
}

/// Every conflict-free combination of parameter names, in generation order.
///
/// With no parameters this is a single empty combination.
pub fn valid_combinations(index: &ParamIndex) -> Vec<Vec<String>> {
    let sets = compatible_sets(index);
    if sets.is_empty() {
        return vec![Vec::new()];
    }

    sets.iter()
        .flat_map(|set| set.iter().cloned().powerset())
        .unique()
        .filter(|combo| {
            let keep = !has_conflict(index, combo);
            if keep {
                debug!(combo = %combo.join(","), "Adding valid parameter combo");
            }
            keep
        })
        .collect()
}

/// Lazily expand the valid combinations into concrete assignments.
pub fn assignments(index: &ParamIndex) -> impl Iterator<Item = Assignment> + '_ {
    valid_combinations(index)
        .into_iter()
        .flat_map(move |combo| expand(index, combo))
}

fn expand(index: &ParamIndex, combo: Vec<String>) -> impl Iterator<Item = Assignment> + use<> {
    if combo.is_empty() {
        return Either::Left(iter::once(Assignment::new()));
    }

    let value_lists: Vec<Vec<String>> = combo
        .iter()
        .map(|name| {
            index
                .get(name)
                .map(|spec| spec.values.clone())
                .unwrap_or_default()
        })
        .collect();

    Either::Right(
        value_lists
            .into_iter()
            .map(Vec::into_iter)
            .multi_cartesian_product()
            .map(move |values| combo.iter().cloned().zip(values).collect::<Assignment>()),
    )
}
