use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fmt::Display;

use crate::UnitId;

/// An ordered set of processing units, such as a sibling set or the span of a domain.
///
/// Sets are displayed in the Linux cpulist format (`0-3,8`).
///
/// # Example
///
/// ```
/// use sched_topology::UnitSet;
///
/// let set: UnitSet = [0, 1, 2, 3, 8].into_iter().collect();
///
/// assert_eq!(set.len(), 5);
/// assert!(set.contains(8));
/// println!("Units: {set}"); // For example "0-3,8".
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct UnitSet {
    units: BTreeSet<UnitId>,
}

impl UnitSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set containing only `unit`.
    #[must_use]
    pub fn single(unit: UnitId) -> Self {
        Self {
            units: BTreeSet::from([unit]),
        }
    }

    /// Creates a set of the units `0..count`.
    #[must_use]
    pub fn first_n(count: usize) -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "unrealistic to have more than u32::MAX units"
        )]
        let count = count as UnitId;

        (0..count).collect()
    }

    /// Adds a unit to the set. Returns whether the unit was newly added.
    pub fn insert(&mut self, unit: UnitId) -> bool {
        self.units.insert(unit)
    }

    /// Whether `unit` is a member of the set.
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    #[inline]
    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        self.units.contains(&unit)
    }

    /// Number of units in the set (the "weight" of the mask).
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the set has no units.
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The lowest unit ID in the set, if any.
    #[must_use]
    pub fn first(&self) -> Option<UnitId> {
        self.units.first().copied()
    }

    /// Iterates over the units in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().copied()
    }

    /// Whether every unit of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.units.is_subset(&other.units)
    }

    /// Whether the two sets share at least one unit.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.units.is_disjoint(&other.units)
    }

    /// Adds every unit of `other` to `self`.
    pub fn union_with(&mut self, other: &Self) {
        self.units.extend(other.units.iter().copied());
    }

    /// The units present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.units.intersection(&other.units).copied().collect()
    }
}

impl FromIterator<UnitId> for UnitSet {
    fn from_iter<T: IntoIterator<Item = UnitId>>(iter: T) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

impl Extend<UnitId> for UnitSet {
    fn extend<T: IntoIterator<Item = UnitId>>(&mut self, iter: T) {
        self.units.extend(iter);
    }
}

impl<'a> IntoIterator for &'a UnitSet {
    type IntoIter = std::iter::Copied<btree_set::Iter<'a, UnitId>>;
    type Item = UnitId;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter().copied()
    }
}

impl Display for UnitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&cpulist::emit(self.iter()))
    }
}
