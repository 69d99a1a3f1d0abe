use std::fmt::Display;

use crate::{ClusterId, CoreId, ThreadIndex, UnitId, UnitSet};

/// Where one processing unit sits in the cluster/core/thread hierarchy, together with the
/// units it shares a cluster or a core with.
///
/// A unit is always a member of its own sibling sets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopologyUnit {
    cluster_id: Option<ClusterId>,
    core_id: CoreId,
    thread_id: Option<ThreadIndex>,
    core_siblings: UnitSet,
    thread_siblings: UnitSet,
}

impl TopologyUnit {
    fn unassigned(unit: UnitId) -> Self {
        Self {
            cluster_id: None,
            core_id: 0,
            thread_id: None,
            core_siblings: UnitSet::single(unit),
            thread_siblings: UnitSet::single(unit),
        }
    }

    /// The cluster of the unit, or `None` if the unit has not been placed yet.
    #[must_use]
    pub fn cluster_id(&self) -> Option<ClusterId> {
        self.cluster_id
    }

    /// The core of the unit within its cluster.
    #[must_use]
    pub fn core_id(&self) -> CoreId {
        self.core_id
    }

    /// The hardware thread of the unit within its core, or `None` if the core has no
    /// hardware threads.
    #[must_use]
    pub fn thread_id(&self) -> Option<ThreadIndex> {
        self.thread_id
    }

    /// Units in the same cluster, including this one.
    #[must_use]
    pub fn core_siblings(&self) -> &UnitSet {
        &self.core_siblings
    }

    /// Units on the same core, including this one.
    #[must_use]
    pub fn thread_siblings(&self) -> &UnitSet {
        &self.thread_siblings
    }
}

impl Display for TopologyUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cluster_id {
            Some(cluster) => write!(f, "cluster {cluster} core {}", self.core_id)?,
            None => write!(f, "unplaced")?,
        }

        if let Some(thread) = self.thread_id {
            write!(f, " thread {thread}")?;
        }

        Ok(())
    }
}

/// The topology record of every possible unit, indexed by unit ID.
///
/// The table has a fixed size chosen at construction: a table for N units describes units
/// `0..N`. Operations that name a unit outside that range do nothing.
///
/// # Example
///
/// ```
/// use sched_topology::TopologyTable;
///
/// let mut table = TopologyTable::new(4);
///
/// for unit in 0..4 {
///     table.assign(unit, unit / 2, unit % 2, None);
/// }
/// table.recompute_all_siblings();
///
/// assert_eq!(table.core_siblings(0).len(), 2);
/// assert!(table.core_siblings(0).contains(1));
/// assert!(!table.core_siblings(0).contains(2));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopologyTable {
    units: Box<[TopologyUnit]>,
}

impl TopologyTable {
    /// Creates a table of `unit_count` unplaced units.
    #[must_use]
    pub fn new(unit_count: usize) -> Self {
        Self {
            units: Self::unit_ids(unit_count)
                .map(TopologyUnit::unassigned)
                .collect(),
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "unrealistic to have more than u32::MAX units"
    )]
    fn unit_ids(unit_count: usize) -> impl Iterator<Item = UnitId> {
        (0..unit_count).map(|index| index as UnitId)
    }

    /// Returns every unit to the unplaced state with singleton sibling sets.
    pub fn reset(&mut self) {
        for (unit, record) in Self::unit_ids(self.units.len()).zip(self.units.iter_mut()) {
            *record = TopologyUnit::unassigned(unit);
        }
    }

    /// The number of possible units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// All possible units.
    #[must_use]
    pub fn possible_units(&self) -> UnitSet {
        UnitSet::first_n(self.units.len())
    }

    /// The record of `unit`, if it is a possible unit.
    #[must_use]
    pub fn unit(&self, unit: UnitId) -> Option<&TopologyUnit> {
        self.units.get(unit as usize)
    }

    /// Iterates over `(unit, record)` pairs in unit order.
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &TopologyUnit)> {
        Self::unit_ids(self.units.len()).zip(self.units.iter())
    }

    /// Whether `unit` has been placed in a cluster.
    #[must_use]
    pub fn is_placed(&self, unit: UnitId) -> bool {
        self.unit(unit)
            .is_some_and(|record| record.cluster_id.is_some())
    }

    /// The units that have not been placed in any cluster.
    #[must_use]
    pub fn unplaced_units(&self) -> UnitSet {
        self.iter()
            .filter(|(_, record)| record.cluster_id.is_none())
            .map(|(unit, _)| unit)
            .collect()
    }

    /// Places `unit` in the hierarchy.
    ///
    /// The first placement wins: if the unit already has a cluster, nothing changes. Sibling
    /// sets are not touched; call [`recompute_siblings()`][Self::recompute_siblings] once the
    /// placements are final.
    ///
    /// Returns whether the unit was placed by this call.
    pub fn assign(
        &mut self,
        unit: UnitId,
        cluster_id: ClusterId,
        core_id: CoreId,
        thread_id: Option<ThreadIndex>,
    ) -> bool {
        let Some(record) = self.units.get_mut(unit as usize) else {
            return false;
        };

        if record.cluster_id.is_some() {
            return false;
        }

        record.cluster_id = Some(cluster_id);
        record.core_id = core_id;
        record.thread_id = thread_id;
        true
    }

    /// Rebuilds the sibling relations of `unit` by scanning every unit.
    ///
    /// Every unit in the same cluster becomes a core sibling of `unit` and vice versa. Every unit
    /// that also has the same core ID becomes a thread sibling of `unit` and vice versa. An
    /// unplaced unit has no siblings besides itself.
    pub fn recompute_siblings(&mut self, unit: UnitId) {
        let Some(target) = self.unit(unit) else {
            return;
        };

        let Some(cluster_id) = target.cluster_id else {
            return;
        };
        let core_id = target.core_id;

        let mut core_siblings = UnitSet::new();
        let mut thread_siblings = UnitSet::new();

        for (other, record) in Self::unit_ids(self.units.len()).zip(self.units.iter_mut()) {
            if record.cluster_id != Some(cluster_id) {
                continue;
            }

            record.core_siblings.insert(unit);
            core_siblings.insert(other);

            if record.core_id != core_id {
                continue;
            }

            record.thread_siblings.insert(unit);
            thread_siblings.insert(other);
        }

        if let Some(target) = self.units.get_mut(unit as usize) {
            target.core_siblings.union_with(&core_siblings);
            target.thread_siblings.union_with(&thread_siblings);
        }
    }

    /// Rebuilds the sibling relations of every unit.
    pub fn recompute_all_siblings(&mut self) {
        for unit in Self::unit_ids(self.units.len()) {
            self.recompute_siblings(unit);
        }
    }

    /// Units in the same cluster as `unit`, including `unit`. Empty for a unit that is not a
    /// possible unit.
    #[must_use]
    pub fn core_siblings(&self, unit: UnitId) -> UnitSet {
        self.unit(unit)
            .map(|record| record.core_siblings.clone())
            .unwrap_or_default()
    }

    /// Units on the same core as `unit`, including `unit`. Empty for a unit that is not a
    /// possible unit.
    #[must_use]
    pub fn thread_siblings(&self, unit: UnitId) -> UnitSet {
        self.unit(unit)
            .map(|record| record.thread_siblings.clone())
            .unwrap_or_default()
    }
}
