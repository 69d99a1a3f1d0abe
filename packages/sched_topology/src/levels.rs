use std::sync::Arc;
use std::{iter, slice};

use tracing::warn;

use crate::{
    DomainFlags, EnergyLevel, EnergyModel, GroupEnergy, SchedDomain, TopologyConfig,
    TopologyTable, UnitId, UnitSet,
};

/// Computes the units that share a level with a unit.
pub type MaskFn = fn(&TopologyTable, UnitId) -> UnitSet;

/// Computes the flags of a level.
pub type FlagsFn = fn() -> DomainFlags;

/// Looks up the energy costs of a unit's group at a level.
pub type EnergyFn = fn(&dyn EnergyModel, UnitId) -> Option<Arc<GroupEnergy>>;

/// One level of the scheduling-domain hierarchy.
#[derive(Clone, Copy, Debug)]
pub struct TopologyLevel {
    name: &'static str,
    mask: MaskFn,
    flags: FlagsFn,
    energy: Option<EnergyFn>,
}

impl TopologyLevel {
    /// Creates a level without energy data.
    #[must_use]
    pub const fn new(name: &'static str, mask: MaskFn, flags: FlagsFn) -> Self {
        Self {
            name,
            mask,
            flags,
            energy: None,
        }
    }

    /// Attaches an energy accessor to the level.
    #[must_use]
    pub const fn with_energy(mut self, energy: EnergyFn) -> Self {
        self.energy = Some(energy);
        self
    }

    /// The name of the level, such as `MC` or `DIE`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The units that share this level with `unit`.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    pub fn mask(&self, table: &TopologyTable, unit: UnitId) -> UnitSet {
        (self.mask)(table, unit)
    }

    /// The flags of the level.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    pub fn flags(&self) -> DomainFlags {
        (self.flags)()
    }

    /// Whether the level has an energy accessor.
    #[must_use]
    pub const fn has_energy(&self) -> bool {
        self.energy.is_some()
    }

    /// The energy costs of `unit`'s group at this level, if the level has an energy accessor and
    /// the model has data for the unit.
    #[must_use]
    pub fn energy(&self, model: &dyn EnergyModel, unit: UnitId) -> Option<Arc<GroupEnergy>> {
        self.energy.and_then(|energy| energy(model, unit))
    }
}

/// Units sharing a core with `unit`.
#[must_use]
pub fn thread_siblings_mask(table: &TopologyTable, unit: UnitId) -> UnitSet {
    table.thread_siblings(unit)
}

/// Units sharing a cluster with `unit`.
#[must_use]
pub fn core_siblings_mask(table: &TopologyTable, unit: UnitId) -> UnitSet {
    table.core_siblings(unit)
}

/// Every possible unit.
#[must_use]
pub fn all_units_mask(table: &TopologyTable, _unit: UnitId) -> UnitSet {
    table.possible_units()
}

/// Flags of the energy-aware MC level: shared package resources, power domain and performance
/// states.
#[must_use]
pub fn core_power_flags() -> DomainFlags {
    DomainFlags::SHARE_PKG_RESOURCES
        | DomainFlags::SHARE_POWERDOMAIN
        | DomainFlags::SHARE_CAP_STATES
}

/// Flags of the energy-aware DIE level.
#[must_use]
pub fn asymmetric_capacity_flags() -> DomainFlags {
    DomainFlags::ASYM_CPUCAPACITY
}

fn smt_flags() -> DomainFlags {
    DomainFlags::SHARE_CPUCAPACITY | DomainFlags::SHARE_PKG_RESOURCES
}

fn core_flags() -> DomainFlags {
    DomainFlags::SHARE_PKG_RESOURCES
}

fn no_flags() -> DomainFlags {
    DomainFlags::empty()
}

/// Core-level energy costs of `unit`. Missing data is logged.
pub fn core_energy(model: &dyn EnergyModel, unit: UnitId) -> Option<Arc<GroupEnergy>> {
    let energy = model.group_energy(unit, EnergyLevel::Core);

    if energy.is_none() {
        warn!(unit, "core energy data missing; MC level has no energy costs");
    }

    energy
}

/// Cluster-level energy costs of `unit`. Missing data is logged.
pub fn cluster_energy(model: &dyn EnergyModel, unit: UnitId) -> Option<Arc<GroupEnergy>> {
    let energy = model.group_energy(unit, EnergyLevel::Cluster);

    if energy.is_none() {
        warn!(unit, "cluster energy data missing; DIE level has no energy costs");
    }

    energy
}

/// The ordered table of hierarchy levels, narrowest first.
///
/// # Example
///
/// ```
/// use sched_topology::{DomainFlags, SchedDomainTopology, TopologyConfig};
///
/// let levels = SchedDomainTopology::energy_aware(&TopologyConfig::new());
///
/// let names: Vec<_> = levels.iter().map(|level| level.name()).collect();
/// assert_eq!(names, ["MC", "DIE"]);
/// assert!(levels.iter().last().unwrap().flags().contains(DomainFlags::ASYM_CPUCAPACITY));
/// ```
#[derive(Clone, Debug)]
pub struct SchedDomainTopology {
    levels: Vec<TopologyLevel>,
}

impl SchedDomainTopology {
    /// Creates a table from explicit levels, narrowest first.
    #[must_use]
    pub fn new(levels: Vec<TopologyLevel>) -> Self {
        Self { levels }
    }

    /// The energy-aware table: `MC` (cluster siblings, with core energy costs) unless disabled by
    /// the configuration, then `DIE` (every unit, asymmetric capacity, with cluster energy
    /// costs).
    #[must_use]
    pub fn energy_aware(config: &TopologyConfig) -> Self {
        let mut levels = Vec::with_capacity(2);

        if config.has_multi_core_level() {
            levels.push(
                TopologyLevel::new("MC", core_siblings_mask, core_power_flags)
                    .with_energy(core_energy),
            );
        }

        levels.push(
            TopologyLevel::new("DIE", all_units_mask, asymmetric_capacity_flags)
                .with_energy(cluster_energy),
        );

        Self { levels }
    }

    /// The generic table installed when the topology could not be discovered: `SMT`, `MC` and
    /// `DIE` without energy costs.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            levels: vec![
                TopologyLevel::new("SMT", thread_siblings_mask, smt_flags),
                TopologyLevel::new("MC", core_siblings_mask, core_flags),
                TopologyLevel::new("DIE", all_units_mask, no_flags),
            ],
        }
    }

    /// The levels, narrowest first.
    #[must_use]
    pub fn levels(&self) -> &[TopologyLevel] {
        &self.levels
    }

    /// Iterates over the levels, narrowest first.
    pub fn iter(&self) -> impl Iterator<Item = &TopologyLevel> {
        self.levels.iter()
    }

    /// The number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the table has no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The level with the given name, if present.
    #[must_use]
    pub fn level(&self, name: &str) -> Option<&TopologyLevel> {
        self.levels.iter().find(|level| level.name == name)
    }

    /// Whether any level carries energy costs.
    #[must_use]
    pub fn is_energy_aware(&self) -> bool {
        self.levels.iter().any(TopologyLevel::has_energy)
    }

    /// Builds the domains `unit` belongs to, narrowest first.
    ///
    /// Each domain spans the level's mask of `unit` (widened to include the domain below). Its
    /// groups partition the span by the mask of the level below, or into single units at the
    /// narrowest level. The first group is always the one containing `unit`.
    #[must_use]
    pub fn build_hierarchy(&self, table: &TopologyTable, unit: UnitId) -> Vec<SchedDomain> {
        let mut domains: Vec<SchedDomain> = Vec::with_capacity(self.levels.len());
        let mut child: Option<&TopologyLevel> = None;

        for level in &self.levels {
            let mut span = level.mask(table, unit);
            if let Some(below) = domains.last() {
                span.union_with(below.span());
            }

            let group_of = |member: UnitId| match child {
                Some(below) => below.mask(table, member).intersection(&span),
                None => UnitSet::single(member),
            };

            let mut groups = Vec::new();
            let mut covered = UnitSet::new();

            for member in iter::once(unit).chain(span.iter()) {
                if covered.contains(member) || !span.contains(member) {
                    continue;
                }

                let group = group_of(member);
                covered.union_with(&group);
                groups.push(group);
            }

            domains.push(SchedDomain::new(
                level.name(),
                span,
                DomainFlags::BALANCE_DEFAULTS | level.flags(),
                groups,
            ));
            child = Some(level);
        }

        domains
    }
}

impl<'a> IntoIterator for &'a SchedDomainTopology {
    type Item = &'a TopologyLevel;
    type IntoIter = slice::Iter<'a, TopologyLevel>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter()
    }
}
