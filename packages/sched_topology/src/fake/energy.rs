use std::sync::Arc;

use foldhash::{HashMap, HashMapExt};

use crate::{CapacityState, EnergyLevel, EnergyModel, EnergyPerfDomain, GroupEnergy, UnitId};

/// An energy model held in memory.
///
/// Units without data report none, as a real provider without a model for them would.
///
/// # Example
///
/// ```
/// use sched_topology::fake::FakeEnergyModel;
/// use sched_topology::{CapacityState, EnergyLevel, EnergyModel, GroupEnergy};
///
/// let energy = FakeEnergyModel::new()
///     .with_perf_domain(0..2, vec![CapacityState::new(1024, 500)])
///     .with_group_energy(
///         0,
///         EnergyLevel::Core,
///         GroupEnergy::new(vec![CapacityState::new(1024, 500)]),
///     );
///
/// assert_eq!(energy.perf_domain(1).unwrap().state_count(), 1);
/// assert!(energy.perf_domain(2).is_none());
/// assert!(energy.group_energy(0, EnergyLevel::Core).is_some());
/// assert!(energy.group_energy(0, EnergyLevel::Cluster).is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct FakeEnergyModel {
    perf_domains: HashMap<UnitId, Arc<EnergyPerfDomain>>,
    group_energy: HashMap<(UnitId, EnergyLevel), Arc<GroupEnergy>>,
}

impl FakeEnergyModel {
    /// Creates a model with no data for any unit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            perf_domains: HashMap::new(),
            group_energy: HashMap::new(),
        }
    }

    /// Adds a frequency domain covering `units` with the given performance states. Replaces the
    /// domain of any unit already covered.
    #[must_use]
    pub fn with_perf_domain(
        mut self,
        units: impl IntoIterator<Item = UnitId>,
        capacity_states: Vec<CapacityState>,
    ) -> Self {
        let span = units.into_iter().collect();
        let domain = Arc::new(EnergyPerfDomain::new(span, capacity_states));

        for unit in domain.span() {
            self.perf_domains.insert(unit, Arc::clone(&domain));
        }

        self
    }

    /// Sets the energy costs of `unit`'s group at `level`.
    #[must_use]
    pub fn with_group_energy(
        mut self,
        unit: UnitId,
        level: EnergyLevel,
        energy: GroupEnergy,
    ) -> Self {
        self.group_energy.insert((unit, level), Arc::new(energy));
        self
    }
}

impl EnergyModel for FakeEnergyModel {
    fn group_energy(&self, unit: UnitId, level: EnergyLevel) -> Option<Arc<GroupEnergy>> {
        self.group_energy.get(&(unit, level)).map(Arc::clone)
    }

    fn perf_domain(&self, unit: UnitId) -> Option<Arc<EnergyPerfDomain>> {
        self.perf_domains.get(&unit).map(Arc::clone)
    }
}
