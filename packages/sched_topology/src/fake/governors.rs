use foldhash::{HashMap, HashMapExt};

use crate::{GovernorId, GovernorSource, UnitId};

/// Frequency governor assignments held in memory.
///
/// # Example
///
/// ```
/// use sched_topology::fake::FakeGovernors;
/// use sched_topology::{GovernorId, GovernorSource};
///
/// let governors = FakeGovernors::uniform("schedutil").with_governor([3], "performance");
///
/// assert_eq!(governors.governor(0), Some(GovernorId::new("schedutil")));
/// assert_eq!(governors.governor(3), Some(GovernorId::new("performance")));
/// ```
#[derive(Clone, Debug, Default)]
pub struct FakeGovernors {
    default: Option<GovernorId>,
    per_unit: HashMap<UnitId, GovernorId>,
}

impl FakeGovernors {
    /// Creates a source in which no unit has a governor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: None,
            per_unit: HashMap::new(),
        }
    }

    /// Creates a source in which every unit is driven by `governor`.
    #[must_use]
    pub fn uniform(governor: impl Into<GovernorId>) -> Self {
        Self {
            default: Some(governor.into()),
            per_unit: HashMap::new(),
        }
    }

    /// Drives `units` by `governor`, overriding any earlier assignment.
    #[must_use]
    pub fn with_governor(
        mut self,
        units: impl IntoIterator<Item = UnitId>,
        governor: impl Into<GovernorId>,
    ) -> Self {
        let governor = governor.into();

        for unit in units {
            self.per_unit.insert(unit, governor.clone());
        }

        self
    }
}

impl GovernorSource for FakeGovernors {
    fn governor(&self, unit: UnitId) -> Option<GovernorId> {
        self.per_unit
            .get(&unit)
            .or(self.default.as_ref())
            .cloned()
    }
}
