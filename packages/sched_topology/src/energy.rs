//! Interfaces to the energy-model provider and the frequency-governor subsystem.
//!
//! Neither subsystem is implemented here. The topology code only consumes what they report,
//! through the [`EnergyModel`] and [`GovernorSource`] traits.

use std::fmt::Debug;
use std::sync::Arc;

use derive_more::derive::Display;

use crate::{Capacity, UnitId, UnitSet};

/// One performance state of an energy model: the capacity delivered in that state and the
/// power it costs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CapacityState {
    /// Capacity delivered in this state, normalized to [`FULL_CAPACITY`][crate::FULL_CAPACITY].
    pub capacity: Capacity,

    /// Power consumed in this state, in provider-defined units.
    pub power: u64,
}

impl CapacityState {
    /// Creates a performance state.
    #[must_use]
    pub const fn new(capacity: Capacity, power: u64) -> Self {
        Self { capacity, power }
    }
}

/// Energy costs of one scheduling group at one level of the hierarchy.
///
/// Performance states are ordered by increasing capacity, so the last one is the maximum.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupEnergy {
    /// Performance states, lowest capacity first.
    pub capacity_states: Vec<CapacityState>,
}

impl GroupEnergy {
    /// Creates a group energy table with the given performance states.
    #[must_use]
    pub fn new(capacity_states: Vec<CapacityState>) -> Self {
        Self { capacity_states }
    }

    /// The capacity of the highest performance state, if there is any state.
    #[must_use]
    pub fn max_capacity(&self) -> Option<Capacity> {
        self.capacity_states.last().map(|state| state.capacity)
    }
}

/// The energy model of a set of units that scale frequency together.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnergyPerfDomain {
    span: UnitSet,
    capacity_states: Vec<CapacityState>,
}

impl EnergyPerfDomain {
    /// Creates the energy model for the units in `span`.
    #[must_use]
    pub fn new(span: UnitSet, capacity_states: Vec<CapacityState>) -> Self {
        Self {
            span,
            capacity_states,
        }
    }

    /// The units that scale together.
    #[must_use]
    pub fn span(&self) -> &UnitSet {
        &self.span
    }

    /// Performance states, lowest capacity first.
    #[must_use]
    pub fn capacity_states(&self) -> &[CapacityState] {
        &self.capacity_states
    }

    /// Number of performance states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.capacity_states.len()
    }
}

/// Hierarchy level at which a [`GroupEnergy`] table applies.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum EnergyLevel {
    /// A single core.
    #[display("core")]
    Core,

    /// A whole cluster.
    #[display("cluster")]
    Cluster,
}

/// Identity of a frequency governor, such as `schedutil`.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
#[display("{_0}")]
pub struct GovernorId(Arc<str>);

impl GovernorId {
    /// Creates a governor identity from its name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// The governor name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GovernorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Supplies energy-cost data per unit.
///
/// A provider may have no data for some or all units. Missing data is never an error at this
/// layer; it disables the features that depend on it.
#[cfg_attr(test, mockall::automock)]
pub trait EnergyModel: Debug + Send + Sync {
    /// The energy costs of the group that `unit` belongs to at `level`, if modeled.
    fn group_energy(&self, unit: UnitId, level: EnergyLevel) -> Option<Arc<GroupEnergy>>;

    /// The frequency domain energy model covering `unit`, if modeled.
    fn perf_domain(&self, unit: UnitId) -> Option<Arc<EnergyPerfDomain>>;
}

/// Reports which frequency governor drives each unit.
#[cfg_attr(test, mockall::automock)]
pub trait GovernorSource: Debug + Send + Sync {
    /// The active governor of the frequency policy covering `unit`, or `None` if the unit has
    /// no frequency policy.
    fn governor(&self, unit: UnitId) -> Option<GovernorId>;
}
