use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::{Capacity, EnergyLevel, EnergyModel, FULL_CAPACITY, UnitId};

/// Per-unit compute capacity and efficiency.
///
/// Both values are normalized to [`FULL_CAPACITY`] and start there. Reads are lock-free and may
/// happen concurrently with updates; each value is read and written as a whole.
#[derive(Debug)]
pub struct CapacityModel {
    capacity: Box<[AtomicU64]>,
    efficiency: Box<[AtomicU64]>,
}

impl CapacityModel {
    /// Creates a model for `unit_count` units, all at full capacity and full efficiency.
    #[must_use]
    pub fn new(unit_count: usize) -> Self {
        Self {
            capacity: Self::full(unit_count),
            efficiency: Self::full(unit_count),
        }
    }

    fn full(unit_count: usize) -> Box<[AtomicU64]> {
        (0..unit_count)
            .map(|_| AtomicU64::new(FULL_CAPACITY))
            .collect()
    }

    /// The number of units the model covers.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.capacity.len()
    }

    /// Sets the capacity of `unit`. Does nothing for a unit outside the model.
    pub fn set_capacity(&self, unit: UnitId, value: Capacity) {
        if let Some(slot) = self.capacity.get(unit as usize) {
            slot.store(value, Ordering::Relaxed);
        }
    }

    /// The capacity of `unit`, or [`FULL_CAPACITY`] for a unit outside the model.
    #[must_use]
    pub fn capacity(&self, unit: UnitId) -> Capacity {
        self.capacity
            .get(unit as usize)
            .map_or(FULL_CAPACITY, |slot| slot.load(Ordering::Relaxed))
    }

    /// Sets the relative efficiency of `unit`. Does nothing for a unit outside the model.
    pub fn set_efficiency(&self, unit: UnitId, value: Capacity) {
        if let Some(slot) = self.efficiency.get(unit as usize) {
            slot.store(value, Ordering::Relaxed);
        }
    }

    /// The relative efficiency of `unit`, or [`FULL_CAPACITY`] for a unit outside the model.
    #[must_use]
    pub fn efficiency(&self, unit: UnitId) -> Capacity {
        self.efficiency
            .get(unit as usize)
            .map_or(FULL_CAPACITY, |slot| slot.load(Ordering::Relaxed))
    }

    /// Recomputes the capacity of `unit` from the energy model.
    ///
    /// The capacity becomes that of the highest performance state in the core-level energy
    /// table of the unit. Without such a table, or with an empty one, it is [`FULL_CAPACITY`].
    /// Call again whenever the energy model changes.
    pub fn update_capacity(&self, unit: UnitId, energy: &dyn EnergyModel) -> Capacity {
        let capacity = energy
            .group_energy(unit, EnergyLevel::Core)
            .and_then(|table| table.max_capacity())
            .unwrap_or_else(|| {
                debug!(unit, "no core energy table; assuming full capacity");
                FULL_CAPACITY
            });

        self.set_capacity(unit, capacity);
        info!("unit {unit}: update capacity {capacity}");
        capacity
    }

    /// Returns every unit to full capacity and full efficiency.
    pub fn reset(&self) {
        for slot in self.capacity.iter().chain(self.efficiency.iter()) {
            slot.store(FULL_CAPACITY, Ordering::Relaxed);
        }
    }
}
