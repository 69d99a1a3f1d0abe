use std::num::NonZero;

use foldhash::{HashMap, HashMapExt};

use crate::{AffinityRegister, AffinityRegisters, UnitId};

/// Affinity register values held in memory.
///
/// A unit without a configured value reads as a uniprocessor system.
///
/// # Example
///
/// ```
/// use new_zealand::nz;
/// use sched_topology::fake::FakeAffinityRegisters;
/// use sched_topology::AffinityRegisters;
///
/// // 2 clusters of 2 cores, 2 hardware threads per core.
/// let registers = FakeAffinityRegisters::from_layout(nz!(2), nz!(2), nz!(2));
///
/// assert_eq!(registers.read(5).placement(), Some((1, 0, Some(1))));
/// ```
#[derive(Clone, Debug, Default)]
pub struct FakeAffinityRegisters {
    registers: HashMap<UnitId, AffinityRegister>,
}

impl FakeAffinityRegisters {
    /// Creates a source in which every unit reads as a uniprocessor system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: HashMap::new(),
        }
    }

    /// Creates registers for a regular machine with units numbered cluster by cluster, core by
    /// core.
    ///
    /// With more than one thread per core the registers use the multi-threading layout.
    ///
    /// # Panics
    ///
    /// Panics if any count exceeds 256, the range of one affinity level.
    #[must_use]
    pub fn from_layout(
        clusters: NonZero<u32>,
        cores_per_cluster: NonZero<u32>,
        threads_per_core: NonZero<u32>,
    ) -> Self {
        let multithreading = threads_per_core.get() > 1;
        let mut registers = Self::new();
        let mut unit: UnitId = 0;

        for cluster in 0..clusters.get() {
            for core in 0..cores_per_cluster.get() {
                for thread in 0..threads_per_core.get() {
                    let register = if multithreading {
                        AffinityRegister::from_levels(
                            level(cluster),
                            level(core),
                            level(thread),
                            true,
                        )
                    } else {
                        AffinityRegister::from_levels(0, level(cluster), level(core), false)
                    };

                    registers = registers.with_register(unit, register);
                    unit = unit
                        .checked_add(1)
                        .expect("unit count cannot exceed u32::MAX with 256 per level");
                }
            }
        }

        registers
    }

    /// Sets the register value of `unit`.
    #[must_use]
    pub fn with_register(mut self, unit: UnitId, register: AffinityRegister) -> Self {
        self.registers.insert(unit, register);
        self
    }
}

fn level(value: u32) -> u8 {
    u8::try_from(value).expect("affinity level values must fit in 8 bits")
}

impl AffinityRegisters for FakeAffinityRegisters {
    fn read(&self, unit: UnitId) -> AffinityRegister {
        self.registers
            .get(&unit)
            .copied()
            .unwrap_or(AffinityRegister::from_raw(AffinityRegister::UNIPROCESSOR))
    }
}
