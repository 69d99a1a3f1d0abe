use std::num::NonZero;

use new_zealand::nz;

use crate::GovernorId;

/// Name of the governor that energy-aware scheduling requires by default.
pub const DEFAULT_ENERGY_AWARE_GOVERNOR: &str = "schedutil";

/// Configures a [`SystemTopology`][crate::SystemTopology].
///
/// # Example
///
/// ```
/// use sched_topology::TopologyConfig;
/// use new_zealand::nz;
///
/// let config = TopologyConfig::new()
///     .sched_debug(true)
///     .memory_region_count(nz!(2));
///
/// assert!(config.is_sched_debug());
/// assert!(config.has_multi_core_level());
/// ```
#[derive(Clone, Debug)]
pub struct TopologyConfig {
    sched_debug: bool,
    multi_core_level: bool,
    energy_aware_governor: GovernorId,
    memory_region_count: NonZero<usize>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyConfig {
    /// Creates the default configuration: no debug output, multi-core level enabled,
    /// `schedutil` as the energy-aware governor and a single memory region.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sched_debug: false,
            multi_core_level: true,
            energy_aware_governor: GovernorId::new(DEFAULT_ENERGY_AWARE_GOVERNOR),
            memory_region_count: nz!(1),
        }
    }

    /// Enables the verbose dumps of domain hierarchies and performance domains.
    #[must_use]
    pub fn sched_debug(mut self, enabled: bool) -> Self {
        self.sched_debug = enabled;
        self
    }

    /// Whether the level table includes the multi-core (cluster) level below the die level.
    #[must_use]
    pub fn multi_core_level(mut self, enabled: bool) -> Self {
        self.multi_core_level = enabled;
        self
    }

    /// Sets the governor that must drive every unit of a root domain before energy-aware
    /// scheduling is enabled on it.
    #[must_use]
    pub fn energy_aware_governor(mut self, governor: impl Into<GovernorId>) -> Self {
        self.energy_aware_governor = governor.into();
        self
    }

    /// Sets the number of memory-affinity regions in the system.
    #[must_use]
    pub fn memory_region_count(mut self, count: NonZero<usize>) -> Self {
        self.memory_region_count = count;
        self
    }

    /// Whether the verbose dumps are enabled.
    #[must_use]
    pub fn is_sched_debug(&self) -> bool {
        self.sched_debug
    }

    /// Whether the multi-core level is part of the level table.
    #[must_use]
    pub fn has_multi_core_level(&self) -> bool {
        self.multi_core_level
    }

    /// The governor required by energy-aware scheduling.
    #[must_use]
    pub fn required_governor(&self) -> &GovernorId {
        &self.energy_aware_governor
    }

    /// The number of memory-affinity regions in the system.
    #[must_use]
    pub fn memory_regions(&self) -> NonZero<usize> {
        self.memory_region_count
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TopologyConfig::default();

        assert!(!config.is_sched_debug());
        assert!(config.has_multi_core_level());
        assert_eq!(config.required_governor().as_str(), "schedutil");
        assert_eq!(config.memory_regions().get(), 1);
    }

    #[test]
    fn builder_overrides() {
        let config = TopologyConfig::new()
            .sched_debug(true)
            .multi_core_level(false)
            .energy_aware_governor("performance")
            .memory_region_count(nz!(4));

        assert!(config.is_sched_debug());
        assert!(!config.has_multi_core_level());
        assert_eq!(config.required_governor().as_str(), "performance");
        assert_eq!(config.memory_regions().get(), 4);
    }
}
