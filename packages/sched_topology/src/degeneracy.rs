use std::num::NonZero;

use new_zealand::nz;

use crate::{DomainFlags, SchedDomain, TopologyConfig};

/// Decides whether a scheduling domain adds nothing to the hierarchy and can be collapsed.
///
/// # Example
///
/// ```
/// use sched_topology::{DegeneracyChecker, DomainFlags, SchedDomain, UnitSet};
///
/// let checker = DegeneracyChecker::new();
///
/// let lonely = SchedDomain::new("MC", UnitSet::single(3), DomainFlags::LOAD_BALANCE, vec![]);
/// assert!(checker.is_degenerate(&lonely));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DegeneracyChecker {
    memory_region_count: NonZero<usize>,
}

impl DegeneracyChecker {
    /// Creates a checker for a system with a single memory region.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory_region_count: nz!(1),
        }
    }

    /// Creates a checker for a system with `memory_region_count` memory regions.
    #[must_use]
    pub fn with_memory_regions(memory_region_count: NonZero<usize>) -> Self {
        Self {
            memory_region_count,
        }
    }

    /// Creates a checker matching the configuration.
    #[must_use]
    pub fn from_config(config: &TopologyConfig) -> Self {
        Self::with_memory_regions(config.memory_regions())
    }

    /// Whether `domain` is degenerate on its own.
    ///
    /// A domain spanning a single unit is always degenerate. Otherwise it is kept if it has more
    /// than one group and a flag that needs groups, or if it does wake-affine balancing.
    #[must_use]
    pub fn is_degenerate(&self, domain: &SchedDomain) -> bool {
        if domain.span().len() == 1 {
            return true;
        }

        if domain.flags().intersects(DomainFlags::REQUIRES_GROUPS) && domain.groups().len() > 1 {
            return false;
        }

        if domain.flags().contains(DomainFlags::WAKE_AFFINE) {
            return false;
        }

        true
    }

    /// Whether `parent` is degenerate with respect to its child `domain`.
    ///
    /// A parent spanning different units than its child is kept. A parent with the same span is
    /// degenerate unless it carries a flag the child lacks. Flags that need groups do not count
    /// when the parent has a single group, and neither does serialization on a system with one
    /// memory region.
    #[must_use]
    pub fn is_degenerate_relative_to_parent(
        &self,
        domain: &SchedDomain,
        parent: &SchedDomain,
    ) -> bool {
        if self.is_degenerate(parent) {
            return true;
        }

        if domain.span() != parent.span() {
            return false;
        }

        let mut parent_flags = parent.flags();

        if parent.groups().len() <= 1 {
            parent_flags.remove(DomainFlags::SINGLE_GROUP_IRRELEVANT);

            if self.memory_region_count.get() == 1 {
                parent_flags.remove(DomainFlags::SERIALIZE);
            }
        }

        domain.flags().contains(parent_flags)
    }
}

impl Default for DegeneracyChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::UnitSet;

    fn set(units: &[u32]) -> UnitSet {
        units.iter().copied().collect()
    }

    fn singletons(units: &[u32]) -> Vec<UnitSet> {
        units.iter().copied().map(UnitSet::single).collect()
    }

    #[test]
    fn single_unit_domain_is_degenerate() {
        let checker = DegeneracyChecker::new();

        for flags in [
            DomainFlags::empty(),
            DomainFlags::LOAD_BALANCE,
            DomainFlags::WAKE_AFFINE,
            DomainFlags::all(),
        ] {
            let domain = SchedDomain::new("MC", UnitSet::single(0), flags, singletons(&[0]));
            assert!(checker.is_degenerate(&domain));
        }
    }

    #[test]
    fn balanced_domain_with_groups_is_kept() {
        let domain = SchedDomain::new(
            "MC",
            set(&[0, 1]),
            DomainFlags::LOAD_BALANCE,
            singletons(&[0, 1]),
        );

        assert!(!DegeneracyChecker::new().is_degenerate(&domain));
    }

    #[test]
    fn single_group_needs_wake_affine() {
        let checker = DegeneracyChecker::new();

        let plain = SchedDomain::new(
            "DIE",
            set(&[0, 1]),
            DomainFlags::LOAD_BALANCE,
            vec![set(&[0, 1])],
        );
        assert!(checker.is_degenerate(&plain));

        let wake_affine = plain.clone().with_flags(DomainFlags::WAKE_AFFINE);
        assert!(!checker.is_degenerate(&wake_affine));
    }

    #[test]
    fn flags_without_groups_requirement_do_not_keep_domain() {
        let domain = SchedDomain::new(
            "DIE",
            set(&[0, 1]),
            DomainFlags::SERIALIZE | DomainFlags::PREFER_SIBLING,
            singletons(&[0, 1]),
        );

        assert!(DegeneracyChecker::new().is_degenerate(&domain));
    }

    #[test]
    fn equal_spans_without_extra_parent_flags_are_degenerate() {
        let flags = DomainFlags::LOAD_BALANCE | DomainFlags::SHARE_PKG_RESOURCES;
        let child = SchedDomain::new("MC", set(&[0, 1]), flags, singletons(&[0, 1]));
        let parent = SchedDomain::new("DIE", set(&[0, 1]), flags, singletons(&[0, 1]));

        assert!(DegeneracyChecker::new().is_degenerate_relative_to_parent(&child, &parent));
    }

    #[test]
    fn different_spans_are_not_degenerate() {
        let flags = DomainFlags::LOAD_BALANCE;
        let child = SchedDomain::new("MC", set(&[0, 1]), flags, singletons(&[0, 1]));
        let parent = SchedDomain::new(
            "DIE",
            set(&[0, 1, 2, 3]),
            flags,
            vec![set(&[0, 1]), set(&[2, 3])],
        );

        assert!(!DegeneracyChecker::new().is_degenerate_relative_to_parent(&child, &parent));
    }

    #[test]
    fn degenerate_parent_is_degenerate() {
        let child = SchedDomain::new(
            "MC",
            set(&[0, 1]),
            DomainFlags::LOAD_BALANCE,
            singletons(&[0, 1]),
        );
        let parent = SchedDomain::new(
            "DIE",
            set(&[0, 1, 2]),
            DomainFlags::empty(),
            vec![set(&[0, 1, 2])],
        );

        assert!(DegeneracyChecker::new().is_degenerate_relative_to_parent(&child, &parent));
    }

    #[test]
    fn extra_parent_flag_keeps_parent() {
        let child = SchedDomain::new(
            "MC",
            set(&[0, 1]),
            DomainFlags::LOAD_BALANCE,
            singletons(&[0, 1]),
        );
        let parent = SchedDomain::new(
            "DIE",
            set(&[0, 1]),
            DomainFlags::LOAD_BALANCE | DomainFlags::ASYM_CPUCAPACITY,
            singletons(&[0, 1]),
        );

        assert!(!DegeneracyChecker::new().is_degenerate_relative_to_parent(&child, &parent));
    }

    #[test]
    fn single_group_parent_ignores_group_flags() {
        let child = SchedDomain::new(
            "MC",
            set(&[0, 1]),
            DomainFlags::WAKE_AFFINE,
            singletons(&[0, 1]),
        );
        let parent = SchedDomain::new(
            "DIE",
            set(&[0, 1]),
            DomainFlags::WAKE_AFFINE
                | DomainFlags::LOAD_BALANCE
                | DomainFlags::PREFER_SIBLING
                | DomainFlags::SERIALIZE,
            vec![set(&[0, 1])],
        );

        assert!(DegeneracyChecker::new().is_degenerate_relative_to_parent(&child, &parent));

        // With several memory regions, serialization is a real difference.
        let checker = DegeneracyChecker::with_memory_regions(nz!(2));
        assert!(!checker.is_degenerate_relative_to_parent(&child, &parent));
    }

    #[test]
    fn from_config_uses_memory_regions() {
        let config = TopologyConfig::new().memory_region_count(nz!(4));

        assert_eq!(
            DegeneracyChecker::from_config(&config),
            DegeneracyChecker::with_memory_regions(nz!(4))
        );
        assert_eq!(DegeneracyChecker::default(), DegeneracyChecker::new());
    }
}
