//! Diagnostic dumps of the domain hierarchy and of performance-domain lists.
//!
//! Only [`SystemTopology`][crate::SystemTopology] with `sched_debug` enabled logs these, but the
//! checks themselves are plain functions usable anywhere.

use std::fmt::Write as _;

use derive_more::derive::Display;
use tracing::{debug, error};

use crate::{DomainFlags, PerfDomainList, SchedDomain, UnitId, UnitSet};

/// A structural problem found in a unit's domain hierarchy.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DomainIssue {
    /// A domain that does not balance load has a parent.
    #[display("domain-{level}: domain without load balancing has a parent")]
    NoLoadBalanceWithParent {
        /// Depth of the domain, 0 being the narrowest.
        level: usize,
    },

    /// The span of a domain does not contain the unit the hierarchy was built for.
    #[display("domain-{level}: span does not contain unit {unit}")]
    SpanMissingUnit {
        /// Depth of the domain.
        level: usize,

        /// The unit.
        unit: UnitId,
    },

    /// The first group of a domain does not contain the unit the hierarchy was built for.
    #[display("domain-{level}: first group does not contain unit {unit}")]
    FirstGroupMissingUnit {
        /// Depth of the domain.
        level: usize,

        /// The unit.
        unit: UnitId,
    },

    /// A domain has no groups at all.
    #[display("domain-{level}: no groups")]
    NoGroups {
        /// Depth of the domain.
        level: usize,
    },

    /// A group has no units.
    #[display("domain-{level}: empty group")]
    EmptyGroup {
        /// Depth of the domain.
        level: usize,
    },

    /// Groups of a domain without the overlap flag share units.
    #[display("domain-{level}: repeated units {units}")]
    RepeatedUnits {
        /// Depth of the domain.
        level: usize,

        /// The units found in more than one group.
        units: UnitSet,
    },

    /// The groups of a domain do not add up to its span.
    #[display("domain-{level}: groups do not span the domain")]
    GroupsDoNotSpanDomain {
        /// Depth of the domain.
        level: usize,
    },

    /// The first group of a domain differs from the span of its child.
    #[display("domain-{level}: first group does not match the child domain")]
    FirstGroupNotChild {
        /// Depth of the domain.
        level: usize,
    },

    /// The parent of a domain does not contain all of its units.
    #[display("domain-{level}: parent span is not a superset of the domain")]
    ParentNotSuperset {
        /// Depth of the domain.
        level: usize,
    },
}

/// Logs the domain hierarchy of `unit` (narrowest first) and returns every structural problem
/// found in it. Problems are also logged as errors.
///
/// Checking stops at the first domain that does not balance load.
pub fn check_domain_hierarchy(unit: UnitId, domains: &[SchedDomain]) -> Vec<DomainIssue> {
    let mut issues = Vec::new();

    if domains.is_empty() {
        debug!(unit, "unit has no scheduling domains");
        return issues;
    }

    debug!(unit, "unit attaching scheduling domains");

    for (level, domain) in domains.iter().enumerate() {
        let child = level.checked_sub(1).and_then(|below| domains.get(below));
        let parent = domains.get(level.saturating_add(1));

        if !domain.flags().contains(DomainFlags::LOAD_BALANCE) {
            debug!(unit, "domain-{level}: does not load-balance");

            if parent.is_some() {
                issues.push(DomainIssue::NoLoadBalanceWithParent { level });
            }
            break;
        }

        check_domain(unit, level, domain, child, parent, &mut issues);
    }

    for issue in &issues {
        error!(unit, "{issue}");
    }

    issues
}

fn check_domain(
    unit: UnitId,
    level: usize,
    domain: &SchedDomain,
    child: Option<&SchedDomain>,
    parent: Option<&SchedDomain>,
    issues: &mut Vec<DomainIssue>,
) {
    debug!(
        unit,
        "domain-{level}: span={} level={}",
        domain.span(),
        domain.name()
    );

    if !domain.span().contains(unit) {
        issues.push(DomainIssue::SpanMissingUnit { level, unit });
    }

    let Some(first) = domain.groups().first() else {
        issues.push(DomainIssue::NoGroups { level });
        return;
    };

    if !first.contains(unit) {
        issues.push(DomainIssue::FirstGroupMissingUnit { level, unit });
    }

    if child.is_some_and(|child| child.span() != first) {
        issues.push(DomainIssue::FirstGroupNotChild { level });
    }

    let mut seen = UnitSet::new();
    let mut rendered = String::new();

    for group in domain.groups() {
        if group.is_empty() {
            issues.push(DomainIssue::EmptyGroup { level });
            break;
        }

        if !domain.flags().contains(DomainFlags::OVERLAP) && seen.intersects(group) {
            issues.push(DomainIssue::RepeatedUnits {
                level,
                units: seen.intersection(group),
            });
            break;
        }

        seen.union_with(group);
        write!(rendered, " {{ span={group} }}")
            .expect("we expect writing to a String to be infallible");
    }

    debug!(unit, "domain-{level}: groups:{rendered}");

    if &seen != domain.span() {
        issues.push(DomainIssue::GroupsDoNotSpanDomain { level });
    }

    if parent.is_some_and(|parent| !seen.is_subset(parent.span())) {
        issues.push(DomainIssue::ParentNotSuperset { level });
    }
}

/// Renders a performance-domain list as `root 0-7: pd0:{ cpus=0-3 nr_cstate=5 } ...`, naming
/// each domain after its first unit.
#[must_use]
pub fn describe_perf_domains(root_span: &UnitSet, list: &PerfDomainList) -> String {
    let mut text = format!("root {root_span}:");

    for domain in list.iter() {
        let first = domain
            .span()
            .first()
            .map_or_else(String::new, |unit| unit.to_string());

        write!(
            text,
            " pd{first}:{{ cpus={} nr_cstate={} }}",
            domain.span(),
            domain.state_count()
        )
        .expect("we expect writing to a String to be infallible");
    }

    text
}
