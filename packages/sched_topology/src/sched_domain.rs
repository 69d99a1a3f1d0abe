use crate::{DomainFlags, UnitSet};

/// One scheduling domain: a set of units balanced together, divided into groups.
///
/// The first group is the one containing the unit the domain was built for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchedDomain {
    name: &'static str,
    span: UnitSet,
    flags: DomainFlags,
    groups: Vec<UnitSet>,
}

impl SchedDomain {
    /// Creates a domain.
    #[must_use]
    pub fn new(
        name: &'static str,
        span: UnitSet,
        flags: DomainFlags,
        groups: Vec<UnitSet>,
    ) -> Self {
        Self {
            name,
            span,
            flags,
            groups,
        }
    }

    /// The name of the level the domain was built from.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The units in the domain.
    #[must_use]
    pub fn span(&self) -> &UnitSet {
        &self.span
    }

    /// The flags of the domain.
    #[must_use]
    pub fn flags(&self) -> DomainFlags {
        self.flags
    }

    /// The groups of the domain.
    #[must_use]
    pub fn groups(&self) -> &[UnitSet] {
        &self.groups
    }

    /// Replaces the flags of the domain.
    #[must_use]
    pub fn with_flags(mut self, flags: DomainFlags) -> Self {
        self.flags = flags;
        self
    }
}
