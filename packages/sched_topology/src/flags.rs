use bitflags::bitflags;

bitflags! {
    /// Behavior flags of a scheduling domain.
    ///
    /// Flags describe both how load is balanced inside the domain and what the units of the
    /// domain share. The same set of flags is used by the level table and by the degeneracy
    /// checks.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct DomainFlags: u32 {
        /// Load is balanced across the groups of the domain.
        const LOAD_BALANCE = 1 << 0;
        /// Balance when a unit is about to become idle.
        const BALANCE_NEWIDLE = 1 << 1;
        /// Balance on exec.
        const BALANCE_EXEC = 1 << 2;
        /// Balance on fork.
        const BALANCE_FORK = 1 << 3;
        /// Balance on wakeup.
        const BALANCE_WAKE = 1 << 4;
        /// Wake tasks up on the waker's unit when possible.
        const WAKE_AFFINE = 1 << 5;
        /// The domain contains units of different capacity.
        const ASYM_CPUCAPACITY = 1 << 6;
        /// Units of the domain share compute capacity (hardware threads).
        const SHARE_CPUCAPACITY = 1 << 7;
        /// Units of the domain share a power domain.
        const SHARE_POWERDOMAIN = 1 << 8;
        /// Units of the domain share package resources such as caches.
        const SHARE_PKG_RESOURCES = 1 << 9;
        /// Units of the domain share performance states.
        const SHARE_CAP_STATES = 1 << 10;
        /// Only one unit balances this domain at a time.
        const SERIALIZE = 1 << 11;
        /// Prefer running on the lowest numbered units.
        const ASYM_PACKING = 1 << 12;
        /// Prefer spreading tasks onto sibling groups.
        const PREFER_SIBLING = 1 << 13;
        /// Groups of the domain may overlap.
        const OVERLAP = 1 << 14;
        /// The domain spans memory-affinity regions.
        const NUMA = 1 << 15;
    }
}

impl DomainFlags {
    /// Balancing behavior every built domain starts from, before level flags are added.
    pub const BALANCE_DEFAULTS: Self = Self::LOAD_BALANCE
        .union(Self::BALANCE_NEWIDLE)
        .union(Self::BALANCE_EXEC)
        .union(Self::BALANCE_FORK)
        .union(Self::WAKE_AFFINE);

    /// Flags that only mean something when the domain has more than one group.
    pub const REQUIRES_GROUPS: Self = Self::LOAD_BALANCE
        .union(Self::BALANCE_NEWIDLE)
        .union(Self::BALANCE_FORK)
        .union(Self::BALANCE_EXEC)
        .union(Self::SHARE_CPUCAPACITY)
        .union(Self::ASYM_CPUCAPACITY)
        .union(Self::SHARE_PKG_RESOURCES)
        .union(Self::SHARE_POWERDOMAIN);

    /// Flags that a parent with a single group does not need its child to carry.
    pub const SINGLE_GROUP_IRRELEVANT: Self = Self::REQUIRES_GROUPS.union(Self::PREFER_SIBLING);
}
