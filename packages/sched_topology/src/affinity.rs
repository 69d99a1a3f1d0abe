//! Register-derived topology, used when no topology map is available.
//!
//! Each unit reports its position in the hierarchy through a multiprocessor affinity register
//! with the layout below. Only levels 0 to 2 are used.
//!
//! ```text
//! 31 30 29   25 24 23    16 15     8 7      0
//! ┌──┬──┬───────┬──┬────────┬────────┬────────┐
//! │1 │U │ RES0  │MT│  Aff2  │  Aff1  │  Aff0  │
//! └──┴──┴───────┴──┴────────┴────────┴────────┘
//! ```
//!
//! * `U` - set on uniprocessor systems.
//! * `MT` - set when the lowest affinity level identifies hardware threads of one core.

use std::fmt::Debug;

use derive_more::derive::Display;
use tracing::debug;

use crate::{ClusterId, CoreId, ThreadIndex, TopologyTable, UnitId};

const AFFINITY_LEVEL_BITS: u32 = 8;
const AFFINITY_LEVEL_MASK: u64 = 0xFF;
const HIGHEST_AFFINITY_LEVEL: u32 = 2;

/// The value of one unit's multiprocessor affinity register.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("{_0:#016x}")]
pub struct AffinityRegister(u64);

impl AffinityRegister {
    /// Set on uniprocessor systems.
    pub const UNIPROCESSOR: u64 = 1 << 30;

    /// Set when affinity level 0 identifies hardware threads.
    pub const MULTITHREADING: u64 = 1 << 24;

    /// Wraps a raw register value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Builds a register value from its parts.
    #[must_use]
    pub fn from_levels(aff2: u8, aff1: u8, aff0: u8, multithreading: bool) -> Self {
        let mut value = u64::from(aff0)
            | (u64::from(aff1) << AFFINITY_LEVEL_BITS)
            | (u64::from(aff2) << (2 * AFFINITY_LEVEL_BITS));

        if multithreading {
            value |= Self::MULTITHREADING;
        }

        Self(value)
    }

    /// The raw register value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether the register reports a uniprocessor system.
    #[must_use]
    pub const fn is_uniprocessor(self) -> bool {
        self.0 & Self::UNIPROCESSOR != 0
    }

    /// Whether affinity level 0 identifies hardware threads.
    #[must_use]
    pub const fn is_multithreaded(self) -> bool {
        self.0 & Self::MULTITHREADING != 0
    }

    /// The value of affinity level `level`, or `None` if `level` is not 0, 1 or 2.
    #[must_use]
    pub const fn level(self, level: u32) -> Option<u32> {
        if level > HIGHEST_AFFINITY_LEVEL {
            return None;
        }

        Some(self.field(level))
    }

    // Callers pass a level of at most HIGHEST_AFFINITY_LEVEL.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "masked to 8 bits before the cast"
    )]
    const fn field(self, level: u32) -> u32 {
        ((self.0 >> (level * AFFINITY_LEVEL_BITS)) & AFFINITY_LEVEL_MASK) as u32
    }

    /// Decodes the placement of the unit, or `None` on a uniprocessor system where the default
    /// topology applies.
    #[must_use]
    pub const fn placement(self) -> Option<(ClusterId, CoreId, Option<ThreadIndex>)> {
        if self.is_uniprocessor() {
            return None;
        }

        if self.is_multithreaded() {
            Some((self.field(2), self.field(1), Some(self.field(0))))
        } else {
            Some((self.field(1), self.field(0), None))
        }
    }
}

/// Reads the affinity register of a unit.
#[cfg_attr(test, mockall::automock)]
pub trait AffinityRegisters: Debug + Send + Sync {
    /// The affinity register value of `unit`.
    fn read(&self, unit: UnitId) -> AffinityRegister;
}

/// What [`store_unit_topology()`] did.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StoreOutcome {
    /// The unit was already placed (by the topology map); only its siblings were refreshed.
    AlreadyPlaced,

    /// The register reports a uniprocessor system; the defaults stand.
    Uniprocessor,

    /// The unit was placed from its affinity register.
    Placed,
}

/// Places `unit` from its affinity register unless it is already placed, then refreshes its
/// sibling sets.
///
/// Call this once for each unit as it comes online.
pub fn store_unit_topology(
    table: &mut TopologyTable,
    unit: UnitId,
    registers: &dyn AffinityRegisters,
) -> StoreOutcome {
    if table.is_placed(unit) {
        table.recompute_siblings(unit);
        return StoreOutcome::AlreadyPlaced;
    }

    let register = registers.read(unit);

    let Some((cluster_id, core_id, thread_id)) = register.placement() else {
        return StoreOutcome::Uniprocessor;
    };

    table.assign(unit, cluster_id, core_id, thread_id);

    debug!(
        unit,
        cluster_id,
        core_id,
        ?thread_id,
        %register,
        "placed unit from its affinity register"
    );

    table.recompute_siblings(unit);
    StoreOutcome::Placed
}
