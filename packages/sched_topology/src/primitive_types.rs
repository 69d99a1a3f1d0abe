/// Identifies a specific processing unit (logical processor).
///
/// Unit IDs are dense: a topology with N possible units uses the IDs `0..N`.
pub type UnitId = u32;

/// Identifies a leaf cluster.
///
/// Cluster IDs are small integers, unique per leaf cluster. When the topology comes from a
/// description tree they are assigned in depth-first order starting from zero. When the topology
/// comes from the affinity register they are whatever the register reports.
pub type ClusterId = u32;

/// Identifies a core within its cluster.
pub type CoreId = u32;

/// Identifies a hardware thread within its core.
pub type ThreadIndex = u32;

/// A relative performance or efficiency value, normalized to [`FULL_CAPACITY`].
pub type Capacity = u64;

/// The capacity of the most capable unit in the system, also the default capacity and
/// efficiency of every unit until an energy model says otherwise.
pub const FULL_CAPACITY: Capacity = 1024;

/// Upper bound on the complexity of an energy model that energy-aware scheduling will accept.
///
/// Complexity is `domain_count * (total_state_count + unit_count)`. The bound keeps iterating the
/// performance domains in the wake-up path cheap: it admits, for example, 16 units with per-unit
/// frequency scaling and fewer than 8 performance states each.
pub const MAX_ENERGY_MODEL_COMPLEXITY: usize = 2048;
