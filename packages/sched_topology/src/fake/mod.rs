//! In-memory providers for testing.
//!
//! The topology code consumes the energy model, the frequency governors and the per-unit affinity
//! registers through traits. This module offers simple in-memory implementations of each, so
//! tests can describe a machine without real firmware or drivers behind it.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! # Example
//!
//! ```
//! use sched_topology::fake::{FakeEnergyModel, FakeGovernors};
//! use sched_topology::{CapacityState, GovernorId, PerfDomainBuilder, RootDomain, UnitSet};
//!
//! // A little cluster (units 0-3) and a big cluster (units 4-5).
//! let energy = FakeEnergyModel::new()
//!     .with_perf_domain(0..4, vec![CapacityState::new(200, 30), CapacityState::new(446, 90)])
//!     .with_perf_domain(4..6, vec![CapacityState::new(512, 200), CapacityState::new(1024, 600)]);
//! let governors = FakeGovernors::uniform("schedutil");
//! let required = GovernorId::new("schedutil");
//!
//! let root = RootDomain::new(UnitSet::first_n(6));
//! root.mark_asymmetric_capacity(true);
//!
//! let outcome = PerfDomainBuilder::new(&energy, &governors, &required).rebuild(&root);
//!
//! assert!(outcome.is_enabled());
//! assert_eq!(root.perf_domains().unwrap().len(), 2);
//! ```

mod energy;
mod governors;
mod registers;

pub use energy::FakeEnergyModel;
pub use governors::FakeGovernors;
pub use registers::FakeAffinityRegisters;
