#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Discovers the cluster/core/thread topology of the processing units in a system and builds the
//! data a scheduler needs on top of it: per-unit capacities, the table of scheduling-domain
//! levels, degeneracy checks for those domains and the energy-aware performance domains of each
//! root domain.
//!
//! # Discovery
//!
//! Topology comes from one of two places:
//!
//! 1. A [`TopologyDescription`] supplied by firmware. Its topology map is a tree of `clusterN`,
//!    `coreN` and `threadN` nodes whose leaves refer to unit nodes. Nested clusters are flattened
//!    into consecutive cluster IDs. A malformed map resets every unit to the defaults; discovery
//!    is not retried.
//! 2. Each unit's affinity register, read as the unit comes online, when the map did not place
//!    the unit.
//!
//! Either way, every unit knows its core siblings (same cluster) and thread siblings (same core),
//! and those relations are symmetric.
//!
//! ```
//! use sched_topology::{
//!     DescriptionNode, Discovery, SystemTopology, TopologyConfig, TopologyDescription, UnitNode,
//! };
//!
//! // Two clusters of two single-threaded cores.
//! let mut map = DescriptionNode::new("cpu-map");
//! let mut description = TopologyDescription::new();
//!
//! for cluster in 0..2 {
//!     let mut cluster_node = DescriptionNode::cluster(cluster);
//!
//!     for core in 0..2 {
//!         let unit = cluster * 2 + core;
//!         description = description.with_unit_node(UnitNode::new(format!("cpu{unit}"), unit));
//!         cluster_node = cluster_node
//!             .with_child(DescriptionNode::core(core).with_unit(format!("cpu{unit}")));
//!     }
//!
//!     map = map.with_child(cluster_node);
//! }
//!
//! let topology = SystemTopology::new(4, TopologyConfig::new());
//! let discovery = topology.discover(Some(&description.with_cpu_map(map)));
//!
//! assert!(matches!(discovery, Discovery::FromMap { cluster_count: 2 }));
//! assert!(topology.core_siblings(3).contains(2));
//! assert!(!topology.core_siblings(3).contains(1));
//! ```
//!
//! # Scheduling domains
//!
//! The installed [`SchedDomainTopology`] lists the levels domains are built from, narrowest
//! first. [`SystemTopology::attach_domains()`] builds the domains of one unit and collapses the
//! ones [`DegeneracyChecker`] finds degenerate.
//!
//! # Energy-aware scheduling
//!
//! [`SystemTopology::rebuild_perf_domains()`] builds the performance domains of a [`RootDomain`]
//! from an [`EnergyModel`] and publishes them as one immutable [`PerfDomainList`]. Readers obtain
//! the list without locking and keep a consistent snapshot for as long as they hold it. When any
//! precondition fails, the root domain is left without performance domains and the reason is
//! returned as an [`EasRejection`].
//!
//! # Testing
//!
//! The `test-util` feature enables the [`fake`] module with in-memory energy models, governors and
//! affinity registers.

mod affinity;
mod capacity;
mod config;
mod debug;
mod degeneracy;
mod description;
mod energy;
mod error;
mod flags;
mod levels;
mod parser;
mod perf_domain;
mod primitive_types;
mod sched_domain;
mod system_topology;
mod topology_table;
mod unit_set;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use affinity::*;
pub use capacity::*;
pub use config::*;
pub use debug::*;
pub use degeneracy::*;
pub use description::*;
pub use energy::*;
pub use error::{Error, ErrorKind};
pub use flags::*;
pub use levels::*;
pub use parser::*;
pub use perf_domain::*;
pub use primitive_types::*;
pub use sched_domain::*;
pub use system_topology::*;
pub use topology_table::*;
pub use unit_set::*;
