//! The process-wide topology state: table, capacities, installed levels and the lock that
//! serializes every change to them.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::{
    AffinityRegisters, Capacity, CapacityModel, DegeneracyChecker, DomainFlags, EasOutcome,
    EnergyModel, Error, GovernorSource, PerfDomainBuilder, RootDomain, SchedDomain,
    SchedDomainTopology, StoreOutcome, TopologyConfig, TopologyDescription, TopologyParser,
    TopologyTable, UnitId, UnitSet, check_domain_hierarchy, describe_perf_domains,
    store_unit_topology,
};

/// How [`SystemTopology::discover()`] ended.
#[derive(Debug)]
pub enum Discovery {
    /// The topology map placed every unit.
    FromMap {
        /// The number of leaf clusters found.
        cluster_count: u32,
    },

    /// There was no topology map. Units are placed from their affinity registers as they come
    /// online.
    NoMap,

    /// The topology map was malformed. Every unit was reset to the defaults and the generic level
    /// table was installed.
    Fallback(Error),
}

/// The topology of the system: where each unit sits, how much it can do and how scheduling
/// domains are built over it.
///
/// All changes ([`discover()`][Self::discover],
/// [`store_unit_topology()`][Self::store_unit_topology], capacity updates and performance-domain
/// rebuilds) are serialized by one lock. Readers never
/// take it: the table and the level table are published as immutable snapshots and capacities
/// are atomics.
///
/// Clones are equivalent and refer to the same state.
///
/// # Example
///
/// ```
/// use sched_topology::{
///     DescriptionNode, Discovery, SystemTopology, TopologyConfig, TopologyDescription, UnitNode,
/// };
///
/// let description = TopologyDescription::new()
///     .with_unit_node(UnitNode::new("cpu0", 0))
///     .with_unit_node(UnitNode::new("cpu1", 1))
///     .with_cpu_map(DescriptionNode::new("cpu-map").with_child(
///         DescriptionNode::cluster(0)
///             .with_child(DescriptionNode::core(0).with_unit("cpu0"))
///             .with_child(DescriptionNode::core(1).with_unit("cpu1")),
///     ));
///
/// let topology = SystemTopology::new(2, TopologyConfig::new());
///
/// assert!(matches!(
///     topology.discover(Some(&description)),
///     Discovery::FromMap { cluster_count: 1 }
/// ));
/// assert_eq!(topology.core_siblings(0).len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct SystemTopology {
    inner: Arc<SystemTopologyInner>,
}

#[derive(Debug)]
struct SystemTopologyInner {
    config: TopologyConfig,

    table: ArcSwap<TopologyTable>,

    capacity: CapacityModel,

    levels: ArcSwap<SchedDomainTopology>,

    /// Held by every writer. Readers never take it.
    domains_lock: Mutex<()>,
}

impl SystemTopology {
    /// Creates the state for `unit_count` possible units, all unplaced, at full capacity and with
    /// the energy-aware level table installed.
    #[must_use]
    pub fn new(unit_count: usize, config: TopologyConfig) -> Self {
        let levels = SchedDomainTopology::energy_aware(&config);

        Self {
            inner: Arc::new(SystemTopologyInner {
                table: ArcSwap::from_pointee(TopologyTable::new(unit_count)),
                capacity: CapacityModel::new(unit_count),
                levels: ArcSwap::from_pointee(levels),
                domains_lock: Mutex::new(()),
                config,
            }),
        }
    }

    /// The configuration the state was created with.
    #[must_use]
    pub fn config(&self) -> &TopologyConfig {
        &self.inner.config
    }

    /// The number of possible units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.inner.capacity.unit_count()
    }

    /// Parses `description` into a fresh table and publishes it.
    ///
    /// Capacities and efficiencies restart from the defaults. On success the efficiencies found
    /// in the description are committed and the energy-aware level table is installed. If the description is malformed, every unit returns to the
    /// defaults and the generic level table is installed instead. Discovery is not retried.
    pub fn discover(&self, description: Option<&TopologyDescription>) -> Discovery {
        let _guard = self.inner.domains_lock.lock();

        let mut table = TopologyTable::new(self.unit_count());

        match TopologyParser::new(description).parse_all(&mut table) {
            Ok(outcome) => {
                table.recompute_all_siblings();

                self.inner.capacity.reset();
                for (unit, efficiency) in outcome.efficiencies {
                    self.inner.capacity.set_efficiency(unit, efficiency);
                }

                self.inner.table.store(Arc::new(table));
                self.inner
                    .levels
                    .store(Arc::new(SchedDomainTopology::energy_aware(&self.inner.config)));

                if outcome.map_present {
                    info!(
                        clusters = outcome.cluster_count,
                        "topology discovered from the topology map"
                    );
                    Discovery::FromMap {
                        cluster_count: outcome.cluster_count,
                    }
                } else {
                    info!("no topology map; units will be placed from their affinity registers");
                    Discovery::NoMap
                }
            }
            Err(parse_error) => {
                error!(
                    kind = ?parse_error.kind(),
                    "invalid topology map, falling back to the default topology: {parse_error}"
                );

                table.reset();
                self.inner.capacity.reset();
                self.inner.table.store(Arc::new(table));
                self.inner
                    .levels
                    .store(Arc::new(SchedDomainTopology::fallback()));

                Discovery::Fallback(parse_error)
            }
        }
    }

    /// Returns every unit to the unplaced state at full capacity and efficiency, and reinstalls
    /// the energy-aware level table.
    pub fn reset(&self) {
        let _guard = self.inner.domains_lock.lock();

        self.inner
            .table
            .store(Arc::new(TopologyTable::new(self.unit_count())));
        self.inner.capacity.reset();
        self.inner
            .levels
            .store(Arc::new(SchedDomainTopology::energy_aware(&self.inner.config)));
    }

    /// Places `unit` from its affinity register if the topology map did not place it, then
    /// refreshes its siblings and publishes the updated table.
    pub fn store_unit_topology(
        &self,
        unit: UnitId,
        registers: &dyn AffinityRegisters,
    ) -> StoreOutcome {
        let _guard = self.inner.domains_lock.lock();

        let mut table = TopologyTable::clone(&self.inner.table.load());
        let outcome = store_unit_topology(&mut table, unit, registers);

        if outcome != StoreOutcome::Uniprocessor {
            self.inner.table.store(Arc::new(table));
        }

        outcome
    }

    /// Recomputes the capacity of `unit` from the energy model.
    pub fn update_unit_capacity(&self, unit: UnitId, energy: &dyn EnergyModel) -> Capacity {
        let _guard = self.inner.domains_lock.lock();

        self.inner.capacity.update_capacity(unit, energy)
    }

    /// The current topology table.
    #[must_use]
    pub fn table(&self) -> Arc<TopologyTable> {
        self.inner.table.load_full()
    }

    /// Units in the same cluster as `unit`, including `unit`.
    #[must_use]
    pub fn core_siblings(&self, unit: UnitId) -> UnitSet {
        self.inner.table.load().core_siblings(unit)
    }

    /// Units on the same core as `unit`, including `unit`.
    #[must_use]
    pub fn thread_siblings(&self, unit: UnitId) -> UnitSet {
        self.inner.table.load().thread_siblings(unit)
    }

    /// The capacity of `unit`.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    pub fn capacity(&self, unit: UnitId) -> Capacity {
        self.inner.capacity.capacity(unit)
    }

    /// The relative efficiency of `unit`.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    pub fn efficiency(&self, unit: UnitId) -> Capacity {
        self.inner.capacity.efficiency(unit)
    }

    /// The installed level table.
    #[must_use]
    pub fn levels(&self) -> Arc<SchedDomainTopology> {
        self.inner.levels.load_full()
    }

    /// A degeneracy checker matching the configuration.
    #[must_use]
    pub fn degeneracy_checker(&self) -> DegeneracyChecker {
        DegeneracyChecker::from_config(&self.inner.config)
    }

    /// Builds the domains of `unit` from the installed levels, narrowest first, and collapses
    /// the degenerate ones.
    ///
    /// A parent that is degenerate relative to its child is dropped, then the narrowest domain is
    /// dropped if it is degenerate on its own. With `sched_debug` the resulting hierarchy is
    /// checked and logged.
    #[must_use]
    pub fn attach_domains(&self, unit: UnitId) -> Vec<SchedDomain> {
        let table = self.inner.table.load();
        let levels = self.inner.levels.load();
        let checker = self.degeneracy_checker();

        let mut domains: Vec<SchedDomain> = Vec::with_capacity(levels.len());

        for domain in levels.build_hierarchy(&table, unit) {
            let collapses = domains
                .last()
                .is_some_and(|child| checker.is_degenerate_relative_to_parent(child, &domain));

            if collapses {
                debug!(unit, level = domain.name(), "dropping degenerate parent domain");
                continue;
            }

            domains.push(domain);
        }

        if domains
            .first()
            .is_some_and(|domain| checker.is_degenerate(domain))
        {
            let dropped = domains.remove(0);
            debug!(unit, level = dropped.name(), "dropping degenerate domain");
        }

        if self.inner.config.is_sched_debug() {
            check_domain_hierarchy(unit, &domains);
        }

        domains
    }

    /// Creates a root domain spanning every possible unit.
    ///
    /// The root is marked as having asymmetric capacity if the domains attached to its first unit
    /// carry that flag.
    #[must_use]
    pub fn root_domain(&self) -> RootDomain {
        let span = self.inner.table.load().possible_units();

        let asymmetric = span.first().is_some_and(|unit| {
            self.attach_domains(unit)
                .iter()
                .any(|domain| domain.flags().contains(DomainFlags::ASYM_CPUCAPACITY))
        });

        let root = RootDomain::new(span);
        root.mark_asymmetric_capacity(asymmetric);
        root
    }

    /// Rebuilds and publishes the performance domains of `root`.
    ///
    /// Concurrent readers of the previous list keep a consistent snapshot until they drop it.
    pub fn rebuild_perf_domains(
        &self,
        root: &RootDomain,
        energy: &dyn EnergyModel,
        governors: &dyn GovernorSource,
    ) -> EasOutcome {
        let _guard = self.inner.domains_lock.lock();

        let outcome =
            PerfDomainBuilder::new(energy, governors, self.inner.config.required_governor())
                .rebuild(root);

        if self.inner.config.is_sched_debug() {
            if let Some(list) = root.perf_domains() {
                debug!("{}", describe_perf_domains(root.span(), &list));
            }
        }

        outcome
    }
}
