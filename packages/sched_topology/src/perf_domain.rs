use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    EnergyModel, EnergyPerfDomain, GovernorId, GovernorSource, MAX_ENERGY_MODEL_COMPLEXITY,
    UnitId, UnitSet,
};

/// A set of units that change performance state together, with the energy model describing them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PerformanceDomain {
    energy: Arc<EnergyPerfDomain>,
    span: UnitSet,
}

impl PerformanceDomain {
    fn new(energy: Arc<EnergyPerfDomain>, span: UnitSet) -> Self {
        Self { energy, span }
    }

    /// The energy model of the domain.
    #[must_use]
    pub fn energy(&self) -> &EnergyPerfDomain {
        &self.energy
    }

    /// The units of the domain that belong to the root domain it was built for.
    #[must_use]
    pub fn span(&self) -> &UnitSet {
        &self.span
    }

    /// The number of performance states of the domain.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial delegation.
    pub fn state_count(&self) -> usize {
        self.energy.state_count()
    }
}

/// An immutable list of the performance domains of one root domain.
///
/// Lists are published whole and never modified afterwards, so a reader always sees either the
/// complete previous list or the complete new one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PerfDomainList {
    domains: Vec<PerformanceDomain>,
}

impl PerfDomainList {
    /// The number of domains in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether the list has no domains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Iterates over the domains in the order they were built.
    pub fn iter(&self) -> impl Iterator<Item = &PerformanceDomain> {
        self.domains.iter()
    }

    /// The domain containing `unit`, if any.
    #[must_use]
    pub fn find(&self, unit: UnitId) -> Option<&PerformanceDomain> {
        self.domains.iter().find(|domain| domain.span.contains(unit))
    }

    /// The sum of the performance-state counts of every domain.
    #[must_use]
    pub fn total_state_count(&self) -> usize {
        self.domains
            .iter()
            .map(PerformanceDomain::state_count)
            .fold(0, usize::saturating_add)
    }
}

/// The cost estimate of energy-aware scheduling decisions over a root domain.
///
/// Saturates instead of overflowing.
#[must_use]
pub fn em_complexity(domain_count: usize, total_state_count: usize, unit_count: usize) -> usize {
    domain_count.saturating_mul(total_state_count.saturating_add(unit_count))
}

/// Why energy-aware scheduling was not enabled on a root domain.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum EasRejection {
    /// The root domain does not contain units of different capacity.
    #[error("root domain does not have asymmetric capacity")]
    NoAsymmetricCapacity,

    /// The energy model has no performance domain covering a unit.
    #[error("no energy model for unit {unit}")]
    MissingEnergyModel {
        /// The uncovered unit.
        unit: UnitId,
    },

    /// The energy model reports a performance domain that does not contain the unit it was
    /// requested for, or that overlaps a domain already built.
    #[error("energy model is inconsistent at unit {unit}")]
    InconsistentEnergyModel {
        /// The unit whose performance domain is inconsistent.
        unit: UnitId,
    },

    /// A unit has no frequency policy and therefore no governor.
    #[error("unit {unit} has no frequency governor")]
    MissingGovernor {
        /// The unit without a governor.
        unit: UnitId,
    },

    /// A unit is driven by a governor other than the energy-aware one.
    #[error("unit {unit} is driven by governor {found} instead of {required}")]
    WrongGovernor {
        /// The unit with the wrong governor.
        unit: UnitId,

        /// The governor driving the unit.
        found: GovernorId,

        /// The governor energy-aware scheduling requires.
        required: GovernorId,
    },

    /// The energy model is too complex to evaluate on every scheduling decision.
    #[error("energy model complexity {complexity} exceeds {limit}")]
    ComplexityTooHigh {
        /// The computed complexity.
        complexity: usize,

        /// The highest allowed complexity.
        limit: usize,
    },
}

/// The result of rebuilding the performance domains of a root domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EasOutcome {
    /// A new list was published.
    Enabled {
        /// The number of domains in the list.
        domain_count: usize,

        /// The energy model complexity of the list.
        complexity: usize,
    },

    /// The root domain was left without performance domains.
    Disabled(EasRejection),
}

impl EasOutcome {
    /// Whether energy-aware scheduling is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// A top-level partition of units, owning its current performance-domain list.
///
/// Readers get the list lock-free through [`perf_domains()`][Self::perf_domains]. A snapshot
/// obtained there stays valid after the list is replaced and is freed when the last reader drops
/// it.
#[derive(Debug)]
pub struct RootDomain {
    span: UnitSet,
    asymmetric_capacity: AtomicBool,
    perf_domains: ArcSwapOption<PerfDomainList>,
}

impl RootDomain {
    /// Creates a root domain over `span`, without asymmetric capacity and without performance
    /// domains.
    #[must_use]
    pub fn new(span: UnitSet) -> Self {
        Self {
            span,
            asymmetric_capacity: AtomicBool::new(false),
            perf_domains: ArcSwapOption::empty(),
        }
    }

    /// The units of the root domain.
    #[must_use]
    pub fn span(&self) -> &UnitSet {
        &self.span
    }

    /// Records whether the root domain contains units of different capacity.
    pub fn mark_asymmetric_capacity(&self, asymmetric: bool) {
        self.asymmetric_capacity.store(asymmetric, Ordering::Relaxed);
    }

    /// Whether the root domain contains units of different capacity.
    #[must_use]
    pub fn has_asymmetric_capacity(&self) -> bool {
        self.asymmetric_capacity.load(Ordering::Relaxed)
    }

    /// The current performance-domain list, or `None` when energy-aware scheduling is disabled.
    #[must_use]
    pub fn perf_domains(&self) -> Option<Arc<PerfDomainList>> {
        self.perf_domains.load_full()
    }

    /// Whether the root domain currently has performance domains.
    #[must_use]
    pub fn has_perf_domains(&self) -> bool {
        self.perf_domains.load().is_some()
    }

    fn publish(&self, list: Option<PerfDomainList>) {
        // The previous list is released here but freed only once the last reader drops it.
        drop(self.perf_domains.swap(list.map(Arc::new)));
    }
}

/// Builds the performance-domain list of a root domain from the energy model.
///
/// Callers must serialize builds; [`SystemTopology`][crate::SystemTopology] does so with its
/// domain lock.
#[derive(Debug)]
pub struct PerfDomainBuilder<'a> {
    energy: &'a dyn EnergyModel,
    governors: &'a dyn GovernorSource,
    required_governor: &'a GovernorId,
}

impl<'a> PerfDomainBuilder<'a> {
    /// Creates a builder that requires every unit to be driven by `required_governor`.
    #[must_use]
    pub fn new(
        energy: &'a dyn EnergyModel,
        governors: &'a dyn GovernorSource,
        required_governor: &'a GovernorId,
    ) -> Self {
        Self {
            energy,
            governors,
            required_governor,
        }
    }

    /// Builds a new list for `root` and publishes it, or leaves `root` without performance
    /// domains if any precondition fails.
    pub fn rebuild(&self, root: &RootDomain) -> EasOutcome {
        match self.build(root) {
            Ok(list) => {
                let domain_count = list.len();
                let complexity = em_complexity(
                    domain_count,
                    list.total_state_count(),
                    root.span().len(),
                );

                info!(
                    root = %root.span(),
                    "energy-aware scheduling enabled with {domain_count} performance domains"
                );

                root.publish(Some(list));

                EasOutcome::Enabled {
                    domain_count,
                    complexity,
                }
            }
            Err(rejection) => {
                root.publish(None);
                EasOutcome::Disabled(rejection)
            }
        }
    }

    /// Builds a list for `root` without publishing it.
    ///
    /// # Errors
    ///
    /// Returns the first precondition that fails: asymmetric capacity on the root, then per unit
    /// a consistent energy model and the required governor, then the complexity limit. Domains of
    /// a successful list are pairwise disjoint and cover the root.
    pub fn build(&self, root: &RootDomain) -> Result<PerfDomainList, EasRejection> {
        if !root.has_asymmetric_capacity() {
            debug!(
                root = %root.span(),
                "no asymmetric capacity; energy-aware scheduling stays off"
            );
            return Err(EasRejection::NoAsymmetricCapacity);
        }

        let had_domains = root.has_perf_domains();

        let mut domains = Vec::new();
        let mut covered = UnitSet::new();
        let mut total_state_count: usize = 0;

        for unit in root.span() {
            if covered.contains(unit) {
                continue;
            }

            let Some(energy) = self.energy.perf_domain(unit) else {
                debug!(unit, "no energy model; energy-aware scheduling stays off");
                return Err(EasRejection::MissingEnergyModel { unit });
            };

            if !energy.span().contains(unit) || energy.span().intersects(&covered) {
                warn!(
                    unit,
                    span = %energy.span(),
                    "performance domain does not contain the unit or overlaps another domain"
                );
                return Err(EasRejection::InconsistentEnergyModel { unit });
            }

            self.check_governor(unit, had_domains)?;

            let span = energy.span().intersection(root.span());
            covered.union_with(&span);

            total_state_count = total_state_count.saturating_add(energy.state_count());
            domains.push(PerformanceDomain::new(energy, span));
        }

        let complexity = em_complexity(domains.len(), total_state_count, root.span().len());

        if complexity > MAX_ENERGY_MODEL_COMPLEXITY {
            warn!(
                root = %root.span(),
                "energy model complexity {complexity} exceeds {MAX_ENERGY_MODEL_COMPLEXITY}; \
                 energy-aware scheduling disabled"
            );
            return Err(EasRejection::ComplexityTooHigh {
                complexity,
                limit: MAX_ENERGY_MODEL_COMPLEXITY,
            });
        }

        Ok(PerfDomainList { domains })
    }

    fn check_governor(&self, unit: UnitId, had_domains: bool) -> Result<(), EasRejection> {
        let Some(found) = self.governors.governor(unit) else {
            debug!(unit, "no frequency governor; energy-aware scheduling stays off");
            return Err(EasRejection::MissingGovernor { unit });
        };

        if found == *self.required_governor {
            return Ok(());
        }

        if had_domains {
            warn!(
                "unit {unit}: governor {found} is not {}; energy-aware scheduling disabled",
                self.required_governor
            );
        } else {
            debug!(
                "unit {unit}: governor {found} is not {}; energy-aware scheduling stays off",
                self.required_governor
            );
        }

        Err(EasRejection::WrongGovernor {
            unit,
            found,
            required: self.required_governor.clone(),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::fake::{FakeEnergyModel, FakeGovernors};
    use crate::{CapacityState, MockEnergyModel, MockGovernorSource};

    assert_impl_all!(RootDomain: Send, Sync);
    assert_impl_all!(PerfDomainList: Send, Sync);

    fn states(count: u64) -> Vec<CapacityState> {
        (1..=count)
            .map(|index| CapacityState::new(index * 100, index * 40))
            .collect()
    }

    /// `domain_count` domains of `units_per_domain` consecutive units each.
    fn uniform_model(
        domain_count: u32,
        units_per_domain: u32,
        state_count: u64,
    ) -> FakeEnergyModel {
        (0..domain_count).fold(FakeEnergyModel::new(), |model, domain| {
            let first = domain * units_per_domain;
            model.with_perf_domain(first..first + units_per_domain, states(state_count))
        })
    }

    fn asymmetric_root(unit_count: usize) -> RootDomain {
        let root = RootDomain::new(UnitSet::first_n(unit_count));
        root.mark_asymmetric_capacity(true);
        root
    }

    fn schedutil() -> GovernorId {
        GovernorId::new("schedutil")
    }

    #[test]
    fn complexity_formula() {
        assert_eq!(em_complexity(3, 30, 8), 114);
        assert_eq!(em_complexity(64, 64 * 32, 64), 135_168);
        assert_eq!(em_complexity(usize::MAX, 2, 0), usize::MAX);
    }

    #[test]
    fn small_model_is_admitted() {
        // 3 domains x 10 states over 8 units.
        let model = FakeEnergyModel::new()
            .with_perf_domain(0..2, states(10))
            .with_perf_domain(2..5, states(10))
            .with_perf_domain(5..8, states(10));
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(8);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Enabled {
                domain_count: 3,
                complexity: 114
            }
        );

        let list = root.perf_domains().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.total_state_count(), 30);
        assert_eq!(list.find(6).unwrap().span(), &(5..8).collect::<UnitSet>());
        assert!(list.find(8).is_none());
    }

    #[test]
    fn complex_model_is_rejected() {
        let model = uniform_model(64, 1, 32);
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(64);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::ComplexityTooHigh {
                complexity: 135_168,
                limit: MAX_ENERGY_MODEL_COMPLEXITY
            })
        );
        assert!(root.perf_domains().is_none());
    }

    #[test]
    fn symmetric_root_is_rejected_before_asking_providers() {
        let model = FakeEnergyModel::new();
        let mut governors = MockGovernorSource::new();
        governors.expect_governor().never();
        let required = schedutil();
        let root = RootDomain::new(UnitSet::first_n(4));

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::NoAsymmetricCapacity)
        );
        assert!(!root.has_perf_domains());
    }

    #[test]
    fn missing_energy_model_is_rejected() {
        let model = FakeEnergyModel::new().with_perf_domain(0..2, states(4));
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(4);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::MissingEnergyModel { unit: 2 })
        );
    }

    #[test]
    fn energy_model_is_checked_before_governor() {
        let model = FakeEnergyModel::new();
        let mut governors = MockGovernorSource::new();
        governors.expect_governor().never();
        let required = schedutil();
        let root = asymmetric_root(2);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::MissingEnergyModel { unit: 0 })
        );
    }

    #[test]
    fn overlapping_perf_domains_are_rejected() {
        // Unit 1 is reported by both domains.
        let model = FakeEnergyModel::new()
            .with_perf_domain(0..2, states(3))
            .with_perf_domain(1..4, states(3));
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(4);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::InconsistentEnergyModel { unit: 2 })
        );
        assert!(root.perf_domains().is_none());
    }

    #[test]
    fn perf_domain_without_its_unit_is_rejected() {
        let mut model = MockEnergyModel::new();
        model
            .expect_perf_domain()
            .returning(|_| Some(Arc::new(EnergyPerfDomain::new(UnitSet::single(1), states(3)))));
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(2);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::InconsistentEnergyModel { unit: 0 })
        );
        assert!(root.perf_domains().is_none());
    }

    #[test]
    fn published_domains_partition_root() {
        let model = FakeEnergyModel::new()
            .with_perf_domain(0..3, states(2))
            .with_perf_domain(3..5, states(2))
            .with_perf_domain(5..6, states(2));
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(6);

        assert!(
            PerfDomainBuilder::new(&model, &governors, &required)
                .rebuild(&root)
                .is_enabled()
        );

        let list = root.perf_domains().unwrap();
        let total: usize = list.iter().map(|domain| domain.span().len()).sum();
        assert_eq!(total, 6);

        for unit in 0..6 {
            assert!(list.find(unit).unwrap().span().contains(unit));
        }
    }

    #[test]
    fn missing_governor_is_rejected() {
        let model = uniform_model(2, 2, 4);
        let governors = FakeGovernors::new().with_governor(0..2, "schedutil");
        let required = schedutil();
        let root = asymmetric_root(4);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::MissingGovernor { unit: 2 })
        );
    }

    #[test]
    fn wrong_governor_clears_previous_list() {
        let model = uniform_model(2, 2, 4);
        let required = schedutil();
        let root = asymmetric_root(4);

        let good = FakeGovernors::uniform("schedutil");
        assert!(
            PerfDomainBuilder::new(&model, &good, &required)
                .rebuild(&root)
                .is_enabled()
        );
        let previous = root.perf_domains().unwrap();

        let bad = FakeGovernors::uniform("schedutil").with_governor(2..4, "performance");
        let outcome = PerfDomainBuilder::new(&model, &bad, &required).rebuild(&root);

        assert_eq!(
            outcome,
            EasOutcome::Disabled(EasRejection::WrongGovernor {
                unit: 2,
                found: GovernorId::new("performance"),
                required: schedutil(),
            })
        );
        assert!(root.perf_domains().is_none());

        // A reader holding the old list can still use it.
        assert_eq!(previous.len(), 2);
        assert_eq!(previous.find(3).unwrap().state_count(), 4);
    }

    #[test]
    fn domain_span_is_limited_to_root() {
        let model = FakeEnergyModel::new()
            .with_perf_domain(0..4, states(3))
            .with_perf_domain(4..8, states(3));
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();

        let root = RootDomain::new((2..6).collect());
        root.mark_asymmetric_capacity(true);

        let outcome = PerfDomainBuilder::new(&model, &governors, &required).rebuild(&root);
        assert!(outcome.is_enabled());

        let list = root.perf_domains().unwrap();
        let spans: Vec<_> = list.iter().map(|domain| domain.span().clone()).collect();
        assert_eq!(
            spans,
            [(2..4).collect::<UnitSet>(), (4..6).collect::<UnitSet>()]
        );
        assert_eq!(
            list.iter().next().unwrap().energy().span(),
            &(0..4).collect::<UnitSet>()
        );
    }

    #[test]
    fn rebuild_replaces_list() {
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(4);

        let first = uniform_model(1, 4, 2);
        PerfDomainBuilder::new(&first, &governors, &required).rebuild(&root);
        assert_eq!(root.perf_domains().unwrap().total_state_count(), 2);

        let second = uniform_model(2, 2, 5);
        PerfDomainBuilder::new(&second, &governors, &required).rebuild(&root);
        assert_eq!(root.perf_domains().unwrap().len(), 2);
        assert_eq!(root.perf_domains().unwrap().total_state_count(), 10);
    }

    #[test]
    fn readers_never_see_torn_list() {
        const REBUILDS: usize = 200;
        const READERS: usize = 4;

        // Every domain of a model has the same number of states, which differs between models.
        let models = [uniform_model(2, 4, 3), uniform_model(4, 2, 7)];
        let governors = FakeGovernors::uniform("schedutil");
        let required = schedutil();
        let root = asymmetric_root(8);
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..READERS {
                scope.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        let Some(list) = root.perf_domains() else {
                            continue;
                        };

                        let first = list.iter().next().unwrap().state_count();
                        assert!(list.iter().all(|domain| domain.state_count() == first));
                        assert_eq!(list.total_state_count(), first * list.len());

                        let covered: UnitSet = list
                            .iter()
                            .flat_map(|domain| domain.span().iter())
                            .collect();
                        assert_eq!(covered, UnitSet::first_n(8));
                    }
                });
            }

            for round in 0..REBUILDS {
                let model = &models[round % models.len()];
                let outcome = PerfDomainBuilder::new(model, &governors, &required).rebuild(&root);
                assert!(outcome.is_enabled());
            }

            done.store(true, Ordering::Relaxed);
        });

        assert!(root.has_perf_domains());
    }
}
