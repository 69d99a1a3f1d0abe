use tracing::{error, warn};

use crate::error::Result;
use crate::{
    Capacity, ClusterId, CoreId, DescriptionNode, Error, TopologyDescription, TopologyTable,
    UnitId, UnitNode,
};

/// What a successful parse produced besides the placements written into the table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParseOutcome {
    /// Whether a topology map was present. If not, nothing was placed and the register-derived
    /// topology applies.
    pub map_present: bool,

    /// Number of leaf clusters found.
    pub cluster_count: ClusterId,

    /// Efficiency attributes read from the unit nodes, to be applied once the parse is accepted.
    pub efficiencies: Vec<(UnitId, Capacity)>,
}

/// Turns a [`TopologyDescription`] into placements in a [`TopologyTable`].
///
/// The parser does not clean up after itself: when it returns an error the table may hold some
/// placements and the caller must [`reset()`][TopologyTable::reset] it before using it.
///
/// # Example
///
/// ```
/// use sched_topology::{
///     DescriptionNode, TopologyDescription, TopologyParser, TopologyTable, UnitNode,
/// };
///
/// let description = TopologyDescription::new()
///     .with_unit_node(UnitNode::new("cpu0", 0))
///     .with_unit_node(UnitNode::new("cpu1", 1))
///     .with_cpu_map(
///         DescriptionNode::new("cpu-map")
///             .with_child(
///                 DescriptionNode::cluster(0)
///                     .with_child(DescriptionNode::core(0).with_unit("cpu0")),
///             )
///             .with_child(
///                 DescriptionNode::cluster(1)
///                     .with_child(DescriptionNode::core(0).with_unit("cpu1")),
///             ),
///     );
///
/// let mut table = TopologyTable::new(2);
/// let outcome = TopologyParser::new(Some(&description)).parse_all(&mut table).unwrap();
///
/// assert_eq!(outcome.cluster_count, 2);
/// assert_eq!(table.unit(1).unwrap().cluster_id(), Some(1));
/// ```
#[derive(Debug)]
pub struct TopologyParser<'d> {
    description: Option<&'d TopologyDescription>,
}

impl<'d> TopologyParser<'d> {
    /// Creates a parser for the given description. `None` means firmware provided no
    /// description at all.
    #[must_use]
    pub fn new(description: Option<&'d TopologyDescription>) -> Self {
        Self { description }
    }

    /// Parses the whole description into `table`.
    ///
    /// A missing description or a description without a topology map is not an error: the
    /// outcome reports that no map was present and the table is untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is malformed, refers to nodes that are not possible units
    /// or leaves some possible unit unplaced.
    pub fn parse_all(&self, table: &mut TopologyTable) -> Result<ParseOutcome> {
        let Some(description) = self.description else {
            warn!("no processor information found in the topology description");
            return Ok(ParseOutcome::default());
        };

        let Some(root) = description.cpu_map() else {
            return Ok(ParseOutcome::default());
        };

        let mut walker = MapWalker {
            description,
            table: &mut *table,
        };
        let cluster_count = walker.parse_cluster(root, TopologyDescription::CPU_MAP_PATH, 0, 0)?;

        let missing = table.unplaced_units();
        let efficiencies = read_efficiencies(description, table);

        if !missing.is_empty() {
            error!(%missing, "possible units are missing from the topology map");
            return Err(Error::IncompleteTopology { missing });
        }

        Ok(ParseOutcome {
            map_present: true,
            cluster_count,
            efficiencies,
        })
    }
}

/// Depth-first walk over the topology map, placing units into the table as it goes.
struct MapWalker<'d, 't> {
    description: &'d TopologyDescription,
    table: &'t mut TopologyTable,
}

impl MapWalker<'_, '_> {
    /// Parses one cluster node and everything beneath it.
    ///
    /// `next_cluster_id` is the ID the next leaf cluster will receive. Returns the ID that the
    /// leaf cluster after this subtree will receive.
    fn parse_cluster(
        &mut self,
        cluster: &DescriptionNode,
        path: &str,
        depth: u32,
        mut next_cluster_id: ClusterId,
    ) -> Result<ClusterId> {
        let mut leaf = true;

        // Nested clusters are flattened: only leaf clusters get an ID.
        for (_, child) in indexed_children(cluster, "cluster") {
            leaf = false;
            let child_path = format!("{path}/{}", child.name());
            next_cluster_id = self.parse_cluster(
                child,
                &child_path,
                depth.saturating_add(1),
                next_cluster_id,
            )?;
        }

        let mut has_cores = false;

        for (core_id, core) in indexed_children(cluster, "core") {
            has_cores = true;
            let core_path = format!("{path}/{}", core.name());

            if depth == 0 {
                error!(
                    path = core_path.as_str(),
                    "topology map children should be clusters"
                );
                return Err(Error::CoreUnderRoot { path: core_path });
            }

            if !leaf {
                error!(path, core = core.name(), "non-leaf cluster has a core child");
                return Err(Error::CoreInNonLeafCluster {
                    cluster_path: path.to_string(),
                    core_name: core.name().to_string(),
                });
            }

            self.parse_core(core, &core_path, next_cluster_id, core_id)?;
        }

        if leaf && !has_cores {
            warn!(path, "empty cluster");
        }

        if leaf {
            next_cluster_id = next_cluster_id.saturating_add(1);
        }

        Ok(next_cluster_id)
    }

    fn parse_core(
        &mut self,
        core: &DescriptionNode,
        path: &str,
        cluster_id: ClusterId,
        core_id: CoreId,
    ) -> Result<()> {
        let mut leaf = true;

        for (thread_index, thread) in indexed_children(core, "thread") {
            leaf = false;
            let thread_path = format!("{path}/{}", thread.name());

            let Some(unit) = self.unit_for_node(thread, &thread_path) else {
                error!(path = thread_path.as_str(), "cannot get unit for thread");
                return Err(Error::UnresolvedThread { path: thread_path });
            };

            self.table.assign(unit, cluster_id, core_id, Some(thread_index));
        }

        match self.unit_for_node(core, path) {
            Some(_) if !leaf => {
                error!(path, "core has both threads and a unit");
                Err(Error::CoreWithThreadsAndUnit {
                    path: path.to_string(),
                })
            }
            Some(unit) => {
                self.table.assign(unit, cluster_id, core_id, None);
                Ok(())
            }
            None if leaf => {
                error!(path, "cannot get unit for leaf core");
                Err(Error::UnresolvedLeafCore {
                    path: path.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// Maps a map node to the possible unit it refers to.
    ///
    /// A node without a unit reference maps to nothing without complaint. A reference that does
    /// not lead to a possible unit is logged here; whether that is fatal is up to the caller.
    fn unit_for_node(&self, node: &DescriptionNode, path: &str) -> Option<UnitId> {
        let label = node.unit_ref()?;

        let unit = self
            .description
            .unit_node_by_label(label)
            .map(UnitNode::unit)
            .filter(|unit| self.table.unit(*unit).is_some());

        if unit.is_none() {
            error!(path, label, "unable to find a possible unit for node");
        }

        unit
    }
}

fn read_efficiencies(
    description: &TopologyDescription,
    table: &TopologyTable,
) -> Vec<(UnitId, Capacity)> {
    table
        .iter()
        .filter_map(|(unit, _)| {
            let efficiency = description.unit_node(unit).and_then(UnitNode::efficiency);

            if efficiency.is_none() {
                warn!(unit, "no efficiency attribute, keeping the default");
            }

            efficiency.map(|value| (unit, Capacity::from(value)))
        })
        .collect()
}

/// Iterates over the children named `{prefix}0`, `{prefix}1`, ... up to the first missing index.
fn indexed_children<'n>(
    node: &'n DescriptionNode,
    prefix: &'n str,
) -> impl Iterator<Item = (u32, &'n DescriptionNode)> + 'n {
    (0..=u32::MAX).map_while(move |index| {
        node.child(&format!("{prefix}{index}"))
            .map(|child| (index, child))
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::{ErrorKind, UnitSet};

    fn unit_nodes(description: TopologyDescription, count: u32) -> TopologyDescription {
        (0..count).fold(description, |description, unit| {
            description.with_unit_node(UnitNode::new(format!("cpu{unit}"), unit))
        })
    }

    /// `clusters` clusters of `cores` cores of `threads` threads, units numbered depth-first.
    fn threaded_map(clusters: u32, cores: u32, threads: u32) -> DescriptionNode {
        let mut unit = 0;
        let mut root = DescriptionNode::new("cpu-map");

        for cluster_index in 0..clusters {
            let mut cluster = DescriptionNode::cluster(cluster_index);

            for core_index in 0..cores {
                let mut core = DescriptionNode::core(core_index);

                for thread_index in 0..threads {
                    core = core.with_child(
                        DescriptionNode::thread(thread_index).with_unit(format!("cpu{unit}")),
                    );
                    unit += 1;
                }

                cluster = cluster.with_child(core);
            }

            root = root.with_child(cluster);
        }

        root
    }

    fn parse(
        description: &TopologyDescription,
        unit_count: usize,
    ) -> (TopologyTable, Result<ParseOutcome>) {
        let mut table = TopologyTable::new(unit_count);
        let result = TopologyParser::new(Some(description)).parse_all(&mut table);
        (table, result)
    }

    #[test]
    fn no_description_is_not_an_error() {
        let mut table = TopologyTable::new(4);

        let outcome = TopologyParser::new(None).parse_all(&mut table).unwrap();

        assert!(!outcome.map_present);
        assert_eq!(table, TopologyTable::new(4));
    }

    #[test]
    fn description_without_map_is_not_an_error() {
        let description = unit_nodes(TopologyDescription::new(), 4);

        let (table, result) = parse(&description, 4);

        assert!(!result.unwrap().map_present);
        assert_eq!(table, TopologyTable::new(4));
    }

    #[test]
    fn two_clusters_four_cores_two_threads() {
        let description =
            unit_nodes(TopologyDescription::new(), 16).with_cpu_map(threaded_map(2, 4, 2));

        let (mut table, result) = parse(&description, 16);
        let outcome = result.unwrap();
        table.recompute_all_siblings();

        assert!(outcome.map_present);
        assert_eq!(outcome.cluster_count, 2);

        let clusters: BTreeSet<_> = table
            .iter()
            .map(|(_, record)| record.cluster_id().unwrap())
            .collect();
        assert_eq!(clusters.len(), 2);

        for (unit, record) in table.iter() {
            assert_eq!(record.cluster_id(), Some(unit / 8));
            assert_eq!(record.core_id(), (unit / 2) % 4);
            assert_eq!(record.thread_id(), Some(unit % 2));
            assert_eq!(record.thread_siblings().len(), 2);
            assert_eq!(record.core_siblings().len(), 8);
        }
    }

    #[test]
    fn nested_clusters_are_flattened() {
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0)
                .with_child(
                    DescriptionNode::cluster(0)
                        .with_child(DescriptionNode::core(0).with_unit("cpu0")),
                )
                .with_child(
                    DescriptionNode::cluster(1)
                        .with_child(DescriptionNode::core(0).with_unit("cpu1"))
                        .with_child(DescriptionNode::core(1).with_unit("cpu2")),
                ),
        );
        let description = unit_nodes(TopologyDescription::new(), 3).with_cpu_map(map);

        let (table, result) = parse(&description, 3);

        assert_eq!(result.unwrap().cluster_count, 2);
        assert_eq!(table.unit(0).unwrap().cluster_id(), Some(0));
        assert_eq!(table.unit(1).unwrap().cluster_id(), Some(1));
        assert_eq!(table.unit(2).unwrap().cluster_id(), Some(1));
        assert_eq!(table.unit(2).unwrap().core_id(), 1);
        assert_eq!(table.unit(2).unwrap().thread_id(), None);
    }

    #[test]
    fn index_gap_stops_the_scan() {
        // core1 is missing, so core2 is never seen and cpu1 stays unplaced.
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0)
                .with_child(DescriptionNode::core(0).with_unit("cpu0"))
                .with_child(DescriptionNode::core(2).with_unit("cpu1")),
        );
        let description = unit_nodes(TopologyDescription::new(), 2).with_cpu_map(map);

        let (_, result) = parse(&description, 2);

        match result.unwrap_err() {
            Error::IncompleteTopology { missing } => assert_eq!(missing, UnitSet::single(1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn core_under_root_is_rejected() {
        let map = DescriptionNode::new("cpu-map")
            .with_child(DescriptionNode::core(0).with_unit("cpu0"));
        let description = unit_nodes(TopologyDescription::new(), 1).with_cpu_map(map);

        let (_, result) = parse(&description, 1);

        let error = result.unwrap_err();
        assert!(matches!(error, Error::CoreUnderRoot { .. }));
        assert_eq!(error.kind(), ErrorKind::Structural);
    }

    #[test]
    fn core_in_non_leaf_cluster_is_rejected() {
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0)
                .with_child(
                    DescriptionNode::cluster(0)
                        .with_child(DescriptionNode::core(0).with_unit("cpu0")),
                )
                .with_child(DescriptionNode::core(0).with_unit("cpu1")),
        );
        let description = unit_nodes(TopologyDescription::new(), 2).with_cpu_map(map);

        let (_, result) = parse(&description, 2);

        assert!(matches!(
            result.unwrap_err(),
            Error::CoreInNonLeafCluster { core_name, .. } if core_name == "core0"
        ));
    }

    #[test]
    fn threaded_core_with_unit_is_rejected() {
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0).with_child(
                DescriptionNode::core(0)
                    .with_unit("cpu2")
                    .with_child(DescriptionNode::thread(0).with_unit("cpu0"))
                    .with_child(DescriptionNode::thread(1).with_unit("cpu1")),
            ),
        );
        let description = unit_nodes(TopologyDescription::new(), 3).with_cpu_map(map);

        let (_, result) = parse(&description, 3);

        assert!(matches!(
            result.unwrap_err(),
            Error::CoreWithThreadsAndUnit { .. }
        ));
    }

    #[test]
    fn unresolved_thread_is_rejected() {
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0).with_child(
                DescriptionNode::core(0)
                    .with_child(DescriptionNode::thread(0).with_unit("cpu0"))
                    .with_child(DescriptionNode::thread(1).with_unit("nonexistent")),
            ),
        );
        let description = unit_nodes(TopologyDescription::new(), 2).with_cpu_map(map);

        let (_, result) = parse(&description, 2);

        let error = result.unwrap_err();
        assert!(matches!(error, Error::UnresolvedThread { .. }));
        assert_eq!(error.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn unresolved_leaf_core_is_rejected() {
        let map = DescriptionNode::new("cpu-map")
            .with_child(DescriptionNode::cluster(0).with_child(DescriptionNode::core(0)));
        let description = unit_nodes(TopologyDescription::new(), 1).with_cpu_map(map);

        let (_, result) = parse(&description, 1);

        assert!(matches!(
            result.unwrap_err(),
            Error::UnresolvedLeafCore { .. }
        ));
    }

    #[test]
    fn reference_to_impossible_unit_is_rejected() {
        // The unit node exists but describes a unit beyond the table.
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0)
                .with_child(DescriptionNode::core(0).with_unit("cpu0"))
                .with_child(DescriptionNode::core(1).with_unit("cpu9")),
        );
        let description = unit_nodes(TopologyDescription::new(), 1)
            .with_unit_node(UnitNode::new("cpu9", 9))
            .with_cpu_map(map);

        let (_, result) = parse(&description, 1);

        assert!(matches!(
            result.unwrap_err(),
            Error::UnresolvedLeafCore { .. }
        ));
    }

    #[test]
    fn empty_leaf_cluster_is_only_a_warning() {
        let map = DescriptionNode::new("cpu-map")
            .with_child(
                DescriptionNode::cluster(0).with_child(DescriptionNode::core(0).with_unit("cpu0")),
            )
            .with_child(DescriptionNode::cluster(1))
            .with_child(
                DescriptionNode::cluster(2).with_child(DescriptionNode::core(0).with_unit("cpu1")),
            );
        let description = unit_nodes(TopologyDescription::new(), 2).with_cpu_map(map);

        let (table, result) = parse(&description, 2);

        // The empty cluster still consumes an ID.
        assert_eq!(result.unwrap().cluster_count, 3);
        assert_eq!(table.unit(1).unwrap().cluster_id(), Some(2));
    }

    #[test]
    fn efficiencies_are_collected_for_units_that_have_them() {
        let map = DescriptionNode::new("cpu-map").with_child(
            DescriptionNode::cluster(0)
                .with_child(DescriptionNode::core(0).with_unit("cpu0"))
                .with_child(DescriptionNode::core(1).with_unit("cpu1")),
        );
        let description = TopologyDescription::new()
            .with_unit_node(UnitNode::new("cpu0", 0).with_efficiency(1740))
            .with_unit_node(UnitNode::new("cpu1", 1))
            .with_cpu_map(map);

        let (_, result) = parse(&description, 2);

        assert_eq!(result.unwrap().efficiencies, vec![(0, 1740)]);
    }

    #[test]
    fn cluster_ids_continue_across_calls_only_via_the_accumulator() {
        // Parsing the same description twice into fresh tables gives identical results,
        // because the cluster counter lives in the call chain rather than in the parser.
        let description =
            unit_nodes(TopologyDescription::new(), 8).with_cpu_map(threaded_map(2, 2, 2));
        let parser = TopologyParser::new(Some(&description));

        let mut first = TopologyTable::new(8);
        let mut second = TopologyTable::new(8);
        parser.parse_all(&mut first).unwrap();
        parser.parse_all(&mut second).unwrap();

        assert_eq!(first, second);
    }
}
