//! The hierarchical topology description consumed by the parser.
//!
//! The description mirrors what firmware provides: a list of unit nodes (one per possible unit,
//! each with a label and optional attributes) and an optional map whose nodes are named
//! `clusterN`, `coreN` and `threadN`. Leaf nodes of the map refer to unit nodes by label.

use crate::UnitId;

/// A node of the topology map.
///
/// # Example
///
/// ```
/// use sched_topology::DescriptionNode;
///
/// // A cluster with two single-threaded cores.
/// let cluster = DescriptionNode::cluster(0)
///     .with_child(DescriptionNode::core(0).with_unit("cpu0"))
///     .with_child(DescriptionNode::core(1).with_unit("cpu1"));
///
/// assert!(cluster.child("core1").is_some());
/// assert_eq!(cluster.child("core1").unwrap().unit_ref(), Some("cpu1"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DescriptionNode {
    name: String,
    unit_ref: Option<String>,
    children: Vec<DescriptionNode>,
}

impl DescriptionNode {
    /// Creates a node with the given name, no unit reference and no children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit_ref: None,
            children: Vec::new(),
        }
    }

    /// Creates a node named `cluster{index}`.
    #[must_use]
    pub fn cluster(index: u32) -> Self {
        Self::new(format!("cluster{index}"))
    }

    /// Creates a node named `core{index}`.
    #[must_use]
    pub fn core(index: u32) -> Self {
        Self::new(format!("core{index}"))
    }

    /// Creates a node named `thread{index}`.
    #[must_use]
    pub fn thread(index: u32) -> Self {
        Self::new(format!("thread{index}"))
    }

    /// Makes the node refer to the unit node with the given label.
    #[must_use]
    pub fn with_unit(mut self, label: impl Into<String>) -> Self {
        self.unit_ref = Some(label.into());
        self
    }

    /// Adds a child node.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// The name of the node.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The label of the unit node this node refers to, if any.
    #[must_use]
    pub fn unit_ref(&self) -> Option<&str> {
        self.unit_ref.as_deref()
    }

    /// The child with the given name, if present.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All children, in insertion order.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Describes one possible unit: the label map nodes use to refer to it, and its attributes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitNode {
    label: String,
    unit: UnitId,
    efficiency: Option<u32>,
}

impl UnitNode {
    /// Creates a unit node for `unit` with the given label and no efficiency attribute.
    #[must_use]
    pub fn new(label: impl Into<String>, unit: UnitId) -> Self {
        Self {
            label: label.into(),
            unit,
            efficiency: None,
        }
    }

    /// Sets the efficiency attribute.
    #[must_use]
    pub fn with_efficiency(mut self, efficiency: u32) -> Self {
        self.efficiency = Some(efficiency);
        self
    }

    /// The label of the node.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The unit the node describes.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// The efficiency attribute, if present.
    #[must_use]
    pub fn efficiency(&self) -> Option<u32> {
        self.efficiency
    }
}

/// A complete topology description: the unit nodes plus an optional topology map.
///
/// # Example
///
/// ```
/// use sched_topology::{DescriptionNode, TopologyDescription, UnitNode};
///
/// let description = TopologyDescription::new()
///     .with_unit_node(UnitNode::new("cpu0", 0).with_efficiency(1024))
///     .with_unit_node(UnitNode::new("cpu1", 1).with_efficiency(1024))
///     .with_cpu_map(
///         DescriptionNode::new("cpu-map").with_child(
///             DescriptionNode::cluster(0)
///                 .with_child(DescriptionNode::core(0).with_unit("cpu0"))
///                 .with_child(DescriptionNode::core(1).with_unit("cpu1")),
///         ),
///     );
///
/// assert_eq!(description.unit_node_by_label("cpu1").unwrap().unit(), 1);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TopologyDescription {
    unit_nodes: Vec<UnitNode>,
    cpu_map: Option<DescriptionNode>,
}

impl TopologyDescription {
    /// Path under which the topology map lives, used in diagnostics.
    pub const CPU_MAP_PATH: &'static str = "/cpus/cpu-map";

    /// Creates a description with no unit nodes and no topology map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit node.
    #[must_use]
    pub fn with_unit_node(mut self, node: UnitNode) -> Self {
        self.unit_nodes.push(node);
        self
    }

    /// Sets the root of the topology map. The root is treated as a cluster that may only
    /// contain clusters.
    #[must_use]
    pub fn with_cpu_map(mut self, root: DescriptionNode) -> Self {
        self.cpu_map = Some(root);
        self
    }

    /// The root of the topology map, if present.
    #[must_use]
    pub fn cpu_map(&self) -> Option<&DescriptionNode> {
        self.cpu_map.as_ref()
    }

    /// All unit nodes.
    #[must_use]
    pub fn unit_nodes(&self) -> &[UnitNode] {
        &self.unit_nodes
    }

    /// The unit node with the given label, if any.
    #[must_use]
    pub fn unit_node_by_label(&self, label: &str) -> Option<&UnitNode> {
        self.unit_nodes.iter().find(|node| node.label == label)
    }

    /// The unit node describing `unit`, if any.
    #[must_use]
    pub fn unit_node(&self, unit: UnitId) -> Option<&UnitNode> {
        self.unit_nodes.iter().find(|node| node.unit == unit)
    }
}
