//! Search node representation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::bounding::ScenarioBound;
use crate::model::{FirstStageBounds, ScenarioSet};

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a search node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Waiting to be bounded.
    Open,

    /// Bounded, decision pending.
    Bounded,

    /// Children were created.
    Branched,

    /// Bound >= incumbent, or infeasible.
    Pruned,

    /// Closed without branching (gap within tolerance).
    Solved,

    /// Box cannot be split and its gap stays open; its bound still counts.
    Unresolved,
}

/// A set of scenarios assigned to a node.
///
/// At a freshly created child these are the scenarios whose bound is
/// inherited verbatim from the parent; once the node is bounded it holds a
/// bound for every scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    scenarios: BTreeSet<String>,
}

impl Partition {
    /// Partition from scenario names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scenarios: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Partition containing every scenario of a set.
    pub fn full(set: &ScenarioSet) -> Self {
        Self::new(set.names())
    }

    /// Check membership.
    pub fn contains(&self, scenario: &str) -> bool {
        self.scenarios.contains(scenario)
    }

    /// Add a scenario.
    pub fn insert(&mut self, scenario: impl Into<String>) {
        self.scenarios.insert(scenario.into());
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Returns true if no scenario is assigned.
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Iterate over scenario names in order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.scenarios.iter()
    }

    /// Returns true if the two partitions share no scenario.
    pub fn is_disjoint(&self, other: &Partition) -> bool {
        self.scenarios.is_disjoint(&other.scenarios)
    }

    /// Union of several partitions.
    pub fn union_of<'a>(parts: impl IntoIterator<Item = &'a Partition>) -> Partition {
        let mut out = Partition::default();
        for p in parts {
            out.scenarios.extend(p.scenarios.iter().cloned());
        }
        out
    }
}

/// A node in the search tree.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Arena index.
    pub id: NodeId,

    /// Parent node (None for root).
    pub parent: Option<NodeId>,

    /// Children in creation order.
    pub children: Vec<NodeId>,

    /// Depth in the tree (0 for root).
    pub depth: usize,

    /// First-stage box.
    pub bounds: FirstStageBounds,

    /// Scenarios whose bound this node holds.
    pub partition: Partition,

    /// Lower bound on the optimal objective in this subtree.
    pub lower_bound: f64,

    /// Objective of the best candidate found at this node.
    pub upper_bound: f64,

    /// Node processing status.
    pub status: NodeStatus,

    /// Per-scenario bounds: inherited from the parent until bounded.
    pub scenario_bounds: BTreeMap<String, ScenarioBound>,

    /// First-stage variable split to create this node.
    pub branched_on: Option<String>,
}

impl SearchNode {
    /// Create the root node.
    pub fn root(bounds: FirstStageBounds, partition: Partition) -> Self {
        Self {
            id: NodeId(0),
            parent: None,
            children: Vec::new(),
            depth: 0,
            bounds,
            partition,
            lower_bound: f64::NEG_INFINITY,
            upper_bound: f64::INFINITY,
            status: NodeStatus::Open,
            scenario_bounds: BTreeMap::new(),
            branched_on: None,
        }
    }

    /// Create a child owning a sub-box and a sub-partition.
    pub fn child(
        &self,
        id: NodeId,
        bounds: FirstStageBounds,
        partition: Partition,
        branched_on: &str,
    ) -> Self {
        Self {
            id,
            parent: Some(self.id),
            children: Vec::new(),
            depth: self.depth + 1,
            bounds,
            partition,
            lower_bound: self.lower_bound, // Inherit parent's bound initially
            upper_bound: f64::INFINITY,
            status: NodeStatus::Open,
            scenario_bounds: self.scenario_bounds.clone(),
            branched_on: Some(branched_on.to_string()),
        }
    }

    /// Raise the lower bound; never lowers it.
    pub fn raise_lower_bound(&mut self, value: f64) {
        if value > self.lower_bound {
            self.lower_bound = value;
        }
    }

    /// Check if this node can be pruned against a threshold
    /// (incumbent minus tolerance).
    pub fn can_prune(&self, threshold: f64) -> bool {
        self.lower_bound >= threshold
    }

    /// Returns true once the node will not be processed again.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            NodeStatus::Branched
                | NodeStatus::Pruned
                | NodeStatus::Solved
                | NodeStatus::Unresolved
        )
    }
}

/// Pruning threshold for an incumbent objective.
///
/// A node is pruned iff its lower bound is at least
/// `incumbent - max(abs_tol, rel_tol * |incumbent|)`.
pub fn prune_threshold(incumbent: f64, rel_tol: f64, abs_tol: f64) -> f64 {
    if !incumbent.is_finite() {
        return f64::INFINITY;
    }
    incumbent - abs_tol.max(rel_tol * incumbent.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarDomain, VarRange};

    fn bounds() -> FirstStageBounds {
        let mut b = FirstStageBounds::new();
        b.insert(
            "x",
            VarRange {
                lb: 0.0,
                ub: 1.0,
                domain: VarDomain::Continuous,
            },
        );
        b
    }

    #[test]
    fn test_root_node() {
        let root = SearchNode::root(bounds(), Partition::new(["a", "b"]));
        assert_eq!(root.id, NodeId(0));
        assert!(root.parent.is_none());
        assert_eq!(root.depth, 0);
        assert_eq!(root.lower_bound, f64::NEG_INFINITY);
        assert_eq!(root.upper_bound, f64::INFINITY);
        assert_eq!(root.status, NodeStatus::Open);
    }

    #[test]
    fn test_child_node() {
        let mut root = SearchNode::root(bounds(), Partition::new(["a", "b"]));
        root.raise_lower_bound(3.0);
        let child = root.child(
            NodeId(1),
            bounds().with_range("x", 0.0, 0.5),
            Partition::new(["a"]),
            "x",
        );

        assert_eq!(child.parent, Some(NodeId(0)));
        assert_eq!(child.depth, 1);
        assert_eq!(child.lower_bound, 3.0);
        assert_eq!(child.branched_on.as_deref(), Some("x"));
        assert_eq!(child.bounds.get("x").unwrap().ub, 0.5);
    }

    #[test]
    fn test_lower_bound_monotone() {
        let mut node = SearchNode::root(bounds(), Partition::default());
        node.raise_lower_bound(5.0);
        node.raise_lower_bound(2.0);
        assert_eq!(node.lower_bound, 5.0);
    }

    #[test]
    fn test_pruning() {
        let mut node = SearchNode::root(bounds(), Partition::default());
        node.lower_bound = 10.0;

        assert!(!node.can_prune(prune_threshold(15.0, 1e-3, 1e-6)));
        assert!(node.can_prune(prune_threshold(10.0, 1e-3, 1e-6)));
        assert!(node.can_prune(prune_threshold(8.0, 1e-3, 1e-6)));
        assert!(!node.can_prune(prune_threshold(f64::INFINITY, 1e-3, 1e-6)));
    }

    #[test]
    fn test_partition_set_ops() {
        let a = Partition::new(["s1", "s2"]);
        let b = Partition::new(["s3"]);
        assert!(a.is_disjoint(&b));
        let u = Partition::union_of([&a, &b]);
        assert_eq!(u.len(), 3);
        assert!(u.contains("s3"));
    }
}
