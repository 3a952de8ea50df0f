//! Branch-and-bound over the first-stage box.
//!
//! The tree ([`SearchTree`]) owns nodes, the open queue and the incumbent.
//! Nodes are processed by a [`NodeProcessor`], which bounds every scenario,
//! optionally looks for a candidate, and either closes the node or splits its
//! box with a [`BranchingStrategy`] and a [`PartitionStrategy`].

mod branching;
mod node;
mod partition;
mod processor;
mod queue;
mod tree;

pub use branching::{
    BranchContext, BranchDecision, BranchingStrategy, HybridBranching, MaximumDisagreement,
};
pub use node::{prune_threshold, NodeId, NodeStatus, Partition, SearchNode};
pub use partition::{split_children, ChildPartition, ExpectedValue, Midpoint, PartitionStrategy};
pub use processor::{NodeOutcome, NodeProcessor, NodeReport, NodeWork, Strategies};
pub use queue::NodeQueue;
pub use tree::{SearchLimits, SearchTree, TreeStats};
