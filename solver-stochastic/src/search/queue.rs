//! Node priority queue for tree exploration.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{NodeId, SearchNode};
use crate::settings::NodeSelection;

/// Entry in the node queue with priority.
#[derive(Debug)]
struct QueuedNode {
    id: NodeId,
    lower_bound: f64,
    priority: f64, // Higher = selected first
    seq: u64,
}

impl PartialEq for QueuedNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedNode {}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, older entries break ties
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of open nodes.
#[derive(Debug)]
pub struct NodeQueue {
    /// Node selection strategy.
    strategy: NodeSelection,

    /// Priority queue (max-heap by priority).
    heap: BinaryHeap<QueuedNode>,

    /// Count of nodes added.
    nodes_added: u64,

    /// Count of nodes popped.
    nodes_popped: u64,
}

impl NodeQueue {
    /// Create a new node queue with the given strategy.
    pub fn new(strategy: NodeSelection) -> Self {
        Self {
            strategy,
            heap: BinaryHeap::new(),
            nodes_added: 0,
            nodes_popped: 0,
        }
    }

    /// Add a node to the queue.
    pub fn push(&mut self, node: &SearchNode) {
        let priority = self.compute_priority(node);
        self.heap.push(QueuedNode {
            id: node.id,
            lower_bound: node.lower_bound,
            priority,
            seq: self.nodes_added,
        });
        self.nodes_added += 1;
    }

    /// Get the next node to process.
    pub fn pop(&mut self) -> Option<NodeId> {
        let queued = self.heap.pop()?;
        self.nodes_popped += 1;
        Some(queued.id)
    }

    /// Get the best (lowest) lower bound across queued nodes.
    ///
    /// Returns +inf for an empty queue.
    pub fn best_bound(&self) -> f64 {
        self.heap
            .iter()
            .map(|q| q.lower_bound)
            .fold(f64::INFINITY, f64::min)
    }

    /// Remove nodes whose bound reaches the threshold.
    ///
    /// Returns the ids of the removed nodes.
    pub fn prune_by_bound(&mut self, threshold: f64) -> Vec<NodeId> {
        let (pruned, remaining): (Vec<QueuedNode>, Vec<QueuedNode>) = self
            .heap
            .drain()
            .partition(|q| q.lower_bound >= threshold);

        self.heap = remaining.into_iter().collect();
        pruned.into_iter().map(|q| q.id).collect()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Get the number of nodes in the queue.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Get the total number of nodes added.
    pub fn total_added(&self) -> u64 {
        self.nodes_added
    }

    /// Get the total number of nodes popped.
    pub fn total_popped(&self) -> u64 {
        self.nodes_popped
    }

    /// Compute priority for a node based on selection strategy.
    fn compute_priority(&self, node: &SearchNode) -> f64 {
        match self.strategy {
            NodeSelection::BestBound => {
                // Lowest bound first (negate for max-heap)
                -node.lower_bound
            }
            NodeSelection::DepthFirst => node.depth as f64,
            NodeSelection::Hybrid { dive_freq } => {
                if dive_freq > 0 && self.nodes_added % dive_freq as u64 == 0 {
                    node.depth as f64
                } else {
                    -node.lower_bound
                }
            }
        }
    }
}
