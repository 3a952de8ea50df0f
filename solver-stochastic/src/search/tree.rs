//! Search tree controller.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::node::{prune_threshold, NodeId, NodeStatus, Partition, SearchNode};
use super::processor::{NodeOutcome, NodeReport, NodeWork};
use super::queue::NodeQueue;
use crate::model::{
    Candidate, FirstStageBounds, IncumbentTracker, SearchLimit, Solution, TerminationReason,
};
use crate::settings::SearchSettings;

/// Budgets and tolerance of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    /// Maximum processed nodes.
    pub max_iterations: u64,

    /// Relative gap at which the search stops.
    pub rel_tolerance: f64,

    /// Wall-clock budget (None = unlimited).
    pub time_limit: Option<Duration>,
}

/// Search tree controller.
///
/// Owns the node arena, the open queue and the incumbent. Nodes are handed
/// out as [`NodeWork`] and their [`NodeReport`]s applied back, so the same
/// controller drives the serial loop and the parallel coordinator.
pub struct SearchTree {
    /// Node arena, indexed by [`NodeId`].
    nodes: Vec<SearchNode>,

    /// Open nodes.
    queue: NodeQueue,

    /// Nodes handed out and not yet reported.
    in_flight: BTreeSet<NodeId>,

    /// Unsplittable nodes whose gap stayed open.
    unresolved: Vec<NodeId>,

    /// Incumbent solution tracker.
    pub incumbent: IncumbentTracker,

    /// Processed nodes.
    iterations: u64,

    /// Nodes pruned by bound.
    nodes_pruned: u64,

    /// Nodes proven infeasible.
    nodes_infeasible: u64,

    /// Deepest node created.
    max_depth: usize,

    /// Start time.
    start_time: Instant,

    /// Settings.
    settings: SearchSettings,

    /// Limits.
    limits: SearchLimits,
}

impl SearchTree {
    /// Create a tree whose root covers `bounds` and `partition`.
    pub fn new(
        settings: SearchSettings,
        limits: SearchLimits,
        bounds: FirstStageBounds,
        partition: Partition,
    ) -> Self {
        let root = SearchNode::root(bounds, partition);
        let mut queue = NodeQueue::new(settings.node_selection);
        queue.push(&root);
        Self {
            nodes: vec![root],
            queue,
            in_flight: BTreeSet::new(),
            unresolved: Vec::new(),
            incumbent: IncumbentTracker::new(),
            iterations: 0,
            nodes_pruned: 0,
            nodes_infeasible: 0,
            max_depth: 0,
            start_time: Instant::now(),
            settings,
            limits,
        }
    }

    /// Access a node.
    pub fn node(&self, id: NodeId) -> Option<&SearchNode> {
        self.nodes.get(id.0)
    }

    /// All nodes created so far.
    pub fn nodes(&self) -> &[SearchNode] {
        &self.nodes
    }

    /// Processed node count.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Nodes currently handed out.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Open nodes in the queue.
    pub fn open_nodes(&self) -> usize {
        self.queue.len()
    }

    fn threshold(&self) -> f64 {
        prune_threshold(
            self.incumbent.obj_val,
            self.limits.rel_tolerance,
            self.settings.abs_tolerance,
        )
    }

    /// Pop the next live node and package it for processing.
    ///
    /// Nodes that became prunable while queued are closed on the way.
    pub fn next_work(&mut self) -> Option<NodeWork> {
        let threshold = self.threshold();
        loop {
            let id = self.queue.pop()?;
            let node = &mut self.nodes[id.0];
            if node.can_prune(threshold) {
                node.status = NodeStatus::Pruned;
                self.nodes_pruned += 1;
                continue;
            }

            let parent_lower_bound = node.lower_bound;
            let work = NodeWork {
                id,
                depth: node.depth,
                bounds: node.bounds.clone(),
                partition: node.partition.clone(),
                parent_lower_bound,
                scenario_bounds: node.scenario_bounds.clone(),
                branched_on: node.branched_on.clone(),
                incumbent: self.incumbent.obj_val,
                compute_upper_bound: self.settings.runs_upper_bound(self.iterations),
                rel_tolerance: self.limits.rel_tolerance,
            };
            self.in_flight.insert(id);
            return Some(work);
        }
    }

    /// Apply a processed node's report.
    pub fn apply_report(&mut self, report: NodeReport) {
        let id = report.id;
        self.in_flight.remove(&id);
        self.iterations += 1;

        if let Some(candidate) = report.candidate {
            self.update_incumbent(candidate);
        }

        let node = &mut self.nodes[id.0];
        node.raise_lower_bound(report.lower_bound);
        node.status = NodeStatus::Bounded;
        node.scenario_bounds = report.scenario_bounds;
        node.partition = Partition::new(node.scenario_bounds.keys().cloned());

        match report.outcome {
            NodeOutcome::Infeasible { scenario } => {
                log::debug!("Node {} infeasible (scenario '{}')", id, scenario);
                node.status = NodeStatus::Pruned;
                self.nodes_infeasible += 1;
            }
            NodeOutcome::Pruned => {
                node.status = NodeStatus::Pruned;
                self.nodes_pruned += 1;
            }
            NodeOutcome::Solved => {
                node.status = NodeStatus::Solved;
            }
            NodeOutcome::Unresolved => {
                node.status = NodeStatus::Unresolved;
                self.unresolved.push(id);
            }
            NodeOutcome::Branched { variable, children } => {
                node.status = NodeStatus::Branched;
                let threshold = self.threshold();
                for child in children {
                    let child_id = NodeId(self.nodes.len());
                    let parent = &self.nodes[id.0];
                    let mut node = parent.child(child_id, child.bounds, child.partition, &variable);
                    self.max_depth = self.max_depth.max(node.depth);
                    if node.can_prune(threshold) {
                        node.status = NodeStatus::Pruned;
                        self.nodes_pruned += 1;
                    } else {
                        self.queue.push(&node);
                    }
                    self.nodes.push(node);
                    self.nodes[id.0].children.push(child_id);
                }
            }
        }
    }

    /// Offer a candidate; on improvement, prune the queue.
    pub fn update_incumbent(&mut self, candidate: Candidate) -> bool {
        let obj = candidate.objective;
        if !self.incumbent.update(candidate) {
            return false;
        }
        if self.settings.verbose {
            log::info!(
                "New incumbent: {:.6e} (gap: {:.2}%)",
                obj,
                self.gap() * 100.0
            );
        }
        let pruned = self.queue.prune_by_bound(self.threshold());
        self.nodes_pruned += pruned.len() as u64;
        for id in pruned {
            self.nodes[id.0].status = NodeStatus::Pruned;
        }
        true
    }

    /// Lowest bound among unresolved nodes the incumbent does not prune.
    fn unresolved_bound(&self) -> f64 {
        let threshold = self.threshold();
        self.unresolved
            .iter()
            .map(|id| self.nodes[id.0].lower_bound)
            .filter(|&lb| lb < threshold)
            .fold(f64::INFINITY, f64::min)
    }

    /// Global lower bound over open, in-flight and unresolved nodes.
    ///
    /// Equals the incumbent (or +inf) once nothing is left to explore.
    pub fn best_bound(&self) -> f64 {
        let in_flight = self
            .in_flight
            .iter()
            .map(|id| self.nodes[id.0].lower_bound)
            .fold(f64::INFINITY, f64::min);
        let bound = self
            .queue
            .best_bound()
            .min(in_flight)
            .min(self.unresolved_bound());
        if bound.is_infinite() && bound > 0.0 {
            self.incumbent.obj_val
        } else {
            bound
        }
    }

    /// Current relative gap.
    pub fn gap(&self) -> f64 {
        self.incumbent.gap(self.best_bound())
    }

    /// Elapsed time since the tree was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if time limit exceeded.
    pub fn time_limit_exceeded(&self) -> bool {
        self.limits
            .time_limit
            .map_or(false, |limit| self.elapsed() >= limit)
    }

    /// Returns true once neither open nor in-flight nodes remain.
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Check termination conditions.
    pub fn check_termination(&self) -> Option<TerminationReason> {
        let found = self.incumbent.has_incumbent();

        // Tree exhausted
        if self.is_exhausted() {
            if self.unresolved_bound() < f64::INFINITY {
                return Some(if found && self.gap() <= self.limits.rel_tolerance {
                    TerminationReason::OptimalWithinTolerance
                } else {
                    Self::limit_reason(found, SearchLimit::BranchWidth)
                });
            }
            return Some(if found {
                TerminationReason::Optimal
            } else {
                TerminationReason::Infeasible
            });
        }

        // Time limit
        if self.time_limit_exceeded() {
            return Some(Self::limit_reason(found, SearchLimit::Time));
        }

        // Iteration limit
        if self.iterations >= self.limits.max_iterations {
            return Some(Self::limit_reason(found, SearchLimit::Iterations));
        }

        // Gap closed
        if found && self.gap() <= self.limits.rel_tolerance {
            return Some(TerminationReason::OptimalWithinTolerance);
        }

        None
    }

    fn limit_reason(found: bool, limit: SearchLimit) -> TerminationReason {
        if found {
            TerminationReason::LimitReached(limit)
        } else {
            TerminationReason::InfeasibleOrUnresolved(limit)
        }
    }

    /// Build the final solution.
    pub fn finalize(&self, reason: TerminationReason) -> Solution {
        let candidate = self.incumbent.candidate.clone();
        let lower_bound = match reason {
            TerminationReason::Optimal => self.incumbent.obj_val,
            TerminationReason::Infeasible => f64::INFINITY,
            _ => self.best_bound(),
        };
        let (objective, first_stage, subproblem_solutions) = match candidate {
            Some(c) => (Some(c.objective), c.first_stage, c.subproblem_solutions),
            None => (None, Default::default(), Default::default()),
        };

        if self.settings.verbose {
            log::info!(
                "Search finished: {} after {} iterations ({:.1}s)",
                reason,
                self.iterations,
                self.elapsed().as_secs_f64()
            );
        }

        Solution {
            reason,
            proven_optimal: reason.is_optimal(),
            objective,
            lower_bound,
            gap: objective.map_or(f64::INFINITY, |obj| Solution::compute_gap(obj, lower_bound)),
            first_stage,
            subproblem_solutions,
            stats: self.stats(),
        }
    }

    /// Log progress (if verbose).
    pub fn log_progress(&self) {
        if !self.settings.verbose {
            return;
        }

        if self.iterations % self.settings.log_freq.max(1) != 0 {
            return;
        }

        log::info!(
            "Iter: {} ({} open, {} busy) | Bound: {:.6e} | Incumbent: {:.6e} | Gap: {:.2}% | Time: {:.1}s",
            self.iterations,
            self.queue.len(),
            self.in_flight.len(),
            self.best_bound(),
            self.incumbent.obj_val,
            self.gap() * 100.0,
            self.elapsed().as_secs_f64(),
        );
    }

    /// Get solver statistics.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            iterations: self.iterations,
            nodes_created: self.nodes.len() as u64,
            nodes_pruned: self.nodes_pruned,
            nodes_infeasible: self.nodes_infeasible,
            nodes_open: self.queue.len() as u64,
            max_depth: self.max_depth,
            incumbent_updates: self.incumbent.update_count,
            best_bound: self.best_bound(),
            incumbent_obj: self.incumbent.obj_val,
            gap: self.gap(),
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }
}

/// Search statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeStats {
    pub iterations: u64,
    pub nodes_created: u64,
    pub nodes_pruned: u64,
    pub nodes_infeasible: u64,
    pub nodes_open: u64,
    pub max_depth: usize,
    pub incumbent_updates: u64,
    pub best_bound: f64,
    pub incumbent_obj: f64,
    pub gap: f64,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarDomain, VarRange};
    use crate::search::ChildPartition;
    use std::collections::BTreeMap;

    fn tree(max_iterations: u64) -> SearchTree {
        let mut bounds = FirstStageBounds::new();
        bounds.insert(
            "x",
            VarRange {
                lb: 0.0,
                ub: 4.0,
                domain: VarDomain::Continuous,
            },
        );
        SearchTree::new(
            SearchSettings::default(),
            SearchLimits {
                max_iterations,
                rel_tolerance: 1e-4,
                time_limit: None,
            },
            bounds,
            Partition::new(["a", "b"]),
        )
    }

    fn candidate(obj: f64) -> Candidate {
        Candidate {
            first_stage: BTreeMap::from([("x".to_string(), 2.0)]),
            objective: obj,
            subproblem_solutions: BTreeMap::new(),
        }
    }

    fn branch_report(tree: &SearchTree, id: NodeId, lower_bound: f64) -> NodeReport {
        let bounds = tree.node(id).unwrap().bounds.clone();
        let range = *bounds.get("x").unwrap();
        let mid = range.midpoint();
        NodeReport {
            id,
            rank: 0,
            lower_bound,
            scenario_bounds: BTreeMap::new(),
            candidate: None,
            outcome: NodeOutcome::Branched {
                variable: "x".into(),
                children: vec![
                    ChildPartition {
                        bounds: bounds.with_range("x", range.lb, mid),
                        partition: Partition::new(["a"]),
                    },
                    ChildPartition {
                        bounds: bounds.with_range("x", mid, range.ub),
                        partition: Partition::new(["b"]),
                    },
                ],
            },
        }
    }

    #[test]
    fn test_tree_initialization() {
        let mut tree = tree(100);
        assert_eq!(tree.open_nodes(), 1);
        assert_eq!(tree.best_bound(), f64::NEG_INFINITY);
        assert!(tree.check_termination().is_none());

        let work = tree.next_work().unwrap();
        assert_eq!(work.id, NodeId(0));
        assert!(work.compute_upper_bound);
        assert_eq!(tree.in_flight(), 1);
        assert!(!tree.is_exhausted());
    }

    #[test]
    fn test_branching_creates_children() {
        let mut tree = tree(100);
        let work = tree.next_work().unwrap();
        let report = branch_report(&tree, work.id, 1.0);
        tree.apply_report(report);

        let root = tree.node(NodeId(0)).unwrap();
        assert_eq!(root.status, NodeStatus::Branched);
        assert_eq!(root.children, vec![NodeId(1), NodeId(2)]);
        assert_eq!(tree.open_nodes(), 2);
        assert_eq!(tree.best_bound(), 1.0);

        let child = tree.node(NodeId(2)).unwrap();
        assert_eq!(child.lower_bound, 1.0);
        assert_eq!(child.depth, 1);
        assert_eq!(child.bounds.get("x").unwrap().lb, 2.0);
    }

    #[test]
    fn test_incumbent_prunes_queue() {
        let mut tree = tree(100);
        let work = tree.next_work().unwrap();
        tree.apply_report(branch_report(&tree, work.id, 1.0));

        assert!(tree.update_incumbent(candidate(1.0)));
        assert!(!tree.update_incumbent(candidate(2.0)));
        assert_eq!(tree.open_nodes(), 0);
        assert_eq!(tree.node(NodeId(1)).unwrap().status, NodeStatus::Pruned);
        assert_eq!(
            tree.check_termination(),
            Some(TerminationReason::Optimal)
        );

        let solution = tree.finalize(TerminationReason::Optimal);
        assert_eq!(solution.objective, Some(1.0));
        assert_eq!(solution.gap, 0.0);
        assert!(solution.proven_optimal);
    }

    #[test]
    fn test_termination_gap() {
        let mut tree = tree(100);
        let work = tree.next_work().unwrap();
        tree.apply_report(branch_report(&tree, work.id, 9.9999));
        tree.incumbent.update(candidate(10.0));
        // 1e-5 relative gap, not pruned by the queue
        assert_eq!(
            tree.check_termination(),
            Some(TerminationReason::OptimalWithinTolerance)
        );
    }

    #[test]
    fn test_iteration_limit() {
        let mut tree = tree(1);
        let work = tree.next_work().unwrap();
        tree.apply_report(branch_report(&tree, work.id, 0.0));
        assert_eq!(
            tree.check_termination(),
            Some(TerminationReason::InfeasibleOrUnresolved(SearchLimit::Iterations))
        );
        let solution = tree.finalize(TerminationReason::InfeasibleOrUnresolved(
            SearchLimit::Iterations,
        ));
        assert!(solution.objective.is_none());
        assert_eq!(solution.lower_bound, 0.0);
    }

    #[test]
    fn test_infeasible_root() {
        let mut tree = tree(100);
        let work = tree.next_work().unwrap();
        tree.apply_report(NodeReport {
            id: work.id,
            rank: 0,
            lower_bound: f64::INFINITY,
            scenario_bounds: BTreeMap::new(),
            candidate: None,
            outcome: NodeOutcome::Infeasible {
                scenario: "a".into(),
            },
        });
        assert_eq!(tree.node(NodeId(0)).unwrap().status, NodeStatus::Pruned);
        assert!(!tree.incumbent.has_incumbent());
        assert_eq!(tree.check_termination(), Some(TerminationReason::Infeasible));
        assert_eq!(tree.stats().nodes_infeasible, 1);
    }

    fn leaf_report(id: NodeId, lower_bound: f64, outcome: NodeOutcome) -> NodeReport {
        NodeReport {
            id,
            rank: 0,
            lower_bound,
            scenario_bounds: BTreeMap::new(),
            candidate: None,
            outcome,
        }
    }

    #[test]
    fn test_unresolved_node_keeps_its_bound() {
        let mut tree = tree(100);
        let work = tree.next_work().unwrap();
        tree.apply_report(branch_report(&tree, work.id, 0.0));
        tree.update_incumbent(candidate(5.0));

        let left = tree.next_work().unwrap();
        tree.apply_report(leaf_report(left.id, 0.5, NodeOutcome::Unresolved));
        let right = tree.next_work().unwrap();
        tree.apply_report(leaf_report(right.id, 6.0, NodeOutcome::Pruned));

        assert!(tree.is_exhausted());
        assert_eq!(tree.node(left.id).unwrap().status, NodeStatus::Unresolved);
        assert_eq!(tree.best_bound(), 0.5);
        assert_eq!(
            tree.check_termination(),
            Some(TerminationReason::LimitReached(SearchLimit::BranchWidth))
        );
        let solution = tree.finalize(TerminationReason::LimitReached(SearchLimit::BranchWidth));
        assert!(!solution.proven_optimal);
        assert_eq!(solution.lower_bound, 0.5);
        assert!((solution.gap - 0.9).abs() < 1e-12);

        // A better incumbent prunes the unresolved node
        tree.update_incumbent(candidate(0.5));
        assert_eq!(tree.check_termination(), Some(TerminationReason::Optimal));
    }
}
