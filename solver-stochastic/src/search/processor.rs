//! Processing of a single node: bound, look for a candidate, then prune,
//! close or branch.
//!
//! A processor owns its strategy objects and never touches the tree. The
//! serial driver and every parallel worker each hold one.

use std::collections::BTreeMap;

use super::branching::{BranchContext, BranchingStrategy};
use super::node::{prune_threshold, NodeId, Partition};
use super::partition::{ChildPartition, PartitionStrategy};
use crate::bounding::{
    BoundRequest, BoundsTightener, CandidateContext, LowerBounder, ScenarioBound,
    ScenarioSubproblem, TighteningOutcome, UpperBounder,
};
use crate::error::SbbResult;
use crate::model::{Candidate, FirstStageBounds, ScenarioSet, Solution};
use crate::oracle::GlobalSolver;
use crate::settings::SearchSettings;

/// Strategy objects owned by one processor.
pub struct Strategies {
    /// Lower bounder.
    pub lower: Box<dyn LowerBounder>,

    /// Candidate finder.
    pub upper: Box<dyn UpperBounder>,

    /// Branching variable selection.
    pub branching: Box<dyn BranchingStrategy>,

    /// Split point and scenario clustering.
    pub partition: Box<dyn PartitionStrategy>,

    /// Solver for OBBT, if enabled.
    pub obbt_solver: Option<Box<dyn GlobalSolver>>,
}

/// Everything needed to process one node away from the tree.
#[derive(Debug, Clone)]
pub struct NodeWork {
    /// Node id.
    pub id: NodeId,

    /// Node depth.
    pub depth: usize,

    /// First-stage box.
    pub bounds: FirstStageBounds,

    /// Scenarios whose inherited bound is exact.
    pub partition: Partition,

    /// Lower bound inherited from the parent.
    pub parent_lower_bound: f64,

    /// Bounds inherited from the parent.
    pub scenario_bounds: BTreeMap<String, ScenarioBound>,

    /// Variable split to create the node.
    pub branched_on: Option<String>,

    /// Incumbent objective when the work was sent.
    pub incumbent: f64,

    /// Run the candidate finder at this node.
    pub compute_upper_bound: bool,

    /// Relative tolerance of the solve.
    pub rel_tolerance: f64,
}

/// What happened to a processed node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// A scenario is infeasible over the box.
    Infeasible {
        /// Offending scenario.
        scenario: String,
    },

    /// Lower bound reached the pruning threshold.
    Pruned,

    /// Closed without branching.
    Solved,

    /// Box cannot be split and neither bound nor candidate closes it.
    Unresolved,

    /// Split into children.
    Branched {
        /// Variable that was split.
        variable: String,
        /// Children in order.
        children: Vec<ChildPartition>,
    },
}

/// Result of processing a node, sent back to the tree.
#[derive(Debug, Clone)]
pub struct NodeReport {
    /// Node id.
    pub id: NodeId,

    /// Rank of the processor.
    pub rank: usize,

    /// New lower bound (never below the inherited one).
    pub lower_bound: f64,

    /// Per-scenario bounds for every scenario.
    pub scenario_bounds: BTreeMap<String, ScenarioBound>,

    /// Candidate found at the node.
    pub candidate: Option<Candidate>,

    /// Decision taken.
    pub outcome: NodeOutcome,
}

/// Bounds and branches nodes.
pub struct NodeProcessor {
    rank: usize,
    scenarios: ScenarioSet,
    lower: Box<dyn LowerBounder>,
    upper: Box<dyn UpperBounder>,
    branching: Box<dyn BranchingStrategy>,
    partition: Box<dyn PartitionStrategy>,
    tightener: BoundsTightener,
    settings: SearchSettings,
    incumbent: f64,
}

impl NodeProcessor {
    /// Create a processor.
    pub fn new(
        rank: usize,
        scenarios: ScenarioSet,
        strategies: Strategies,
        settings: SearchSettings,
    ) -> Self {
        let tightener = BoundsTightener::new(settings.tightening.clone(), strategies.obbt_solver);
        Self {
            rank,
            scenarios,
            lower: strategies.lower,
            upper: strategies.upper,
            branching: strategies.branching,
            partition: strategies.partition,
            tightener,
            settings,
            incumbent: f64::INFINITY,
        }
    }

    /// Rank of this processor.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Best objective this processor knows of.
    pub fn incumbent(&self) -> f64 {
        self.incumbent
    }

    /// Process one node.
    pub fn process(&mut self, work: NodeWork) -> SbbResult<NodeReport> {
        if work.incumbent < self.incumbent {
            self.incumbent = work.incumbent;
        }
        let id = work.id;
        let rel_tol = work.rel_tolerance;
        let abs_tol = self.settings.abs_tolerance;

        // === Bound ===
        let mut scenario_bounds = BTreeMap::new();
        let mut fixed = 0.0;
        let mut subproblems = Vec::new();

        for s in self.scenarios.scenarios() {
            let prior = work.scenario_bounds.get(&s.name);
            if work.partition.contains(&s.name) {
                if let Some(prior) = prior {
                    fixed += s.weight * prior.lower_bound;
                    scenario_bounds.insert(s.name.clone(), prior.clone());
                    continue;
                }
            }

            let mut model = self
                .scenarios
                .build_in(&s.name, &work.bounds)
                .map_err(|e| e.at_node(id))?;
            model.set_successor_objective(prior.map_or(f64::NEG_INFINITY, |p| p.lower_bound));

            if self.tightener.tighten(&mut model, work.depth) == TighteningOutcome::Infeasible {
                log::debug!("Node {}: tightening proved '{}' infeasible", id, s.name);
                return Ok(Self::infeasible(self.rank, &work, s.name.clone()));
            }
            subproblems.push(ScenarioSubproblem {
                scenario: s.name.clone(),
                weight: s.weight,
                model,
            });
        }

        let threshold = prune_threshold(self.incumbent, rel_tol, abs_tol);
        let bound = self
            .lower
            .bound(BoundRequest {
                subproblems,
                fixed_contribution: fixed,
                cutoff: threshold.is_finite().then_some(threshold),
            })
            .map_err(|e| e.at_node(id))?;

        if !bound.feasible {
            let scenario = bound.infeasible_scenario.clone().unwrap_or_default();
            return Ok(Self::infeasible(self.rank, &work, scenario));
        }

        for name in &bound.skipped {
            if let Some(prior) = work.scenario_bounds.get(name) {
                scenario_bounds.insert(name.clone(), prior.clone());
            }
        }
        let hit_cutoff = bound.hit_cutoff();
        scenario_bounds.extend(bound.scenarios);
        let lower_bound = bound.bound.max(work.parent_lower_bound);

        if let Some(var) = &work.branched_on {
            if work.parent_lower_bound.is_finite() {
                self.branching
                    .record_improvement(var, lower_bound - work.parent_lower_bound);
            }
        }

        if hit_cutoff {
            return Ok(NodeReport {
                id,
                rank: self.rank,
                lower_bound,
                scenario_bounds,
                candidate: None,
                outcome: NodeOutcome::Pruned,
            });
        }

        // === Candidate ===
        let mut candidate = None;
        if work.compute_upper_bound {
            candidate = self.find_candidate(id, &work.bounds, &scenario_bounds)?;
        }

        // === Decide ===
        let outcome = match self.settle(lower_bound, candidate.as_ref(), rel_tol) {
            Some(outcome) => outcome,
            None => {
                let ctx = BranchContext {
                    scenarios: &self.scenarios,
                    bounds: &work.bounds,
                    scenario_bounds: &scenario_bounds,
                    min_branch_width: self.settings.min_branch_width,
                };
                match self.branching.select(&ctx) {
                    Some(decision) => {
                        let full = Partition::new(scenario_bounds.keys().cloned());
                        let children = self
                            .partition
                            .partition(&ctx, &full, &decision)
                            .map_err(|e| e.at_node(id))?;
                        log::trace!(
                            "Node {}: split '{}' (score {:.3e})",
                            id,
                            decision.variable,
                            decision.score
                        );
                        NodeOutcome::Branched {
                            variable: decision.variable,
                            children,
                        }
                    }
                    None => {
                        // Unsplittable box: the candidate is the last chance to close it
                        if !work.compute_upper_bound {
                            candidate = self.find_candidate(id, &work.bounds, &scenario_bounds)?;
                        }
                        self.settle(lower_bound, candidate.as_ref(), rel_tol)
                            .unwrap_or_else(|| {
                                log::debug!(
                                    "Node {}: box cannot be split, bound {:.6e} left open",
                                    id,
                                    lower_bound
                                );
                                NodeOutcome::Unresolved
                            })
                    }
                }
            }
        };

        Ok(NodeReport {
            id,
            rank: self.rank,
            lower_bound,
            scenario_bounds,
            candidate,
            outcome,
        })
    }

    fn find_candidate(
        &mut self,
        id: NodeId,
        bounds: &FirstStageBounds,
        scenario_bounds: &BTreeMap<String, ScenarioBound>,
    ) -> SbbResult<Option<Candidate>> {
        let ctx = CandidateContext {
            node: id,
            scenarios: &self.scenarios,
            bounds,
            scenario_bounds,
        };
        let candidate = self.upper.candidate(&ctx).map_err(|e| e.at_node(id))?;
        if let Some(c) = &candidate {
            if c.objective < self.incumbent {
                self.incumbent = c.objective;
            }
        }
        Ok(candidate)
    }

    /// Close the node without branching, if its bound or candidate allow it.
    fn settle(
        &self,
        lower_bound: f64,
        candidate: Option<&Candidate>,
        rel_tol: f64,
    ) -> Option<NodeOutcome> {
        let threshold = prune_threshold(self.incumbent, rel_tol, self.settings.abs_tolerance);
        let node_gap = candidate.map_or(f64::INFINITY, |c| {
            Solution::compute_gap(c.objective, lower_bound)
        });
        let singleton_closed = self.scenarios.len() == 1
            && Solution::compute_gap(self.incumbent, lower_bound) <= rel_tol;

        if node_gap <= rel_tol || singleton_closed {
            Some(NodeOutcome::Solved)
        } else if lower_bound >= threshold {
            Some(NodeOutcome::Pruned)
        } else {
            None
        }
    }

    fn infeasible(rank: usize, work: &NodeWork, scenario: String) -> NodeReport {
        NodeReport {
            id: work.id,
            rank,
            lower_bound: f64::INFINITY,
            scenario_bounds: BTreeMap::new(),
            candidate: None,
            outcome: NodeOutcome::Infeasible { scenario },
        }
    }
}
