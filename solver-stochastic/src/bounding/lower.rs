//! Lower bounding of scenario subproblems with nonanticipativity dropped.
//!
//! Every scenario is solved independently over the node's first-stage box.
//! The weighted sum of the per-scenario bounds is a valid lower bound on the
//! expected objective over that box.

use std::collections::BTreeMap;

use crate::error::{SbbError, SbbResult};
use crate::model::SubproblemModel;
use crate::oracle::{GlobalSolveOptions, GlobalSolver, TerminationStatus};

/// Result of bounding one subproblem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundSolveResult {
    /// False iff the subproblem was proven infeasible.
    pub feasible: bool,

    /// Valid lower bound (None when infeasible).
    pub bound: Option<f64>,
}

impl BoundSolveResult {
    /// A feasible result with a bound.
    pub fn feasible(bound: f64) -> Self {
        Self {
            feasible: true,
            bound: Some(bound),
        }
    }

    /// An infeasible result.
    pub fn infeasible() -> Self {
        Self {
            feasible: false,
            bound: None,
        }
    }
}

/// Bound and solution recorded for one scenario at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioBound {
    /// Lower bound on the scenario's objective over the node's box.
    pub lower_bound: f64,

    /// First-stage values of the scenario's solution.
    pub first_stage: BTreeMap<String, f64>,

    /// All variable values of the scenario's solution.
    pub values: BTreeMap<String, f64>,

    /// Objective of the loaded solution, if reported.
    pub objective: Option<f64>,
}

impl ScenarioBound {
    /// Capture the bound and loaded solution of a model.
    pub fn from_model(model: &SubproblemModel, lower_bound: f64) -> Self {
        Self {
            lower_bound,
            first_stage: model.first_stage_values(),
            values: model.values(),
            objective: model.objective_value(),
        }
    }
}

/// One scenario to bound at a node.
#[derive(Debug)]
pub struct ScenarioSubproblem {
    /// Scenario name.
    pub scenario: String,

    /// Normalised probability.
    pub weight: f64,

    /// Model restricted to the node's box, successor objective set.
    pub model: SubproblemModel,
}

/// Request to bound the scenarios of a node.
#[derive(Debug)]
pub struct BoundRequest {
    /// Scenarios to solve, in order.
    pub subproblems: Vec<ScenarioSubproblem>,

    /// Weighted bound already known for scenarios not in this request.
    pub fixed_contribution: f64,

    /// Stop solving once the node bound provably reaches this value.
    pub cutoff: Option<f64>,
}

/// Aggregate bound over a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionBound {
    /// False iff some scenario is infeasible over the box.
    pub feasible: bool,

    /// First infeasible scenario.
    pub infeasible_scenario: Option<String>,

    /// Weighted lower bound including the fixed contribution.
    pub bound: f64,

    /// Bounds of the solved scenarios.
    pub scenarios: BTreeMap<String, ScenarioBound>,

    /// Scenarios left unsolved after the cutoff was reached.
    pub skipped: Vec<String>,
}

impl PartitionBound {
    fn infeasible(scenario: String) -> Self {
        Self {
            feasible: false,
            infeasible_scenario: Some(scenario),
            bound: f64::INFINITY,
            scenarios: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Returns true if solving stopped at the cutoff.
    pub fn hit_cutoff(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Computes lower bounds on scenario subproblems.
pub trait LowerBounder: Send {
    /// Solve one subproblem, loading the solution into `model` on success.
    ///
    /// Must never report a value above the subproblem's true optimum.
    fn solve_subproblem(&mut self, model: &mut SubproblemModel) -> SbbResult<BoundSolveResult>;

    /// Bound every scenario of a request.
    ///
    /// Each scenario contributes `max(result, successor objective)`. Any
    /// infeasible scenario makes the whole box infeasible.
    fn bound(&mut self, request: BoundRequest) -> SbbResult<PartitionBound> {
        let pending: Vec<f64> = request
            .subproblems
            .iter()
            .map(|s| s.weight * s.model.successor_objective())
            .collect();
        let names: Vec<String> = request
            .subproblems
            .iter()
            .map(|s| s.scenario.clone())
            .collect();

        let mut total = request.fixed_contribution;
        let mut scenarios = BTreeMap::new();

        for (i, mut sub) in request.subproblems.into_iter().enumerate() {
            if let Some(cutoff) = request.cutoff {
                let rest: f64 = pending[i..].iter().sum();
                if total + rest >= cutoff {
                    log::trace!(
                        "Cutoff {:.6e} reached with {} scenarios unsolved",
                        cutoff,
                        names.len() - i
                    );
                    return Ok(PartitionBound {
                        feasible: true,
                        infeasible_scenario: None,
                        bound: total + rest,
                        scenarios,
                        skipped: names[i..].to_vec(),
                    });
                }
            }

            let result = self.solve_subproblem(&mut sub.model)?;
            if !result.feasible {
                log::debug!("Scenario '{}' infeasible over the box", sub.scenario);
                return Ok(PartitionBound::infeasible(sub.scenario));
            }

            let successor = sub.model.successor_objective();
            let value = result.bound.unwrap_or(f64::NEG_INFINITY).max(successor);
            total += sub.weight * value;
            scenarios.insert(sub.scenario, ScenarioBound::from_model(&sub.model, value));
        }

        Ok(PartitionBound {
            feasible: true,
            infeasible_scenario: None,
            bound: total,
            scenarios,
            skipped: Vec::new(),
        })
    }
}

/// Plain global solve of each scenario with the first stage decoupled.
pub struct DropNonants {
    solver: Box<dyn GlobalSolver>,
    options: GlobalSolveOptions,
}

impl DropNonants {
    /// Create a bounder around a global solver.
    pub fn new(solver: impl GlobalSolver + 'static) -> Self {
        Self {
            solver: Box::new(solver),
            options: GlobalSolveOptions::default(),
        }
    }

    /// Use fixed options for every solve.
    pub fn with_options(mut self, options: GlobalSolveOptions) -> Self {
        self.options = options;
        self
    }
}

impl LowerBounder for DropNonants {
    fn solve_subproblem(&mut self, model: &mut SubproblemModel) -> SbbResult<BoundSolveResult> {
        let outcome = self.solver.solve(model, &self.options)?;
        match outcome.status {
            TerminationStatus::Optimal => {
                model.load_solution(&outcome.values, outcome.objective);
                let bound = outcome.best_bound().ok_or_else(|| {
                    SbbError::solver_fault(model.name(), "optimal without objective")
                })?;
                Ok(BoundSolveResult::feasible(bound))
            }
            TerminationStatus::Infeasible => Ok(BoundSolveResult::infeasible()),
            TerminationStatus::TimeLimit => match outcome.bound {
                Some(bound) => {
                    model.load_solution(&outcome.values, outcome.objective);
                    Ok(BoundSolveResult::feasible(bound))
                }
                None => Err(SbbError::solver_fault(
                    model.name(),
                    "time limit without a proven bound",
                )),
            },
            TerminationStatus::Other(status) => Err(SbbError::solver_fault(model.name(), status)),
        }
    }
}
