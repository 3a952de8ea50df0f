//! Solver statuses, outcomes and per-call options.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Termination status reported by a solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationStatus {
    /// Solved to optimality (within the requested gap).
    Optimal,

    /// Proven infeasible.
    Infeasible,

    /// Time budget exhausted.
    TimeLimit,

    /// Anything else (numerical trouble, unbounded, interrupted, ...).
    Other(String),
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStatus::Optimal => write!(f, "optimal"),
            TerminationStatus::Infeasible => write!(f, "infeasible"),
            TerminationStatus::TimeLimit => write!(f, "time limit"),
            TerminationStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Result of solving one subproblem.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Termination status.
    pub status: TerminationStatus,

    /// Objective of the returned point (if any).
    pub objective: Option<f64>,

    /// Best proven bound in the direction of optimisation: a lower bound
    /// when minimising, an upper bound when maximising.
    pub bound: Option<f64>,

    /// Variable values of the returned point.
    pub values: BTreeMap<String, f64>,
}

impl SolveOutcome {
    /// An optimal outcome whose bound equals its objective.
    pub fn optimal(objective: f64, values: BTreeMap<String, f64>) -> Self {
        Self {
            status: TerminationStatus::Optimal,
            objective: Some(objective),
            bound: Some(objective),
            values,
        }
    }

    /// An infeasible outcome.
    pub fn infeasible() -> Self {
        Self {
            status: TerminationStatus::Infeasible,
            objective: None,
            bound: None,
            values: BTreeMap::new(),
        }
    }

    /// A time-limited outcome, optionally with a proven bound.
    pub fn time_limit(bound: Option<f64>) -> Self {
        Self {
            status: TerminationStatus::TimeLimit,
            objective: None,
            bound,
            values: BTreeMap::new(),
        }
    }

    /// Any other termination.
    pub fn other(status: impl Into<String>) -> Self {
        Self {
            status: TerminationStatus::Other(status.into()),
            objective: None,
            bound: None,
            values: BTreeMap::new(),
        }
    }

    /// Override the proven bound.
    pub fn with_bound(mut self, bound: f64) -> Self {
        self.bound = Some(bound);
        self
    }

    /// Proven bound, falling back to the objective.
    pub fn best_bound(&self) -> Option<f64> {
        self.bound.or(self.objective)
    }

    /// Returns true if the status is optimal.
    pub fn is_optimal(&self) -> bool {
        self.status == TerminationStatus::Optimal
    }
}

/// Result of solving an extensive form.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensiveOutcome {
    /// Termination status.
    pub status: TerminationStatus,

    /// Expected objective of the returned point.
    pub objective: Option<f64>,

    /// Proven lower bound.
    pub bound: Option<f64>,

    /// Variable values per scenario.
    pub scenario_values: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ExtensiveOutcome {
    /// An outcome without a point.
    pub fn without_point(status: TerminationStatus) -> Self {
        Self {
            status,
            objective: None,
            bound: None,
            scenario_values: BTreeMap::new(),
        }
    }
}

/// Objective a global solve should optimise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ObjectiveOverride {
    /// The model's own objective.
    #[default]
    Model,

    /// Minimise a single variable.
    Minimize(String),

    /// Maximise a single variable.
    Maximize(String),
}

/// Options applied to one global solver invocation.
///
/// Built fresh for every call so adaptive settings never mutate a long-lived
/// solver object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalSolveOptions {
    /// Acceptable relative optimality gap (None = solver default).
    pub relative_gap: Option<f64>,

    /// Time budget for this call (None = unlimited).
    pub time_limit: Option<Duration>,

    /// Objective to optimise.
    pub objective: ObjectiveOverride,
}

impl GlobalSolveOptions {
    /// Set the relative gap.
    pub fn with_gap(mut self, gap: f64) -> Self {
        self.relative_gap = Some(gap);
        self
    }

    /// Set the time limit in seconds. Negative values mean no time at all;
    /// infinite, NaN or unrepresentable values mean no limit.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = if seconds.is_finite() {
            Duration::try_from_secs_f64(seconds.max(0.0)).ok()
        } else {
            None
        };
        self
    }

    /// Copy of these options minimising `var`.
    pub fn minimizing(&self, var: &str) -> Self {
        Self {
            objective: ObjectiveOverride::Minimize(var.to_string()),
            ..self.clone()
        }
    }

    /// Copy of these options maximising `var`.
    pub fn maximizing(&self, var: &str) -> Self {
        Self {
            objective: ObjectiveOverride::Maximize(var.to_string()),
            ..self.clone()
        }
    }
}
