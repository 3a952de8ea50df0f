//! Solution types and incumbent tracking.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::search::TreeStats;

/// Which budget ended the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchLimit {
    /// Maximum iteration count reached.
    Iterations,

    /// Wall-clock budget exhausted.
    Time,

    /// Open boxes narrower than the minimum branch width were left with a
    /// gap that no candidate closed.
    BranchWidth,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// Tree exhausted with an incumbent: the incumbent is optimal.
    Optimal,

    /// Global relative gap closed to within the requested tolerance.
    OptimalWithinTolerance,

    /// A budget ran out; the best known incumbent is reported.
    LimitReached(SearchLimit),

    /// A budget ran out before any feasible candidate was found.
    InfeasibleOrUnresolved(SearchLimit),

    /// Tree exhausted without a feasible candidate.
    Infeasible,
}

impl TerminationReason {
    /// Returns true if a feasible solution is reported.
    pub fn has_solution(&self) -> bool {
        matches!(
            self,
            TerminationReason::Optimal
                | TerminationReason::OptimalWithinTolerance
                | TerminationReason::LimitReached(_)
        )
    }

    /// Returns true if optimality (within tolerance) was proven.
    pub fn is_optimal(&self) -> bool {
        matches!(
            self,
            TerminationReason::Optimal | TerminationReason::OptimalWithinTolerance
        )
    }

    /// Returns true if the search stopped on a budget.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            TerminationReason::LimitReached(_) | TerminationReason::InfeasibleOrUnresolved(_)
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = |l: &SearchLimit| match l {
            SearchLimit::Iterations => "iteration",
            SearchLimit::Time => "time",
            SearchLimit::BranchWidth => "branch-width",
        };
        match self {
            TerminationReason::Optimal => write!(f, "optimal"),
            TerminationReason::OptimalWithinTolerance => write!(f, "optimal-within-tolerance"),
            TerminationReason::LimitReached(l) => {
                write!(f, "{} limit - best-known reported", limit(l))
            }
            TerminationReason::InfeasibleOrUnresolved(l) => {
                write!(f, "infeasible-or-unresolved ({} limit)", limit(l))
            }
            TerminationReason::Infeasible => write!(f, "infeasible"),
        }
    }
}

/// A feasible global point: one first-stage assignment shared by all scenarios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// First-stage assignment.
    pub first_stage: BTreeMap<String, f64>,

    /// Expected objective (probability-weighted sum over scenarios).
    pub objective: f64,

    /// Per-scenario variable values.
    pub subproblem_solutions: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Final result of a solve.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Why the search stopped.
    pub reason: TerminationReason,

    /// True when the reported objective is certified within tolerance.
    pub proven_optimal: bool,

    /// Objective of the incumbent (None if no feasible point was found).
    pub objective: Option<f64>,

    /// Best global lower bound.
    pub lower_bound: f64,

    /// Relative gap: (objective - lower_bound) / |objective|.
    pub gap: f64,

    /// First-stage assignment of the incumbent.
    pub first_stage: BTreeMap<String, f64>,

    /// Per-scenario variable-name -> value maps of the incumbent.
    pub subproblem_solutions: BTreeMap<String, BTreeMap<String, f64>>,

    /// Search statistics.
    pub stats: TreeStats,
}

impl Solution {
    /// Compute relative gap.
    pub fn compute_gap(primal: f64, dual: f64) -> f64 {
        if primal.is_infinite() || dual.is_infinite() {
            return f64::INFINITY;
        }
        let denom = primal.abs().max(1e-10);
        ((primal - dual) / denom).max(0.0)
    }
}

/// Tracks the best known feasible candidate (incumbent).
#[derive(Debug, Clone)]
pub struct IncumbentTracker {
    /// Current best candidate (if any).
    pub candidate: Option<Candidate>,

    /// Objective value of the incumbent.
    /// Initialized to +inf for minimization.
    pub obj_val: f64,

    /// Number of times the incumbent was updated.
    pub update_count: u64,
}

impl Default for IncumbentTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IncumbentTracker {
    /// Create a new incumbent tracker.
    pub fn new() -> Self {
        Self {
            candidate: None,
            obj_val: f64::INFINITY,
            update_count: 0,
        }
    }

    /// Check if we have an incumbent.
    pub fn has_incumbent(&self) -> bool {
        self.candidate.is_some()
    }

    /// Try to replace the incumbent.
    ///
    /// Returns true if the candidate was strictly better.
    pub fn update(&mut self, candidate: Candidate) -> bool {
        if candidate.objective.is_finite() && candidate.objective < self.obj_val - 1e-9 {
            self.obj_val = candidate.objective;
            self.candidate = Some(candidate);
            self.update_count += 1;
            true
        } else {
            false
        }
    }

    /// Compute relative gap to a lower bound.
    pub fn gap(&self, lower_bound: f64) -> f64 {
        Solution::compute_gap(self.obj_val, lower_bound)
    }

    /// Check if gap is within tolerance.
    pub fn gap_closed(&self, lower_bound: f64, tol: f64) -> bool {
        self.gap(lower_bound) <= tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(obj: f64) -> Candidate {
        Candidate {
            first_stage: BTreeMap::from([("x".to_string(), obj / 10.0)]),
            objective: obj,
            subproblem_solutions: BTreeMap::new(),
        }
    }

    #[test]
    fn test_incumbent_tracker() {
        let mut tracker = IncumbentTracker::new();

        assert!(!tracker.has_incumbent());
        assert_eq!(tracker.obj_val, f64::INFINITY);

        assert!(tracker.update(candidate(10.0)));
        assert!(tracker.has_incumbent());
        assert_eq!(tracker.obj_val, 10.0);
        assert_eq!(tracker.update_count, 1);

        // Worse and equal candidates are rejected
        assert!(!tracker.update(candidate(15.0)));
        assert!(!tracker.update(candidate(10.0)));
        assert_eq!(tracker.obj_val, 10.0);
        assert_eq!(tracker.update_count, 1);

        assert!(tracker.update(candidate(5.0)));
        assert_eq!(tracker.obj_val, 5.0);
        assert_eq!(tracker.update_count, 2);
    }

    #[test]
    fn test_non_finite_candidate_rejected() {
        let mut tracker = IncumbentTracker::new();
        assert!(!tracker.update(candidate(f64::NAN)));
        assert!(!tracker.update(candidate(f64::NEG_INFINITY)));
        assert!(!tracker.has_incumbent());
    }

    #[test]
    fn test_gap_computation() {
        let gap = Solution::compute_gap(10.0, 8.0);
        assert!((gap - 0.2).abs() < 1e-10);

        let gap = Solution::compute_gap(-10.0, -12.0);
        assert!((gap - 0.2).abs() < 1e-10);

        assert_eq!(Solution::compute_gap(f64::INFINITY, 1.0), f64::INFINITY);
        assert_eq!(Solution::compute_gap(10.0, 11.0), 0.0);
    }

    #[test]
    fn test_reason_methods() {
        assert!(TerminationReason::Optimal.has_solution());
        assert!(TerminationReason::LimitReached(SearchLimit::Time).has_solution());
        assert!(!TerminationReason::InfeasibleOrUnresolved(SearchLimit::Time).has_solution());
        assert!(!TerminationReason::Infeasible.has_solution());

        assert!(TerminationReason::OptimalWithinTolerance.is_optimal());
        assert!(!TerminationReason::LimitReached(SearchLimit::Iterations).is_optimal());

        assert_eq!(
            TerminationReason::InfeasibleOrUnresolved(SearchLimit::Time).to_string(),
            "infeasible-or-unresolved (time limit)"
        );
        assert_eq!(
            TerminationReason::LimitReached(SearchLimit::BranchWidth).to_string(),
            "branch-width limit - best-known reported"
        );
    }
}
