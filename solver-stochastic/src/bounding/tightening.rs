//! Feasibility- and optimality-based bounds tightening.

use crate::model::{SubproblemModel, DOMAIN_TOL};
use crate::oracle::{GlobalSolveOptions, GlobalSolver, TerminationStatus};
use crate::settings::TighteningSettings;

/// Minimum improvement that counts as a tightening.
const MIN_IMPROVEMENT: f64 = 1e-7;

/// Result of a tightening pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TighteningOutcome {
    /// No bound moved.
    Unchanged,

    /// Number of bound changes applied.
    Tightened(usize),

    /// Some variable domain became empty.
    Infeasible,
}

impl TighteningOutcome {
    fn merge(self, other: TighteningOutcome) -> TighteningOutcome {
        use TighteningOutcome::*;
        match (self, other) {
            (Infeasible, _) | (_, Infeasible) => Infeasible,
            (Tightened(a), Tightened(b)) => Tightened(a + b),
            (Tightened(a), Unchanged) | (Unchanged, Tightened(a)) => Tightened(a),
            (Unchanged, Unchanged) => Unchanged,
        }
    }
}

/// Interval contribution of one term `a * x`.
fn term_range(a: f64, lb: f64, ub: f64) -> (f64, f64) {
    if a >= 0.0 {
        (a * lb, a * ub)
    } else {
        (a * ub, a * lb)
    }
}

/// Sum of finite parts plus a count of infinite parts.
#[derive(Debug, Default, Clone, Copy)]
struct Activity {
    finite: f64,
    infinite: usize,
}

impl Activity {
    fn add(&mut self, v: f64) {
        if v.is_finite() {
            self.finite += v;
        } else {
            self.infinite += 1;
        }
    }

    /// Activity without one term, or None if still unbounded.
    fn without(&self, v: f64) -> Option<f64> {
        let inf = self.infinite - usize::from(!v.is_finite());
        if inf > 0 {
            None
        } else if v.is_finite() {
            Some(self.finite - v)
        } else {
            Some(self.finite)
        }
    }

    fn total(&self, sign: f64) -> f64 {
        if self.infinite > 0 {
            sign * f64::INFINITY
        } else {
            self.finite
        }
    }
}

/// Propagate linear rows over variable bounds.
///
/// Runs at most `max_rounds` passes over all rows. Integral variables are
/// rounded inward.
pub fn fbbt(model: &mut SubproblemModel, max_rounds: usize) -> TighteningOutcome {
    let mut changes = 0;

    for _ in 0..max_rounds {
        let mut round_changes = 0;

        for r in 0..model.rows().len() {
            let row = model.rows()[r].clone();
            let vars = model.variables();

            let mut min_act = Activity::default();
            let mut max_act = Activity::default();
            for &(j, a) in &row.terms {
                let (lo, hi) = term_range(a, vars[j].lb, vars[j].ub);
                min_act.add(lo);
                max_act.add(hi);
            }

            if min_act.total(-1.0) > row.upper + DOMAIN_TOL
                || max_act.total(1.0) < row.lower - DOMAIN_TOL
            {
                return TighteningOutcome::Infeasible;
            }

            for &(j, a) in &row.terms {
                if a.abs() < 1e-12 {
                    continue;
                }
                let var = &model.variables()[j];
                let (lo, hi) = term_range(a, var.lb, var.ub);
                let rest_min = min_act.without(lo);
                let rest_max = max_act.without(hi);

                // a*x <= upper - rest_min, a*x >= lower - rest_max
                let mut new_lb = var.lb;
                let mut new_ub = var.ub;
                if let Some(rmin) = rest_min {
                    if row.upper.is_finite() {
                        let bound = (row.upper - rmin) / a;
                        if a > 0.0 {
                            new_ub = new_ub.min(bound);
                        } else {
                            new_lb = new_lb.max(bound);
                        }
                    }
                }
                if let Some(rmax) = rest_max {
                    if row.lower.is_finite() {
                        let bound = (row.lower - rmax) / a;
                        if a > 0.0 {
                            new_lb = new_lb.max(bound);
                        } else {
                            new_ub = new_ub.min(bound);
                        }
                    }
                }
                if var.domain.is_integral() {
                    new_lb = (new_lb - DOMAIN_TOL).ceil();
                    new_ub = (new_ub + DOMAIN_TOL).floor();
                }

                let var = &mut model.variables_mut()[j];
                if new_lb > var.lb + MIN_IMPROVEMENT {
                    var.lb = new_lb;
                    round_changes += 1;
                }
                if new_ub < var.ub - MIN_IMPROVEMENT {
                    var.ub = new_ub;
                    round_changes += 1;
                }
                if var.is_empty() {
                    return TighteningOutcome::Infeasible;
                }
            }
        }

        changes += round_changes;
        if round_changes == 0 {
            break;
        }
    }

    if changes > 0 {
        TighteningOutcome::Tightened(changes)
    } else {
        TighteningOutcome::Unchanged
    }
}

/// Applies FBBT and OBBT to freshly built subproblems.
pub struct BoundsTightener {
    settings: TighteningSettings,
    solver: Option<Box<dyn GlobalSolver>>,
}

impl BoundsTightener {
    /// Create a tightener.
    ///
    /// OBBT is skipped when no solver is given.
    pub fn new(settings: TighteningSettings, solver: Option<Box<dyn GlobalSolver>>) -> Self {
        Self { settings, solver }
    }

    /// A tightener that never changes anything.
    pub fn disabled() -> Self {
        Self::new(
            TighteningSettings {
                fbbt: false,
                obbt: false,
                ..TighteningSettings::default()
            },
            None,
        )
    }

    /// Tighten a model built for a node at `depth`.
    pub fn tighten(&mut self, model: &mut SubproblemModel, depth: usize) -> TighteningOutcome {
        if let Some(name) = model.empty_domain() {
            log::debug!("'{}' has an empty domain for '{}'", model.name(), name);
            return TighteningOutcome::Infeasible;
        }

        let mut outcome = TighteningOutcome::Unchanged;
        if self.settings.fbbt {
            outcome = outcome.merge(fbbt(model, self.settings.fbbt_max_rounds));
            if outcome == TighteningOutcome::Infeasible {
                return outcome;
            }
        }
        if self.settings.obbt && depth <= self.settings.obbt_max_depth {
            outcome = outcome.merge(self.obbt(model));
        }
        outcome
    }

    /// Minimise and maximise each first-stage variable.
    ///
    /// Solver failures leave the bound untouched.
    fn obbt(&mut self, model: &mut SubproblemModel) -> TighteningOutcome {
        let Some(solver) = self.solver.as_mut() else {
            return TighteningOutcome::Unchanged;
        };
        let options = &self.settings.obbt_options;
        let names: Vec<String> = model
            .first_stage_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut changes = 0;
        for name in &names {
            let lower = directional_bound(solver.as_mut(), model, &options.minimizing(name));
            let upper = directional_bound(solver.as_mut(), model, &options.maximizing(name));
            let (lower, upper) = match (lower, upper) {
                (Probe::Infeasible, _) | (_, Probe::Infeasible) => {
                    return TighteningOutcome::Infeasible
                }
                (l, u) => (l.bound(), u.bound()),
            };

            let Some(idx) = model.var_index(name) else {
                continue;
            };
            let var = &mut model.variables_mut()[idx];
            let integral = var.domain.is_integral();
            if let Some(mut lb) = lower {
                if integral {
                    lb = (lb - DOMAIN_TOL).ceil();
                }
                if lb > var.lb + MIN_IMPROVEMENT {
                    var.lb = lb;
                    changes += 1;
                }
            }
            if let Some(mut ub) = upper {
                if integral {
                    ub = (ub + DOMAIN_TOL).floor();
                }
                if ub < var.ub - MIN_IMPROVEMENT {
                    var.ub = ub;
                    changes += 1;
                }
            }
            if var.lb > var.ub {
                // Loose solver tolerances can cross the bounds
                if var.lb - var.ub <= 1e-6 {
                    var.ub = var.lb;
                } else {
                    return TighteningOutcome::Infeasible;
                }
            }
        }

        if changes > 0 {
            TighteningOutcome::Tightened(changes)
        } else {
            TighteningOutcome::Unchanged
        }
    }
}

enum Probe {
    Bound(f64),
    Infeasible,
    Failed,
}

impl Probe {
    fn bound(self) -> Option<f64> {
        match self {
            Probe::Bound(b) => Some(b),
            _ => None,
        }
    }
}

/// Proven bound of one OBBT direction.
fn directional_bound(
    solver: &mut dyn GlobalSolver,
    model: &SubproblemModel,
    options: &GlobalSolveOptions,
) -> Probe {
    match solver.solve(model, options) {
        Ok(outcome) => match outcome.status {
            TerminationStatus::Optimal | TerminationStatus::TimeLimit => {
                match outcome.best_bound() {
                    Some(b) if b.is_finite() => Probe::Bound(b),
                    _ => Probe::Failed,
                }
            }
            TerminationStatus::Infeasible => Probe::Infeasible,
            TerminationStatus::Other(status) => {
                log::warn!("OBBT on '{}' skipped: {}", model.name(), status);
                Probe::Failed
            }
        },
        Err(e) => {
            log::warn!("OBBT on '{}' skipped: {}", model.name(), e);
            Probe::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SbbResult;
    use crate::model::VarDomain;
    use crate::oracle::{ObjectiveOverride, SolveOutcome};
    use std::collections::BTreeMap;

    fn knapsack() -> SubproblemModel {
        // x + y <= 3, x in [0, 10], y in [1, 10] (integer)
        let mut m = SubproblemModel::new("s");
        m.add_variable("x", 0.0, 10.0, VarDomain::Continuous).unwrap();
        m.add_variable("y", 1.0, 10.0, VarDomain::Integer).unwrap();
        m.add_row(Some("cap"), &[("x", 1.0), ("y", 1.0)], f64::NEG_INFINITY, 3.0)
            .unwrap();
        m.mark_first_stage("x").unwrap();
        m
    }

    #[test]
    fn test_fbbt_tightens_upper_bounds() {
        let mut m = knapsack();
        let out = fbbt(&mut m, 5);
        assert!(matches!(out, TighteningOutcome::Tightened(_)));
        assert_eq!(m.variable("x").unwrap().ub, 2.0);
        assert_eq!(m.variable("y").unwrap().ub, 3.0);
    }

    #[test]
    fn test_fbbt_detects_infeasible_row() {
        let mut m = knapsack();
        m.add_row(None, &[("x", 1.0)], 5.0, f64::INFINITY).unwrap();
        assert_eq!(fbbt(&mut m, 5), TighteningOutcome::Infeasible);
    }

    #[test]
    fn test_fbbt_negative_coefficient() {
        // x - y >= 2 with x in [0, 3] forces y <= 1
        let mut m = SubproblemModel::new("s");
        m.add_variable("x", 0.0, 3.0, VarDomain::Continuous).unwrap();
        m.add_variable("y", 0.0, 5.0, VarDomain::Continuous).unwrap();
        m.add_row(None, &[("x", 1.0), ("y", -1.0)], 2.0, f64::INFINITY)
            .unwrap();
        fbbt(&mut m, 3);
        assert_eq!(m.variable("y").unwrap().ub, 1.0);
        assert_eq!(m.variable("x").unwrap().lb, 2.0);
    }

    #[test]
    fn test_empty_domain_is_infeasible() {
        let mut m = knapsack();
        m.set_bounds("x", 2.0, 1.0).unwrap();
        let mut t = BoundsTightener::disabled();
        assert_eq!(t.tighten(&mut m, 0), TighteningOutcome::Infeasible);
    }

    #[test]
    fn test_obbt_uses_proven_bounds() {
        let solver = |_: &SubproblemModel, o: &GlobalSolveOptions| -> SbbResult<SolveOutcome> {
            Ok(match &o.objective {
                ObjectiveOverride::Minimize(_) => {
                    SolveOutcome::optimal(0.7, BTreeMap::new()).with_bound(0.5)
                }
                ObjectiveOverride::Maximize(_) => SolveOutcome::time_limit(Some(1.5)),
                ObjectiveOverride::Model => SolveOutcome::other("unexpected"),
            })
        };
        let settings = TighteningSettings {
            fbbt: true,
            obbt: true,
            ..TighteningSettings::default()
        };
        let mut t = BoundsTightener::new(settings, Some(Box::new(solver)));
        let mut m = knapsack();
        let out = t.tighten(&mut m, 0);
        assert!(matches!(out, TighteningOutcome::Tightened(_)));
        let x = m.variable("x").unwrap();
        assert_eq!(x.lb, 0.5);
        assert_eq!(x.ub, 1.5);
    }

    #[test]
    fn test_obbt_failure_degrades() {
        let solver = |_: &SubproblemModel, _: &GlobalSolveOptions| -> SbbResult<SolveOutcome> {
            Ok(SolveOutcome::other("numerical trouble"))
        };
        let settings = TighteningSettings {
            fbbt: false,
            obbt: true,
            ..TighteningSettings::default()
        };
        let mut t = BoundsTightener::new(settings, Some(Box::new(solver)));
        let mut m = knapsack();
        assert_eq!(t.tighten(&mut m, 0), TighteningOutcome::Unchanged);
        assert_eq!(m.variable("x").unwrap().ub, 10.0);
    }

    #[test]
    fn test_obbt_depth_limit() {
        let solver = |_: &SubproblemModel, _: &GlobalSolveOptions| -> SbbResult<SolveOutcome> {
            Ok(SolveOutcome::infeasible())
        };
        let settings = TighteningSettings {
            fbbt: false,
            obbt: true,
            obbt_max_depth: 2,
            ..TighteningSettings::default()
        };
        let mut t = BoundsTightener::new(settings, Some(Box::new(solver)));
        assert_eq!(t.tighten(&mut knapsack(), 3), TighteningOutcome::Unchanged);
        assert_eq!(t.tighten(&mut knapsack(), 2), TighteningOutcome::Infeasible);
    }
}
