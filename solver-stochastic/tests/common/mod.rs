//! Separable quadratic test problems with closed-form subproblem solutions.
//!
//! Scenario `s` minimises `(x - t_s)^2 + (n - k_s)^2` over a continuous
//! first-stage variable `x` and an integer first-stage variable `n`. A
//! recourse variable `y = x + n` is carried along so that solutions contain
//! second-stage values too.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use solver_stochastic::model::ExtensiveForm;
use solver_stochastic::oracle::ObjectiveOverride;
use solver_stochastic::{
    ExtensiveOutcome, GlobalSolveOptions, GlobalSolver, SbbResult, ScenarioBuild, SolveOutcome,
    SubproblemModel, TerminationStatus, VarDomain,
};

/// Targets of one scenario.
#[derive(Debug, Clone, Copy)]
pub struct Targets {
    pub x: f64,
    pub n: f64,
}

/// A family of quadratic scenarios.
#[derive(Debug, Clone)]
pub struct Quadratic {
    pub scenarios: Vec<(String, Targets, f64)>,
    pub x_range: (f64, f64),
    pub n_range: (f64, f64),
    /// Lower limit on `x` imposed through a linear row.
    pub x_at_least: Option<f64>,
}

impl Quadratic {
    pub fn new(scenarios: &[(&str, f64, f64, f64)]) -> Self {
        Self {
            scenarios: scenarios
                .iter()
                .map(|&(name, x, n, p)| (name.to_string(), Targets { x, n }, p))
                .collect(),
            x_range: (0.0, 4.0),
            n_range: (0.0, 5.0),
            x_at_least: None,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.0.clone()).collect()
    }

    /// Expected objective at a first-stage point.
    pub fn expected(&self, x: f64, n: f64) -> f64 {
        let total: f64 = self.scenarios.iter().map(|s| s.2).sum();
        self.scenarios
            .iter()
            .map(|(_, t, p)| p / total * ((x - t.x).powi(2) + (n - t.n).powi(2)))
            .sum()
    }

    /// Builder closure for the solver parameters.
    pub fn builder(&self) -> impl Fn(&str) -> SbbResult<ScenarioBuild> + Send + Sync + 'static {
        let problem = Arc::new(self.clone());
        move |name: &str| -> SbbResult<ScenarioBuild> {
            let (_, targets, probability) = problem
                .scenarios
                .iter()
                .find(|s| s.0 == name)
                .cloned()
                .ok_or_else(|| {
                    solver_stochastic::SbbError::InvalidProblem(format!("unknown scenario {}", name))
                })?;

            let mut model = SubproblemModel::new(name);
            model.add_variable("x", problem.x_range.0, problem.x_range.1, VarDomain::Continuous)?;
            model.add_variable("n", problem.n_range.0, problem.n_range.1, VarDomain::Integer)?;
            model.add_variable("y", f64::NEG_INFINITY, f64::INFINITY, VarDomain::Continuous)?;
            model.add_row(Some("recourse"), &[("y", 1.0), ("x", -1.0), ("n", -1.0)], 0.0, 0.0)?;
            if let Some(limit) = problem.x_at_least {
                model.add_row(Some("floor"), &[("x", 1.0)], limit, f64::INFINITY)?;
            }

            Ok(ScenarioBuild {
                model: model.with_payload(targets),
                first_stage: vec!["x".into(), "n".into()],
                probability,
            })
        }
    }
}

/// Minimise the scenario objective over the model's current bounds.
pub fn solve_exact(model: &SubproblemModel) -> SolveOutcome {
    let Some(targets) = model.payload::<Targets>().copied() else {
        return SolveOutcome::other("missing payload");
    };
    let (Some(x), Some(n)) = (model.variable("x"), model.variable("n")) else {
        return SolveOutcome::other("missing variables");
    };
    let n_lb = (n.lb - 1e-9).ceil();
    let n_ub = (n.ub + 1e-9).floor();
    if x.lb > x.ub + 1e-9 || n_lb > n_ub {
        return SolveOutcome::infeasible();
    }

    let best_x = targets.x.clamp(x.lb, x.ub);
    let best_n = targets.n.round().clamp(n_lb, n_ub);
    let objective = (best_x - targets.x).powi(2) + (best_n - targets.n).powi(2);
    SolveOutcome::optimal(
        objective,
        BTreeMap::from([
            ("x".to_string(), best_x),
            ("n".to_string(), best_n),
            ("y".to_string(), best_x + best_n),
        ]),
    )
}

/// Global solver honouring objective overrides and the requested gap.
///
/// The reported bound sits `gap * objective` below the optimum, the way a
/// real solver stopping at that gap may report it.
pub fn global(model: &SubproblemModel, options: &GlobalSolveOptions) -> SbbResult<SolveOutcome> {
    let outcome = match &options.objective {
        ObjectiveOverride::Model => solve_exact(model),
        ObjectiveOverride::Minimize(var) | ObjectiveOverride::Maximize(var) => {
            let Some(v) = model.variable(var) else {
                return Ok(SolveOutcome::other("unknown variable"));
            };
            let value = if matches!(options.objective, ObjectiveOverride::Minimize(_)) {
                v.lb
            } else {
                v.ub
            };
            return Ok(SolveOutcome::optimal(value, BTreeMap::from([(var.clone(), value)])));
        }
    };
    match (outcome.objective, options.relative_gap) {
        (Some(obj), Some(gap)) if gap > 0.0 => Ok(outcome.with_bound(obj - gap * obj.abs())),
        _ => Ok(outcome),
    }
}

/// Local solver returning the exact optimum.
pub fn local(model: &SubproblemModel) -> SbbResult<SolveOutcome> {
    Ok(solve_exact(model))
}

/// Exact global solver that also solves extensive forms of [`Quadratic`].
///
/// With one shared first stage the expected objective is minimised by the
/// weighted mean target for `x` and its nearest integer for `n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactGlobal;

impl GlobalSolver for ExactGlobal {
    fn solve(&mut self, model: &SubproblemModel, options: &GlobalSolveOptions) -> SbbResult<SolveOutcome> {
        global(model, options)
    }

    fn solve_extensive(
        &mut self,
        form: &ExtensiveForm,
        _options: &GlobalSolveOptions,
    ) -> SbbResult<ExtensiveOutcome> {
        let (Some(x), Some(n)) = (form.bounds().get("x"), form.bounds().get("n")) else {
            return Ok(ExtensiveOutcome::without_point(TerminationStatus::Other(
                "missing variables".into(),
            )));
        };
        let mut members = Vec::new();
        for member in form.members() {
            let Some(targets) = member.model.payload::<Targets>().copied() else {
                return Ok(ExtensiveOutcome::without_point(TerminationStatus::Other(
                    "missing payload".into(),
                )));
            };
            members.push((member.scenario.clone(), member.weight, targets));
        }

        let n_lb = (n.lb - 1e-9).ceil();
        let n_ub = (n.ub + 1e-9).floor();
        if x.lb > x.ub + 1e-9 || n_lb > n_ub {
            return Ok(ExtensiveOutcome::without_point(TerminationStatus::Infeasible));
        }
        let mean_x: f64 = members.iter().map(|(_, w, t)| w * t.x).sum();
        let mean_n: f64 = members.iter().map(|(_, w, t)| w * t.n).sum();
        let best_x = mean_x.clamp(x.lb, x.ub);
        let best_n = mean_n.round().clamp(n_lb, n_ub);

        let mut objective = 0.0;
        let mut scenario_values = BTreeMap::new();
        for (name, weight, t) in members {
            objective += weight * ((best_x - t.x).powi(2) + (best_n - t.n).powi(2));
            scenario_values.insert(
                name,
                BTreeMap::from([
                    ("x".to_string(), best_x),
                    ("n".to_string(), best_n),
                    ("y".to_string(), best_x + best_n),
                ]),
            );
        }
        Ok(ExtensiveOutcome {
            status: TerminationStatus::Optimal,
            objective: Some(objective),
            bound: Some(objective),
            scenario_values,
        })
    }
}

/// Scenario costs tabulated over an integer first stage `x` in
/// `0..costs.len()`.
#[derive(Debug, Clone)]
pub struct Tabulated {
    pub scenarios: Vec<(String, Vec<f64>)>,
}

impl Tabulated {
    pub fn new(scenarios: &[(&str, &[f64])]) -> Self {
        Self {
            scenarios: scenarios
                .iter()
                .map(|(name, costs)| (name.to_string(), costs.to_vec()))
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.0.clone()).collect()
    }

    pub fn builder(&self) -> impl Fn(&str) -> SbbResult<ScenarioBuild> + Send + Sync + 'static {
        let problem = Arc::new(self.clone());
        move |name: &str| -> SbbResult<ScenarioBuild> {
            let costs = problem
                .scenarios
                .iter()
                .find(|s| s.0 == name)
                .map(|s| s.1.clone())
                .ok_or_else(|| {
                    solver_stochastic::SbbError::InvalidProblem(format!("unknown scenario {}", name))
                })?;
            let mut model = SubproblemModel::new(name);
            model.add_variable("x", 0.0, (costs.len() - 1) as f64, VarDomain::Integer)?;
            Ok(ScenarioBuild {
                model: model.with_payload(costs),
                first_stage: vec!["x".into()],
                probability: 1.0,
            })
        }
    }
}

/// Enumerate the tabulated costs inside the model's bounds.
pub fn tabulated_global(
    model: &SubproblemModel,
    _options: &GlobalSolveOptions,
) -> SbbResult<SolveOutcome> {
    let (Some(costs), Some(x)) = (model.payload::<Vec<f64>>(), model.variable("x")) else {
        return Ok(SolveOutcome::other("not a tabulated model"));
    };
    let lo = (x.lb - 1e-9).ceil().max(0.0) as usize;
    let hi = ((x.ub + 1e-9).floor() as usize).min(costs.len() - 1);
    let best = (lo..=hi).min_by(|&a, &b| costs[a].total_cmp(&costs[b]));
    Ok(match best {
        Some(i) if lo <= hi => {
            SolveOutcome::optimal(costs[i], BTreeMap::from([("x".to_string(), i as f64)]))
        }
        _ => SolveOutcome::infeasible(),
    })
}
