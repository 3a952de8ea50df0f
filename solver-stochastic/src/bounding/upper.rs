//! Candidate (upper bound) generation.

use std::collections::BTreeMap;

use super::lower::ScenarioBound;
use crate::error::{SbbError, SbbResult};
use crate::model::{Candidate, ExtensiveForm, FirstStageBounds, ScenarioSet};
use crate::oracle::{GlobalSolveOptions, GlobalSolver, TerminationStatus};
use crate::search::NodeId;

/// What a candidate finder sees of a node.
#[derive(Debug, Clone, Copy)]
pub struct CandidateContext<'a> {
    /// Node being processed.
    pub node: NodeId,

    /// All scenarios.
    pub scenarios: &'a ScenarioSet,

    /// First-stage box of the node.
    pub bounds: &'a FirstStageBounds,

    /// Per-scenario bounds computed at the node.
    pub scenario_bounds: &'a BTreeMap<String, ScenarioBound>,
}

/// Produces feasible global points from a node.
pub trait UpperBounder: Send {
    /// Try to find a feasible candidate inside the node's box.
    ///
    /// Returns `Ok(None)` when no candidate could be produced.
    fn candidate(&mut self, ctx: &CandidateContext<'_>) -> SbbResult<Option<Candidate>>;
}

/// Solves the extensive form over the node's box.
pub struct SolveExtensiveForm {
    solver: Box<dyn GlobalSolver>,
    options: GlobalSolveOptions,
}

impl SolveExtensiveForm {
    /// Create a candidate finder around a global solver.
    pub fn new(solver: impl GlobalSolver + 'static) -> Self {
        Self {
            solver: Box::new(solver),
            options: GlobalSolveOptions::default(),
        }
    }

    /// Options passed to every extensive solve.
    pub fn with_options(mut self, options: GlobalSolveOptions) -> Self {
        self.options = options;
        self
    }
}

impl UpperBounder for SolveExtensiveForm {
    fn candidate(&mut self, ctx: &CandidateContext<'_>) -> SbbResult<Option<Candidate>> {
        let form = ExtensiveForm::build(ctx.scenarios, ctx.bounds)?;
        let outcome = self.solver.solve_extensive(&form, &self.options)?;

        match outcome.status {
            TerminationStatus::Optimal => {
                let objective = outcome.objective.ok_or_else(|| {
                    SbbError::solver_fault("extensive form", "optimal without objective")
                })?;
                let first_stage = form
                    .members()
                    .first()
                    .and_then(|m| outcome.scenario_values.get(&m.scenario))
                    .map(|values| {
                        form.first_stage()
                            .iter()
                            .filter_map(|n| values.get(n).map(|&x| (n.clone(), x)))
                            .collect()
                    })
                    .unwrap_or_default();

                Ok(Some(Candidate {
                    first_stage,
                    objective,
                    subproblem_solutions: outcome.scenario_values,
                }))
            }
            TerminationStatus::Infeasible | TerminationStatus::TimeLimit => Ok(None),
            TerminationStatus::Other(status) => {
                Err(SbbError::solver_fault("extensive form", status))
            }
        }
    }
}

/// Fixes the first stage at the probability-weighted mean of the scenario
/// solutions and solves every scenario at that point.
pub struct ExpectedValueCandidate {
    solver: Box<dyn GlobalSolver>,
    options: GlobalSolveOptions,
}

impl ExpectedValueCandidate {
    /// Create a candidate finder around a global solver.
    pub fn new(solver: impl GlobalSolver + 'static) -> Self {
        Self {
            solver: Box::new(solver),
            options: GlobalSolveOptions::default(),
        }
    }

    /// Options passed to every scenario solve.
    pub fn with_options(mut self, options: GlobalSolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Weighted mean of the scenario first-stage values, clipped into the
    /// box. None if some scenario lacks a value or the box is empty.
    pub fn expected_point(ctx: &CandidateContext<'_>) -> Option<BTreeMap<String, f64>> {
        let mut point = BTreeMap::new();
        for (name, range) in ctx.bounds.iter() {
            let mut mean = 0.0;
            for s in ctx.scenarios.scenarios() {
                let x = ctx.scenario_bounds.get(&s.name)?.first_stage.get(name)?;
                mean += s.weight * x;
            }
            point.insert(name.clone(), range.clip(mean)?);
        }
        Some(point)
    }

    fn evaluate(
        &mut self,
        ctx: &CandidateContext<'_>,
        point: BTreeMap<String, f64>,
    ) -> SbbResult<Option<Candidate>> {
        let mut objective = 0.0;
        let mut solutions = BTreeMap::new();

        for s in ctx.scenarios.scenarios() {
            let mut model = ctx.scenarios.build_in(&s.name, ctx.bounds)?;
            FirstStageBounds::fix_in(&mut model, &point)?;

            let outcome = self.solver.solve(&model, &self.options)?;
            match outcome.status {
                TerminationStatus::Optimal => {
                    let value = outcome.objective.ok_or_else(|| {
                        SbbError::solver_fault(s.name.as_str(), "optimal without objective")
                    })?;
                    objective += s.weight * value;
                    solutions.insert(s.name.clone(), outcome.values);
                }
                TerminationStatus::Infeasible | TerminationStatus::TimeLimit => {
                    log::debug!(
                        "Candidate rejected: scenario '{}' returned {}",
                        s.name,
                        outcome.status
                    );
                    return Ok(None);
                }
                TerminationStatus::Other(status) => {
                    return Err(SbbError::solver_fault(s.name.as_str(), status));
                }
            }
        }

        Ok(Some(Candidate {
            first_stage: point,
            objective,
            subproblem_solutions: solutions,
        }))
    }
}

impl UpperBounder for ExpectedValueCandidate {
    fn candidate(&mut self, ctx: &CandidateContext<'_>) -> SbbResult<Option<Candidate>> {
        match Self::expected_point(ctx) {
            Some(point) => self.evaluate(ctx, point),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScenarioBuild, SubproblemModel, VarDomain};
    use crate::oracle::{ExtensiveOutcome, SolveOutcome};
    use std::sync::Arc;

    fn scenarios() -> ScenarioSet {
        let builder = |name: &str| -> SbbResult<ScenarioBuild> {
            let mut model = SubproblemModel::new(name);
            model.add_variable("x", 0.0, 4.0, VarDomain::Integer)?;
            model.add_variable("y", 0.0, 10.0, VarDomain::Continuous)?;
            Ok(ScenarioBuild {
                model,
                first_stage: vec!["x".into()],
                probability: if name == "lo" { 1.0 } else { 3.0 },
            })
        };
        ScenarioSet::new(&["hi".to_string(), "lo".to_string()], Arc::new(builder)).unwrap()
    }

    fn bound_at(x: f64) -> ScenarioBound {
        ScenarioBound {
            lower_bound: 0.0,
            first_stage: BTreeMap::from([("x".to_string(), x)]),
            values: BTreeMap::new(),
            objective: None,
        }
    }

    #[test]
    fn test_expected_point_rounds_and_clips() {
        let set = scenarios();
        let sb = BTreeMap::from([("hi".to_string(), bound_at(3.0)), ("lo".to_string(), bound_at(0.0))]);
        let ctx = CandidateContext {
            node: NodeId(0),
            scenarios: &set,
            bounds: set.root_bounds(),
            scenario_bounds: &sb,
        };
        // 0.75 * 3 + 0.25 * 0 = 2.25 -> 2
        let point = ExpectedValueCandidate::expected_point(&ctx).unwrap();
        assert_eq!(point["x"], 2.0);
    }

    #[test]
    fn test_expected_value_candidate() {
        let set = scenarios();
        let sb = BTreeMap::from([("hi".to_string(), bound_at(2.0)), ("lo".to_string(), bound_at(2.0))]);
        let ctx = CandidateContext {
            node: NodeId(0),
            scenarios: &set,
            bounds: set.root_bounds(),
            scenario_bounds: &sb,
        };
        let mut finder = ExpectedValueCandidate::new(
            |m: &SubproblemModel, _: &GlobalSolveOptions| -> SbbResult<SolveOutcome> {
                let x = m.variable("x").unwrap();
                assert_eq!(x.lb, x.ub);
                let obj = if m.name() == "hi" { 10.0 } else { 2.0 };
                Ok(SolveOutcome::optimal(obj, BTreeMap::from([("x".into(), x.lb)])))
            },
        );
        let candidate = finder.candidate(&ctx).unwrap().unwrap();
        assert!((candidate.objective - (0.75 * 10.0 + 0.25 * 2.0)).abs() < 1e-12);
        assert_eq!(candidate.first_stage["x"], 2.0);
        assert_eq!(candidate.subproblem_solutions.len(), 2);
    }

    #[test]
    fn test_missing_scenario_values_gives_no_candidate() {
        let set = scenarios();
        let sb = BTreeMap::from([("hi".to_string(), bound_at(2.0))]);
        let ctx = CandidateContext {
            node: NodeId(0),
            scenarios: &set,
            bounds: set.root_bounds(),
            scenario_bounds: &sb,
        };
        let mut finder = ExpectedValueCandidate::new(
            |_: &SubproblemModel, _: &GlobalSolveOptions| -> SbbResult<SolveOutcome> {
                Ok(SolveOutcome::optimal(0.0, BTreeMap::new()))
            },
        );
        assert!(finder.candidate(&ctx).unwrap().is_none());
    }

    struct Extensive(TerminationStatus);

    impl GlobalSolver for Extensive {
        fn solve(&mut self, _: &SubproblemModel, _: &GlobalSolveOptions) -> SbbResult<SolveOutcome> {
            Ok(SolveOutcome::other("not used"))
        }

        fn solve_extensive(
            &mut self,
            form: &ExtensiveForm,
            _: &GlobalSolveOptions,
        ) -> SbbResult<ExtensiveOutcome> {
            if self.0 != TerminationStatus::Optimal {
                return Ok(ExtensiveOutcome::without_point(self.0.clone()));
            }
            let scenario_values = form
                .members()
                .iter()
                .map(|m| (m.scenario.clone(), BTreeMap::from([("x".to_string(), 1.0)])))
                .collect();
            Ok(ExtensiveOutcome {
                status: TerminationStatus::Optimal,
                objective: Some(7.0),
                bound: Some(7.0),
                scenario_values,
            })
        }
    }

    #[test]
    fn test_extensive_form_statuses() {
        let set = scenarios();
        let sb = BTreeMap::new();
        let ctx = CandidateContext {
            node: NodeId(3),
            scenarios: &set,
            bounds: set.root_bounds(),
            scenario_bounds: &sb,
        };

        let mut ok = SolveExtensiveForm::new(Extensive(TerminationStatus::Optimal));
        let c = ok.candidate(&ctx).unwrap().unwrap();
        assert_eq!(c.objective, 7.0);
        assert_eq!(c.first_stage["x"], 1.0);

        let mut tl = SolveExtensiveForm::new(Extensive(TerminationStatus::TimeLimit));
        assert!(tl.candidate(&ctx).unwrap().is_none());

        let mut bad = SolveExtensiveForm::new(Extensive(TerminationStatus::Other("error".into())));
        assert!(bad.candidate(&ctx).is_err());
    }
}
