//! Scenarios and the caller-supplied subproblem builder.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::bounds::{FirstStageBounds, VarRange};
use super::subproblem::SubproblemModel;
use crate::error::{SbbError, SbbResult};

/// What a builder returns for one scenario.
#[derive(Debug)]
pub struct ScenarioBuild {
    /// The scenario's model.
    pub model: SubproblemModel,

    /// Names of the first-stage variables inside `model`.
    pub first_stage: Vec<String>,

    /// Probability weight (positive, need not sum to one).
    pub probability: f64,
}

/// Builds a fresh subproblem model from a scenario name.
pub trait SubproblemBuilder: Send + Sync {
    /// Build the model for `scenario`.
    fn build(&self, scenario: &str) -> SbbResult<ScenarioBuild>;
}

impl<F> SubproblemBuilder for F
where
    F: Fn(&str) -> SbbResult<ScenarioBuild> + Send + Sync,
{
    fn build(&self, scenario: &str) -> SbbResult<ScenarioBuild> {
        self(scenario)
    }
}

/// A scenario of the stochastic program.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,

    /// Probability as returned by the builder.
    pub probability: f64,

    /// Probability normalised over the scenario set.
    pub weight: f64,
}

/// The validated scenario set with its builder.
#[derive(Clone)]
pub struct ScenarioSet {
    scenarios: Vec<Scenario>,
    first_stage: Vec<String>,
    root_bounds: FirstStageBounds,
    builder: Arc<dyn SubproblemBuilder>,
}

impl std::fmt::Debug for ScenarioSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioSet")
            .field("scenarios", &self.scenarios)
            .field("first_stage", &self.first_stage)
            .field("root_bounds", &self.root_bounds)
            .finish()
    }
}

impl ScenarioSet {
    /// Build every scenario once and validate the set.
    ///
    /// Checks that probabilities are positive, that all scenarios declare the
    /// same first-stage variables with matching domains, and that every
    /// first-stage variable has finite bounds. The root box is the
    /// intersection of all declared bounds.
    pub fn new(names: &[String], builder: Arc<dyn SubproblemBuilder>) -> SbbResult<Self> {
        if names.is_empty() {
            return Err(SbbError::InvalidProblem("no scenarios given".into()));
        }
        let unique: BTreeSet<&String> = names.iter().collect();
        if unique.len() != names.len() {
            return Err(SbbError::InvalidProblem("duplicate scenario names".into()));
        }

        let mut scenarios = Vec::with_capacity(names.len());
        let mut first_stage: Option<Vec<String>> = None;
        let mut root_bounds = FirstStageBounds::new();

        for name in names {
            let build = builder.build(name).map_err(|e| wrap_build(name, e))?;

            if !(build.probability.is_finite() && build.probability > 0.0) {
                return Err(SbbError::InvalidProblem(format!(
                    "scenario '{}' has non-positive probability {}",
                    name, build.probability
                )));
            }

            let mut declared = build.first_stage.clone();
            declared.sort();
            declared.dedup();
            if declared.is_empty() {
                return Err(SbbError::InvalidProblem(format!(
                    "scenario '{}' declares no first-stage variables",
                    name
                )));
            }

            match &first_stage {
                None => first_stage = Some(declared.clone()),
                Some(expected) if *expected != declared => {
                    return Err(SbbError::InvalidProblem(format!(
                        "scenario '{}' declares first-stage variables {:?}, expected {:?}",
                        name, declared, expected
                    )));
                }
                Some(_) => {}
            }

            for var_name in &declared {
                let var = build.model.variable(var_name).ok_or_else(|| {
                    SbbError::InvalidProblem(format!(
                        "first-stage variable '{}' missing from scenario '{}'",
                        var_name, name
                    ))
                })?;
                if !(var.lb.is_finite() && var.ub.is_finite()) {
                    return Err(SbbError::InvalidProblem(format!(
                        "first-stage variable '{}' in scenario '{}' must have finite bounds",
                        var_name, name
                    )));
                }
                match root_bounds.get(var_name).copied() {
                    None => root_bounds.insert(
                        var_name.clone(),
                        VarRange {
                            lb: var.lb,
                            ub: var.ub,
                            domain: var.domain,
                        },
                    ),
                    Some(range) => {
                        if range.domain != var.domain {
                            return Err(SbbError::InvalidProblem(format!(
                                "first-stage variable '{}' has inconsistent domains",
                                var_name
                            )));
                        }
                        root_bounds.insert(
                            var_name.clone(),
                            VarRange {
                                lb: range.lb.max(var.lb),
                                ub: range.ub.min(var.ub),
                                domain: range.domain,
                            },
                        );
                    }
                }
            }

            scenarios.push(Scenario {
                name: name.clone(),
                probability: build.probability,
                weight: 0.0,
            });
        }

        let total: f64 = scenarios.iter().map(|s| s.probability).sum();
        for s in &mut scenarios {
            s.weight = s.probability / total;
        }

        Ok(Self {
            scenarios,
            first_stage: first_stage.unwrap_or_default(),
            root_bounds,
            builder,
        })
    }

    /// Scenarios in declaration order.
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Scenario names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.name.as_str())
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Returns true if the set is empty (never, after validation).
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Look up a scenario.
    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Normalised weight of a scenario (0 if unknown).
    pub fn weight(&self, name: &str) -> f64 {
        self.get(name).map(|s| s.weight).unwrap_or(0.0)
    }

    /// First-stage variable names, sorted.
    pub fn first_stage(&self) -> &[String] {
        &self.first_stage
    }

    /// Intersection of all scenarios' first-stage bounds.
    pub fn root_bounds(&self) -> &FirstStageBounds {
        &self.root_bounds
    }

    /// Build a fresh model for a scenario with its first stage marked.
    pub fn build(&self, scenario: &str) -> SbbResult<SubproblemModel> {
        let build = self
            .builder
            .build(scenario)
            .map_err(|e| wrap_build(scenario, e))?;
        let mut model = build.model;
        model.set_name(scenario);
        for name in &self.first_stage {
            model.mark_first_stage(name)?;
        }
        Ok(model)
    }

    /// Build a fresh model restricted to a first-stage box.
    pub fn build_in(&self, scenario: &str, bounds: &FirstStageBounds) -> SbbResult<SubproblemModel> {
        let mut model = self.build(scenario)?;
        bounds.apply_to(&mut model)?;
        Ok(model)
    }
}

fn wrap_build(scenario: &str, err: SbbError) -> SbbError {
    match err {
        SbbError::Build { .. } => err,
        other => SbbError::Build {
            scenario: scenario.to_string(),
            message: other.to_string(),
        },
    }
}
