//! Extensive (consensus) form: all scenario models coupled through shared
//! first-stage variables.

use std::collections::BTreeMap;

use super::bounds::FirstStageBounds;
use super::scenario::ScenarioSet;
use super::subproblem::SubproblemModel;
use crate::error::SbbResult;

/// One scenario inside the extensive form.
#[derive(Debug)]
pub struct ExtensiveMember {
    /// Scenario name.
    pub scenario: String,

    /// Normalised probability weight.
    pub weight: f64,

    /// The scenario's model, restricted to the form's box.
    pub model: SubproblemModel,
}

/// The coupled problem `min sum_s w_s f_s(x, y_s)` with one shared first stage.
///
/// Solvers that support it must enforce equality of every first-stage
/// variable across members.
#[derive(Debug)]
pub struct ExtensiveForm {
    members: Vec<ExtensiveMember>,
    first_stage: Vec<String>,
    bounds: FirstStageBounds,
}

impl ExtensiveForm {
    /// Build the extensive form of a scenario set restricted to `bounds`.
    pub fn build(scenarios: &ScenarioSet, bounds: &FirstStageBounds) -> SbbResult<Self> {
        let mut members = Vec::with_capacity(scenarios.len());
        for scenario in scenarios.scenarios() {
            let model = scenarios.build_in(&scenario.name, bounds)?;
            members.push(ExtensiveMember {
                scenario: scenario.name.clone(),
                weight: scenario.weight,
                model,
            });
        }
        Ok(Self {
            members,
            first_stage: scenarios.first_stage().to_vec(),
            bounds: bounds.clone(),
        })
    }

    /// Members in scenario order.
    pub fn members(&self) -> &[ExtensiveMember] {
        &self.members
    }

    /// Mutable access to members (for solvers that annotate models).
    pub fn members_mut(&mut self) -> &mut [ExtensiveMember] {
        &mut self.members
    }

    /// Shared first-stage variable names.
    pub fn first_stage(&self) -> &[String] {
        &self.first_stage
    }

    /// First-stage box the form was built for.
    pub fn bounds(&self) -> &FirstStageBounds {
        &self.bounds
    }

    /// Largest deviation of any member's first stage from the first member's.
    ///
    /// Zero means the per-scenario solutions are in consensus.
    pub fn consensus_violation(&self, values: &BTreeMap<String, BTreeMap<String, f64>>) -> f64 {
        let mut worst = 0.0_f64;
        for name in &self.first_stage {
            let xs: Vec<f64> = self
                .members
                .iter()
                .filter_map(|m| values.get(&m.scenario).and_then(|v| v.get(name)).copied())
                .collect();
            if let (Some(lo), Some(hi)) = (
                xs.iter().copied().reduce(f64::min),
                xs.iter().copied().reduce(f64::max),
            ) {
                worst = worst.max(hi - lo);
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScenarioBuild, VarDomain};
    use std::sync::Arc;

    fn set() -> ScenarioSet {
        let builder = |name: &str| -> SbbResult<ScenarioBuild> {
            let mut model = SubproblemModel::new(name);
            model.add_variable("x", 0.0, 4.0, VarDomain::Continuous)?;
            Ok(ScenarioBuild {
                model,
                first_stage: vec!["x".into()],
                probability: 1.0,
            })
        };
        ScenarioSet::new(&["a".to_string(), "b".to_string()], Arc::new(builder)).unwrap()
    }

    #[test]
    fn test_build_restricts_members() {
        let s = set();
        let bounds = s.root_bounds().with_range("x", 1.0, 2.0);
        let ef = ExtensiveForm::build(&s, &bounds).unwrap();
        assert_eq!(ef.members().len(), 2);
        for m in ef.members() {
            assert_eq!(m.model.variable("x").unwrap().lb, 1.0);
            assert!((m.weight - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_consensus_violation() {
        let s = set();
        let ef = ExtensiveForm::build(&s, s.root_bounds()).unwrap();
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), BTreeMap::from([("x".to_string(), 1.0)]));
        values.insert("b".to_string(), BTreeMap::from([("x".to_string(), 1.5)]));
        assert!((ef.consensus_violation(&values) - 0.5).abs() < 1e-12);
    }
}
