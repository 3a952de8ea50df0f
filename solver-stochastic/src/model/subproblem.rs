//! Per-scenario subproblem model.
//!
//! The coordinator never looks inside the mathematical program a builder
//! produces. It only needs the named variables (to read and write values and
//! restrict bounds), the linear rows (for feasibility-based tightening), and
//! the set of first-stage variables. Everything solver-specific travels in an
//! opaque payload that solver implementations downcast.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::error::{SbbError, SbbResult};

/// Tolerance under which a domain `[lb, ub]` with `lb > ub` is still accepted.
pub const DOMAIN_TOL: f64 = 1e-9;

/// Variable domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VarDomain {
    /// Real-valued variable.
    Continuous,

    /// Integer-valued variable.
    Integer,

    /// Integer variable restricted to {0, 1}.
    Binary,
}

impl VarDomain {
    /// Returns true for integer and binary domains.
    pub fn is_integral(&self) -> bool {
        matches!(self, VarDomain::Integer | VarDomain::Binary)
    }
}

/// A named decision variable.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Variable name (unique within a model).
    pub name: String,

    /// Lower bound.
    pub lb: f64,

    /// Upper bound.
    pub ub: f64,

    /// Domain.
    pub domain: VarDomain,

    /// Value loaded from the last solve (if any).
    pub value: Option<f64>,
}

impl Variable {
    /// Width of the domain.
    pub fn width(&self) -> f64 {
        self.ub - self.lb
    }

    /// Returns true if the domain is empty.
    pub fn is_empty(&self) -> bool {
        self.lb > self.ub + DOMAIN_TOL
    }
}

/// A linear row `lower <= sum(coef * x) <= upper`.
#[derive(Debug, Clone)]
pub struct LinearRow {
    /// Optional name for debugging.
    pub name: Option<String>,

    /// Terms as (variable index, coefficient).
    pub terms: Vec<(usize, f64)>,

    /// Row lower bound (may be -inf).
    pub lower: f64,

    /// Row upper bound (may be +inf).
    pub upper: f64,
}

/// One scenario's mathematical program.
///
/// Created fresh for every (scenario, node) pair and moved into the bounder,
/// so no state leaks between nodes.
pub struct SubproblemModel {
    name: String,
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
    rows: Vec<LinearRow>,
    first_stage: Vec<usize>,
    successor_objective: f64,
    objective_value: Option<f64>,
    payload: Option<Box<dyn Any + Send>>,
}

impl fmt::Debug for SubproblemModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubproblemModel")
            .field("name", &self.name)
            .field("variables", &self.variables.len())
            .field("rows", &self.rows.len())
            .field("first_stage", &self.first_stage_names())
            .field("successor_objective", &self.successor_objective)
            .field("objective_value", &self.objective_value)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

impl SubproblemModel {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            index: HashMap::new(),
            rows: Vec::new(),
            first_stage: Vec::new(),
            successor_objective: f64::NEG_INFINITY,
            objective_value: None,
            payload: None,
        }
    }

    /// Model (scenario) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Add a variable and return its index.
    ///
    /// Binary variables are clamped to `[0, 1]`.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        lb: f64,
        ub: f64,
        domain: VarDomain,
    ) -> SbbResult<usize> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(SbbError::InvalidProblem(format!(
                "variable '{}' declared twice in model '{}'",
                name, self.name
            )));
        }
        let (lb, ub) = match domain {
            VarDomain::Binary => (lb.max(0.0), ub.min(1.0)),
            _ => (lb, ub),
        };
        let idx = self.variables.len();
        self.index.insert(name.clone(), idx);
        self.variables.push(Variable {
            name,
            lb,
            ub,
            domain,
            value: None,
        });
        Ok(idx)
    }

    /// Add a linear row over named variables.
    pub fn add_row(
        &mut self,
        name: Option<&str>,
        terms: &[(&str, f64)],
        lower: f64,
        upper: f64,
    ) -> SbbResult<()> {
        let mut indexed = Vec::with_capacity(terms.len());
        for (var, coef) in terms {
            let idx = self.require(var)?;
            indexed.push((idx, *coef));
        }
        self.rows.push(LinearRow {
            name: name.map(str::to_string),
            terms: indexed,
            lower,
            upper,
        });
        Ok(())
    }

    /// Mark a variable as first-stage.
    pub fn mark_first_stage(&mut self, name: &str) -> SbbResult<()> {
        let idx = self.require(name)?;
        if !self.first_stage.contains(&idx) {
            self.first_stage.push(idx);
        }
        Ok(())
    }

    /// All variables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub(crate) fn variables_mut(&mut self) -> &mut [Variable] {
        &mut self.variables
    }

    /// Linear rows.
    pub fn rows(&self) -> &[LinearRow] {
        &self.rows
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    /// Index of a variable by name.
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn require(&self, name: &str) -> SbbResult<usize> {
        self.var_index(name).ok_or_else(|| {
            SbbError::InvalidProblem(format!(
                "unknown variable '{}' in model '{}'",
                name, self.name
            ))
        })
    }

    /// Indices of first-stage variables.
    pub fn first_stage(&self) -> &[usize] {
        &self.first_stage
    }

    /// Names of first-stage variables.
    pub fn first_stage_names(&self) -> Vec<&str> {
        self.first_stage
            .iter()
            .map(|&i| self.variables[i].name.as_str())
            .collect()
    }

    /// Replace a variable's bounds.
    pub fn set_bounds(&mut self, name: &str, lb: f64, ub: f64) -> SbbResult<()> {
        let idx = self.require(name)?;
        let var = &mut self.variables[idx];
        var.lb = lb;
        var.ub = ub;
        Ok(())
    }

    /// Intersect a variable's bounds with `[lb, ub]`.
    pub fn restrict_bounds(&mut self, name: &str, lb: f64, ub: f64) -> SbbResult<()> {
        let idx = self.require(name)?;
        let var = &mut self.variables[idx];
        var.lb = var.lb.max(lb);
        var.ub = var.ub.min(ub);
        Ok(())
    }

    /// Fix a variable to a value.
    pub fn fix(&mut self, name: &str, value: f64) -> SbbResult<()> {
        let idx = self.require(name)?;
        let var = &mut self.variables[idx];
        var.lb = value;
        var.ub = value;
        var.value = Some(value);
        Ok(())
    }

    /// Returns the name of the first variable with an empty domain.
    pub fn empty_domain(&self) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.is_empty())
            .map(|v| v.name.as_str())
    }

    /// Current value of a variable.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.variable(name).and_then(|v| v.value)
    }

    /// All loaded variable values.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.variables
            .iter()
            .filter_map(|v| v.value.map(|x| (v.name.clone(), x)))
            .collect()
    }

    /// Loaded values of the first-stage variables.
    pub fn first_stage_values(&self) -> BTreeMap<String, f64> {
        self.first_stage
            .iter()
            .filter_map(|&i| {
                let v = &self.variables[i];
                v.value.map(|x| (v.name.clone(), x))
            })
            .collect()
    }

    /// Load a solution into the model.
    ///
    /// Names the model does not know are ignored.
    pub fn load_solution(&mut self, values: &BTreeMap<String, f64>, objective: Option<f64>) {
        for (name, &x) in values {
            if let Some(&i) = self.index.get(name) {
                self.variables[i].value = Some(x);
            }
        }
        if objective.is_some() {
            self.objective_value = objective;
        }
    }

    /// Objective value of the loaded solution.
    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    /// Objective value inherited from the parent node (-inf at the root).
    ///
    /// Always a valid lower bound for this subproblem.
    pub fn successor_objective(&self) -> f64 {
        self.successor_objective
    }

    /// Set the inherited objective value.
    pub fn set_successor_objective(&mut self, value: f64) {
        self.successor_objective = value;
    }

    /// Attach solver-specific model data.
    pub fn set_payload<T: Any + Send>(&mut self, payload: T) {
        self.payload = Some(Box::new(payload));
    }

    /// Builder-style variant of [`set_payload`](Self::set_payload).
    pub fn with_payload<T: Any + Send>(mut self, payload: T) -> Self {
        self.set_payload(payload);
        self
    }

    /// Borrow the payload as a concrete type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Mutably borrow the payload as a concrete type.
    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.as_mut().and_then(|p| p.downcast_mut::<T>())
    }
}
