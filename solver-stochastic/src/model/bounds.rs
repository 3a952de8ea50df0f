//! Boxes over the first-stage variables.

use std::collections::BTreeMap;

use super::subproblem::{SubproblemModel, VarDomain, DOMAIN_TOL};
use crate::error::SbbResult;

/// Domain of one first-stage variable at a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarRange {
    /// Lower bound.
    pub lb: f64,

    /// Upper bound.
    pub ub: f64,

    /// Variable domain.
    pub domain: VarDomain,
}

impl VarRange {
    /// Width of the range.
    pub fn width(&self) -> f64 {
        self.ub - self.lb
    }

    /// Midpoint of the range.
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lb + self.ub)
    }

    /// Check whether `x` lies in the range within tolerance.
    pub fn contains(&self, x: f64, tol: f64) -> bool {
        x >= self.lb - tol && x <= self.ub + tol
    }

    /// Clamp `x` into the range, rounding integral domains.
    ///
    /// Returns `None` for an empty range.
    pub fn clip(&self, x: f64) -> Option<f64> {
        if !(self.lb <= self.ub) {
            return None;
        }
        let x = if self.domain.is_integral() { x.round() } else { x };
        Some(x.clamp(self.lb, self.ub))
    }

    /// Returns true if the range can still be split.
    pub fn is_branchable(&self, min_width: f64) -> bool {
        if self.domain.is_integral() {
            self.ub - self.lb >= 1.0 - DOMAIN_TOL
        } else {
            self.width() > min_width
        }
    }
}

/// Box over all first-stage variables, keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirstStageBounds {
    ranges: BTreeMap<String, VarRange>,
}

impl FirstStageBounds {
    /// Create an empty box.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the range of a variable.
    pub fn insert(&mut self, name: impl Into<String>, range: VarRange) {
        self.ranges.insert(name.into(), range);
    }

    /// Range of a variable.
    pub fn get(&self, name: &str) -> Option<&VarRange> {
        self.ranges.get(name)
    }

    /// Iterate over (name, range) in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarRange)> {
        self.ranges.iter()
    }

    /// Variable names in order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.ranges.keys()
    }

    /// Number of first-stage variables.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the box has no variables.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Check whether a first-stage assignment lies inside the box.
    pub fn contains(&self, point: &BTreeMap<String, f64>, tol: f64) -> bool {
        self.ranges.iter().all(|(name, range)| {
            point
                .get(name)
                .map(|&x| range.contains(x, tol))
                .unwrap_or(false)
        })
    }

    /// Copy of the box with one variable's range replaced.
    pub fn with_range(&self, name: &str, lb: f64, ub: f64) -> Self {
        let mut out = self.clone();
        if let Some(range) = out.ranges.get_mut(name) {
            range.lb = lb;
            range.ub = ub;
        }
        out
    }

    /// Restrict a model's first-stage variables to this box.
    pub fn apply_to(&self, model: &mut SubproblemModel) -> SbbResult<()> {
        for (name, range) in &self.ranges {
            model.restrict_bounds(name, range.lb, range.ub)?;
        }
        Ok(())
    }

    /// Fix a model's first-stage variables to an assignment.
    pub fn fix_in(model: &mut SubproblemModel, point: &BTreeMap<String, f64>) -> SbbResult<()> {
        for (name, &x) in point {
            model.fix(name, x)?;
        }
        Ok(())
    }
}
