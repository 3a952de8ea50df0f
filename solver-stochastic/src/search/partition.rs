//! Splitting a node's box and clustering its scenarios among the children.
//!
//! A scenario whose solution already lies inside a child's box keeps its
//! bound there: the child is a subset of the parent, so the parent's
//! scenario optimum is still optimal for it. All other scenarios are solved
//! again at the child, starting from the parent's value as a floor. A
//! scenario without a recorded point, or whose point falls in the gap of an
//! integer split, belongs to neither child.

use super::branching::{BranchContext, BranchDecision};
use super::node::Partition;
use crate::error::{SbbError, SbbResult};
use crate::model::{FirstStageBounds, DOMAIN_TOL};

/// One child produced by a split.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildPartition {
    /// Child box.
    pub bounds: FirstStageBounds,

    /// Scenarios whose parent bound is exact in the child.
    pub partition: Partition,
}

/// Chooses where to split a branching variable.
pub trait PartitionStrategy: Send {
    /// Split point for `decision`'s variable.
    fn split_value(&mut self, ctx: &BranchContext<'_>, decision: &BranchDecision) -> f64;

    /// Split the box and cluster the scenarios of `parent`.
    fn partition(
        &mut self,
        ctx: &BranchContext<'_>,
        parent: &Partition,
        decision: &BranchDecision,
    ) -> SbbResult<Vec<ChildPartition>> {
        let value = self.split_value(ctx, decision);
        split_children(ctx, parent, decision, value)
    }
}

/// Split at the midpoint of the range.
#[derive(Debug, Clone, Default)]
pub struct Midpoint;

impl PartitionStrategy for Midpoint {
    fn split_value(&mut self, ctx: &BranchContext<'_>, decision: &BranchDecision) -> f64 {
        ctx.bounds
            .get(&decision.variable)
            .map(|r| r.midpoint())
            .unwrap_or(f64::NAN)
    }
}

/// Split at the probability-weighted mean of the scenario values, falling
/// back to the midpoint when the mean sits on the boundary.
#[derive(Debug, Clone, Default)]
pub struct ExpectedValue;

impl PartitionStrategy for ExpectedValue {
    fn split_value(&mut self, ctx: &BranchContext<'_>, decision: &BranchDecision) -> f64 {
        let Some(range) = ctx.bounds.get(&decision.variable) else {
            return f64::NAN;
        };
        match ctx.expected_value(&decision.variable) {
            Some(v) if v > range.lb && v < range.ub => v,
            _ => range.midpoint(),
        }
    }
}

/// Build the two children of a split at `value`.
///
/// Integral ranges split into `[lb, floor(v)]` and `[floor(v) + 1, ub]`;
/// continuous ranges share the split point, which goes left. A split point
/// outside the open range is replaced by the midpoint.
pub fn split_children(
    ctx: &BranchContext<'_>,
    parent: &Partition,
    decision: &BranchDecision,
    value: f64,
) -> SbbResult<Vec<ChildPartition>> {
    let var = decision.variable.as_str();
    let range = ctx.bounds.get(var).ok_or_else(|| {
        SbbError::Internal(format!("branching variable '{}' is not first-stage", var))
    })?;

    let value = if value.is_finite() && value > range.lb && value < range.ub {
        value
    } else {
        range.midpoint()
    };

    let (left_ub, right_lb) = if range.domain.is_integral() {
        let v = value.floor().clamp(range.lb, range.ub - 1.0);
        (v, v + 1.0)
    } else {
        (value, value)
    };
    if left_ub < range.lb || right_lb > range.ub {
        return Err(SbbError::Internal(format!(
            "range of '{}' cannot be split: [{}, {}]",
            var, range.lb, range.ub
        )));
    }

    let mut left = Partition::default();
    let mut right = Partition::default();
    for scenario in parent.iter() {
        let x = ctx
            .scenario_bounds
            .get(scenario)
            .and_then(|b| b.first_stage.get(var));
        match x {
            Some(&x) if x <= left_ub + DOMAIN_TOL => left.insert(scenario.as_str()),
            Some(&x) if x >= right_lb - DOMAIN_TOL => right.insert(scenario.as_str()),
            _ => log::trace!("'{}' is re-solved in both children of '{}'", scenario, var),
        }
    }

    Ok(vec![
        ChildPartition {
            bounds: ctx.bounds.with_range(var, range.lb, left_ub),
            partition: left,
        },
        ChildPartition {
            bounds: ctx.bounds.with_range(var, right_lb, range.ub),
            partition: right,
        },
    ])
}
