//! Branching variable selection.

use std::collections::BTreeMap;

use crate::bounding::ScenarioBound;
use crate::model::{FirstStageBounds, ScenarioSet};

/// Disagreement below this is treated as consensus.
const CONSENSUS_TOL: f64 = 1e-9;

/// What a branching strategy sees of a bounded node.
#[derive(Debug, Clone, Copy)]
pub struct BranchContext<'a> {
    /// All scenarios.
    pub scenarios: &'a ScenarioSet,

    /// First-stage box of the node.
    pub bounds: &'a FirstStageBounds,

    /// Per-scenario bounds and solutions at the node.
    pub scenario_bounds: &'a BTreeMap<String, ScenarioBound>,

    /// Continuous ranges narrower than this are not split.
    pub min_branch_width: f64,
}

impl<'a> BranchContext<'a> {
    /// (weight, value) of `var` for every scenario that reported one.
    pub fn values_of(&self, var: &str) -> Vec<(f64, f64)> {
        self.scenarios
            .scenarios()
            .iter()
            .filter_map(|s| {
                let x = self.scenario_bounds.get(&s.name)?.first_stage.get(var)?;
                Some((s.weight, *x))
            })
            .collect()
    }

    /// Spread of the scenario values of `var` relative to its root range
    /// width, so the score shrinks along with the node's box.
    pub fn disagreement(&self, var: &str) -> f64 {
        let Some(range) = self.scenarios.root_bounds().get(var) else {
            return 0.0;
        };
        let values = self.values_of(var);
        if values.len() < 2 || range.width() <= 0.0 {
            return 0.0;
        }
        let (lo, hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, x)| {
                (lo.min(x), hi.max(x))
            });
        (hi - lo) / range.width()
    }

    /// Probability-weighted mean of `var` over reporting scenarios.
    pub fn expected_value(&self, var: &str) -> Option<f64> {
        let values = self.values_of(var);
        let total: f64 = values.iter().map(|(w, _)| w).sum();
        if values.is_empty() || total <= 0.0 {
            return None;
        }
        Some(values.iter().map(|(w, x)| w * x).sum::<f64>() / total)
    }

    /// Branchable variables in name order.
    pub fn branchable(&self) -> impl Iterator<Item = &'a String> + '_ {
        let min_width = self.min_branch_width;
        self.bounds
            .iter()
            .filter(move |(_, r)| r.is_branchable(min_width))
            .map(|(n, _)| n)
    }

    /// Branchable variable with the widest range.
    pub fn widest(&self) -> Option<BranchDecision> {
        let mut best: Option<BranchDecision> = None;
        for name in self.branchable() {
            let width = self.bounds.get(name).map(|r| r.width()).unwrap_or(0.0);
            if best.as_ref().map_or(true, |b| width > b.score) {
                best = Some(BranchDecision {
                    variable: name.clone(),
                    score: width,
                    disagreement: 0.0,
                });
            }
        }
        best
    }
}

/// A branching decision.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchDecision {
    /// First-stage variable to split.
    pub variable: String,

    /// Score of this decision (for logging/debugging).
    pub score: f64,

    /// Normalised scenario disagreement on the variable.
    pub disagreement: f64,
}

/// Chooses the first-stage variable to split at a node.
pub trait BranchingStrategy: Send {
    /// Select a variable, or None if no range can be split.
    fn select(&mut self, ctx: &BranchContext<'_>) -> Option<BranchDecision>;

    /// Observe the lower-bound improvement of a child created by splitting
    /// `var`.
    fn record_improvement(&mut self, _var: &str, _improvement: f64) {}
}

/// Split the variable on which the scenarios disagree most.
///
/// Falls back to the widest range once the scenarios agree.
#[derive(Debug, Clone, Default)]
pub struct MaximumDisagreement;

impl MaximumDisagreement {
    fn most_disputed(ctx: &BranchContext<'_>) -> Option<BranchDecision> {
        let mut best: Option<BranchDecision> = None;
        for name in ctx.branchable() {
            let d = ctx.disagreement(name);
            if d > CONSENSUS_TOL && best.as_ref().map_or(true, |b| d > b.score) {
                best = Some(BranchDecision {
                    variable: name.clone(),
                    score: d,
                    disagreement: d,
                });
            }
        }
        best
    }
}

impl BranchingStrategy for MaximumDisagreement {
    fn select(&mut self, ctx: &BranchContext<'_>) -> Option<BranchDecision> {
        Self::most_disputed(ctx).or_else(|| ctx.widest())
    }
}

/// Maximum disagreement for early nodes, pseudocost-weighted later.
#[derive(Debug, Clone)]
pub struct HybridBranching {
    /// Switch to pseudocost scoring after this many decisions.
    switch_after: u64,

    /// Decisions made so far.
    decisions: u64,

    /// Average lower-bound improvement per split, and split count.
    pseudocosts: BTreeMap<String, (f64, u64)>,
}

impl HybridBranching {
    /// Create a hybrid rule.
    pub fn new(switch_after: u64) -> Self {
        Self {
            switch_after,
            decisions: 0,
            pseudocosts: BTreeMap::new(),
        }
    }

    /// Average improvement and count for a variable.
    pub fn pseudocost(&self, var: &str) -> (f64, u64) {
        self.pseudocosts.get(var).copied().unwrap_or((1.0, 0)) // 1 is neutral
    }

    fn select_pseudocost(&self, ctx: &BranchContext<'_>) -> Option<BranchDecision> {
        let mut best: Option<BranchDecision> = None;
        for name in ctx.branchable() {
            let d = ctx.disagreement(name);
            if d <= CONSENSUS_TOL {
                continue;
            }
            let score = (d * self.pseudocost(name).0).max(1e-10);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(BranchDecision {
                    variable: name.clone(),
                    score,
                    disagreement: d,
                });
            }
        }
        best
    }
}

impl BranchingStrategy for HybridBranching {
    fn select(&mut self, ctx: &BranchContext<'_>) -> Option<BranchDecision> {
        let decision = if self.decisions < self.switch_after {
            MaximumDisagreement::most_disputed(ctx)
        } else {
            self.select_pseudocost(ctx)
        };
        let decision = decision.or_else(|| ctx.widest());
        if decision.is_some() {
            self.decisions += 1;
        }
        decision
    }

    fn record_improvement(&mut self, var: &str, improvement: f64) {
        if !improvement.is_finite() || improvement < 0.0 {
            return;
        }
        let entry = self.pseudocosts.entry(var.to_string()).or_insert((1.0, 0));
        // Running average
        let count = entry.1 as f64;
        entry.0 = (entry.0 * count + improvement) / (count + 1.0);
        entry.1 += 1;
    }
}
