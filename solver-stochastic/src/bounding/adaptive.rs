//! Adaptive-gap lower bounding.
//!
//! Early in the search the global solver runs with a loose relative gap and
//! only its proven bound is used. After a number of warm-up sweeps the gap is
//! tightened by a fixed step once per sweep until it reaches its floor, after
//! which the solver's objective is used directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::lower::{BoundSolveResult, LowerBounder};
use crate::error::{SbbError, SbbResult};
use crate::model::SubproblemModel;
use crate::oracle::{
    GlobalSolveOptions, GlobalSolver, LocalSolver, SolveOutcome, TerminationStatus,
};

/// Relative gap schedule driven by a shared solve counter.
///
/// The gap is a pure function of the number of solves recorded so far, so
/// every worker sharing the schedule observes the same sequence.
#[derive(Debug)]
pub struct GapSchedule {
    initial: f64,
    decrement: f64,
    floor: f64,
    warmup_sweeps: u64,
    sweep_len: u64,
    solves: AtomicU64,
}

impl GapSchedule {
    /// Create a schedule.
    ///
    /// `sweep_len` is the number of solves in one sweep, normally the
    /// scenario count.
    pub fn new(initial: f64, decrement: f64, floor: f64, warmup_sweeps: u64, sweep_len: u64) -> Self {
        Self {
            initial,
            decrement: decrement.max(0.0),
            floor: floor.min(initial),
            warmup_sweeps,
            sweep_len: sweep_len.max(1),
            solves: AtomicU64::new(0),
        }
    }

    /// Create a schedule ready to be shared between bounders.
    pub fn shared(
        initial: f64,
        decrement: f64,
        floor: f64,
        warmup_sweeps: u64,
        sweep_len: u64,
    ) -> Arc<Self> {
        Arc::new(Self::new(initial, decrement, floor, warmup_sweeps, sweep_len))
    }

    /// Gap in effect after `solves` recorded solves.
    ///
    /// The first decrement applies at solve `warmup_sweeps * sweep_len + 1`
    /// and one more at every sweep after it.
    pub fn gap_after(&self, solves: u64) -> f64 {
        let warmup = self.warmup_sweeps * self.sweep_len;
        let steps = if solves > warmup {
            (solves - warmup - 1) / self.sweep_len + 1
        } else {
            0
        };
        (self.initial - self.decrement * steps as f64).max(self.floor)
    }

    /// Record one solve and return the gap to use for it.
    pub fn record_solve(&self) -> f64 {
        let k = self.solves.fetch_add(1, Ordering::SeqCst) + 1;
        self.gap_after(k)
    }

    /// Gap after the solves recorded so far.
    pub fn current_gap(&self) -> f64 {
        self.gap_after(self.solves())
    }

    /// Number of solves recorded.
    pub fn solves(&self) -> u64 {
        self.solves.load(Ordering::SeqCst)
    }

    /// Gap floor.
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Returns true if `gap` has reached the floor.
    pub fn at_floor(&self, gap: f64) -> bool {
        gap <= self.floor + 1e-12
    }
}

/// Local warm start followed by a global solve at the scheduled gap.
pub struct AdaptiveGapBounder {
    local: Box<dyn LocalSolver>,
    global: Box<dyn GlobalSolver>,
    options: GlobalSolveOptions,
    schedule: Arc<GapSchedule>,
}

impl AdaptiveGapBounder {
    /// Create a bounder sharing `schedule` with its siblings.
    pub fn new(
        local: impl LocalSolver + 'static,
        global: impl GlobalSolver + 'static,
        schedule: Arc<GapSchedule>,
    ) -> Self {
        Self {
            local: Box::new(local),
            global: Box::new(global),
            options: GlobalSolveOptions::default(),
            schedule,
        }
    }

    /// Time budget of each global solve, in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.options = self.options.with_time_limit(seconds);
        self
    }

    /// The shared schedule.
    pub fn schedule(&self) -> &Arc<GapSchedule> {
        &self.schedule
    }

    fn warm_start(&mut self, model: &mut SubproblemModel) -> Option<SolveOutcome> {
        match self.local.solve(model) {
            Ok(outcome) => {
                if outcome.is_optimal() {
                    model.load_solution(&outcome.values, None);
                }
                Some(outcome)
            }
            Err(e) => {
                log::warn!(
                    "Local warm start failed on scenario '{}', a global time limit will be fatal: {}",
                    model.name(),
                    e
                );
                None
            }
        }
    }
}

impl LowerBounder for AdaptiveGapBounder {
    fn solve_subproblem(&mut self, model: &mut SubproblemModel) -> SbbResult<BoundSolveResult> {
        let gap = self.schedule.record_solve();
        let warm = self.warm_start(model);

        let options = self.options.clone().with_gap(gap);
        let mut outcome = self.global.solve(model, &options)?;
        let mut fallback = false;

        if outcome.status == TerminationStatus::TimeLimit {
            log::debug!(
                "Global solve of '{}' hit its time limit, using local result",
                model.name()
            );
            fallback = true;
            outcome = warm.ok_or_else(|| {
                SbbError::solver_fault(model.name(), "time limit without a local warm start")
            })?;
        }

        match outcome.status {
            TerminationStatus::Optimal => {
                model.load_solution(&outcome.values, outcome.objective);
                let value = if self.schedule.at_floor(gap) {
                    outcome.objective.or(outcome.bound)
                } else {
                    outcome
                        .best_bound()
                        .map(|b| b.max(model.successor_objective()))
                };
                let value = value.ok_or_else(|| {
                    SbbError::solver_fault(model.name(), "optimal without objective")
                })?;
                Ok(BoundSolveResult::feasible(value))
            }
            TerminationStatus::Infeasible if !fallback => Ok(BoundSolveResult::infeasible()),
            status => Err(SbbError::solver_fault(model.name(), status.to_string())),
        }
    }
}
