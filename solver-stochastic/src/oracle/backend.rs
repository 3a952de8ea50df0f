//! Solver backend traits.
//!
//! The coordinator reaches the numerical engines only through these two
//! contracts. Calls are synchronous and must respect the time budget they are
//! given, so the search can always fall back to a partial result.

use super::outcome::{ExtensiveOutcome, GlobalSolveOptions, SolveOutcome};
use crate::error::{SbbError, SbbResult};
use crate::model::{ExtensiveForm, SubproblemModel};

/// Local (convex / NLP) solver used for warm starts and fallback bounds.
pub trait LocalSolver: Send {
    /// Solve a subproblem locally.
    fn solve(&mut self, model: &SubproblemModel) -> SbbResult<SolveOutcome>;
}

impl<F> LocalSolver for F
where
    F: FnMut(&SubproblemModel) -> SbbResult<SolveOutcome> + Send,
{
    fn solve(&mut self, model: &SubproblemModel) -> SbbResult<SolveOutcome> {
        self(model)
    }
}

/// Global (MINLP / MILP) solver used for certified bounds.
///
/// Implementations read the current variable values of `model` as a warm
/// start.
pub trait GlobalSolver: Send {
    /// Solve a subproblem under the given options.
    fn solve(&mut self, model: &SubproblemModel, options: &GlobalSolveOptions)
        -> SbbResult<SolveOutcome>;

    /// Solve the extensive form of several scenarios.
    fn solve_extensive(
        &mut self,
        _form: &ExtensiveForm,
        _options: &GlobalSolveOptions,
    ) -> SbbResult<ExtensiveOutcome> {
        Err(SbbError::Unsupported(
            "this global solver cannot solve extensive forms".into(),
        ))
    }
}

impl<F> GlobalSolver for F
where
    F: FnMut(&SubproblemModel, &GlobalSolveOptions) -> SbbResult<SolveOutcome> + Send,
{
    fn solve(
        &mut self,
        model: &SubproblemModel,
        options: &GlobalSolveOptions,
    ) -> SbbResult<SolveOutcome> {
        self(model, options)
    }
}
