//! Stochastic branch-and-bound for two-stage stochastic MINLPs
//!
//! Solves problems of the form
//!
//! ```text
//! min  Σ_s p_s f_s(x, y_s)
//! s.t. (x, y_s) ∈ X_s   for every scenario s
//! ```
//!
//! where `x` are first-stage variables shared by all scenarios and `y_s` are
//! scenario-local recourse variables. The search is a spatial
//! branch-and-bound over the box of `x`:
//!
//! - **Lower bounds** relax nonanticipativity and solve each scenario
//!   separately, either to global optimality ([`DropNonants`]) or with a
//!   gap that shrinks as the search proceeds ([`AdaptiveGapBounder`])
//! - **Upper bounds** fix a candidate first stage and evaluate every
//!   scenario ([`ExpectedValueCandidate`]) or solve the extensive form over
//!   the node box ([`SolveExtensiveForm`])
//! - **Branching** splits on the first-stage variable on which the
//!   scenarios disagree most, and each child inherits the scenarios whose
//!   parent bound is still exact in its box
//!
//! Subproblem models are built by a caller-supplied [`SubproblemBuilder`] and
//! solved through the [`LocalSolver`] and [`GlobalSolver`] contracts; no
//! numerical solver is bundled.
//!
//! # Example
//!
//! ```ignore
//! use solver_stochastic::{DropNonants, ExpectedValueCandidate, Solver, SolverParameters};
//!
//! let mut params = SolverParameters::new(scenario_names, build_scenario);
//! params
//!     .set_bounders(
//!         || ExpectedValueCandidate::new(my_global_solver()),
//!         || DropNonants::new(my_global_solver()),
//!     )
//!     .set_workers(4);
//!
//! let mut solver = Solver::new(params)?;
//! let solution = solver.solve(10_000, 1e-4, None)?;
//! println!("{} {:?} {:?}", solution.reason, solution.objective, solution.first_stage);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bounding;
pub mod error;
pub mod model;
pub mod oracle;
mod parallel;
pub mod params;
pub mod search;
pub mod settings;
pub mod solver;

pub use bounding::{
    AdaptiveGapBounder, BoundsTightener, DropNonants, ExpectedValueCandidate, GapSchedule,
    LowerBounder, SolveExtensiveForm, UpperBounder,
};
pub use error::{SbbError, SbbResult};
pub use model::{
    Candidate, FirstStageBounds, ScenarioBuild, ScenarioSet, SearchLimit, Solution,
    SubproblemBuilder, SubproblemModel, TerminationReason, VarDomain, VarRange,
};
pub use oracle::{
    ExtensiveOutcome, GlobalSolveOptions, GlobalSolver, LocalSolver, SolveOutcome,
    TerminationStatus,
};
pub use params::SolverParameters;
pub use search::{
    BranchingStrategy, HybridBranching, MaximumDisagreement, PartitionStrategy, TreeStats,
};
pub use settings::{NodeSelection, SearchSettings, TighteningSettings};
pub use solver::Solver;
