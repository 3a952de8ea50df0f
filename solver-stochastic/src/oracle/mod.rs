//! Contracts with the external local and global solvers.

mod backend;
mod outcome;

pub use backend::{GlobalSolver, LocalSolver};
pub use outcome::{
    ExtensiveOutcome, GlobalSolveOptions, ObjectiveOverride, SolveOutcome, TerminationStatus,
};
