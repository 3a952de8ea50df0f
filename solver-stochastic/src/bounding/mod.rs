//! Lower bounding, candidate generation and bounds tightening.

mod adaptive;
mod lower;
mod tightening;
mod upper;

pub use adaptive::{AdaptiveGapBounder, GapSchedule};
pub use lower::{
    BoundRequest, BoundSolveResult, DropNonants, LowerBounder, PartitionBound, ScenarioBound,
    ScenarioSubproblem,
};
pub use tightening::{fbbt, BoundsTightener, TighteningOutcome};
pub use upper::{CandidateContext, ExpectedValueCandidate, SolveExtensiveForm, UpperBounder};
