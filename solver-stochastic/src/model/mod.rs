//! Scenario, subproblem and solution types.

mod bounds;
mod extensive;
mod scenario;
mod solution;
mod subproblem;

pub use bounds::{FirstStageBounds, VarRange};
pub use extensive::{ExtensiveForm, ExtensiveMember};
pub use scenario::{Scenario, ScenarioBuild, ScenarioSet, SubproblemBuilder};
pub use solution::{Candidate, IncumbentTracker, SearchLimit, Solution, TerminationReason};
pub use subproblem::{LinearRow, SubproblemModel, VarDomain, Variable, DOMAIN_TOL};
