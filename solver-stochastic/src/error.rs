//! Error types for the stochastic branch-and-bound coordinator.

use thiserror::Error;

use crate::search::NodeId;

/// Errors that abort a solve.
///
/// Infeasible subproblems and exhausted budgets are search outcomes and are
/// never reported through this type.
#[derive(Error, Debug)]
pub enum SbbError {
    /// Problem or parameter validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// The caller's builder failed for a scenario
    #[error("Failed to build subproblem for scenario '{scenario}': {message}")]
    Build {
        /// Scenario whose model could not be built.
        scenario: String,
        /// Builder-provided reason.
        message: String,
    },

    /// A solver terminated with a status that is neither optimal, infeasible
    /// nor time-limited.
    #[error("Solver fault on scenario '{scenario}' at {}: {status}", node_label(.node))]
    SolverFault {
        /// Scenario being solved.
        scenario: String,
        /// Node being processed, once known.
        node: Option<NodeId>,
        /// Termination status reported by the solver.
        status: String,
    },

    /// A collaborator does not implement a requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A worker thread failed or disconnected
    #[error("Worker {rank} failed: {message}")]
    Worker {
        /// Rank of the failing worker.
        rank: usize,
        /// Failure description.
        message: String,
    },

    /// Internal solver error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn node_label(node: &Option<NodeId>) -> String {
    match node {
        Some(id) => format!("node {}", id),
        None => "unknown node".to_string(),
    }
}

impl SbbError {
    /// Create a solver fault for a scenario whose node is not yet known.
    pub fn solver_fault(scenario: impl Into<String>, status: impl Into<String>) -> Self {
        SbbError::SolverFault {
            scenario: scenario.into(),
            node: None,
            status: status.into(),
        }
    }

    /// Attach the node being processed to a fault that lacks one.
    pub fn at_node(self, id: NodeId) -> Self {
        match self {
            SbbError::SolverFault {
                scenario,
                node: None,
                status,
            } => SbbError::SolverFault {
                scenario,
                node: Some(id),
                status,
            },
            other => other,
        }
    }
}

/// Result type for coordinator operations.
pub type SbbResult<T> = Result<T, SbbError>;
