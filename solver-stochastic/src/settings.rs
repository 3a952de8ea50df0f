//! Search settings.

use crate::oracle::GlobalSolveOptions;

/// Node selection strategy for the search tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelection {
    /// Always select node with best (lowest) lower bound.
    #[default]
    BestBound,

    /// Depth-first search (finds candidates quickly).
    DepthFirst,

    /// Hybrid: alternate between diving and best-bound.
    Hybrid {
        /// How often to dive (every N nodes).
        dive_freq: usize,
    },
}

/// Bounds tightening settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TighteningSettings {
    /// Propagate linear rows on every subproblem.
    pub fbbt: bool,

    /// Minimise/maximise first-stage variables before bounding.
    pub obbt: bool,

    /// Options for OBBT solves (gap and time limit).
    pub obbt_options: GlobalSolveOptions,

    /// Maximum FBBT passes over all rows.
    pub fbbt_max_rounds: usize,

    /// Deepest node at which OBBT runs.
    pub obbt_max_depth: usize,
}

impl Default for TighteningSettings {
    fn default() -> Self {
        Self {
            fbbt: true,
            obbt: false,
            obbt_options: GlobalSolveOptions::default().with_gap(1e-2),
            fbbt_max_rounds: 10,
            obbt_max_depth: 4,
        }
    }
}

/// Search settings.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    // === Pruning ===
    /// Absolute tolerance used when pruning against the incumbent.
    pub abs_tolerance: f64,

    /// Minimum width of a continuous range that may still be split.
    pub min_branch_width: f64,

    // === Search strategy ===
    /// Node selection strategy.
    pub node_selection: NodeSelection,

    /// Run the candidate finder every N iterations (root always).
    pub upper_bound_frequency: u64,

    /// Bounds tightening.
    pub tightening: TighteningSettings,

    /// Worker threads (1 = serial).
    pub workers: usize,

    // === Output ===
    /// Print progress information.
    pub verbose: bool,

    /// Log frequency (print every N iterations).
    pub log_freq: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            abs_tolerance: 1e-6,
            min_branch_width: 1e-6,

            node_selection: NodeSelection::default(),
            upper_bound_frequency: 1,
            tightening: TighteningSettings::default(),
            workers: 1,

            verbose: false,
            log_freq: 10,
        }
    }
}

impl SearchSettings {
    /// Create settings with verbose output enabled.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            log_freq: 1,
            ..Self::default()
        }
    }

    /// Set the absolute pruning tolerance.
    pub fn with_abs_tolerance(mut self, tol: f64) -> Self {
        self.abs_tolerance = tol;
        self
    }

    /// Set the candidate finder cadence.
    pub fn with_upper_bound_frequency(mut self, every: u64) -> Self {
        self.upper_bound_frequency = every.max(1);
        self
    }

    /// Set the node selection strategy.
    pub fn with_node_selection(mut self, selection: NodeSelection) -> Self {
        self.node_selection = selection;
        self
    }

    /// Returns true if the candidate finder should run at this iteration.
    pub fn runs_upper_bound(&self, iteration: u64) -> bool {
        iteration == 0 || iteration % self.upper_bound_frequency.max(1) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = SearchSettings::default();
        assert_eq!(s.node_selection, NodeSelection::BestBound);
        assert_eq!(s.workers, 1);
        assert!(s.tightening.fbbt);
        assert!(!s.tightening.obbt);
        assert!(!s.verbose);
    }

    #[test]
    fn test_upper_bound_cadence() {
        let s = SearchSettings::default().with_upper_bound_frequency(3);
        assert!(s.runs_upper_bound(0));
        assert!(!s.runs_upper_bound(1));
        assert!(!s.runs_upper_bound(2));
        assert!(s.runs_upper_bound(3));

        let s = SearchSettings::default().with_upper_bound_frequency(0);
        assert!(s.runs_upper_bound(5));
    }
}
