//! Top-level solver.

use std::time::Duration;

use crate::error::{SbbError, SbbResult};
use crate::model::{ExtensiveForm, ScenarioSet, Solution};
use crate::parallel;
use crate::params::SolverParameters;
use crate::search::{NodeProcessor, Partition, SearchLimits, SearchTree, TreeStats};

/// Stochastic branch-and-bound solver.
///
/// # Example
///
/// ```ignore
/// let mut params = SolverParameters::new(names, builder);
/// params.set_bounders(
///     || ExpectedValueCandidate::new(global()),
///     || DropNonants::new(global()),
/// );
/// let mut solver = Solver::new(params)?;
/// let solution = solver.solve(1000, 1e-4, Some(Duration::from_secs(60)))?;
/// println!("{}: {:?}", solution.reason, solution.objective);
/// ```
pub struct Solver {
    params: SolverParameters,
    scenarios: ScenarioSet,
    solution: Option<Solution>,
}

impl Solver {
    /// Validate the parameters and build every scenario once.
    pub fn new(params: SolverParameters) -> SbbResult<Self> {
        params.validate()?;
        let scenarios = ScenarioSet::new(params.subproblem_names(), params.builder())?;
        if params.settings.verbose {
            log::info!("{}", params);
            log::info!(
                "{} scenarios, {} first-stage variables",
                scenarios.len(),
                scenarios.first_stage().len()
            );
        }
        Ok(Self {
            params,
            scenarios,
            solution: None,
        })
    }

    /// The validated scenario set.
    pub fn scenarios(&self) -> &ScenarioSet {
        &self.scenarios
    }

    /// Solver parameters.
    pub fn parameters(&self) -> &SolverParameters {
        &self.params
    }

    /// Extensive form over the root box, for checking against a monolithic
    /// solve.
    pub fn extensive_form(&self) -> SbbResult<ExtensiveForm> {
        ExtensiveForm::build(&self.scenarios, self.scenarios.root_bounds())
    }

    /// Result of the last solve.
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Search statistics of the last solve.
    pub fn stats(&self) -> Option<&TreeStats> {
        self.solution.as_ref().map(|s| &s.stats)
    }

    /// Run branch-and-bound.
    ///
    /// Stops after `max_iter` processed nodes, once the relative gap is at
    /// most `rel_tolerance`, or when `time_limit` elapses.
    pub fn solve(
        &mut self,
        max_iter: u64,
        rel_tolerance: f64,
        time_limit: Option<Duration>,
    ) -> SbbResult<&Solution> {
        if !(rel_tolerance >= 0.0) {
            return Err(SbbError::InvalidProblem(format!(
                "relative tolerance must be nonnegative, got {}",
                rel_tolerance
            )));
        }
        let limits = SearchLimits {
            max_iterations: max_iter,
            rel_tolerance,
            time_limit,
        };

        let solution = if self.params.settings.workers > 1 {
            parallel::solve(&self.params, &self.scenarios, limits)?
        } else {
            self.solve_serial(limits)?
        };

        if self.params.settings.verbose {
            log::info!(
                "Objective: {:?} | Lower bound: {:.6e} | Gap: {:.4}%",
                solution.objective,
                solution.lower_bound,
                solution.gap * 100.0
            );
        }
        Ok(self.solution.insert(solution))
    }

    fn solve_serial(&self, limits: SearchLimits) -> SbbResult<Solution> {
        let mut processor = NodeProcessor::new(
            0,
            self.scenarios.clone(),
            self.params.strategies()?,
            self.params.settings.clone(),
        );
        let mut tree = SearchTree::new(
            self.params.settings.clone(),
            limits,
            self.scenarios.root_bounds().clone(),
            Partition::full(&self.scenarios),
        );

        loop {
            if let Some(reason) = tree.check_termination() {
                return Ok(tree.finalize(reason));
            }
            let Some(work) = tree.next_work() else {
                continue;
            };
            let report = processor.process(work)?;
            tree.apply_report(report);
            tree.log_progress();
        }
    }
}
