//! Solver configuration: scenarios, strategy factories and search settings.
//!
//! Strategies are registered as factories so that every worker builds its
//! own instances.

use std::fmt;
use std::sync::Arc;

use crate::bounding::{LowerBounder, UpperBounder};
use crate::error::{SbbError, SbbResult};
use crate::model::SubproblemBuilder;
use crate::oracle::{GlobalSolveOptions, GlobalSolver};
use crate::search::{
    BranchingStrategy, ExpectedValue, MaximumDisagreement, PartitionStrategy, Strategies,
};
use crate::settings::{NodeSelection, SearchSettings};

/// Builds a lower bounder.
pub type LowerBounderFactory = Arc<dyn Fn() -> Box<dyn LowerBounder> + Send + Sync>;

/// Builds a candidate finder.
pub type UpperBounderFactory = Arc<dyn Fn() -> Box<dyn UpperBounder> + Send + Sync>;

/// Builds a branching strategy.
pub type BranchingFactory = Arc<dyn Fn() -> Box<dyn BranchingStrategy> + Send + Sync>;

/// Builds a partition strategy.
pub type PartitionFactory = Arc<dyn Fn() -> Box<dyn PartitionStrategy> + Send + Sync>;

/// Builds a global solver.
pub type GlobalSolverFactory = Arc<dyn Fn() -> Box<dyn GlobalSolver> + Send + Sync>;

/// Last path segment of a type name, without generics.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Parameters of a stochastic branch-and-bound solve.
#[derive(Clone)]
pub struct SolverParameters {
    subproblem_names: Vec<String>,
    builder: Arc<dyn SubproblemBuilder>,

    lower_bounder: Option<(LowerBounderFactory, &'static str)>,
    upper_bounder: Option<(UpperBounderFactory, &'static str)>,
    branching: (BranchingFactory, &'static str),
    partition: (PartitionFactory, &'static str),
    obbt_solver: Option<GlobalSolverFactory>,

    /// Search settings.
    pub settings: SearchSettings,
}

impl SolverParameters {
    /// Parameters for the named scenarios.
    ///
    /// Branching defaults to [`MaximumDisagreement`] with [`ExpectedValue`]
    /// partitioning; bounders must be set with
    /// [`set_bounders`](Self::set_bounders).
    pub fn new(subproblem_names: Vec<String>, builder: impl SubproblemBuilder + 'static) -> Self {
        let branching: BranchingFactory = Arc::new(|| Box::new(MaximumDisagreement));
        let partition: PartitionFactory = Arc::new(|| Box::new(ExpectedValue));
        Self {
            subproblem_names,
            builder: Arc::new(builder),
            lower_bounder: None,
            upper_bounder: None,
            branching: (branching, short_type_name::<MaximumDisagreement>()),
            partition: (partition, short_type_name::<ExpectedValue>()),
            obbt_solver: None,
            settings: SearchSettings::default(),
        }
    }

    /// Register the candidate finder and the lower bounder.
    pub fn set_bounders<U, FU, L, FL>(
        &mut self,
        candidate_solution_finder: FU,
        lower_bounder: FL,
    ) -> &mut Self
    where
        U: UpperBounder + 'static,
        FU: Fn() -> U + Send + Sync + 'static,
        L: LowerBounder + 'static,
        FL: Fn() -> L + Send + Sync + 'static,
    {
        let upper: UpperBounderFactory =
            Arc::new(move || Box::new(candidate_solution_finder()) as Box<dyn UpperBounder>);
        let lower: LowerBounderFactory =
            Arc::new(move || Box::new(lower_bounder()) as Box<dyn LowerBounder>);
        self.upper_bounder = Some((upper, short_type_name::<U>()));
        self.lower_bounder = Some((lower, short_type_name::<L>()));
        self
    }

    /// Enable or disable FBBT and OBBT.
    pub fn set_bounds_tightening(
        &mut self,
        fbbt: bool,
        obbt: bool,
        obbt_options: GlobalSolveOptions,
    ) -> &mut Self {
        self.settings.tightening.fbbt = fbbt;
        self.settings.tightening.obbt = obbt;
        self.settings.tightening.obbt_options = obbt_options;
        self
    }

    /// Register the solver used for OBBT.
    pub fn set_obbt_solver<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: GlobalSolver + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.obbt_solver = Some(Arc::new(move || Box::new(factory()) as Box<dyn GlobalSolver>));
        self
    }

    /// Register the branching and partition strategies.
    pub fn set_branching<B, FB, P, FP>(&mut self, selection: FB, partition: FP) -> &mut Self
    where
        B: BranchingStrategy + 'static,
        FB: Fn() -> B + Send + Sync + 'static,
        P: PartitionStrategy + 'static,
        FP: Fn() -> P + Send + Sync + 'static,
    {
        let b: BranchingFactory =
            Arc::new(move || Box::new(selection()) as Box<dyn BranchingStrategy>);
        let p: PartitionFactory =
            Arc::new(move || Box::new(partition()) as Box<dyn PartitionStrategy>);
        self.branching = (b, short_type_name::<B>());
        self.partition = (p, short_type_name::<P>());
        self
    }

    /// Set the node selection strategy.
    pub fn set_node_selection(&mut self, selection: NodeSelection) -> &mut Self {
        self.settings.node_selection = selection;
        self
    }

    /// Number of worker threads (1 = serial).
    pub fn set_workers(&mut self, workers: usize) -> &mut Self {
        self.settings.workers = workers;
        self
    }

    /// Enable progress logging.
    pub fn activate_verbose(&mut self) -> &mut Self {
        self.settings.verbose = true;
        self
    }

    /// Log progress every `freq` iterations.
    pub fn set_log_freq(&mut self, freq: u64) -> &mut Self {
        self.settings.log_freq = freq.max(1);
        self
    }

    /// Scenario names.
    pub fn subproblem_names(&self) -> &[String] {
        &self.subproblem_names
    }

    /// The subproblem builder.
    pub fn builder(&self) -> Arc<dyn SubproblemBuilder> {
        Arc::clone(&self.builder)
    }

    /// Check that the parameters describe a runnable solve.
    pub fn validate(&self) -> SbbResult<()> {
        if self.subproblem_names.is_empty() {
            return Err(SbbError::InvalidProblem("no scenarios given".into()));
        }
        if self.lower_bounder.is_none() || self.upper_bounder.is_none() {
            return Err(SbbError::InvalidProblem(
                "bounders not set; call set_bounders first".into(),
            ));
        }
        if self.settings.workers == 0 {
            return Err(SbbError::InvalidProblem("at least one worker is required".into()));
        }
        if !(self.settings.abs_tolerance >= 0.0) {
            return Err(SbbError::InvalidProblem(format!(
                "absolute tolerance must be nonnegative, got {}",
                self.settings.abs_tolerance
            )));
        }
        if self.settings.tightening.obbt && self.obbt_solver.is_none() {
            log::warn!("OBBT enabled without an OBBT solver; it will be skipped");
        }
        Ok(())
    }

    /// Instantiate one set of strategies.
    pub fn strategies(&self) -> SbbResult<Strategies> {
        let (lower, _) = self
            .lower_bounder
            .as_ref()
            .ok_or_else(|| SbbError::InvalidProblem("lower bounder not set".into()))?;
        let (upper, _) = self
            .upper_bounder
            .as_ref()
            .ok_or_else(|| SbbError::InvalidProblem("candidate finder not set".into()))?;
        Ok(Strategies {
            lower: lower(),
            upper: upper(),
            branching: (self.branching.0)(),
            partition: (self.partition.0)(),
            obbt_solver: self.obbt_solver.as_ref().map(|f| f()),
        })
    }
}

impl fmt::Debug for SolverParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverParameters")
            .field("subproblem_names", &self.subproblem_names)
            .field("lower_bounder", &self.lower_bounder.as_ref().map(|l| l.1))
            .field("upper_bounder", &self.upper_bounder.as_ref().map(|u| u.1))
            .field("branching", &self.branching.1)
            .field("partition", &self.partition.1)
            .field("settings", &self.settings)
            .finish()
    }
}

impl fmt::Display for SolverParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.settings;
        let on_off = |b: bool| if b { "on" } else { "off" };
        writeln!(f, "Stochastic branch-and-bound parameters")?;
        writeln!(f, "  scenarios        : {}", self.subproblem_names.len())?;
        writeln!(
            f,
            "  lower bounder    : {}",
            self.lower_bounder.as_ref().map_or("<unset>", |l| l.1)
        )?;
        writeln!(
            f,
            "  candidate finder : {}",
            self.upper_bounder.as_ref().map_or("<unset>", |u| u.1)
        )?;
        writeln!(f, "  branching        : {}", self.branching.1)?;
        writeln!(f, "  partitioning     : {}", self.partition.1)?;
        writeln!(f, "  node selection   : {:?}", s.node_selection)?;
        writeln!(
            f,
            "  tightening       : fbbt {}, obbt {} (depth <= {})",
            on_off(s.tightening.fbbt),
            on_off(s.tightening.obbt),
            s.tightening.obbt_max_depth
        )?;
        writeln!(f, "  upper bound every: {} iterations", s.upper_bound_frequency)?;
        writeln!(f, "  abs tolerance    : {:e}", s.abs_tolerance)?;
        write!(
            f,
            "  workers          : {} | verbose {} (every {})",
            s.workers,
            on_off(s.verbose),
            s.log_freq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounding::{BoundSolveResult, CandidateContext};
    use crate::model::{Candidate, ScenarioBuild, SubproblemModel, VarDomain};
    use crate::search::{HybridBranching, Midpoint};

    struct NoCandidate;

    impl UpperBounder for NoCandidate {
        fn candidate(&mut self, _: &CandidateContext<'_>) -> SbbResult<Option<Candidate>> {
            Ok(None)
        }
    }

    struct Zero;

    impl LowerBounder for Zero {
        fn solve_subproblem(&mut self, _: &mut SubproblemModel) -> SbbResult<BoundSolveResult> {
            Ok(BoundSolveResult::feasible(0.0))
        }
    }

    fn builder(name: &str) -> SbbResult<ScenarioBuild> {
        let mut model = SubproblemModel::new(name);
        model.add_variable("x", 0.0, 1.0, VarDomain::Binary)?;
        Ok(ScenarioBuild {
            model,
            first_stage: vec!["x".into()],
            probability: 1.0,
        })
    }

    #[test]
    fn test_validation() {
        let mut params = SolverParameters::new(vec!["a".into()], builder);
        assert!(matches!(params.validate(), Err(SbbError::InvalidProblem(_))));
        assert!(params.strategies().is_err());

        params.set_bounders(|| NoCandidate, || Zero);
        assert!(params.validate().is_ok());
        assert!(params.strategies().is_ok());

        params.set_workers(0);
        assert!(params.validate().is_err());

        let empty = SolverParameters::new(Vec::new(), builder);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_setters_and_display() {
        let mut params = SolverParameters::new(vec!["a".into(), "b".into()], builder);
        params
            .set_bounders(|| NoCandidate, || Zero)
            .set_branching(|| HybridBranching::new(10), || Midpoint)
            .set_bounds_tightening(false, true, GlobalSolveOptions::default())
            .set_node_selection(NodeSelection::DepthFirst)
            .set_workers(4)
            .activate_verbose()
            .set_log_freq(0);

        assert_eq!(params.settings.workers, 4);
        assert_eq!(params.settings.log_freq, 1);
        assert!(!params.settings.tightening.fbbt);
        assert!(params.settings.tightening.obbt);

        let text = params.to_string();
        assert!(text.contains("HybridBranching"));
        assert!(text.contains("Midpoint"));
        assert!(text.contains("Zero"));
        assert!(text.contains("scenarios        : 2"));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<MaximumDisagreement>(), "MaximumDisagreement");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
    }
}
