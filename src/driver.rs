//! High-level API for running a sequential model-based optimization loop.
//!
//! The [`RunDriver`] encapsulates all state of a run and repeats the
//! fit-generate-evaluate-record loop for you: while the observation set is
//! below the warm-start threshold, candidates come from a quasi-random
//! generator; afterwards, each round fits the model factory on all
//! accumulated data and asks a model-based generator for new candidates,
//! until the round budget is exhausted.
//!
//! The simplest way of using the driver is to initialize it with the
//! defaults (Gaussian process factory, Halton warm start, expected
//! improvement) and run it to completion:
//!
//! ```rust
//! use rand::Rng;
//! use smbo::{
//!     Assignment, EvaluationError, Measurement, Objective, OutOfDomainError, Problem,
//!     RunDriver, RunOptions, SearchSpace,
//! };
//!
//! struct Quadratic;
//!
//! impl Problem for Quadratic {
//!     type Field = f64;
//!
//!     fn space(&self) -> SearchSpace<Self::Field> {
//!         [("x", -1.0, 1.0)].into_iter().collect()
//!     }
//! }
//!
//! impl Objective for Quadratic {
//!     fn metrics(&self) -> Vec<String> {
//!         vec!["loss".to_string()]
//!     }
//!
//!     fn measure<R: Rng + ?Sized>(
//!         &self,
//!         x: &Assignment<Self::Field>,
//!         _rng: &mut R,
//!     ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
//!         let x = x.real("x").ok_or(OutOfDomainError::Missing("x".to_string()))?;
//!         Ok(vec![Measurement::new("loss", (x - 0.25) * (x - 0.25), 0.0)])
//!     }
//! }
//!
//! let f = Quadratic;
//!
//! let mut options = RunOptions::default();
//! options.set_warm_start(4).set_rounds(4);
//!
//! let report = RunDriver::builder(&f).with_options(options).build().run();
//!
//! assert_eq!(report.observations().len(), 8);
//! assert!(report.aborted().is_none());
//! ```
//!
//! If you need more control, you can drive the rounds manually and inspect
//! each of them:
//!
//! ```rust
//! # use rand::Rng;
//! # use smbo::{
//! #     Assignment, EvaluationError, Measurement, Objective, OutOfDomainError, Problem,
//! #     RunDriver, RunOptions, SearchSpace,
//! # };
//! #
//! # struct Quadratic;
//! #
//! # impl Problem for Quadratic {
//! #     type Field = f64;
//! #
//! #     fn space(&self) -> SearchSpace<Self::Field> {
//! #         [("x", -1.0, 1.0)].into_iter().collect()
//! #     }
//! # }
//! #
//! # impl Objective for Quadratic {
//! #     fn metrics(&self) -> Vec<String> {
//! #         vec!["loss".to_string()]
//! #     }
//! #
//! #     fn measure<R: Rng + ?Sized>(
//! #         &self,
//! #         x: &Assignment<Self::Field>,
//! #         _rng: &mut R,
//! #     ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
//! #         let x = x.real("x").ok_or(OutOfDomainError::Missing("x".to_string()))?;
//! #         Ok(vec![Measurement::new("loss", (x - 0.25) * (x - 0.25), 0.0)])
//! #     }
//! # }
//! #
//! # let f = Quadratic;
//! #
//! # let mut options = RunOptions::default();
//! # options.set_warm_start(2).set_rounds(2);
//! #
//! let mut driver = RunDriver::builder(&f).with_options(options).build();
//!
//! while let Some(record) = driver.next() {
//!     println!(
//!         "round {}: {} observations appended",
//!         record.index(),
//!         record.appended()
//!     );
//! }
//!
//! let report = driver.finish();
//! assert_eq!(report.observations().len(), 4);
//! ```
//!
//! Errors never crash a run. An evaluation error discards the failing trial,
//! a diverged model fit skips the round and keeps the stale model, and only
//! a configured number of consecutive failed rounds ends the run early with
//! an [`AbortedRunError`]. Everything is surfaced in the [`RunReport`].

use std::time::{Duration, Instant};

use getset::{CopyGetters, Setters};
use log::debug;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::uniform::SampleUniform;
use thiserror::Error;

use crate::algo::{ExpectedImprovement, Halton};
use crate::core::{
    Assignment, EvaluationError, FitDivergedError, FitOptions, Generate, GenerateWithModel, Goal,
    ModelFactory, Objective, Observation, ObservationSet, OutOfDomainError, SearchSpace,
};
use crate::model::GaussianProcess;

/// Seed of the default expected improvement generator. Override the
/// generator with [`RunBuilder::with_algo`] to control its randomness.
const DEFAULT_ALGO_SEED: u64 = 982;

/// Options for the [`RunDriver`].
#[derive(Debug, Clone, CopyGetters, Setters)]
pub struct RunOptions<T: nalgebra::RealField + Copy> {
    /// Number of observations of the objective metric collected by the
    /// quasi-random generator before the loop becomes model-guided.
    #[getset(get_copy = "pub", set = "pub")]
    warm_start: usize,
    /// Number of model-guided rounds after the warm start.
    #[getset(get_copy = "pub", set = "pub")]
    rounds: usize,
    /// Number of candidates evaluated per model-guided round.
    #[getset(get_copy = "pub", set = "pub")]
    batch_size: usize,
    /// Direction in which the objective metric is optimized.
    #[getset(get_copy = "pub", set = "pub")]
    goal: Goal,
    /// Number of consecutive failed rounds after which the run is aborted.
    #[getset(get_copy = "pub", set = "pub")]
    max_consecutive_failures: usize,
    /// Optional deadline per evaluation. An evaluation finishing after the
    /// deadline is treated as a failed trial.
    #[getset(get_copy = "pub", set = "pub")]
    round_deadline: Option<Duration>,
    /// Seed of the random source passed to the objective.
    #[getset(get_copy = "pub", set = "pub")]
    seed: u64,
    metric: Option<String>,
    fit: FitOptions<T>,
}

impl<T: nalgebra::RealField + Copy> RunOptions<T> {
    /// Gets the name of the optimized metric, if overridden.
    ///
    /// By default the first metric declared by the objective is optimized.
    pub fn metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    /// Sets the name of the optimized metric.
    pub fn set_metric(&mut self, metric: impl Into<String>) -> &mut Self {
        self.metric = Some(metric.into());
        self
    }

    /// Gets the model fit options.
    pub fn fit(&self) -> &FitOptions<T> {
        &self.fit
    }

    /// Gets the model fit options mutably.
    pub fn fit_mut(&mut self) -> &mut FitOptions<T> {
        &mut self.fit
    }

    /// Sets the model fit options.
    pub fn set_fit(&mut self, fit: FitOptions<T>) -> &mut Self {
        self.fit = fit;
        self
    }
}

impl<T: nalgebra::RealField + Copy> Default for RunOptions<T> {
    fn default() -> Self {
        Self {
            warm_start: 5,
            rounds: 20,
            batch_size: 1,
            goal: Goal::Minimize,
            max_consecutive_failures: 3,
            round_deadline: None,
            seed: 0,
            metric: None,
            fit: FitOptions::default(),
        }
    }
}

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Candidates come from the quasi-random generator until the
    /// observation set reaches the warm-start size.
    WarmStart,
    /// Candidates come from the model-based generator.
    ModelGuided,
    /// The run finished. No further evaluations occur.
    Done,
}

/// Error recorded for a failed trial or round.
#[derive(Debug, Error)]
pub enum RoundError {
    /// A generated candidate violated the search space bounds. This
    /// indicates a bug in the generator, which is responsible for enforcing
    /// the bounds; the candidate is discarded.
    #[error("{0}")]
    OutOfDomain(#[from] OutOfDomainError),
    /// The objective failed or produced invalid output. The trial is
    /// discarded.
    #[error("{0}")]
    Evaluation(#[from] EvaluationError),
    /// The model fit diverged. The round is skipped and the stale model is
    /// kept for the next one.
    #[error("{0}")]
    Fit(#[from] FitDivergedError),
    /// The candidate generator failed. The round appends no observations.
    #[error("candidate generation failed: {0}")]
    Generation(Box<dyn std::error::Error>),
}

/// Record of one driver round.
#[derive(Debug)]
pub struct RoundRecord {
    index: usize,
    phase: Phase,
    appended: usize,
    errors: Vec<RoundError>,
}

impl RoundRecord {
    fn new(index: usize, phase: Phase) -> Self {
        Self {
            index,
            phase,
            appended: 0,
            errors: Vec::new(),
        }
    }

    /// Gets the sequential index of the round.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Gets the phase the round executed in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Gets the number of observations appended by the round.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Gets the errors of failed trials of the round, if any.
    pub fn errors(&self) -> &[RoundError] {
        &self.errors
    }

    /// Determines whether the round finished without any failed trial.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Terminal error of a run whose consecutive-failure limit was exceeded.
///
/// The partial observation set collected before the abort is preserved in
/// the [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("run aborted after {failures} consecutive failed rounds")]
pub struct AbortedRunError {
    /// Number of consecutive failed rounds at the time of the abort.
    pub failures: usize,
}

/// Structured result of a finished run.
pub struct RunReport<T: nalgebra::RealField + Copy> {
    observations: ObservationSet<T>,
    best: Option<(Assignment<T>, T)>,
    records: Vec<RoundRecord>,
    aborted: Option<AbortedRunError>,
}

impl<T: nalgebra::RealField + Copy> RunReport<T> {
    /// Gets the full observation set of the run.
    pub fn observations(&self) -> &ObservationSet<T> {
        &self.observations
    }

    /// Gets the best observed assignment and its mean, if any observation
    /// was recorded.
    pub fn best(&self) -> Option<(&Assignment<T>, T)> {
        self.best.as_ref().map(|(x, value)| (x, *value))
    }

    /// Gets the per-round records, including skipped rounds and failed
    /// trials.
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Gets the terminal abort error, if the run exceeded its
    /// consecutive-failure limit.
    pub fn aborted(&self) -> Option<&AbortedRunError> {
        self.aborted.as_ref()
    }

    /// Consumes the report, returning the observation set.
    pub fn into_observations(self) -> ObservationSet<T> {
        self.observations
    }
}

/// Builder for the [`RunDriver`].
pub struct RunBuilder<'a, F: Objective, M, W, G> {
    f: &'a F,
    space: SearchSpace<F::Field>,
    factory: M,
    warmup: W,
    algo: G,
    options: RunOptions<F::Field>,
}

impl<'a, F: Objective>
    RunBuilder<'a, F, GaussianProcess<F::Field>, Halton, ExpectedImprovement<F::Field, SmallRng>>
{
    fn new(f: &'a F) -> Self {
        let space = f.space();

        Self {
            f,
            space,
            factory: GaussianProcess::new(),
            warmup: Halton::new(),
            algo: ExpectedImprovement::new(SmallRng::seed_from_u64(DEFAULT_ALGO_SEED)),
            options: RunOptions::default(),
        }
    }
}

impl<'a, F: Objective, M, W, G> RunBuilder<'a, F, M, W, G> {
    /// Sets the run options.
    pub fn with_options(mut self, options: RunOptions<F::Field>) -> Self {
        self.options = options;
        self
    }

    /// Sets a specific model factory to be used.
    ///
    /// The builder method accepts a closure that takes the reference to the
    /// objective and its search space.
    pub fn with_model<M2, FM>(self, factory: FM) -> RunBuilder<'a, F, M2, W, G>
    where
        FM: FnOnce(&F, &SearchSpace<F::Field>) -> M2,
    {
        let factory = factory(self.f, &self.space);

        RunBuilder {
            f: self.f,
            space: self.space,
            factory,
            warmup: self.warmup,
            algo: self.algo,
            options: self.options,
        }
    }

    /// Sets a specific warm-start generator to be used.
    ///
    /// The builder method accepts a closure that takes the reference to the
    /// objective and its search space.
    pub fn with_warmup<W2, FW>(self, warmup: FW) -> RunBuilder<'a, F, M, W2, G>
    where
        FW: FnOnce(&F, &SearchSpace<F::Field>) -> W2,
    {
        let warmup = warmup(self.f, &self.space);

        RunBuilder {
            f: self.f,
            space: self.space,
            factory: self.factory,
            warmup,
            algo: self.algo,
            options: self.options,
        }
    }

    /// Sets a specific model-based generator to be used.
    ///
    /// The builder method accepts a closure that takes the reference to the
    /// objective and its search space.
    pub fn with_algo<G2, FG>(self, algo: FG) -> RunBuilder<'a, F, M, W, G2>
    where
        FG: FnOnce(&F, &SearchSpace<F::Field>) -> G2,
    {
        let algo = algo(self.f, &self.space);

        RunBuilder {
            f: self.f,
            space: self.space,
            factory: self.factory,
            warmup: self.warmup,
            algo,
            options: self.options,
        }
    }

    /// Builds the [`RunDriver`].
    ///
    /// # Panics
    ///
    /// Panics if the objective declares no metrics, the configured metric is
    /// not declared, the batch size is zero or the consecutive-failure limit
    /// is zero.
    pub fn build(self) -> RunDriver<'a, F, M, W, G>
    where
        M: ModelFactory<F::Field>,
        W: Generate<F::Field>,
        G: GenerateWithModel<F::Field, M::Model>,
    {
        let metrics = self.f.metrics();
        assert!(!metrics.is_empty(), "objective declares no metrics");

        let objective_metric = match self.options.metric() {
            Some(name) => metrics
                .iter()
                .position(|metric| metric == name)
                .unwrap_or_else(|| panic!("objective does not declare metric `{name}`")),
            None => 0,
        };

        assert!(self.options.batch_size() > 0, "batch size must be positive");
        assert!(
            self.options.max_consecutive_failures() > 0,
            "consecutive-failure limit must be positive"
        );

        let rng = SmallRng::seed_from_u64(self.options.seed());

        RunDriver {
            f: self.f,
            space: self.space,
            metrics,
            objective_metric,
            factory: self.factory,
            warmup: self.warmup,
            algo: self.algo,
            options: self.options,
            rng,
            observations: ObservationSet::new(),
            model: None,
            snapshot: None,
            phase: Phase::WarmStart,
            guided_rounds: 0,
            records: Vec::new(),
            consecutive_failures: 0,
            aborted: None,
            best: None,
        }
    }
}

/// The driver for the process of sequential model-based optimization.
///
/// For default settings, use [`RunDriver::new`]. For more flexibility, use
/// [`RunDriver::builder`]. For the usage of the driver, see [module](self)
/// documentation.
pub struct RunDriver<'a, F: Objective, M: ModelFactory<F::Field>, W, G> {
    f: &'a F,
    space: SearchSpace<F::Field>,
    metrics: Vec<String>,
    objective_metric: usize,
    factory: M,
    warmup: W,
    algo: G,
    options: RunOptions<F::Field>,
    rng: SmallRng,
    observations: ObservationSet<F::Field>,
    model: Option<M::Model>,
    snapshot: Option<M::Snapshot>,
    phase: Phase,
    guided_rounds: usize,
    records: Vec<RoundRecord>,
    consecutive_failures: usize,
    aborted: Option<AbortedRunError>,
    best: Option<(Assignment<F::Field>, F::Field)>,
}

impl<'a, F: Objective>
    RunDriver<'a, F, GaussianProcess<F::Field>, Halton, ExpectedImprovement<F::Field, SmallRng>>
{
    /// Returns the builder for specifying additional settings.
    pub fn builder(
        f: &'a F,
    ) -> RunBuilder<'a, F, GaussianProcess<F::Field>, Halton, ExpectedImprovement<F::Field, SmallRng>>
    {
        RunBuilder::new(f)
    }

    /// Initializes the driver with the default settings.
    pub fn new(f: &'a F) -> Self
    where
        F::Field: SampleUniform,
    {
        RunDriver::builder(f).build()
    }
}

impl<'a, F: Objective, M: ModelFactory<F::Field>, W, G> RunDriver<'a, F, M, W, G> {
    /// Returns reference to the search space of the run.
    pub fn space(&self) -> &SearchSpace<F::Field> {
        &self.space
    }

    /// Returns reference to the observations recorded so far.
    pub fn observations(&self) -> &ObservationSet<F::Field> {
        &self.observations
    }

    /// Returns the current phase of the run.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the best observed assignment and its mean so far.
    pub fn best(&self) -> Option<(&Assignment<F::Field>, F::Field)> {
        self.best.as_ref().map(|(x, value)| (x, *value))
    }

    /// Returns the records of the rounds executed so far.
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Consumes the driver, returning the report of the run in its current
    /// state.
    pub fn finish(self) -> RunReport<F::Field> {
        RunReport {
            observations: self.observations,
            best: self.best,
            records: self.records,
            aborted: self.aborted,
        }
    }
}

impl<'a, F, M, W, G> RunDriver<'a, F, M, W, G>
where
    F: Objective,
    M: ModelFactory<F::Field>,
    W: Generate<F::Field>,
    G: GenerateWithModel<F::Field, M::Model>,
{
    /// Executes one round of the run, returning its record, or `None` once
    /// the run is done.
    ///
    /// Per-round errors never escape this method; they are recorded in the
    /// returned record and in the final report.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&RoundRecord> {
        if self.phase == Phase::WarmStart && self.warmed_up() {
            self.phase = Phase::ModelGuided;
        }
        if self.phase == Phase::ModelGuided && self.guided_rounds >= self.options.rounds() {
            self.phase = Phase::Done;
        }

        let record = match self.phase {
            Phase::WarmStart => self.warm_round(),
            Phase::ModelGuided => self.guided_round(),
            Phase::Done => return None,
        };

        self.records.push(record);
        self.records.last()
    }

    /// Runs the loop to completion and returns the report.
    pub fn run(mut self) -> RunReport<F::Field> {
        while self.next().is_some() {}
        self.finish()
    }

    fn warmed_up(&self) -> bool {
        self.observations
            .count(&self.metrics[self.objective_metric])
            >= self.options.warm_start()
    }

    fn warm_round(&mut self) -> RoundRecord {
        let mut record = RoundRecord::new(self.records.len(), Phase::WarmStart);

        let have = self
            .observations
            .count(&self.metrics[self.objective_metric]);
        let need = self.options.warm_start() - have;

        debug!("warm start: requesting {} candidates", need);

        match self.warmup.generate(&self.space, need) {
            Ok(candidates) => {
                for x in candidates {
                    self.evaluate(x, &mut record);
                }
            }
            Err(error) => record.errors.push(RoundError::Generation(Box::new(error))),
        }

        self.account_failures(record.appended);

        if self.phase != Phase::Done && self.warmed_up() {
            self.phase = Phase::ModelGuided;
        }

        record
    }

    fn guided_round(&mut self) -> RoundRecord {
        let mut record = RoundRecord::new(self.records.len(), Phase::ModelGuided);

        let data = self
            .observations
            .training_data(&self.space, &self.metrics);

        match self
            .factory
            .fit(&self.space, &data, self.snapshot.as_ref(), self.options.fit())
        {
            Ok(model) => {
                self.snapshot = self.factory.snapshot(&model);
                // The previous model is superseded and dropped, never
                // updated in place.
                self.model = Some(model);
            }
            Err(error) => {
                debug!("model fit diverged, keeping the stale model: {}", error);
                record.errors.push(RoundError::Fit(error));
                self.guided_rounds += 1;
                self.account_failures(0);
                return record;
            }
        }

        let incumbent = self
            .best
            .as_ref()
            .map(|(_, value)| *value)
            .unwrap_or_else(|| self.options.goal().worst());

        let candidates = {
            let Self {
                space,
                algo,
                model,
                options,
                objective_metric,
                ..
            } = self;

            algo.generate_with_model(
                space,
                model.as_ref().expect("a model is fitted in this phase"),
                *objective_metric,
                options.goal(),
                incumbent,
                options.batch_size(),
            )
        };

        match candidates {
            Ok(candidates) => {
                for x in candidates {
                    self.evaluate(x, &mut record);
                }
            }
            Err(error) => record.errors.push(RoundError::Generation(Box::new(error))),
        }

        self.guided_rounds += 1;
        self.account_failures(record.appended);

        if self.phase != Phase::Done && self.guided_rounds >= self.options.rounds() {
            self.phase = Phase::Done;
        }

        record
    }

    /// Updates the consecutive-failure counter after a round that appended
    /// given number of observations and aborts the run once the limit is
    /// reached.
    fn account_failures(&mut self, appended: usize) {
        if appended > 0 {
            self.consecutive_failures = 0;
            return;
        }

        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.options.max_consecutive_failures() {
            debug!(
                "aborting the run after {} consecutive failed rounds",
                self.consecutive_failures
            );

            self.aborted = Some(AbortedRunError {
                failures: self.consecutive_failures,
            });
            self.phase = Phase::Done;
        }
    }

    fn evaluate(&mut self, x: Assignment<F::Field>, record: &mut RoundRecord) {
        if let Err(error) = self.space.check(&x) {
            debug!("generated candidate is out of domain: {}", error);
            record.errors.push(RoundError::OutOfDomain(error));
            return;
        }

        let started = Instant::now();

        let measurements = match self.f.measure(&x, &mut self.rng) {
            Ok(measurements) => measurements,
            Err(error) => {
                debug!("evaluation failed: {}", error);
                record.errors.push(RoundError::Evaluation(error));
                return;
            }
        };

        if let Some(deadline) = self.options.round_deadline() {
            if started.elapsed() >= deadline {
                record.errors.push(RoundError::Evaluation(
                    EvaluationError::DeadlineExceeded(deadline),
                ));
                return;
            }
        }

        // A trial is recorded all or nothing, so validate everything first.
        for metric in self.metrics.iter() {
            if !measurements.iter().any(|m| m.metric() == metric) {
                record.errors.push(RoundError::Evaluation(
                    EvaluationError::MissingMetric(metric.clone()),
                ));
                return;
            }
        }
        for measurement in measurements.iter() {
            if !self.metrics.iter().any(|name| name == measurement.metric()) {
                continue;
            }

            let invalid = !measurement.mean().is_finite()
                || !measurement.std_error().is_finite()
                || measurement.std_error() < nalgebra::convert(0.0);

            if invalid {
                record.errors.push(RoundError::Evaluation(
                    EvaluationError::InvalidValue(measurement.metric().to_string()),
                ));
                return;
            }
        }

        for measurement in measurements {
            if !self.metrics.iter().any(|name| name == measurement.metric()) {
                // Metrics the objective did not declare are ignored, like
                // unrecognized option keys.
                continue;
            }

            if measurement.metric() == self.metrics[self.objective_metric] {
                let improved = match self.best.as_ref() {
                    Some((_, incumbent)) => self
                        .options
                        .goal()
                        .better(measurement.mean(), *incumbent),
                    None => true,
                };

                if improved {
                    debug!("best observed mean improved: {:?}", measurement.mean());
                    self.best = Some((x.clone(), measurement.mean()));
                }
            }

            self.observations.push(Observation::new(
                x.clone(),
                measurement.metric(),
                measurement.mean(),
                measurement.std_error(),
            ));
            record.appended += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::algo::ExpectedImprovementOptions;
    use crate::core::{Measurement, Posterior, Problem, Surrogate, TrainingData};
    use crate::testing::{Branin, Sphere, WithNoise};

    /// Factory whose fit always diverges.
    struct Diverging;

    struct NeverModel;

    impl Surrogate<f64> for NeverModel {
        fn num_outputs(&self) -> usize {
            1
        }

        fn predict(&self, xs: &[nalgebra::OVector<f64, nalgebra::Dynamic>]) -> Posterior<f64> {
            let n = xs.len();
            Posterior::new(
                vec![nalgebra::OVector::<f64, nalgebra::Dynamic>::from_element(n, 0.0)],
                vec![nalgebra::OVector::<f64, nalgebra::Dynamic>::from_element(n, 1.0)],
            )
        }
    }

    impl ModelFactory<f64> for Diverging {
        type Model = NeverModel;
        type Snapshot = ();

        fn fit(
            &self,
            _space: &SearchSpace<f64>,
            _data: &TrainingData<f64>,
            _warm_start: Option<&()>,
            _options: &FitOptions<f64>,
        ) -> Result<NeverModel, FitDivergedError> {
            Err(FitDivergedError { iterations: 1 })
        }
    }

    /// Objective whose evaluation always fails.
    struct Failing;

    impl Problem for Failing {
        type Field = f64;

        fn space(&self) -> SearchSpace<f64> {
            [("x", 0.0, 1.0)].into_iter().collect()
        }
    }

    impl Objective for Failing {
        fn metrics(&self) -> Vec<String> {
            vec!["loss".to_string()]
        }

        fn measure<R: Rng + ?Sized>(
            &self,
            _x: &Assignment<f64>,
            _rng: &mut R,
        ) -> Result<Vec<Measurement<f64>>, EvaluationError> {
            Err(EvaluationError::Custom("broken instrument".into()))
        }
    }

    #[test]
    fn observation_count_is_warm_start_plus_rounds_times_batch() {
        let f = Sphere::new(2);

        let mut options = RunOptions::default();
        options.set_warm_start(4).set_rounds(3).set_batch_size(2);

        let report = RunDriver::builder(&f).with_options(options).build().run();

        assert_eq!(report.observations().len(), 4 + 3 * 2);
        assert!(report.aborted().is_none());
        assert!(report.records().iter().all(|record| record.is_clean()));
    }

    #[test]
    fn warm_start_only_run() {
        let f = Sphere::new(2);

        let mut options = RunOptions::default();
        options.set_warm_start(6).set_rounds(0);

        let report = RunDriver::builder(&f).with_options(options).build().run();

        assert_eq!(report.observations().len(), 6);
        assert_eq!(report.records().len(), 1);
        assert_eq!(report.records()[0].phase(), Phase::WarmStart);
    }

    #[test]
    fn diverging_fit_aborts_after_the_limit_with_observations_unchanged() {
        let f = Sphere::new(2);

        let mut options = RunOptions::default();
        options
            .set_warm_start(2)
            .set_rounds(10)
            .set_max_consecutive_failures(3);

        let report = RunDriver::builder(&f)
            .with_options(options)
            .with_model(|_, _| Diverging)
            .build()
            .run();

        assert_eq!(report.aborted(), Some(&AbortedRunError { failures: 3 }));
        // One warm-start round and exactly three failed model-guided rounds.
        assert_eq!(report.records().len(), 1 + 3);
        assert_eq!(report.observations().len(), 2);
        assert!(report
            .records()
            .iter()
            .skip(1)
            .all(|record| matches!(record.errors()[0], RoundError::Fit(_))));
    }

    #[test]
    fn failing_evaluations_abort_the_warm_start() {
        let f = Failing;

        let mut options = RunOptions::default();
        options.set_warm_start(2).set_max_consecutive_failures(2);

        let report = RunDriver::builder(&f).with_options(options).build().run();

        assert_eq!(report.aborted(), Some(&AbortedRunError { failures: 2 }));
        assert!(report.observations().is_empty());
        assert!(report.best().is_none());
        assert!(report
            .records()
            .iter()
            .all(|record| matches!(record.errors()[0], RoundError::Evaluation(_))));
    }

    #[test]
    fn zero_deadline_fails_every_trial() {
        let f = Sphere::new(2);

        let mut options = RunOptions::default();
        options
            .set_warm_start(2)
            .set_max_consecutive_failures(2)
            .set_round_deadline(Some(Duration::ZERO));

        let report = RunDriver::builder(&f).with_options(options).build().run();

        assert!(report.aborted().is_some());
        assert!(matches!(
            report.records()[0].errors()[0],
            RoundError::Evaluation(EvaluationError::DeadlineExceeded(_))
        ));
    }

    #[test]
    fn best_matches_the_minimum_observed_mean() {
        let f = Sphere::new(2);

        let mut options = RunOptions::default();
        options.set_warm_start(5).set_rounds(3);

        let report = RunDriver::builder(&f).with_options(options).build().run();

        let minimum = report
            .observations()
            .by_metric("sphere")
            .map(|o| o.mean())
            .fold(f64::INFINITY, f64::min);

        assert_eq!(report.best().unwrap().1, minimum);
    }

    #[test]
    fn noisy_objective_draws_from_the_driver_rng() {
        let f = WithNoise::new(Sphere::new(2), 0.1);

        let mut options = RunOptions::default();
        options.set_warm_start(3).set_rounds(2).set_seed(7);

        let first = RunDriver::builder(&f)
            .with_options(options.clone())
            .build()
            .run();
        let second = RunDriver::builder(&f).with_options(options).build().run();

        let means = |report: &RunReport<f64>| {
            report
                .observations()
                .iter()
                .map(|o| o.mean())
                .collect::<Vec<_>>()
        };

        assert_eq!(means(&first), means(&second));
        assert!(first
            .observations()
            .iter()
            .all(|o| o.std_error() == 0.1));
    }

    #[test]
    #[should_panic(expected = "objective does not declare metric `accuracy`")]
    fn unknown_objective_metric() {
        let f = Sphere::new(2);

        let mut options = RunOptions::default();
        options.set_metric("accuracy");

        RunDriver::builder(&f).with_options(options).build();
    }

    #[test]
    fn branin_run_has_exact_observation_count() {
        let f = Branin::new();

        let mut options = RunOptions::default();
        options.set_warm_start(5).set_rounds(5).set_batch_size(1);

        let report = RunDriver::builder(&f).with_options(options).build().run();

        assert_eq!(report.observations().len(), 10);
        assert_eq!(report.records().len(), 1 + 5);
    }

    #[test]
    fn branin_run_approaches_the_global_minimum() {
        let f = Branin::new();

        let mut options = RunOptions::default();
        options.set_warm_start(5).set_rounds(20);

        let report = RunDriver::builder(&f)
            .with_options(options)
            .with_algo(|_, _| {
                let mut options = ExpectedImprovementOptions::default();
                options.set_candidates(2000);
                ExpectedImprovement::with_options(options, SmallRng::seed_from_u64(17))
            })
            .build()
            .run();

        // Documented tolerance: the best observed mean lies within 1.0 of
        // the known global minimum of Branin.
        let (_, best) = report.best().unwrap();
        assert!(best <= 0.397887 + 1.0, "best observed mean {best}");
    }
}
