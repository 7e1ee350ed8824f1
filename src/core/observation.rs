//! Bookkeeping of evaluated trials.

use nalgebra::RealField;
use num_traits::Zero;

use super::base::Goal;
use super::model::TrainingData;
use super::space::{Assignment, SearchSpace};

/// A single recorded evaluation result for one metric.
///
/// Observations are immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T: RealField + Copy> {
    assignment: Assignment<T>,
    metric: String,
    mean: T,
    std_error: T,
}

impl<T: RealField + Copy> Observation<T> {
    /// Creates an observation.
    ///
    /// # Panics
    ///
    /// Panics if the standard error is negative or not finite. Raw
    /// evaluation output is validated by the driver harness before
    /// observations are constructed.
    pub fn new(assignment: Assignment<T>, metric: impl Into<String>, mean: T, std_error: T) -> Self {
        assert!(
            std_error >= T::zero() && std_error.is_finite(),
            "standard error must be finite and non-negative"
        );

        Self {
            assignment,
            metric: metric.into(),
            mean,
            std_error,
        }
    }

    /// Gets the evaluated assignment.
    pub fn assignment(&self) -> &Assignment<T> {
        &self.assignment
    }

    /// Gets the name of the observed metric.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Gets the observed mean.
    pub fn mean(&self) -> T {
        self.mean
    }

    /// Gets the standard error of the observed mean.
    pub fn std_error(&self) -> T {
        self.std_error
    }
}

/// Append-only ordered sequence of observations.
///
/// The set grows monotonically over a run's lifetime and is owned and
/// appended to exclusively by the driver. Model factories and generators
/// only ever receive read-only views derived from it.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet<T: RealField + Copy> {
    observations: Vec<Observation<T>>,
}

impl<T: RealField + Copy> ObservationSet<T> {
    /// Creates an empty observation set.
    pub fn new() -> Self {
        Self {
            observations: Vec::new(),
        }
    }

    /// Gets the total number of recorded observations across all metrics.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Determines whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Appends an observation. Only the driver records new observations.
    pub(crate) fn push(&mut self, observation: Observation<T>) {
        self.observations.push(observation);
    }

    /// Iterates over all observations in recording order.
    pub fn iter(&self) -> std::slice::Iter<'_, Observation<T>> {
        self.observations.iter()
    }

    /// Iterates over the observations of given metric in recording order.
    pub fn by_metric<'a>(&'a self, metric: &'a str) -> impl Iterator<Item = &'a Observation<T>> {
        self.observations.iter().filter(move |o| o.metric() == metric)
    }

    /// Gets the number of observations recorded for given metric.
    pub fn count(&self, metric: &str) -> usize {
        self.by_metric(metric).count()
    }

    /// Gets the metric names present in the set, in first-seen order.
    pub fn metrics(&self) -> Vec<&str> {
        let mut names = Vec::new();

        for observation in self.observations.iter() {
            if !names.contains(&observation.metric()) {
                names.push(observation.metric());
            }
        }

        names
    }

    /// Gets the best observation of given metric under given goal.
    ///
    /// Observations with non-finite means are never considered best.
    pub fn best(&self, metric: &str, goal: Goal) -> Option<&Observation<T>> {
        self.by_metric(metric)
            .filter(|o| o.mean().is_finite())
            .fold(None, |best: Option<&Observation<T>>, o| match best {
                Some(b) if !goal.better(o.mean(), b.mean()) => Some(b),
                _ => Some(o),
            })
    }

    /// Builds per-outcome training data for a model factory.
    ///
    /// The outer ordering of the result follows `metrics`; inner rows follow
    /// the recording order. Observation variances are the squared standard
    /// errors.
    ///
    /// # Panics
    ///
    /// Panics if a recorded assignment no longer matches the search space.
    /// This cannot happen for observations recorded by the driver, which
    /// validates every assignment before recording it.
    pub fn training_data(
        &self,
        space: &SearchSpace<T>,
        metrics: &[String],
    ) -> TrainingData<T> {
        let mut data = TrainingData::new(metrics.to_vec());

        for (outcome, metric) in metrics.iter().enumerate() {
            for observation in self.by_metric(metric) {
                let features = space
                    .featurize(observation.assignment())
                    .expect("recorded observation does not match the search space");

                data.push(
                    outcome,
                    features,
                    observation.mean(),
                    observation.std_error() * observation.std_error(),
                );
            }
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::ParamValue;

    fn space() -> SearchSpace<f64> {
        [("x", 0.0, 1.0)].into_iter().collect()
    }

    fn point(x: f64) -> Assignment<f64> {
        [("x", ParamValue::Real(x))].into_iter().collect()
    }

    fn set() -> ObservationSet<f64> {
        let mut observations = ObservationSet::new();
        observations.push(Observation::new(point(0.1), "loss", 3.0, 0.5));
        observations.push(Observation::new(point(0.2), "loss", 1.0, 0.0));
        observations.push(Observation::new(point(0.3), "loss", 2.0, 0.1));
        observations.push(Observation::new(point(0.3), "runtime", 7.0, 0.0));
        observations
    }

    #[test]
    #[should_panic(expected = "standard error must be finite and non-negative")]
    fn negative_std_error() {
        Observation::new(point(0.1), "loss", 1.0, -0.1);
    }

    #[test]
    fn counts_by_metric() {
        let observations = set();

        assert_eq!(observations.len(), 4);
        assert_eq!(observations.count("loss"), 3);
        assert_eq!(observations.count("runtime"), 1);
        assert_eq!(observations.metrics(), vec!["loss", "runtime"]);
    }

    #[test]
    fn best_respects_goal() {
        let observations = set();

        let best = observations.best("loss", Goal::Minimize).unwrap();
        assert_eq!(best.mean(), 1.0);

        let best = observations.best("loss", Goal::Maximize).unwrap();
        assert_eq!(best.mean(), 3.0);

        assert!(observations.best("accuracy", Goal::Minimize).is_none());
    }

    #[test]
    fn best_ignores_non_finite_means() {
        let mut observations = ObservationSet::new();
        observations.push(Observation::new(point(0.1), "loss", f64::INFINITY, 0.0));

        assert!(observations.best("loss", Goal::Maximize).is_none());
    }

    #[test]
    fn training_data_is_grouped_and_parallel() {
        let observations = set();
        let space = space();

        let data = observations.training_data(
            &space,
            &["loss".to_string(), "runtime".to_string()],
        );

        assert_eq!(data.num_outcomes(), 2);
        assert_eq!(data.len(0), 3);
        assert_eq!(data.len(1), 1);
        assert_eq!(data.ys(0), &[3.0, 1.0, 2.0]);
        assert_eq!(data.yvars(0), &[0.25, 0.0, 0.010000000000000002]);
        assert_eq!(data.xs(0)[1].as_slice(), &[0.2]);
        assert_eq!(data.ys(1), &[7.0]);
    }
}
