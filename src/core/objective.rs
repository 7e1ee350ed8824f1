//! Abstractions for defining objective functions.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use super::base::Problem;
use super::space::{Assignment, OutOfDomainError};

/// A single metric value produced by one evaluation of an objective.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement<T> {
    metric: String,
    mean: T,
    std_error: T,
}

impl<T: Copy> Measurement<T> {
    /// Creates a measurement of given metric.
    ///
    /// The standard error expresses the uncertainty of the observed mean and
    /// must be non-negative; zero means a noiseless observation. Invalid
    /// values are not rejected here but by the driver harness, which turns
    /// them into an [`EvaluationError`].
    pub fn new(metric: impl Into<String>, mean: T, std_error: T) -> Self {
        Self {
            metric: metric.into(),
            mean,
            std_error,
        }
    }

    /// Gets the name of the measured metric.
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

/// Error encountered while evaluating an objective.
///
/// Evaluation errors are fatal to the trial being evaluated, never to the
/// whole run; the driver records them and moves on (see
/// [`driver`](crate::driver) module).
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The objective produced a non-finite mean or an invalid (negative or
    /// non-finite) standard error for the named metric.
    #[error("metric `{0}` has a non-finite mean or invalid standard error")]
    InvalidValue(String),
    /// A metric declared by [`Objective::metrics`] is missing from the
    /// evaluation output.
    #[error("declared metric `{0}` is missing from the evaluation output")]
    MissingMetric(String),
    /// The evaluation finished after the configured per-round deadline.
    #[error("evaluation exceeded the round deadline of {0:?}")]
    DeadlineExceeded(Duration),
    /// A custom error specific to the objective.
    #[error("{0}")]
    Custom(Box<dyn std::error::Error>),
}

impl From<OutOfDomainError> for EvaluationError {
    fn from(error: OutOfDomainError) -> Self {
        EvaluationError::Custom(Box::new(error))
    }
}

/// The trait for defining objective functions.
///
/// An objective maps an [`Assignment`] to one or more measured metrics. It
/// must be deterministic apart from an explicitly modeled noise term drawn
/// from the passed random source; there is no other hidden randomness.
///
/// ## Defining an objective
///
/// ```rust
/// use rand::Rng;
/// use smbo::{
///     Assignment, EvaluationError, Measurement, Objective, OutOfDomainError, Problem,
///     SearchSpace,
/// };
///
/// struct Paraboloid;
///
/// impl Problem for Paraboloid {
///     type Field = f64;
///
///     fn space(&self) -> SearchSpace<Self::Field> {
///         [("x", -10.0, 10.0), ("y", -10.0, 10.0)].into_iter().collect()
///     }
/// }
///
/// impl Objective for Paraboloid {
///     fn metrics(&self) -> Vec<String> {
///         vec!["loss".to_string()]
///     }
///
///     fn measure<R: Rng + ?Sized>(
///         &self,
///         x: &Assignment<Self::Field>,
///         _rng: &mut R,
///     ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
///         let a = x.real("x").ok_or(OutOfDomainError::Missing("x".to_string()))?;
///         let b = x.real("y").ok_or(OutOfDomainError::Missing("y".to_string()))?;
///
///         Ok(vec![Measurement::new("loss", a * a + b * b, 0.0)])
///     }
/// }
/// ```
pub trait Objective: Problem {
    /// Gets the names of the metrics this objective produces, in a stable
    /// order. The first metric is the default optimization target.
    fn metrics(&self) -> Vec<String>;

    /// Evaluates the objective at given assignment.
    ///
    /// Any modeled noise must be drawn from `rng` so that runs are
    /// reproducible under a fixed seed. Evaluation may be arbitrarily slow;
    /// the caller must not assume sub-second latency and must not retry on
    /// error.
    fn measure<R: Rng + ?Sized>(
        &self,
        x: &Assignment<Self::Field>,
        rng: &mut R,
    ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_accessors() {
        let m = Measurement::new("loss", 1.5, 0.1);

        assert_eq!(m.metric(), "loss");
        assert_eq!(m.mean(), 1.5);
        assert_eq!(m.std_error(), 0.1);
    }

    #[test]
    fn out_of_domain_converts_to_evaluation_error() {
        let error: EvaluationError = OutOfDomainError::Missing("x".to_string()).into();
        assert!(matches!(error, EvaluationError::Custom(_)));
    }
}
