//! The surrogate model seam.
//!
//! The optimization loop never depends on a concrete model family. It only
//! requires a [`ModelFactory`] that turns accumulated training data into a
//! fitted model satisfying the minimal [`Surrogate`] capability set: batch
//! posterior prediction (mean and variance) and the number of tracked
//! outcomes. Any regression technique (Gaussian process, random forest,
//! ensemble) can be substituted through this seam.

use std::collections::BTreeMap;

use getset::{CopyGetters, Setters};
use nalgebra::{convert, Dynamic, OVector, RealField};
use num_traits::Zero;
use thiserror::Error;

use super::space::SearchSpace;

/// Per-outcome training data passed to a model factory.
///
/// For each tracked outcome there is one ordered sequence of equal-length
/// feature vectors with parallel sequences of observed means and observation
/// variances.
#[derive(Debug, Clone)]
pub struct TrainingData<T: RealField + Copy> {
    names: Vec<String>,
    xs: Vec<Vec<OVector<T, Dynamic>>>,
    ys: Vec<Vec<T>>,
    yvars: Vec<Vec<T>>,
}

impl<T: RealField + Copy> TrainingData<T> {
    /// Creates empty training data for given outcome names.
    ///
    /// # Panics
    ///
    /// Panics if no outcome is given. Models must support one or more
    /// outcomes, not zero.
    pub fn new(names: Vec<String>) -> Self {
        assert!(!names.is_empty(), "no outcomes");

        let n = names.len();

        Self {
            names,
            xs: vec![Vec::new(); n],
            ys: vec![Vec::new(); n],
            yvars: vec![Vec::new(); n],
        }
    }

    /// Appends a training row for given outcome.
    ///
    /// # Panics
    ///
    /// Panics if the outcome index is out of range or the variance is
    /// negative.
    pub fn push(&mut self, outcome: usize, x: OVector<T, Dynamic>, y: T, yvar: T) {
        assert!(outcome < self.names.len(), "outcome index out of range");
        assert!(yvar >= T::zero(), "negative observation variance");

        self.xs[outcome].push(x);
        self.ys[outcome].push(y);
        self.yvars[outcome].push(yvar);
    }

    /// Gets the number of tracked outcomes.
    pub fn num_outcomes(&self) -> usize {
        self.names.len()
    }

    /// Gets the name of given outcome.
    pub fn name(&self, outcome: usize) -> &str {
        &self.names[outcome]
    }

    /// Gets the number of training rows of given outcome.
    pub fn len(&self, outcome: usize) -> usize {
        self.xs[outcome].len()
    }

    /// Determines whether there is no training row at all.
    pub fn is_empty(&self) -> bool {
        self.xs.iter().all(|rows| rows.is_empty())
    }

    /// Gets the feature vectors of given outcome.
    pub fn xs(&self, outcome: usize) -> &[OVector<T, Dynamic>] {
        &self.xs[outcome]
    }

    /// Gets the observed means of given outcome.
    pub fn ys(&self, outcome: usize) -> &[T] {
        &self.ys[outcome]
    }

    /// Gets the observation variances of given outcome.
    pub fn yvars(&self, outcome: usize) -> &[T] {
        &self.yvars[outcome]
    }
}

/// Posterior predictive distribution at a batch of points.
#[derive(Debug, Clone)]
pub struct Posterior<T: RealField + Copy> {
    means: Vec<OVector<T, Dynamic>>,
    variances: Vec<OVector<T, Dynamic>>,
}

impl<T: RealField + Copy> Posterior<T> {
    /// Creates a posterior from per-outcome means and variances.
    ///
    /// # Panics
    ///
    /// Panics if the outer or inner lengths of `means` and `variances` do
    /// not match.
    pub fn new(means: Vec<OVector<T, Dynamic>>, variances: Vec<OVector<T, Dynamic>>) -> Self {
        assert!(
            means.len() == variances.len(),
            "means and variances have different number of outcomes"
        );
        assert!(
            means
                .iter()
                .zip(variances.iter())
                .all(|(m, v)| m.nrows() == v.nrows()),
            "means and variances have different number of points"
        );

        Self { means, variances }
    }

    /// Gets the number of outcomes.
    pub fn num_outputs(&self) -> usize {
        self.means.len()
    }

    /// Gets the predicted means of given outcome, one per queried point.
    pub fn mean(&self, outcome: usize) -> &OVector<T, Dynamic> {
        &self.means[outcome]
    }

    /// Gets the predicted variances of given outcome, one per queried point.
    pub fn variance(&self, outcome: usize) -> &OVector<T, Dynamic> {
        &self.variances[outcome]
    }
}

/// Capability set of a fitted model.
///
/// A fitted model is an opaque handle produced by a [`ModelFactory`] from a
/// snapshot of the accumulated observations. It is consumed by model-based
/// candidate generators and superseded, never mutated, on each refit.
pub trait Surrogate<T: RealField + Copy> {
    /// Gets the number of tracked outcomes. Always at least one.
    fn num_outputs(&self) -> usize;

    /// Predicts the posterior mean and variance at a batch of feature
    /// vectors.
    fn predict(&self, xs: &[OVector<T, Dynamic>]) -> Posterior<T>;
}

/// Error reported when the numerical optimization underlying a model fit
/// does not converge within the configured iteration budget.
///
/// The driver treats this as "keep using the previous round's model", never
/// as a reason to abort the run on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model fit did not converge within {iterations} iterations")]
pub struct FitDivergedError {
    /// Number of iterations spent before giving up.
    pub iterations: usize,
}

/// Options controlling a model fit.
///
/// The recognized typed options are the iteration budget and the convergence
/// tolerance of the underlying numerical optimization. Implementations may
/// document additional keys read from the extras bag; keys they do not
/// recognize are ignored, never errors.
#[derive(Debug, Clone, CopyGetters, Setters)]
pub struct FitOptions<T: RealField + Copy> {
    /// Iteration budget for the numerical optimization done by the fit.
    #[getset(get_copy = "pub", set = "pub")]
    max_iterations: usize,
    /// Convergence tolerance for the numerical optimization done by the
    /// fit.
    #[getset(get_copy = "pub", set = "pub")]
    convergence_tolerance: T,
    extra: BTreeMap<String, f64>,
}

impl<T: RealField + Copy> FitOptions<T> {
    /// Sets an implementation-specific option.
    pub fn set_extra(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Gets an implementation-specific option if set.
    pub fn extra(&self, key: &str) -> Option<f64> {
        self.extra.get(key).copied()
    }
}

impl<T: RealField + Copy> Default for FitOptions<T> {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_tolerance: convert(1e-3),
            extra: BTreeMap::new(),
        }
    }
}

/// Interface of a model factory, the extension point of the optimization
/// loop.
///
/// Given accumulated observations, a factory constructs and fits a
/// predictive model. The factory must support one or more outcomes and must
/// handle the degenerate case of zero or one training row without raising
/// (by returning a prior-only model).
///
/// ## Implementing a factory
///
/// Here is a factory producing a model that predicts the mean of the
/// training data with unit uncertainty everywhere. It is useless for
/// optimization but demonstrates that any regression technique satisfying
/// the [`Surrogate`] capability set can be plugged in.
///
/// ```rust
/// use smbo::nalgebra as na;
/// use smbo::{
///     FitDivergedError, FitOptions, ModelFactory, Posterior, SearchSpace, Surrogate,
///     TrainingData,
/// };
/// use na::{Dynamic, OVector};
///
/// struct MeanModel {
///     means: Vec<f64>,
/// }
///
/// impl Surrogate<f64> for MeanModel {
///     fn num_outputs(&self) -> usize {
///         self.means.len()
///     }
///
///     fn predict(&self, xs: &[OVector<f64, Dynamic>]) -> Posterior<f64> {
///         let n = xs.len();
///         let means = self
///             .means
///             .iter()
///             .map(|&m| OVector::<f64, Dynamic>::from_element(n, m))
///             .collect();
///         let variances = (0..self.means.len())
///             .map(|_| OVector::<f64, Dynamic>::from_element(n, 1.0))
///             .collect();
///
///         Posterior::new(means, variances)
///     }
/// }
///
/// struct MeanFactory;
///
/// impl ModelFactory<f64> for MeanFactory {
///     type Model = MeanModel;
///     type Snapshot = ();
///
///     fn fit(
///         &self,
///         _space: &SearchSpace<f64>,
///         data: &TrainingData<f64>,
///         _warm_start: Option<&()>,
///         _options: &FitOptions<f64>,
///     ) -> Result<MeanModel, FitDivergedError> {
///         let means = (0..data.num_outcomes())
///             .map(|o| {
///                 let ys = data.ys(o);
///                 if ys.is_empty() {
///                     0.0
///                 } else {
///                     ys.iter().sum::<f64>() / ys.len() as f64
///                 }
///             })
///             .collect();
///
///         Ok(MeanModel { means })
///     }
/// }
/// ```
pub trait ModelFactory<T: RealField + Copy> {
    /// Type of the fitted model the factory produces.
    type Model: Surrogate<T>;

    /// Opaque snapshot of fitted parameters used to warm-start a subsequent
    /// fit. Implementations that do not support warm starting can use `()`.
    type Snapshot;

    /// Constructs and fits a model on given training data.
    ///
    /// The search space is available for input normalization. A warm-start
    /// snapshot from a previously fitted model may be passed back in to
    /// accelerate convergence; implementations are free to ignore it.
    fn fit(
        &self,
        space: &SearchSpace<T>,
        data: &TrainingData<T>,
        warm_start: Option<&Self::Snapshot>,
        options: &FitOptions<T>,
    ) -> Result<Self::Model, FitDivergedError>;

    /// Extracts a warm-start snapshot from a fitted model.
    ///
    /// The default implementation supports no warm starting and returns
    /// `None`.
    fn snapshot(&self, model: &Self::Model) -> Option<Self::Snapshot> {
        let _ = model;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "no outcomes")]
    fn training_data_requires_an_outcome() {
        TrainingData::<f64>::new(Vec::new());
    }

    #[test]
    fn training_data_rows_are_per_outcome() {
        let mut data = TrainingData::new(vec!["a".to_string(), "b".to_string()]);
        data.push(0, OVector::<f64, Dynamic>::from_vec(vec![1.0]), 2.0, 0.0);

        assert_eq!(data.num_outcomes(), 2);
        assert_eq!(data.len(0), 1);
        assert_eq!(data.len(1), 0);
        assert!(!data.is_empty());
        assert_eq!(data.name(1), "b");
    }

    #[test]
    #[should_panic(expected = "means and variances have different number of points")]
    fn posterior_requires_parallel_lengths() {
        Posterior::new(
            vec![OVector::<f64, Dynamic>::from_vec(vec![1.0, 2.0])],
            vec![OVector::<f64, Dynamic>::from_vec(vec![1.0])],
        );
    }

    #[test]
    fn fit_options_extras_are_open_ended() {
        let mut options = FitOptions::<f64>::default();
        options.set_extra("jitter", 1e-9);

        assert_eq!(options.extra("jitter"), Some(1e-9));
        assert_eq!(options.extra("unknown"), None);
        assert_eq!(options.max_iterations(), 50);
    }
}
