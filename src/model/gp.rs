//! Gaussian process surrogate with Matérn 5/2 kernel.
//!
//! One independent Gaussian process is fitted per tracked outcome. Training
//! inputs are normalized to the unit cube using the search space bounds and
//! outputs are standardized to zero mean and unit variance, so the kernel
//! operates on comparable scales regardless of the problem. Per-dimension
//! lengthscales are derived from the spread of the training inputs and a
//! single global lengthscale multiplier is chosen by maximizing the log
//! marginal likelihood with a bounded golden-section search. The posterior
//! is computed through a Cholesky decomposition of the kernel matrix.
//!
//! Per-observation variances reported by the objective enter the kernel
//! diagonal, so noisy and noiseless observations can be mixed freely.
//!
//! The fitting cost is O(n³) in the number of observations per likelihood
//! evaluation, which is the usual regime of sequential model-based
//! optimization: few, expensive evaluations.
//!
//! # References
//!
//! \[1\] [Gaussian Processes for Machine
//! Learning](https://gaussianprocess.org/gpml/)
//!
//! \[2\] [Efficient Global Optimization of Expensive Black-Box
//! Functions](https://link.springer.com/article/10.1023/A:1008306431147)

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::linalg::Cholesky;
use nalgebra::{convert, DMatrix, DimName, Dynamic, OVector, RealField, U1};
use num_traits::{One, Zero};

use crate::core::{
    FitDivergedError, FitOptions, ModelFactory, Posterior, SearchSpace, Surrogate, TrainingData,
};

/// Bounds of the lengthscale multiplier search, in log space.
const LN_MULTIPLIER_MIN: f64 = -2.302585092994046;
const LN_MULTIPLIER_MAX: f64 = 2.302585092994046;

/// Options for the [`GaussianProcess`] model factory.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct GaussianProcessOptions<T: RealField + Copy> {
    /// Observation noise variance added to the kernel diagonal on top of
    /// the per-observation variances. Larger values make the posterior
    /// smoother.
    noise_variance: T,
    /// Smallest allowed per-dimension lengthscale in normalized input
    /// space.
    lengthscale_floor: T,
}

impl<T: RealField + Copy> Default for GaussianProcessOptions<T> {
    fn default() -> Self {
        Self {
            noise_variance: convert(1e-6),
            lengthscale_floor: convert(1e-2),
        }
    }
}

/// Gaussian process model factory. See [module](self) documentation for more
/// details.
pub struct GaussianProcess<T: RealField + Copy> {
    options: GaussianProcessOptions<T>,
}

impl<T: RealField + Copy> GaussianProcess<T> {
    /// Initializes the factory with default options.
    pub fn new() -> Self {
        Self::with_options(GaussianProcessOptions::default())
    }

    /// Initializes the factory with given options.
    pub fn with_options(options: GaussianProcessOptions<T>) -> Self {
        Self { options }
    }
}

impl<T: RealField + Copy> Default for GaussianProcess<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Warm-start snapshot of a fitted [`GaussianProcessModel`].
///
/// Holds the fitted lengthscale multiplier of every outcome so that a
/// subsequent fit can seed its likelihood search with the previous solution.
#[derive(Debug, Clone)]
pub struct GaussianProcessSnapshot<T: RealField + Copy> {
    multipliers: Vec<Option<T>>,
}

impl<T: RealField + Copy> GaussianProcessSnapshot<T> {
    fn multiplier(&self, outcome: usize) -> Option<T> {
        self.multipliers.get(outcome).copied().flatten()
    }
}

/// A fitted Gaussian process model.
pub struct GaussianProcessModel<T: RealField + Copy> {
    outcomes: Vec<OutcomeModel<T>>,
    lower: OVector<T, Dynamic>,
    span: OVector<T, Dynamic>,
}

enum OutcomeModel<T: RealField + Copy> {
    /// No training data. Predicts the standard normal prior.
    Prior,
    Fitted(FittedOutcome<T>),
}

struct FittedOutcome<T: RealField + Copy> {
    xs: Vec<OVector<T, Dynamic>>,
    chol: Cholesky<T, Dynamic>,
    alpha: OVector<T, Dynamic>,
    lengthscales: OVector<T, Dynamic>,
    y_mean: T,
    y_std: T,
    multiplier: T,
}

impl<T: RealField + Copy> GaussianProcessModel<T> {
    fn normalize(&self, x: &OVector<T, Dynamic>) -> OVector<T, Dynamic> {
        (x - &self.lower).component_div(&self.span)
    }
}

impl<T: RealField + Copy> Surrogate<T> for GaussianProcessModel<T> {
    fn num_outputs(&self) -> usize {
        self.outcomes.len()
    }

    fn predict(&self, xs: &[OVector<T, Dynamic>]) -> Posterior<T> {
        let normalized = xs.iter().map(|x| self.normalize(x)).collect::<Vec<_>>();
        let dim = Dynamic::new(normalized.len());

        let mut means = Vec::with_capacity(self.outcomes.len());
        let mut variances = Vec::with_capacity(self.outcomes.len());

        for outcome in self.outcomes.iter() {
            match outcome {
                OutcomeModel::Prior => {
                    means.push(OVector::from_element_generic(dim, U1::name(), T::zero()));
                    variances.push(OVector::from_element_generic(dim, U1::name(), T::one()));
                }
                OutcomeModel::Fitted(fitted) => {
                    let mut mean = Vec::with_capacity(normalized.len());
                    let mut variance = Vec::with_capacity(normalized.len());

                    for x in normalized.iter() {
                        let k_star = OVector::from_iterator_generic(
                            Dynamic::new(fitted.xs.len()),
                            U1::name(),
                            fitted.xs.iter().map(|xi| matern52(xi, x, &fitted.lengthscales)),
                        );

                        let m = fitted.y_mean + fitted.y_std * k_star.dot(&fitted.alpha);

                        let v = fitted.chol.solve(&k_star);
                        let latent = (T::one() - k_star.dot(&v)).max(T::zero());

                        mean.push(m);
                        variance.push(fitted.y_std * fitted.y_std * latent);
                    }

                    means.push(OVector::from_vec_generic(dim, U1::name(), mean));
                    variances.push(OVector::from_vec_generic(dim, U1::name(), variance));
                }
            }
        }

        Posterior::new(means, variances)
    }
}

impl<T: RealField + Copy> ModelFactory<T> for GaussianProcess<T> {
    type Model = GaussianProcessModel<T>;
    type Snapshot = GaussianProcessSnapshot<T>;

    fn fit(
        &self,
        space: &SearchSpace<T>,
        data: &TrainingData<T>,
        warm_start: Option<&Self::Snapshot>,
        options: &FitOptions<T>,
    ) -> Result<Self::Model, FitDivergedError> {
        let (lower, upper) = space.feature_bounds();
        let span = OVector::from_iterator_generic(
            Dynamic::new(lower.nrows()),
            U1::name(),
            lower.iter().zip(upper.iter()).map(|(l, u)| {
                let span = *u - *l;
                if span > T::zero() {
                    span
                } else {
                    T::one()
                }
            }),
        );

        let mut outcomes = Vec::with_capacity(data.num_outcomes());

        for outcome in 0..data.num_outcomes() {
            let xs = data
                .xs(outcome)
                .iter()
                .map(|x| (x - &lower).component_div(&span))
                .collect::<Vec<_>>();
            let warm = warm_start.and_then(|snapshot| snapshot.multiplier(outcome));

            debug!(
                "fitting outcome `{}` on {} observations",
                data.name(outcome),
                xs.len()
            );

            outcomes.push(fit_outcome(
                xs,
                data.ys(outcome),
                data.yvars(outcome),
                warm,
                &self.options,
                options,
            )?);
        }

        Ok(GaussianProcessModel {
            outcomes,
            lower,
            span,
        })
    }

    fn snapshot(&self, model: &Self::Model) -> Option<Self::Snapshot> {
        let multipliers = model
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                OutcomeModel::Prior => None,
                OutcomeModel::Fitted(fitted) => Some(fitted.multiplier),
            })
            .collect();

        Some(GaussianProcessSnapshot { multipliers })
    }
}

/// A likelihood-evaluated candidate of the multiplier search.
struct FitCandidate<T: RealField + Copy> {
    chol: Cholesky<T, Dynamic>,
    alpha: OVector<T, Dynamic>,
    lengthscales: OVector<T, Dynamic>,
    multiplier: T,
    likelihood: T,
}

fn fit_outcome<T: RealField + Copy>(
    xs: Vec<OVector<T, Dynamic>>,
    ys: &[T],
    yvars: &[T],
    warm: Option<T>,
    options: &GaussianProcessOptions<T>,
    fit: &FitOptions<T>,
) -> Result<OutcomeModel<T>, FitDivergedError> {
    let n = xs.len();

    if n == 0 {
        return Ok(OutcomeModel::Prior);
    }

    let n_t: T = convert(n as f64);
    let y_mean = ys.iter().fold(T::zero(), |acc, y| acc + *y) / n_t;
    let y_std = if n > 1 {
        let var = ys
            .iter()
            .fold(T::zero(), |acc, y| acc + (*y - y_mean) * (*y - y_mean))
            / convert::<f64, T>((n - 1) as f64);
        var.sqrt()
    } else {
        T::one()
    };
    let y_std = y_std.max(convert(1e-10));

    let y = OVector::from_iterator_generic(
        Dynamic::new(n),
        U1::name(),
        ys.iter().map(|yi| (*yi - y_mean) / y_std),
    );
    let noise = OVector::from_iterator_generic(
        Dynamic::new(n),
        U1::name(),
        yvars
            .iter()
            .map(|yvar| *yvar / (y_std * y_std) + options.noise_variance()),
    );

    let base = base_lengthscales(&xs, options.lengthscale_floor());

    let budget = fit.max_iterations();
    let tolerance = fit.convergence_tolerance();
    let mut used = 0;
    let mut best: Option<FitCandidate<T>> = None;

    let mut a: T = convert(LN_MULTIPLIER_MIN);
    let mut b: T = convert(LN_MULTIPLIER_MAX);

    if let Some(warm) = warm {
        let seed = warm.ln().max(a).min(b);
        probe(seed, &base, &xs, &y, &noise, budget, &mut used, &mut best);
    }

    let inv_phi: T = convert(0.618_033_988_749_894_9);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = probe(c, &base, &xs, &y, &noise, budget, &mut used, &mut best);
    let mut fd = probe(d, &base, &xs, &y, &noise, budget, &mut used, &mut best);

    while used < budget && b - a > tolerance {
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = probe(c, &base, &xs, &y, &noise, budget, &mut used, &mut best);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = probe(d, &base, &xs, &y, &noise, budget, &mut used, &mut best);
        }
    }

    match best {
        Some(candidate) => {
            debug!(
                "selected lengthscale multiplier {:?} after {} likelihood evaluations",
                candidate.multiplier, used
            );

            Ok(OutcomeModel::Fitted(FittedOutcome {
                xs,
                chol: candidate.chol,
                alpha: candidate.alpha,
                lengthscales: candidate.lengthscales,
                y_mean,
                y_std,
                multiplier: candidate.multiplier,
            }))
        }
        None => Err(FitDivergedError { iterations: used }),
    }
}

/// Evaluates the log marginal likelihood at given log-multiplier, tracking
/// the best candidate seen so far. Returns negative infinity when the budget
/// is exhausted or the kernel matrix is not positive definite.
#[allow(clippy::too_many_arguments)]
fn probe<T: RealField + Copy>(
    ln_multiplier: T,
    base: &OVector<T, Dynamic>,
    xs: &[OVector<T, Dynamic>],
    y: &OVector<T, Dynamic>,
    noise: &OVector<T, Dynamic>,
    budget: usize,
    used: &mut usize,
    best: &mut Option<FitCandidate<T>>,
) -> T {
    let worst: T = convert(f64::NEG_INFINITY);

    if *used >= budget {
        return worst;
    }
    *used += 1;

    let multiplier = ln_multiplier.exp();
    let lengthscales = base * multiplier;

    let n = xs.len();
    let mut kernel = DMatrix::from_fn(n, n, |i, j| matern52(&xs[i], &xs[j], &lengthscales));
    for i in 0..n {
        kernel[(i, i)] += noise[i];
    }

    let chol = match Cholesky::new(kernel) {
        Some(chol) => chol,
        None => return worst,
    };
    let alpha = chol.solve(y);

    let half_log_det = chol
        .l_dirty()
        .diagonal()
        .iter()
        .fold(T::zero(), |acc, l| acc + l.ln());
    let ln_2pi = (convert::<f64, T>(2.0) * T::pi()).ln();
    let likelihood = -convert::<f64, T>(0.5) * y.dot(&alpha)
        - half_log_det
        - convert::<f64, T>(0.5 * n as f64) * ln_2pi;

    if !likelihood.is_finite() {
        return worst;
    }

    if best
        .as_ref()
        .map_or(true, |candidate| likelihood > candidate.likelihood)
    {
        *best = Some(FitCandidate {
            chol,
            alpha,
            lengthscales,
            multiplier,
            likelihood,
        });
    }

    likelihood
}

/// Derives per-dimension lengthscales from the spread of the training
/// inputs.
fn base_lengthscales<T: RealField + Copy>(
    xs: &[OVector<T, Dynamic>],
    floor: T,
) -> OVector<T, Dynamic> {
    let n = xs.len();
    let dim = xs[0].nrows();

    if n < 2 {
        return OVector::from_element_generic(Dynamic::new(dim), U1::name(), convert(0.5));
    }

    let n_t: T = convert(n as f64);

    OVector::from_iterator_generic(
        Dynamic::new(dim),
        U1::name(),
        (0..dim).map(|j| {
            let mean = xs.iter().fold(T::zero(), |acc, x| acc + x[j]) / n_t;
            let var = xs
                .iter()
                .fold(T::zero(), |acc, x| acc + (x[j] - mean) * (x[j] - mean))
                / n_t;
            var.sqrt().max(floor)
        }),
    )
}

/// Matérn 5/2 kernel with unit signal variance.
fn matern52<T: RealField + Copy>(
    a: &OVector<T, Dynamic>,
    b: &OVector<T, Dynamic>,
    lengthscales: &OVector<T, Dynamic>,
) -> T {
    let mut r2 = T::zero();
    for ((ai, bi), li) in a.iter().zip(b.iter()).zip(lengthscales.iter()) {
        let d = (*ai - *bi) / *li;
        r2 += d * d;
    }

    let r = r2.sqrt();
    let sqrt5: T = convert(2.236_067_977_499_79);

    (T::one() + sqrt5 * r + convert::<f64, T>(5.0 / 3.0) * r2) * (-sqrt5 * r).exp()
}
