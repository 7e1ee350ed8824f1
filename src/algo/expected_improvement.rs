//! Model-based candidate generation maximizing expected improvement.
//!
//! Expected improvement scores a candidate point by how much better than the
//! incumbent its outcome is expected to be under the posterior of a fitted
//! surrogate, integrating over the posterior uncertainty. The inner
//! maximization of the criterion over the feasible domain is performed by
//! multi-start uniform candidate search, which keeps the generator free of
//! assumptions about the surrogate.
//!
//! # References
//!
//! \[1\] [Efficient Global Optimization of Expensive Black-Box
//! Functions](https://link.springer.com/article/10.1023/A:1008306431147)
//!
//! \[2\] [A Tutorial on Bayesian Optimization of Expensive Cost
//! Functions](https://arxiv.org/abs/1012.2599)

use std::cmp::Ordering;
use std::convert::Infallible;

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{convert, RealField};
use num_traits::{One, Zero};
use rand::Rng;
use rand_distr::uniform::SampleUniform;

use crate::core::{Assignment, GenerateWithModel, Goal, SearchSpace, Surrogate};

/// Options for the [`ExpectedImprovement`] generator.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct ExpectedImprovementOptions<T: RealField + Copy> {
    /// Number of uniformly sampled points scored in the inner maximization.
    /// More candidates improve the acquisition maximum at the cost of more
    /// posterior predictions per round.
    candidates: usize,
    /// Exploration offset subtracted from the improvement. Zero gives the
    /// classical criterion; larger values favor uncertain regions.
    exploration: T,
}

impl<T: RealField + Copy> Default for ExpectedImprovementOptions<T> {
    fn default() -> Self {
        Self {
            candidates: 1000,
            exploration: convert(0.0),
        }
    }
}

/// Expected improvement generator. See [module](self) documentation for more
/// details.
pub struct ExpectedImprovement<T: RealField + Copy, R> {
    options: ExpectedImprovementOptions<T>,
    rng: R,
}

impl<T: RealField + Copy, R: Rng> ExpectedImprovement<T, R> {
    /// Initializes the generator with default options.
    pub fn new(rng: R) -> Self {
        Self::with_options(ExpectedImprovementOptions::default(), rng)
    }

    /// Initializes the generator with given options.
    pub fn with_options(options: ExpectedImprovementOptions<T>, rng: R) -> Self {
        assert!(options.candidates() > 0, "no candidates to score");
        Self { options, rng }
    }
}

impl<T, M, R> GenerateWithModel<T, M> for ExpectedImprovement<T, R>
where
    T: RealField + Copy + SampleUniform,
    M: Surrogate<T>,
    R: Rng,
{
    const NAME: &'static str = "Expected Improvement";

    type Error = Infallible;

    fn generate_with_model(
        &mut self,
        space: &SearchSpace<T>,
        model: &M,
        outcome: usize,
        goal: Goal,
        incumbent: T,
        count: usize,
    ) -> Result<Vec<Assignment<T>>, Self::Error> {
        assert!(
            outcome < model.num_outputs(),
            "outcome index out of range of the model outputs"
        );

        if count == 0 {
            return Ok(Vec::new());
        }

        let trials = self.options.candidates().max(count);
        let exploration = self.options.exploration();

        let assignments = (0..trials)
            .map(|_| space.sample(&mut self.rng))
            .collect::<Vec<_>>();
        let features = assignments
            .iter()
            .map(|x| {
                space
                    .featurize(x)
                    .expect("sampled assignment is always in domain")
            })
            .collect::<Vec<_>>();

        let posterior = model.predict(&features);
        let mean = posterior.mean(outcome);
        let variance = posterior.variance(outcome);

        let mut scored = (0..trials)
            .map(|i| {
                let std = variance[i].max(T::zero()).sqrt();
                (
                    i,
                    expected_improvement(mean[i], std, incumbent, goal, exploration),
                )
            })
            .collect::<Vec<_>>();

        scored.sort_by(|lhs, rhs| rhs.1.partial_cmp(&lhs.1).unwrap_or(Ordering::Equal));

        debug!(
            "scored {} candidates, best expected improvement = {:?}",
            trials, scored[0].1
        );

        Ok(scored
            .into_iter()
            .take(count)
            .map(|(i, _)| assignments[i].clone())
            .collect())
    }
}

/// Computes the expected improvement of a posterior `(mean, std)` over the
/// incumbent under given goal.
///
/// For zero posterior uncertainty the criterion degenerates to the plain
/// improvement clamped at zero.
pub fn expected_improvement<T: RealField + Copy>(
    mean: T,
    std: T,
    incumbent: T,
    goal: Goal,
    exploration: T,
) -> T {
    let improvement = match goal {
        Goal::Minimize => incumbent - mean - exploration,
        Goal::Maximize => mean - incumbent - exploration,
    };

    if std <= convert(1e-12) {
        return improvement.max(T::zero());
    }

    let z = improvement / std;
    (improvement * normal_cdf(z) + std * normal_pdf(z)).max(T::zero())
}

fn normal_pdf<T: RealField + Copy>(z: T) -> T {
    let inv_sqrt_2pi: T = convert(0.3989422804014327);
    inv_sqrt_2pi * (-z * z * convert::<f64, T>(0.5)).exp()
}

/// Standard normal CDF via the Hart rational approximation.
fn normal_cdf<T: RealField + Copy>(z: T) -> T {
    let eight: T = convert(8.0);

    if z < -eight {
        return T::zero();
    }
    if z > eight {
        return T::one();
    }

    let abs = z.abs();
    let t = T::one() / (T::one() + convert::<f64, T>(0.231_641_9) * abs);

    let poly = t
        * (convert::<f64, T>(0.319_381_530)
            + t * (convert::<f64, T>(-0.356_563_782)
                + t * (convert::<f64, T>(1.781_477_937)
                    + t * (convert::<f64, T>(-1.821_255_978)
                        + t * convert::<f64, T>(1.330_274_429)))));

    let cdf = T::one() - normal_pdf(abs) * poly;

    if z >= T::zero() {
        cdf
    } else {
        T::one() - cdf
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Dynamic, OVector};
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::core::{ParamSpec, Posterior};

    /// Surrogate stub predicting the first feature as the mean with given
    /// constant variance.
    struct FirstFeature {
        variance: f64,
    }

    impl Surrogate<f64> for FirstFeature {
        fn num_outputs(&self) -> usize {
            1
        }

        fn predict(&self, xs: &[OVector<f64, Dynamic>]) -> Posterior<f64> {
            let means = OVector::<f64, Dynamic>::from_iterator(xs.len(), xs.iter().map(|x| x[0]));
            let variances = OVector::<f64, Dynamic>::from_element(xs.len(), self.variance);

            Posterior::new(vec![means], vec![variances])
        }
    }

    #[test]
    fn normal_cdf_reference_values() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(normal_cdf(1.0), 0.841345, epsilon = 1e-5);
        assert_relative_eq!(normal_cdf(-1.0), 1.0 - normal_cdf(1.0), epsilon = 1e-7);
        assert_eq!(normal_cdf(9.0), 1.0);
        assert_eq!(normal_cdf(-9.0), 0.0);
    }

    #[test]
    fn improvement_decreases_with_mean_when_minimizing() {
        let low = expected_improvement(0.1, 0.5, 1.0, Goal::Minimize, 0.0);
        let high = expected_improvement(0.9, 0.5, 1.0, Goal::Minimize, 0.0);

        assert!(low > high);
        assert!(high > 0.0);
    }

    #[test]
    fn improvement_increases_with_mean_when_maximizing() {
        let low = expected_improvement(0.1, 0.5, 1.0, Goal::Maximize, 0.0);
        let high = expected_improvement(1.9, 0.5, 1.0, Goal::Maximize, 0.0);

        assert!(high > low);
    }

    #[test]
    fn zero_uncertainty_degenerates_to_plain_improvement() {
        assert_eq!(
            expected_improvement(0.25, 0.0, 1.0, Goal::Minimize, 0.0),
            0.75
        );
        assert_eq!(expected_improvement(2.0, 0.0, 1.0, Goal::Minimize, 0.0), 0.0);
    }

    #[test]
    fn generated_candidates_are_in_domain() {
        let space = SearchSpace::new(vec![
            ParamSpec::real("x", -5.0, 10.0),
            ParamSpec::integer("n", 0, 3),
            ParamSpec::categorical("kind", ["a", "b"]),
        ]);
        let model = FirstFeature { variance: 1.0 };

        let mut generator = ExpectedImprovement::new(SmallRng::seed_from_u64(3));
        let candidates = generator
            .generate_with_model(&space, &model, 0, Goal::Minimize, 0.0, 5)
            .unwrap();

        assert_eq!(candidates.len(), 5);
        for x in candidates.iter() {
            assert_eq!(space.check(x), Ok(()));
        }
    }

    #[test]
    fn candidates_are_ordered_by_acquisition() {
        let space: SearchSpace<f64> = [("x", 0.0, 1.0)].into_iter().collect();
        let model = FirstFeature { variance: 0.0 };

        let mut generator = ExpectedImprovement::new(SmallRng::seed_from_u64(3));
        let candidates = generator
            .generate_with_model(&space, &model, 0, Goal::Minimize, 0.5, 2)
            .unwrap();

        // With zero variance the criterion is strictly decreasing in the
        // predicted mean, which here is the value of `x` itself.
        assert!(candidates[0].real("x").unwrap() <= candidates[1].real("x").unwrap());
        assert!(candidates[0].real("x").unwrap() < 0.5);
    }

    #[test]
    fn empty_request_yields_no_candidates() {
        let space: SearchSpace<f64> = [("x", 0.0, 1.0)].into_iter().collect();
        let model = FirstFeature { variance: 1.0 };

        let mut generator = ExpectedImprovement::new(SmallRng::seed_from_u64(3));
        let candidates = generator
            .generate_with_model(&space, &model, 0, Goal::Minimize, 0.0, 0)
            .unwrap();

        assert!(candidates.is_empty());
    }
}
