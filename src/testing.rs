//! Testing objectives and utilities useful for benchmarking, debugging and
//! smoke testing.
//!
//! [`Sphere`] is recommended for first tests. [`Branin`] is the classical
//! benchmark for model-based optimization with a handful of evaluations.
//! [`WithNoise`] turns any deterministic objective into a noisy one with an
//! explicitly seeded noise source.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Towards Global Optimisation
//! 2](https://www.worldcat.org/title/towards-global-optimisation-2/oclc/4982487)
//! (Dixon and Szegő, the origin of the Branin benchmark)

#![allow(unused)]

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::core::{
    Assignment, EvaluationError, Measurement, Objective, OutOfDomainError, ParamValue, Problem,
    SearchSpace,
};

/// [Branin function](https://www.sfu.ca/~ssurjano/branin.html) \[1,2\].
///
/// A two-dimensional function with three global minima of value
/// approximately 0.397887, commonly used to exercise model-based
/// optimization loops on a small evaluation budget.
#[derive(Debug, Clone, Copy)]
pub struct Branin(());

impl Branin {
    /// Initializes the objective.
    pub fn new() -> Self {
        Self(())
    }

    /// The value of the known global minima.
    pub fn minimum(&self) -> f64 {
        0.39788735772973816
    }

    /// The three global minimizers.
    pub fn optima(&self) -> Vec<Assignment<f64>> {
        [(-PI, 12.275), (PI, 2.275), (3.0 * PI, 2.475)]
            .into_iter()
            .map(|(x1, x2)| {
                [
                    ("x1", ParamValue::Real(x1)),
                    ("x2", ParamValue::Real(x2)),
                ]
                .into_iter()
                .collect()
            })
            .collect()
    }

    /// Tests whether given assignment attains the global minimum, given the
    /// tolerance `eps` on the function value.
    pub fn is_optimum(&self, x: &Assignment<f64>, eps: f64) -> bool {
        match (x.real("x1"), x.real("x2")) {
            (Some(x1), Some(x2)) => (self.value(x1, x2) - self.minimum()).abs() <= eps,
            _ => false,
        }
    }

    fn value(&self, x1: f64, x2: f64) -> f64 {
        let a = 1.0;
        let b = 5.1 / (4.0 * PI * PI);
        let c = 5.0 / PI;
        let r = 6.0;
        let s = 10.0;
        let t = 1.0 / (8.0 * PI);

        a * (x2 - b * x1 * x1 + c * x1 - r).powi(2) + s * (1.0 - t) * x1.cos() + s
    }
}

impl Default for Branin {
    fn default() -> Self {
        Self::new()
    }
}

impl Problem for Branin {
    type Field = f64;

    fn space(&self) -> SearchSpace<Self::Field> {
        [("x1", -5.0, 10.0), ("x2", 0.0, 15.0)].into_iter().collect()
    }
}

impl Objective for Branin {
    fn metrics(&self) -> Vec<String> {
        vec!["branin".to_string()]
    }

    fn measure<R: Rng + ?Sized>(
        &self,
        x: &Assignment<Self::Field>,
        _rng: &mut R,
    ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
        let x1 = x
            .real("x1")
            .ok_or(OutOfDomainError::Missing("x1".to_string()))?;
        let x2 = x
            .real("x2")
            .ok_or(OutOfDomainError::Missing("x2".to_string()))?;

        Ok(vec![Measurement::new("branin", self.value(x1, x2), 0.0)])
    }
}

/// [Sphere
/// function](https://en.wikipedia.org/wiki/Test_functions_for_optimization)
/// \[1\].
///
/// A simple paraboloid which can be used in early development and sanity
/// checking as it can be considered a trivial problem.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the objective with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for Sphere {
    type Field = f64;

    fn space(&self) -> SearchSpace<Self::Field> {
        (0..self.n).map(|i| (format!("x{i}"), -5.12, 5.12)).collect()
    }
}

impl Objective for Sphere {
    fn metrics(&self) -> Vec<String> {
        vec!["sphere".to_string()]
    }

    fn measure<R: Rng + ?Sized>(
        &self,
        x: &Assignment<Self::Field>,
        _rng: &mut R,
    ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
        let mut value = 0.0;

        for i in 0..self.n {
            let name = format!("x{i}");
            let xi = x.real(&name).ok_or(OutOfDomainError::Missing(name))?;
            value += xi * xi;
        }

        Ok(vec![Measurement::new("sphere", value, 0.0)])
    }
}

/// Wrapper adding Gaussian observation noise to a deterministic objective.
///
/// The noise is drawn from the random source passed to `measure`, so runs
/// remain reproducible under a fixed seed. Every measurement reports the
/// noise standard deviation as its standard error.
#[derive(Debug, Clone)]
pub struct WithNoise<F: Objective> {
    f: F,
    std_error: F::Field,
}

impl<F: Objective> WithNoise<F> {
    /// Wraps given objective, adding zero-mean Gaussian noise with given
    /// standard deviation to every observed mean.
    pub fn new(f: F, std_error: F::Field) -> Self {
        assert!(
            std_error >= nalgebra::convert(0.0),
            "standard deviation must be non-negative"
        );

        Self { f, std_error }
    }
}

impl<F: Objective> Problem for WithNoise<F> {
    type Field = F::Field;

    fn space(&self) -> SearchSpace<Self::Field> {
        self.f.space()
    }
}

impl<F: Objective> Objective for WithNoise<F>
where
    StandardNormal: Distribution<F::Field>,
{
    fn metrics(&self) -> Vec<String> {
        self.f.metrics()
    }

    fn measure<R: Rng + ?Sized>(
        &self,
        x: &Assignment<Self::Field>,
        rng: &mut R,
    ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
        let measurements = self.f.measure(x, rng)?;

        Ok(measurements
            .into_iter()
            .map(|m| {
                let noise: F::Field = rng.sample(StandardNormal);
                Measurement::new(m.metric(), m.mean() + self.std_error * noise, self.std_error)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    #[test]
    fn branin_optima_attain_the_minimum() {
        let f = Branin::new();

        for optimum in f.optima() {
            let x1 = optimum.real("x1").unwrap();
            let x2 = optimum.real("x2").unwrap();

            assert_relative_eq!(f.value(x1, x2), f.minimum(), epsilon = 1e-6);
            assert!(f.is_optimum(&optimum, 1e-6));
        }
    }

    #[test]
    fn branin_origin_is_not_an_optimum() {
        let f = Branin::new();
        let origin = [
            ("x1", ParamValue::Real(0.0)),
            ("x2", ParamValue::Real(0.0)),
        ]
        .into_iter()
        .collect();

        assert!(!f.is_optimum(&origin, 1e-3));
    }

    #[test]
    fn branin_optima_are_in_domain() {
        let f = Branin::new();
        let space = f.space();

        for optimum in f.optima() {
            assert_eq!(space.check(&optimum), Ok(()));
        }
    }

    #[test]
    fn sphere_is_zero_at_the_origin() {
        let f = Sphere::new(3);
        let origin: Assignment<f64> = (0..3)
            .map(|i| (format!("x{i}"), ParamValue::Real(0.0)))
            .collect();

        let mut rng = SmallRng::seed_from_u64(3);
        let measurements = f.measure(&origin, &mut rng).unwrap();

        assert_eq!(measurements[0].metric(), "sphere");
        assert_eq!(measurements[0].mean(), 0.0);
    }

    #[test]
    fn noise_is_reproducible_under_a_fixed_seed() {
        let f = WithNoise::new(Sphere::new(1), 0.5);
        let x: Assignment<f64> = [("x0", ParamValue::Real(1.0))].into_iter().collect();

        let first = f
            .measure(&x, &mut SmallRng::seed_from_u64(3))
            .unwrap();
        let second = f
            .measure(&x, &mut SmallRng::seed_from_u64(3))
            .unwrap();

        assert_eq!(first[0].mean(), second[0].mean());
        assert_eq!(first[0].std_error(), 0.5);
        assert_ne!(first[0].mean(), 1.0);
    }
}
