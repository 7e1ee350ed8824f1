//! Quasi-random candidate generation based on the Halton sequence.
//!
//! The Halton sequence is a deterministic low-discrepancy sequence that
//! covers a rectangular domain more evenly than uniform random sampling,
//! which makes it a good source of warm-start evaluations before any model
//! can be fitted.
//!
//! # References
//!
//! \[1\] [On the efficiency of certain quasi-random sequences of points in
//! evaluating multi-dimensional
//! integrals](https://link.springer.com/article/10.1007/BF01386213)
//!
//! \[2\] [Random and Quasi-Random Point
//! Sets](https://link.springer.com/book/10.1007/978-1-4612-1702-2)

use nalgebra::{convert, RealField};
use thiserror::Error;

use crate::core::{Assignment, Generate, ParamBounds, ParamValue, SearchSpace};

/// One prime base per supported dimension.
const PRIMES: [u32; 32] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131,
];

/// Error returned from the [`Halton`] generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HaltonError {
    /// The search space has more dimensions than there are prime bases.
    #[error("search space dimensionality {0} exceeds the supported maximum of 32")]
    TooManyDimensions(usize),
}

/// Halton sequence generator. See [module](self) documentation for more
/// details.
///
/// The generator is deterministic: given the same starting offset, the same
/// sequence of `generate` calls produces the same assignments.
#[derive(Debug, Clone)]
pub struct Halton {
    index: usize,
}

impl Halton {
    /// Initializes the generator at the beginning of the sequence.
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Initializes the generator skipping the first `offset` elements of the
    /// sequence.
    ///
    /// Different offsets produce different, non-overlapping warm-start
    /// batches of the same underlying sequence.
    pub fn with_offset(offset: usize) -> Self {
        // Index zero maps to the origin in every base, which is a degenerate
        // corner point. Start at one.
        Self { index: offset + 1 }
    }
}

impl Default for Halton {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RealField + Copy> Generate<T> for Halton {
    const NAME: &'static str = "Halton";

    type Error = HaltonError;

    fn generate(
        &mut self,
        space: &SearchSpace<T>,
        count: usize,
    ) -> Result<Vec<Assignment<T>>, Self::Error> {
        if space.dim() > PRIMES.len() {
            return Err(HaltonError::TooManyDimensions(space.dim()));
        }

        let mut assignments = Vec::with_capacity(count);

        for i in 0..count {
            let mut x = Assignment::new();

            for (dim, spec) in space.iter().enumerate() {
                let u = radical_inverse(self.index + i, PRIMES[dim]);

                let value = match spec.bounds() {
                    ParamBounds::Real { lower, upper } => {
                        let span = *upper - *lower;
                        ParamValue::Real(*lower + convert::<f64, T>(u) * span)
                    }
                    ParamBounds::Integer { lower, upper } => {
                        let span = (*upper - *lower + 1) as f64;
                        let value = *lower + (u * span) as i64;
                        ParamValue::Int(value.min(*upper))
                    }
                    ParamBounds::Categorical { choices } => {
                        let index = (u * choices.len() as f64) as usize;
                        ParamValue::Choice(choices[index.min(choices.len() - 1)].clone())
                    }
                };

                x.set(spec.name(), value);
            }

            assignments.push(x);
        }

        self.index += count;
        Ok(assignments)
    }
}

/// Computes the radical inverse of `i` in given base, a value in [0, 1).
fn radical_inverse(mut i: usize, base: u32) -> f64 {
    let base = base as usize;
    let inv_base = 1.0 / base as f64;

    let mut factor = inv_base;
    let mut result = 0.0;

    while i > 0 {
        result += factor * (i % base) as f64;
        i /= base;
        factor *= inv_base;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParamSpec;

    #[test]
    fn radical_inverse_base_2() {
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert_eq!(radical_inverse(4, 2), 0.125);
    }

    #[test]
    fn generated_assignments_are_in_domain() {
        let space = SearchSpace::new(vec![
            ParamSpec::real("x", -5.0, 10.0),
            ParamSpec::integer("n", 1, 7),
            ParamSpec::categorical("kind", ["a", "b", "c"]),
        ]);

        let mut halton = Halton::new();
        let assignments = halton.generate(&space, 500).unwrap();

        assert_eq!(assignments.len(), 500);
        for x in assignments.iter() {
            assert_eq!(space.check(x), Ok(()));
        }
    }

    #[test]
    fn sequence_is_deterministic() {
        let space: SearchSpace<f64> = [("x", 0.0, 1.0), ("y", 0.0, 1.0)].into_iter().collect();

        let first = Halton::new().generate(&space, 16).unwrap();
        let second = Halton::new().generate(&space, 16).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn consecutive_calls_continue_the_sequence() {
        let space: SearchSpace<f64> = [("x", 0.0, 1.0)].into_iter().collect();

        let mut halton = Halton::new();
        let head = halton.generate(&space, 4).unwrap();
        let tail = halton.generate(&space, 4).unwrap();

        let mut all = Halton::new().generate(&space, 8).unwrap();
        let expected_tail = all.split_off(4);

        assert_eq!(head, all);
        assert_eq!(tail, expected_tail);
    }

    #[test]
    fn offset_skips_ahead() {
        let space: SearchSpace<f64> = [("x", 0.0, 1.0)].into_iter().collect();

        let mut all = Halton::new().generate(&space, 8).unwrap();
        let tail = all.split_off(3);
        let skipped = Halton::with_offset(3).generate(&space, 5).unwrap();

        assert_eq!(skipped, tail);
    }

    #[test]
    fn covers_the_unit_interval_evenly() {
        let space: SearchSpace<f64> = [("x", 0.0, 1.0)].into_iter().collect();

        let assignments = Halton::new().generate(&space, 15).unwrap();

        // The first 2^k - 1 points of the base-2 sequence hit every dyadic
        // interval of width 2^-k exactly once.
        for k in 0..8 {
            let bucket = (k as f64 + 0.5) / 8.0;
            assert!(assignments
                .iter()
                .any(|x| (x.real("x").unwrap() - bucket).abs() < 0.5 / 8.0));
        }
    }

    #[test]
    fn too_many_dimensions() {
        let space: SearchSpace<f64> = (0..40)
            .map(|i| (format!("x{i}"), 0.0, 1.0))
            .collect();

        let result = <Halton as Generate<f64>>::generate(&mut Halton::new(), &space, 1);
        assert_eq!(result, Err(HaltonError::TooManyDimensions(40)));
    }
}
