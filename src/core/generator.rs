//! Interfaces of candidate generators.

use nalgebra::RealField;

use super::base::Goal;
use super::model::Surrogate;
use super::space::{Assignment, SearchSpace};

/// Interface of a warm-start candidate generator.
///
/// A warm-start generator produces candidate assignments without any model,
/// typically with low-discrepancy coverage of the search space. It is used
/// while the observation set is below the configured minimum size.
///
/// Implementations are responsible for returning assignments that satisfy
/// the search space bounds; the driver does not repair out-of-domain
/// candidates.
pub trait Generate<T: RealField + Copy> {
    /// Name of the generator.
    const NAME: &'static str;

    /// Error while generating candidates.
    type Error: std::error::Error + 'static;

    /// Generates `count` candidate assignments within the search space.
    fn generate(
        &mut self,
        space: &SearchSpace<T>,
        count: usize,
    ) -> Result<Vec<Assignment<T>>, Self::Error>;
}

/// Interface of a model-based candidate generator.
///
/// A model-based generator solves an inner maximization of an acquisition
/// criterion over the feasible domain, guided by the posterior of a fitted
/// model, and returns the top `count` candidates. How the inner maximization
/// is performed is opaque to the driver; only this boundary is stable.
///
/// As with [`Generate`], returned assignments must satisfy the search space
/// bounds.
pub trait GenerateWithModel<T: RealField + Copy, M: Surrogate<T>> {
    /// Name of the generator.
    const NAME: &'static str;

    /// Error while generating candidates.
    type Error: std::error::Error + 'static;

    /// Generates `count` candidate assignments within the search space.
    ///
    /// The `outcome` index selects which of the model's tracked outcomes is
    /// being optimized, `goal` gives the direction and `incumbent` is the
    /// best observed mean of that outcome so far (or [`Goal::worst`] if
    /// nothing has been observed).
    fn generate_with_model(
        &mut self,
        space: &SearchSpace<T>,
        model: &M,
        outcome: usize,
        goal: Goal,
        incumbent: T,
        count: usize,
    ) -> Result<Vec<Assignment<T>>, Self::Error>;
}
