//! Search space definition (parameter names, types and bound constraints).

use std::collections::BTreeMap;
use std::iter::FromIterator;

use nalgebra::{convert, DimName, Dynamic, OVector, RealField, U1};
use rand::Rng;
use rand_distr::{uniform::SampleUniform, Distribution, Uniform};
use thiserror::Error;

/// Domain of a single parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamBounds<T: RealField + Copy> {
    /// Continuous parameter with inclusive finite bounds.
    Real {
        /// Lower bound, strictly less than `upper`.
        lower: T,
        /// Upper bound.
        upper: T,
    },
    /// Integer parameter with inclusive bounds.
    Integer {
        /// Lower bound, strictly less than `upper`.
        lower: i64,
        /// Upper bound.
        upper: i64,
    },
    /// Categorical parameter with an enumerated set of choices.
    Categorical {
        /// Non-empty set of unique choices.
        choices: Vec<String>,
    },
}

/// Specification of a single named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec<T: RealField + Copy> {
    name: String,
    bounds: ParamBounds<T>,
}

impl<T: RealField + Copy> ParamSpec<T> {
    /// Creates a continuous parameter with given inclusive bounds.
    pub fn real(name: impl Into<String>, lower: T, upper: T) -> Self {
        assert!(
            lower.is_finite() && upper.is_finite(),
            "bounds must be finite"
        );
        assert!(lower < upper, "lower bound must be less than upper bound");

        Self {
            name: name.into(),
            bounds: ParamBounds::Real { lower, upper },
        }
    }

    /// Creates an integer parameter with given inclusive bounds.
    pub fn integer(name: impl Into<String>, lower: i64, upper: i64) -> Self {
        assert!(lower < upper, "lower bound must be less than upper bound");

        Self {
            name: name.into(),
            bounds: ParamBounds::Integer { lower, upper },
        }
    }

    /// Creates a categorical parameter with given choices.
    pub fn categorical<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices = choices.into_iter().map(Into::into).collect::<Vec<_>>();
        assert!(!choices.is_empty(), "empty set of choices");
        assert!(
            choices
                .iter()
                .all(|c| choices.iter().filter(|o| *o == c).count() == 1),
            "choices must be unique"
        );

        Self {
            name: name.into(),
            bounds: ParamBounds::Categorical { choices },
        }
    }

    /// Gets the name of the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the bounds of the parameter.
    pub fn bounds(&self) -> &ParamBounds<T> {
        &self.bounds
    }
}

/// Concrete value assigned to a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue<T: RealField + Copy> {
    /// Value of a continuous parameter.
    Real(T),
    /// Value of an integer parameter.
    Int(i64),
    /// Value of a categorical parameter.
    Choice(String),
}

/// Mapping from parameter names to concrete values.
///
/// An assignment is valid with respect to a [`SearchSpace`] if it passes
/// [`SearchSpace::check`]. Assignments themselves do not enforce any
/// domain constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment<T: RealField + Copy> {
    values: BTreeMap<String, ParamValue<T>>,
}

impl<T: RealField + Copy> Assignment<T> {
    /// Creates an empty assignment.
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Sets the value of a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue<T>) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Gets the value of a parameter if present.
    pub fn get(&self, name: &str) -> Option<&ParamValue<T>> {
        self.values.get(name)
    }

    /// Gets the value of a continuous parameter if present and of that kind.
    pub fn real(&self, name: &str) -> Option<T> {
        match self.values.get(name) {
            Some(ParamValue::Real(value)) => Some(*value),
            _ => None,
        }
    }

    /// Gets the value of an integer parameter if present and of that kind.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Gets the value of a categorical parameter if present and of that
    /// kind.
    pub fn choice(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Choice(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Gets the number of assigned parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Determines whether the assignment is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the assigned name-value pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue<T>)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<T: RealField + Copy, S: Into<String>> FromIterator<(S, ParamValue<T>)> for Assignment<T> {
    fn from_iter<I: IntoIterator<Item = (S, ParamValue<T>)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

/// Error encountered while validating an assignment against a search space.
///
/// The offending parameter is always named.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutOfDomainError {
    /// A declared parameter has no value in the assignment.
    #[error("parameter `{0}` is missing from the assignment")]
    Missing(String),
    /// The assignment contains a parameter the search space does not
    /// declare.
    #[error("parameter `{0}` is not declared by the search space")]
    Undeclared(String),
    /// The value kind does not match the parameter specification.
    #[error("parameter `{0}` has a value of different kind than declared")]
    KindMismatch(String),
    /// A numeric value is NaN or infinite.
    #[error("parameter `{0}` has a non-finite value")]
    NotFinite(String),
    /// The value violates the declared bounds or choice set.
    #[error("parameter `{0}` violates its declared bounds")]
    OutOfBounds(String),
}

/// Search space for a problem.
///
/// An ordered collection of [`ParamSpec`]s with unique names. The search
/// space is created once at setup and is immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace<T: RealField + Copy> {
    params: Vec<ParamSpec<T>>,
}

impl<T: RealField + Copy> SearchSpace<T> {
    /// Creates a search space from given parameter specifications.
    ///
    /// # Panics
    ///
    /// Panics if the collection is empty or parameter names are not unique.
    pub fn new(params: Vec<ParamSpec<T>>) -> Self {
        assert!(!params.is_empty(), "empty search space");

        for spec in params.iter() {
            assert!(
                params.iter().filter(|o| o.name() == spec.name()).count() == 1,
                "parameter names must be unique"
            );
        }

        Self { params }
    }

    /// Gets the dimensionality (number of parameters) of the search space.
    pub fn dim(&self) -> usize {
        self.params.len()
    }

    /// Iterates over the parameter specifications in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, ParamSpec<T>> {
        self.params.iter()
    }

    /// Gets the specification of a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec<T>> {
        self.params.iter().find(|spec| spec.name() == name)
    }

    /// Gets the positional index of a parameter by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|spec| spec.name() == name)
    }

    /// Validates that given assignment lies within the declared domain.
    ///
    /// Every declared parameter must be present with a value of the declared
    /// kind, finite and within bounds; parameters not declared by the space
    /// are rejected. The check has no side effects and passing it is
    /// idempotent.
    pub fn check(&self, x: &Assignment<T>) -> Result<(), OutOfDomainError> {
        for spec in self.params.iter() {
            let value = x
                .get(spec.name())
                .ok_or_else(|| OutOfDomainError::Missing(spec.name().to_string()))?;

            match (spec.bounds(), value) {
                (ParamBounds::Real { lower, upper }, ParamValue::Real(value)) => {
                    if !value.is_finite() {
                        return Err(OutOfDomainError::NotFinite(spec.name().to_string()));
                    }
                    if value < lower || value > upper {
                        return Err(OutOfDomainError::OutOfBounds(spec.name().to_string()));
                    }
                }
                (ParamBounds::Integer { lower, upper }, ParamValue::Int(value)) => {
                    if value < lower || value > upper {
                        return Err(OutOfDomainError::OutOfBounds(spec.name().to_string()));
                    }
                }
                (ParamBounds::Categorical { choices }, ParamValue::Choice(value)) => {
                    if !choices.iter().any(|c| c == value) {
                        return Err(OutOfDomainError::OutOfBounds(spec.name().to_string()));
                    }
                }
                _ => return Err(OutOfDomainError::KindMismatch(spec.name().to_string())),
            }
        }

        if x.len() != self.params.len() {
            for (name, _) in x.iter() {
                if self.get(name).is_none() {
                    return Err(OutOfDomainError::Undeclared(name.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Samples an assignment uniformly in the search space.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Assignment<T>
    where
        T: SampleUniform,
    {
        let mut x = Assignment::new();

        for spec in self.params.iter() {
            let value = match spec.bounds() {
                ParamBounds::Real { lower, upper } => {
                    ParamValue::Real(Uniform::new_inclusive(*lower, *upper).sample(rng))
                }
                ParamBounds::Integer { lower, upper } => {
                    ParamValue::Int(rng.gen_range(*lower..=*upper))
                }
                ParamBounds::Categorical { choices } => {
                    ParamValue::Choice(choices[rng.gen_range(0..choices.len())].clone())
                }
            };

            x.set(spec.name(), value);
        }

        x
    }

    /// Encodes an assignment into a numeric feature vector.
    ///
    /// Continuous and integer parameters are encoded as their values,
    /// categorical parameters as the index of the chosen option. Models are
    /// free to normalize further using [`SearchSpace::feature_bounds`].
    pub fn featurize(&self, x: &Assignment<T>) -> Result<OVector<T, Dynamic>, OutOfDomainError> {
        let mut features = Vec::with_capacity(self.params.len());

        for spec in self.params.iter() {
            let value = x
                .get(spec.name())
                .ok_or_else(|| OutOfDomainError::Missing(spec.name().to_string()))?;

            let feature = match (spec.bounds(), value) {
                (ParamBounds::Real { .. }, ParamValue::Real(value)) => *value,
                (ParamBounds::Integer { .. }, ParamValue::Int(value)) => {
                    convert(*value as f64)
                }
                (ParamBounds::Categorical { choices }, ParamValue::Choice(value)) => {
                    let index = choices
                        .iter()
                        .position(|c| c == value)
                        .ok_or_else(|| OutOfDomainError::OutOfBounds(spec.name().to_string()))?;
                    convert(index as f64)
                }
                _ => return Err(OutOfDomainError::KindMismatch(spec.name().to_string())),
            };

            features.push(feature);
        }

        Ok(OVector::from_vec_generic(
            Dynamic::new(features.len()),
            U1::name(),
            features,
        ))
    }

    /// Gets the numeric bounds of the feature encoding, dimension by
    /// dimension.
    ///
    /// For categorical parameters the bounds are `[0, k - 1]` where `k` is
    /// the number of choices.
    pub fn feature_bounds(&self) -> (OVector<T, Dynamic>, OVector<T, Dynamic>) {
        let dim = Dynamic::new(self.params.len());

        let lower = self.params.iter().map(|spec| match spec.bounds() {
            ParamBounds::Real { lower, .. } => *lower,
            ParamBounds::Integer { lower, .. } => convert(*lower as f64),
            ParamBounds::Categorical { .. } => convert(0.0),
        });
        let upper = self.params.iter().map(|spec| match spec.bounds() {
            ParamBounds::Real { upper, .. } => *upper,
            ParamBounds::Integer { upper, .. } => convert(*upper as f64),
            ParamBounds::Categorical { choices } => {
                convert(choices.len().saturating_sub(1) as f64)
            }
        });

        (
            OVector::from_iterator_generic(dim, U1::name(), lower),
            OVector::from_iterator_generic(dim, U1::name(), upper),
        )
    }
}

impl<T: RealField + Copy, S: Into<String>> FromIterator<(S, T, T)> for SearchSpace<T> {
    fn from_iter<I: IntoIterator<Item = (S, T, T)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(name, lower, upper)| ParamSpec::real(name, lower, upper))
                .collect(),
        )
    }
}

impl<T: RealField + Copy> FromIterator<ParamSpec<T>> for SearchSpace<T> {
    fn from_iter<I: IntoIterator<Item = ParamSpec<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    fn mixed_space() -> SearchSpace<f64> {
        SearchSpace::new(vec![
            ParamSpec::real("lr", 1e-4, 1.0),
            ParamSpec::integer("layers", 1, 8),
            ParamSpec::categorical("activation", ["relu", "tanh"]),
        ])
    }

    fn valid_assignment() -> Assignment<f64> {
        [
            ("lr", ParamValue::Real(0.1)),
            ("layers", ParamValue::Int(3)),
            ("activation", ParamValue::Choice("relu".to_string())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    #[should_panic(expected = "empty search space")]
    fn empty_space() {
        SearchSpace::<f64>::new(Vec::new());
    }

    #[test]
    #[should_panic(expected = "parameter names must be unique")]
    fn duplicate_names() {
        SearchSpace::new(vec![
            ParamSpec::real("x", 0.0, 1.0),
            ParamSpec::real("x", 0.0, 2.0),
        ]);
    }

    #[test]
    #[should_panic(expected = "lower bound must be less than upper bound")]
    fn inverted_bounds() {
        ParamSpec::real("x", 1.0, 0.0);
    }

    #[test]
    fn check_accepts_valid_assignment() {
        let space = mixed_space();
        assert_eq!(space.check(&valid_assignment()), Ok(()));
    }

    #[test]
    fn check_is_idempotent_and_side_effect_free() {
        let space = mixed_space();
        let x = valid_assignment();

        let first = space.check(&x);
        let second = space.check(&x);

        assert_eq!(first, Ok(()));
        assert_eq!(first, second);
        assert_eq!(x, valid_assignment());
    }

    #[test]
    fn check_names_offending_parameter() {
        let space = mixed_space();

        let mut x = valid_assignment();
        x.set("lr", ParamValue::Real(2.0));
        assert_eq!(
            space.check(&x),
            Err(OutOfDomainError::OutOfBounds("lr".to_string()))
        );

        let mut x = valid_assignment();
        x.set("lr", ParamValue::Real(f64::NAN));
        assert_eq!(
            space.check(&x),
            Err(OutOfDomainError::NotFinite("lr".to_string()))
        );

        let mut x = valid_assignment();
        x.set("layers", ParamValue::Real(3.0));
        assert_eq!(
            space.check(&x),
            Err(OutOfDomainError::KindMismatch("layers".to_string()))
        );

        let mut x = valid_assignment();
        x.set("activation", ParamValue::Choice("sigmoid".to_string()));
        assert_eq!(
            space.check(&x),
            Err(OutOfDomainError::OutOfBounds("activation".to_string()))
        );

        let mut x = valid_assignment();
        x.set("extra", ParamValue::Real(0.0));
        assert_eq!(
            space.check(&x),
            Err(OutOfDomainError::Undeclared("extra".to_string()))
        );
    }

    #[test]
    fn check_reports_missing_parameter() {
        let space = mixed_space();
        let x: Assignment<f64> = [("lr", ParamValue::Real(0.1))].into_iter().collect();

        assert_eq!(
            space.check(&x),
            Err(OutOfDomainError::Missing("layers".to_string()))
        );
    }

    #[test]
    fn sampled_assignments_are_in_domain() {
        let space = mixed_space();
        let mut rng = SmallRng::seed_from_u64(3);

        for _ in 0..1000 {
            let x = space.sample(&mut rng);
            assert_eq!(space.check(&x), Ok(()));
        }
    }

    #[test]
    fn featurize_encodes_in_declaration_order() {
        let space = mixed_space();
        let features = space.featurize(&valid_assignment()).unwrap();

        assert_eq!(features.as_slice(), &[0.1, 3.0, 0.0]);
    }

    #[test]
    fn feature_bounds_cover_all_kinds() {
        let space = mixed_space();
        let (lower, upper) = space.feature_bounds();

        assert_eq!(lower.as_slice(), &[1e-4, 1.0, 0.0]);
        assert_eq!(upper.as_slice(), &[1.0, 8.0, 1.0]);
    }

    #[test]
    fn space_from_bounds_tuples() {
        let space: SearchSpace<f64> = [("x1", -5.0, 10.0), ("x2", 0.0, 15.0)]
            .into_iter()
            .collect();

        assert_eq!(space.dim(), 2);
        assert_eq!(space.index_of("x2"), Some(1));
    }
}
