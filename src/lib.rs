#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! _smbo_ is a framework and implementation for **sequential model-based
//! optimization**, also known as Bayesian optimization.
//!
//! The library is written completely in Rust. Its focus is on being useful
//! for **practical problems** with expensive evaluations and having an API
//! that is simple for easy cases as well as flexible for complicated ones.
//! The name stands for ***s***equential ***m***odel-***b***ased
//! ***o***ptimization.
//!
//! ## Practical problems
//!
//! The main goal is to be useful for practical problems. This is manifested
//! by the following features:
//!
//! * _Pluggable surrogates_. The optimization loop depends on a minimal
//!   capability set of a fitted model (posterior mean and variance, number
//!   of tracked outcomes), never on a concrete model family. A reference
//!   Gaussian process is provided, but any regression technique can be
//!   substituted.
//! * _Mixed-type search spaces_. Continuous, integer and categorical
//!   parameters with bound constraints are supported first-class, which is
//!   what real tuning problems look like.
//! * _Failures are data, not crashes_. Failed evaluations, diverged model
//!   fits and exhausted failure budgets are recorded and surfaced in a
//!   structured report instead of tearing the loop down.
//!
//! ## The loop
//!
//! The problem is: given an expensive function over a bounded domain, find
//! a good assignment of its parameters with a small number of evaluations.
//! The driver repeats a simple cycle:
//!
//! 1. While there are fewer observations than the warm-start size, ask a
//!    quasi-random generator for candidates covering the domain evenly.
//! 2. Afterwards, fit the model factory on all accumulated observations,
//!    ask a model-based generator to maximize an acquisition criterion over
//!    the posterior, and evaluate the returned candidates.
//! 3. Record every result in an append-only observation set and repeat
//!    until the round budget is exhausted.
//!
//! ## Example
//!
//! A problem is a type implementing [`Problem`] (the search space) and
//! [`Objective`] (the measurement). Everything else has defaults.
//!
//! ```rust
//! use rand::Rng;
//! use smbo::{
//!     Assignment, EvaluationError, Goal, Measurement, Objective, OutOfDomainError,
//!     Problem, RunDriver, RunOptions, SearchSpace,
//! };
//!
//! struct Tuning;
//!
//! impl Problem for Tuning {
//!     type Field = f64;
//!
//!     fn space(&self) -> SearchSpace<Self::Field> {
//!         [("x", -2.0, 2.0), ("y", -2.0, 2.0)].into_iter().collect()
//!     }
//! }
//!
//! impl Objective for Tuning {
//!     fn metrics(&self) -> Vec<String> {
//!         vec!["loss".to_string()]
//!     }
//!
//!     fn measure<R: Rng + ?Sized>(
//!         &self,
//!         x: &Assignment<Self::Field>,
//!         _rng: &mut R,
//!     ) -> Result<Vec<Measurement<Self::Field>>, EvaluationError> {
//!         let a = x.real("x").ok_or(OutOfDomainError::Missing("x".to_string()))?;
//!         let b = x.real("y").ok_or(OutOfDomainError::Missing("y".to_string()))?;
//!
//!         let loss = (a - 1.0) * (a - 1.0) + (b + 0.5) * (b + 0.5);
//!         Ok(vec![Measurement::new("loss", loss, 0.0)])
//!     }
//! }
//!
//! let f = Tuning;
//!
//! let mut options = RunOptions::default();
//! options.set_warm_start(5).set_rounds(5).set_goal(Goal::Minimize);
//!
//! let report = RunDriver::builder(&f).with_options(options).build().run();
//!
//! assert_eq!(report.observations().len(), 10);
//! let (best, loss) = report.best().expect("at least one observation");
//! println!("best loss {loss} at {:?}", best);
//! ```
//!
//! ## Structure
//!
//! * [`driver`] -- The high-level loop with builder-based configuration.
//! * [`algo`] -- Candidate generators: quasi-random Halton warm start and
//!   expected improvement.
//! * [`model`] -- Reference surrogate: a Gaussian process with Matérn 5/2
//!   kernel.
//! * The crate root re-exports the core traits and types ([`SearchSpace`],
//!   [`Objective`], [`ModelFactory`], [`Surrogate`], ...).
//!
//! ## License
//!
//! Licensed under MIT.

pub mod algo;
mod core;
pub mod driver;
pub mod model;

pub use core::*;
pub use driver::{RunBuilder, RunDriver, RunOptions, RunReport};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
