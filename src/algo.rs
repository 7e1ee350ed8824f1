//! Candidate generation algorithms.
//!
//! * [Halton](halton) -- Quasi-random generator with low-discrepancy
//!   coverage, used for warm-starting a run.
//! * [Expected Improvement](expected_improvement) -- Model-based generator
//!   maximizing the expected improvement acquisition criterion over the
//!   posterior of a fitted surrogate.

pub mod expected_improvement;
pub mod halton;

pub use expected_improvement::{ExpectedImprovement, ExpectedImprovementOptions};
pub use halton::Halton;
