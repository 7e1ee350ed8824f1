//! Reference surrogate model implementations.
//!
//! * [Gaussian process](gp) -- Recommended default surrogate for
//!   low-dimensional continuous spaces with expensive evaluations.

pub mod gp;

pub use gp::{
    GaussianProcess, GaussianProcessModel, GaussianProcessOptions, GaussianProcessSnapshot,
};
