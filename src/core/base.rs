use nalgebra::{convert, RealField};

use super::space::SearchSpace;

/// The base trait for [`Objective`](super::objective::Objective).
///
/// A problem knows its scalar type and the search space over which it is
/// defined. Everything else (metrics, evaluation) is added by the traits
/// that build on top of it.
pub trait Problem {
    /// Type of the scalar, usually f32 or f64.
    type Field: RealField + Copy;

    /// Get the search space (parameter names, types and bounds) of the
    /// problem.
    fn space(&self) -> SearchSpace<Self::Field>;
}

/// Direction in which a metric is optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    /// Lower observed means are better.
    Minimize,
    /// Higher observed means are better.
    Maximize,
}

impl Goal {
    /// Determines whether `candidate` is strictly better than `incumbent`
    /// under this goal.
    pub fn better<T: PartialOrd>(self, candidate: T, incumbent: T) -> bool {
        match self {
            Goal::Minimize => candidate < incumbent,
            Goal::Maximize => candidate > incumbent,
        }
    }

    /// Returns the value that every finite observation improves upon.
    pub fn worst<T: RealField + Copy>(self) -> T {
        match self {
            Goal::Minimize => convert(f64::INFINITY),
            Goal::Maximize => convert(f64::NEG_INFINITY),
        }
    }
}

impl Default for Goal {
    fn default() -> Self {
        Goal::Minimize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn better_respects_direction() {
        assert!(Goal::Minimize.better(1.0, 2.0));
        assert!(!Goal::Minimize.better(2.0, 1.0));
        assert!(Goal::Maximize.better(2.0, 1.0));
        assert!(!Goal::Maximize.better(1.0, 2.0));
    }

    #[test]
    fn worst_is_improved_by_any_finite_value() {
        assert!(Goal::Minimize.better(1e30, Goal::Minimize.worst::<f64>()));
        assert!(Goal::Maximize.better(-1e30, Goal::Maximize.worst::<f64>()));
    }
}
