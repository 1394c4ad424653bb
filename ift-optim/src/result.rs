use std::fmt;

use ift::Float;

use crate::energy::Energy;

/// Outcome of an iterative solve.
///
/// Numerical trouble (a CG breakdown, an energy that went up) is reported
/// here rather than as an `Err`: the last iterate is still handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// Keep iterating.
    Continue,
    /// The controller's stopping criterion was met.
    Converged,
    /// The iteration limit was hit before convergence.
    IterationLimit,
    /// Numerical breakdown (zero curvature, lost positive definiteness,
    /// increasing energy).
    Error,
    /// A callback asked the minimizer to stop.
    Aborted,
}

impl Status {
    /// `true` for every status except [`Status::Continue`].
    pub fn is_terminal(self) -> bool {
        self != Status::Continue
    }

    /// `true` if the result is usable as a solution: converged or at least
    /// stopped by the iteration limit.
    pub fn is_usable(self) -> bool {
        matches!(self, Status::Converged | Status::IterationLimit)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Continue => write!(f, "continue"),
            Status::Converged => write!(f, "converged"),
            Status::IterationLimit => write!(f, "iteration limit reached"),
            Status::Error => write!(f, "numerical error"),
            Status::Aborted => write!(f, "aborted by callback"),
        }
    }
}

/// Result of a minimization run.
#[derive(Debug)]
pub struct MinimizationResult<F: Float> {
    /// Energy at the last accepted position.
    pub energy: Box<dyn Energy<F>>,
    /// Why the minimizer stopped.
    pub status: Status,
    /// Number of completed iterations.
    pub iterations: usize,
}

impl<F: Float> MinimizationResult<F> {
    pub fn new(energy: Box<dyn Energy<F>>, status: Status, iterations: usize) -> Self {
        MinimizationResult {
            energy,
            status,
            iterations,
        }
    }

    pub fn position(&self) -> &ift::Field<F> {
        self.energy.position()
    }
}
