//! Line-search descent minimization.

use std::fmt;
use std::ops::ControlFlow;

use log::{error, info, warn};

use ift::{Field, Float, Result};

use crate::energy::Energy;
use crate::iteration_controller::IterationController;
use crate::line_search::LineSearch;
use crate::result::{MinimizationResult, Status};
use crate::solvers::Minimizer;

/// Strategy producing a descent direction at the current energy.
pub trait DescentDirection<F: Float>: fmt::Debug {
    /// Direction to search along, or `None` if none could be computed
    /// (reported as [`Status::Error`]).
    fn direction(&mut self, energy: &dyn Energy<F>) -> Result<Option<Field<F>>>;

    /// First trial step for the line search, if the direction has a natural
    /// scale (Newton-type directions use 1).
    fn initial_step(&self) -> Option<F> {
        None
    }

    /// Forget accumulated state after a failed line search.
    fn reset(&mut self) {}
}

/// `-g`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteepestDescent;

impl<F: Float> DescentDirection<F> for SteepestDescent {
    fn direction(&mut self, energy: &dyn Energy<F>) -> Result<Option<Field<F>>> {
        Ok(Some(-energy.gradient()?))
    }
}

/// Per-iteration hook: receives the current energy and the iteration
/// number; returning `Break` stops the minimization with
/// [`Status::Aborted`].
pub type Callback<F> = Box<dyn FnMut(&dyn Energy<F>, usize) -> ControlFlow<()>>;

/// Generic descent loop: pick a direction, line search along it, move, and
/// let the controller decide when to stop.
///
/// Stops early at a point with vanishing gradient (converged), when the
/// energy would increase (error), or when a step leaves it unchanged
/// (converged). A failed line search resets the direction finder; two
/// failures in a row are an error.
pub struct DescentMinimizer<F: Float, D> {
    controller: Box<dyn IterationController<F>>,
    direction: D,
    line_search: LineSearch<F>,
    callback: Option<Callback<F>>,
}

impl<F: Float, D: DescentDirection<F>> DescentMinimizer<F, D>
where
    LineSearch<F>: Default,
{
    pub fn new(controller: Box<dyn IterationController<F>>, direction: D) -> Self {
        DescentMinimizer {
            controller,
            direction,
            line_search: LineSearch::default(),
            callback: None,
        }
    }
}

impl<F: Float, D: DescentDirection<F>> DescentMinimizer<F, D> {
    pub fn with_line_search(mut self, line_search: LineSearch<F>) -> Self {
        self.line_search = line_search;
        self
    }

    pub fn with_callback(
        mut self,
        callback: impl FnMut(&dyn Energy<F>, usize) -> ControlFlow<()> + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn controller(&self) -> &dyn IterationController<F> {
        self.controller.as_ref()
    }

    pub fn direction_finder(&self) -> &D {
        &self.direction
    }

    fn run(&mut self, mut energy: Box<dyn Energy<F>>) -> Result<(Box<dyn Energy<F>>, Status)> {
        let status = self.controller.start(energy.as_ref())?;
        if status != Status::Continue {
            return Ok((energy, status));
        }

        let mut previous_value: Option<F> = None;
        let mut failed_last = false;
        loop {
            if let Some(cb) = self.callback.as_mut() {
                if cb(energy.as_ref(), self.controller.iterations()).is_break() {
                    info!("minimization stopped by callback");
                    return Ok((energy, Status::Aborted));
                }
            }

            if energy.gradient_norm()? == F::zero() {
                info!("reached a perfectly flat point");
                return Ok((energy, Status::Converged));
            }

            let Some(direction) = self.direction.direction(energy.as_ref())? else {
                error!("no descent direction could be computed");
                return Ok((energy, Status::Error));
            };

            let value = energy.value()?;
            let searched = self.line_search.search(
                energy.as_ref(),
                &direction,
                previous_value,
                self.direction.initial_step(),
            )?;
            let Some(step) = searched else {
                if failed_last {
                    error!("line search failed twice in a row");
                    return Ok((energy, Status::Error));
                }
                warn!("line search failed; resetting the direction finder");
                self.direction.reset();
                failed_last = true;
                continue;
            };
            failed_last = false;
            previous_value = Some(value);

            let new_value = step.energy.value()?;
            if new_value > value {
                error!("energy increased from {value} to {new_value}");
                return Ok((energy, Status::Error));
            }
            if new_value == value {
                warn!("energy unchanged by the step; assuming convergence");
                return Ok((step.energy, Status::Converged));
            }
            energy = step.energy;

            let status = self.controller.check(energy.as_ref())?;
            if status != Status::Continue {
                return Ok((energy, status));
            }
        }
    }
}

impl<F: Float, D: DescentDirection<F>> Minimizer<F> for DescentMinimizer<F, D> {
    fn minimize(&mut self, energy: Box<dyn Energy<F>>) -> Result<MinimizationResult<F>> {
        let (energy, status) = self.run(energy)?;
        Ok(MinimizationResult::new(
            energy,
            status,
            self.controller.iterations(),
        ))
    }
}

impl<F: Float, D: fmt::Debug> fmt::Debug for DescentMinimizer<F, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescentMinimizer")
            .field("controller", &self.controller)
            .field("direction", &self.direction)
            .field("line_search", &self.line_search)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Steepest descent with a strong Wolfe line search.
pub fn steepest_descent<F: Float>(
    controller: Box<dyn IterationController<F>>,
) -> DescentMinimizer<F, SteepestDescent>
where
    LineSearch<F>: Default,
{
    DescentMinimizer::new(controller, SteepestDescent)
}
