use log::{debug, error};

use ift::{Field, Float, Result};

use crate::conjugate_gradient::ConjugateGradient;
use crate::energy::Energy;
use crate::iteration_controller::{
    GradientNormConfig, GradientNormController, IterationController,
};
use crate::line_search::LineSearch;
use crate::quadratic::QuadraticEnergy;
use crate::result::Status;
use crate::solvers::descent::{DescentDirection, DescentMinimizer};

/// `-M^{-1} g` with the metric inverted exactly (it must support
/// `InverseTimes`, e.g. a diagonal or an `InversionEnabler`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RelaxedNewton;

impl<F: Float> DescentDirection<F> for RelaxedNewton {
    fn direction(&mut self, energy: &dyn Energy<F>) -> Result<Option<Field<F>>> {
        let g = energy.gradient()?;
        Ok(Some(-energy.metric()?.inverse_times(&g)?))
    }

    fn initial_step(&self) -> Option<F> {
        Some(F::one())
    }
}

/// Configuration for the Newton-CG direction.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewtonCgConfig<F> {
    /// Iteration limit of each inner CG solve (default: 200).
    pub max_cg_iterations: usize,
    /// Upper bound of the forcing term (default: 0.5).
    pub max_forcing: F,
    /// CG residual reset interval (default: 20).
    pub nreset: usize,
}

impl Default for NewtonCgConfig<f64> {
    fn default() -> Self {
        NewtonCgConfig {
            max_cg_iterations: 200,
            max_forcing: 0.5,
            nreset: 20,
        }
    }
}

impl Default for NewtonCgConfig<f32> {
    fn default() -> Self {
        NewtonCgConfig {
            max_cg_iterations: 200,
            max_forcing: 0.5,
            nreset: 20,
        }
    }
}

/// Inexact Newton direction: `M d = -g` solved by CG to a relative
/// residual of `min(max_forcing, sqrt(|g|))`.
#[derive(Debug, Clone)]
pub struct NewtonCg<F> {
    config: NewtonCgConfig<F>,
}

impl<F: Float> NewtonCg<F> {
    pub fn new(config: NewtonCgConfig<F>) -> Self {
        NewtonCg { config }
    }

    pub fn config(&self) -> &NewtonCgConfig<F> {
        &self.config
    }
}

impl<F: Float> DescentDirection<F> for NewtonCg<F> {
    fn direction(&mut self, energy: &dyn Energy<F>) -> Result<Option<Field<F>>> {
        let g = energy.gradient()?;
        let forcing = self.config.max_forcing.min(g.norm().sqrt());
        let controller = GradientNormController::new(GradientNormConfig {
            tol_abs: None,
            tol_rel: Some(forcing),
            convergence_level: 1,
            iteration_limit: Some(self.config.max_cg_iterations),
        })
        .named("NewtonCg inner");
        let controller: Box<dyn IterationController<F>> = Box::new(controller);
        let start = Field::zeros(g.domain().clone());
        let quadratic = QuadraticEnergy::new(start, energy.metric()?, Some(g))?;
        let mut cg = ConjugateGradient::new(controller).with_nreset(self.config.nreset);
        let (solution, status) = cg.solve(quadratic, None)?;
        if status == Status::Error {
            error!("NewtonCg: inner conjugate gradient failed");
            return Ok(None);
        }
        debug!(
            "NewtonCg: inner CG {status} after {} iterations",
            cg.controller().iterations()
        );
        Ok(Some(-solution.position()))
    }

    fn initial_step(&self) -> Option<F> {
        Some(F::one())
    }
}

impl<F: Float> DescentMinimizer<F, NewtonCg<F>>
where
    LineSearch<F>: Default,
    NewtonCgConfig<F>: Default,
{
    /// Newton-CG with default settings and a strong Wolfe line search.
    pub fn newton_cg(controller: Box<dyn IterationController<F>>) -> Self {
        DescentMinimizer::new(controller, NewtonCg::new(NewtonCgConfig::default()))
    }
}

impl<F: Float> DescentMinimizer<F, RelaxedNewton>
where
    LineSearch<F>: Default,
{
    pub fn relaxed_newton(controller: Box<dyn IterationController<F>>) -> Self {
        DescentMinimizer::new(controller, RelaxedNewton)
    }
}
