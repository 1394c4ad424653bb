//! Stopping criteria for iterative solvers.
//!
//! A controller is started once per run and then checked after every
//! iteration. The gradient- and energy-based controllers keep a convergence
//! counter: it goes up whenever the tolerance is met, down (never below zero)
//! otherwise, and the run converges once it reaches `convergence_level`.
//! Hitting `iteration_limit` first ends the run with
//! [`Status::IterationLimit`].

use std::fmt;

use log::{debug, warn};

use ift::{Field, Float, Result};

use crate::energy::Energy;
use crate::result::Status;

/// Decides when an iterative solver stops.
pub trait IterationController<F: Float>: fmt::Debug + Send + Sync {
    /// Reset the internal state for a new run at `energy`.
    fn start(&mut self, energy: &dyn Energy<F>) -> Result<Status>;

    /// Inspect the energy after one more iteration.
    fn check(&mut self, energy: &dyn Energy<F>) -> Result<Status>;

    /// Iterations seen since the last `start`.
    fn iterations(&self) -> usize;

    /// A fresh copy with the same settings.
    fn box_clone(&self) -> Box<dyn IterationController<F>>;
}

impl<F: Float> Clone for Box<dyn IterationController<F>> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Shared hysteresis and iteration bookkeeping.
#[derive(Debug, Clone, Default)]
struct Counter {
    iterations: usize,
    level: usize,
}

impl Counter {
    fn reset(&mut self) {
        *self = Counter::default();
    }

    fn update(
        &mut self,
        hit: bool,
        convergence_level: usize,
        iteration_limit: Option<usize>,
        name: &str,
    ) -> Status {
        if hit {
            self.level += 1;
        } else {
            self.level = self.level.saturating_sub(1);
        }
        if self.level >= convergence_level {
            return Status::Converged;
        }
        if let Some(limit) = iteration_limit {
            if self.iterations >= limit {
                warn!("{name}: iteration limit of {limit} reached");
                return Status::IterationLimit;
            }
        }
        Status::Continue
    }
}

// ── Gradient norm ──

/// Parameters of a [`GradientNormController`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradientNormConfig<F> {
    /// Converge when `|g| <= tol_abs` (default: disabled).
    pub tol_abs: Option<F>,
    /// Converge when `|g| <= tol_rel * |g_0|` (default: disabled).
    pub tol_rel: Option<F>,
    /// Consecutive hits required (default: 1).
    pub convergence_level: usize,
    /// Maximum number of iterations (default: none).
    pub iteration_limit: Option<usize>,
}

impl Default for GradientNormConfig<f64> {
    fn default() -> Self {
        GradientNormConfig {
            tol_abs: None,
            tol_rel: None,
            convergence_level: 1,
            iteration_limit: None,
        }
    }
}

impl Default for GradientNormConfig<f32> {
    fn default() -> Self {
        GradientNormConfig {
            tol_abs: None,
            tol_rel: None,
            convergence_level: 1,
            iteration_limit: None,
        }
    }
}

/// Stops on a small Euclidean gradient norm, absolute or relative to the
/// norm at the start.
#[derive(Debug, Clone)]
pub struct GradientNormController<F> {
    config: GradientNormConfig<F>,
    name: String,
    tol_rel_now: Option<F>,
    counter: Counter,
}

impl<F: Float> GradientNormController<F> {
    pub fn new(config: GradientNormConfig<F>) -> Self {
        GradientNormController {
            config,
            name: "GradientNormController".into(),
            tol_rel_now: None,
            counter: Counter::default(),
        }
    }

    /// Label used in log messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &GradientNormConfig<F> {
        &self.config
    }
}

impl<F: Float> IterationController<F> for GradientNormController<F> {
    fn start(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        self.counter.reset();
        self.tol_rel_now = match self.config.tol_rel {
            Some(tol) => Some(tol * energy.gradient_norm()?),
            None => None,
        };
        self.evaluate(energy)
    }

    fn check(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        self.counter.iterations += 1;
        self.evaluate(energy)
    }

    fn iterations(&self) -> usize {
        self.counter.iterations
    }

    fn box_clone(&self) -> Box<dyn IterationController<F>> {
        Box::new(GradientNormController::new(self.config.clone()).named(self.name.clone()))
    }
}

impl<F: Float> GradientNormController<F> {
    fn evaluate(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        let gnorm = energy.gradient_norm()?;
        let hit = self.config.tol_abs.map_or(false, |t| gnorm <= t)
            || self.tol_rel_now.map_or(false, |t| gnorm <= t);
        debug!(
            "{}: iteration {} energy {:.6e} gradnorm {:.2e} clvl {}",
            self.name,
            self.counter.iterations,
            energy.value()?,
            gnorm,
            self.counter.level
        );
        Ok(self.counter.update(
            hit,
            self.config.convergence_level,
            self.config.iteration_limit,
            &self.name,
        ))
    }
}

/// Stops when the largest gradient component is small.
#[derive(Debug, Clone)]
pub struct GradInfNormController<F> {
    tol: F,
    convergence_level: usize,
    iteration_limit: Option<usize>,
    counter: Counter,
}

impl<F: Float> GradInfNormController<F> {
    pub fn new(tol: F, convergence_level: usize, iteration_limit: Option<usize>) -> Self {
        GradInfNormController {
            tol,
            convergence_level,
            iteration_limit,
            counter: Counter::default(),
        }
    }

    fn evaluate(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        let crit = energy.gradient()?.max_abs();
        debug!(
            "GradInfNormController: iteration {} max|g| {:.2e}",
            self.counter.iterations, crit
        );
        Ok(self.counter.update(
            crit <= self.tol,
            self.convergence_level,
            self.iteration_limit,
            "GradInfNormController",
        ))
    }
}

impl<F: Float> IterationController<F> for GradInfNormController<F> {
    fn start(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        self.counter.reset();
        self.evaluate(energy)
    }

    fn check(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        self.counter.iterations += 1;
        self.evaluate(energy)
    }

    fn iterations(&self) -> usize {
        self.counter.iterations
    }

    fn box_clone(&self) -> Box<dyn IterationController<F>> {
        Box::new(Self::new(self.tol, self.convergence_level, self.iteration_limit))
    }
}

// ── Energy change ──

/// Parameters of the energy-change controllers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaEnergyConfig<F> {
    /// Tolerance on the energy change between iterations.
    pub tol: F,
    /// Consecutive hits required (default: 1).
    pub convergence_level: usize,
    /// Maximum number of iterations (default: none).
    pub iteration_limit: Option<usize>,
}

impl Default for DeltaEnergyConfig<f64> {
    fn default() -> Self {
        DeltaEnergyConfig {
            tol: 1e-10,
            convergence_level: 1,
            iteration_limit: None,
        }
    }
}

impl Default for DeltaEnergyConfig<f32> {
    fn default() -> Self {
        DeltaEnergyConfig {
            tol: 1e-5,
            convergence_level: 1,
            iteration_limit: None,
        }
    }
}

/// Stops when `|E_old - E| / max(|E_old|, |E|)` drops below the tolerance.
#[derive(Debug, Clone)]
pub struct DeltaEnergyController<F> {
    config: DeltaEnergyConfig<F>,
    previous: Option<F>,
    counter: Counter,
}

/// Stops when `|E_old - E|` drops below the tolerance.
#[derive(Debug, Clone)]
pub struct AbsDeltaEnergyController<F> {
    config: DeltaEnergyConfig<F>,
    previous: Option<F>,
    counter: Counter,
}

fn relative_change<F: Float>(old: F, new: F) -> F {
    let scale = old.abs().max(new.abs());
    if scale == F::zero() {
        F::zero()
    } else {
        (old - new).abs() / scale
    }
}

macro_rules! delta_energy_controller {
    ($name:ident, $label:literal, $change:expr) => {
        impl<F: Float> $name<F> {
            pub fn new(config: DeltaEnergyConfig<F>) -> Self {
                $name {
                    config,
                    previous: None,
                    counter: Counter::default(),
                }
            }

            fn evaluate(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
                let e = energy.value()?;
                let change: Option<F> = self.previous.map(|old| $change(old, e));
                self.previous = Some(e);
                debug!(
                    "{}: iteration {} energy {:.6e} change {:?}",
                    $label, self.counter.iterations, e, change
                );
                let hit = change.map_or(false, |c| c < self.config.tol);
                Ok(self.counter.update(
                    hit,
                    self.config.convergence_level,
                    self.config.iteration_limit,
                    $label,
                ))
            }
        }

        impl<F: Float> IterationController<F> for $name<F> {
            fn start(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
                self.counter.reset();
                self.previous = None;
                self.evaluate(energy)
            }

            fn check(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
                self.counter.iterations += 1;
                self.evaluate(energy)
            }

            fn iterations(&self) -> usize {
                self.counter.iterations
            }

            fn box_clone(&self) -> Box<dyn IterationController<F>> {
                Box::new(Self::new(self.config.clone()))
            }
        }
    };
}

delta_energy_controller!(
    DeltaEnergyController,
    "DeltaEnergyController",
    relative_change
);
delta_energy_controller!(
    AbsDeltaEnergyController,
    "AbsDeltaEnergyController",
    |old: F, new: F| (old - new).abs()
);

// ── Step size ──

/// Stops when the largest change of any position component between two
/// iterations drops below `tol`.
#[derive(Debug, Clone)]
pub struct StepSizeController<F: Float> {
    tol: F,
    convergence_level: usize,
    iteration_limit: Option<usize>,
    previous: Option<Field<F>>,
    counter: Counter,
}

impl<F: Float> StepSizeController<F> {
    pub fn new(tol: F, convergence_level: usize, iteration_limit: Option<usize>) -> Self {
        StepSizeController {
            tol,
            convergence_level,
            iteration_limit,
            previous: None,
            counter: Counter::default(),
        }
    }
}

impl<F: Float> IterationController<F> for StepSizeController<F> {
    fn start(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        self.counter.reset();
        self.previous = Some(energy.position().clone());
        Ok(Status::Continue)
    }

    fn check(&mut self, energy: &dyn Energy<F>) -> Result<Status> {
        self.counter.iterations += 1;
        let x = energy.position();
        let delta = match &self.previous {
            Some(old) => (x - old).max_abs(),
            None => F::infinity(),
        };
        self.previous = Some(x.clone());
        debug!(
            "StepSizeController: iteration {} delta {:.2e}",
            self.counter.iterations, delta
        );
        Ok(self.counter.update(
            delta < self.tol,
            self.convergence_level,
            self.iteration_limit,
            "StepSizeController",
        ))
    }

    fn iterations(&self) -> usize {
        self.counter.iterations
    }

    fn box_clone(&self) -> Box<dyn IterationController<F>> {
        Box::new(Self::new(self.tol, self.convergence_level, self.iteration_limit))
    }
}
