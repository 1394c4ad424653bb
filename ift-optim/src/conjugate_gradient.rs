use log::error;

use ift::{Field, Float, Operator, Result};

use crate::energy::Energy;
use crate::iteration_controller::IterationController;
use crate::quadratic::QuadraticEnergy;
use crate::result::{MinimizationResult, Status};
use crate::solvers::Minimizer;

/// Preconditioned linear conjugate gradient for `A x = b`, posed as
/// minimizing a [`QuadraticEnergy`].
///
/// The residual is updated incrementally and recomputed from scratch every
/// `nreset` iterations to limit drift (see Nocedal & Wright, *Numerical
/// Optimization*, ch. 5).
#[derive(Debug, Clone)]
pub struct ConjugateGradient<F: Float> {
    controller: Box<dyn IterationController<F>>,
    nreset: usize,
}

impl<F: Float> ConjugateGradient<F> {
    pub fn new(controller: Box<dyn IterationController<F>>) -> Self {
        ConjugateGradient {
            controller,
            nreset: 20,
        }
    }

    /// Recompute the residual exactly every `nreset` iterations (default 20).
    pub fn with_nreset(mut self, nreset: usize) -> Self {
        self.nreset = nreset.max(1);
        self
    }

    pub fn nreset(&self) -> usize {
        self.nreset
    }

    pub fn controller(&self) -> &dyn IterationController<F> {
        self.controller.as_ref()
    }

    /// Run CG from `energy`'s position. `preconditioner` should approximate
    /// `A^{-1}` and be positive definite.
    ///
    /// Breakdowns are reported as [`Status::Error`] together with the last
    /// iterate; `Err` is reserved for structural failures (domain mismatch,
    /// missing capability).
    pub fn solve(
        &mut self,
        energy: QuadraticEnergy<F>,
        preconditioner: Option<&Operator<F>>,
    ) -> Result<(QuadraticEnergy<F>, Status)> {
        let mut energy = energy;
        let controller = &mut self.controller;
        let status = controller.start(&energy)?;
        if status != Status::Continue {
            return Ok((energy, status));
        }

        let precondition = |r: &Field<F>| -> Result<Field<F>> {
            match preconditioner {
                Some(p) => p.times(r),
                None => Ok(r.clone()),
            }
        };

        let mut r = energy.gradient()?;
        let mut d = precondition(&r)?;
        let mut previous_gamma = r.vdot(&d);
        if previous_gamma == F::zero() {
            return Ok((energy, Status::Converged));
        }

        let mut since_reset = 0;
        loop {
            let q = energy.apply_metric(&d)?;
            let ddotq = d.vdot(&q);
            if ddotq == F::zero() {
                error!("ConjugateGradient: ddotq == 0");
                return Ok((energy, Status::Error));
            }
            let alpha = previous_gamma / ddotq;
            if alpha < F::zero() {
                error!("ConjugateGradient: alpha < 0");
                return Ok((energy, Status::Error));
            }

            let x = energy.position().add_scaled(-alpha, &d);
            since_reset += 1;
            if since_reset < self.nreset {
                r = r.add_scaled(-alpha, &q);
                energy = energy.at_with_grad(x, r.clone())?;
            } else {
                energy = energy.with_position(x)?;
                r = energy.gradient()?;
                since_reset = 0;
            }

            let s = precondition(&r)?;
            let gamma = r.vdot(&s);
            if gamma < F::zero() {
                error!("ConjugateGradient: preconditioner is not positive definite");
                return Ok((energy, Status::Error));
            }
            if gamma == F::zero() {
                return Ok((energy, Status::Converged));
            }

            let status = controller.check(&energy)?;
            if status != Status::Continue {
                return Ok((energy, status));
            }

            let beta = (gamma / previous_gamma).max(F::zero());
            d = s.add_scaled(beta, &d);
            previous_gamma = gamma;
        }
    }
}

/// CG on the local quadratic model of a general energy: `A` is its metric
/// and `b = A x_0 - g(x_0)`, so the result is one Newton step from `x_0`.
impl<F: Float> Minimizer<F> for ConjugateGradient<F> {
    fn minimize(&mut self, energy: Box<dyn Energy<F>>) -> Result<MinimizationResult<F>> {
        let metric = energy.metric()?;
        let x0 = energy.position().clone();
        let b = metric.times(&x0)? - energy.gradient()?;
        let quadratic = QuadraticEnergy::new(x0, metric, Some(b))?;
        let (result, status) = self.solve(quadratic, None)?;
        let iterations = self.controller.iterations();
        Ok(MinimizationResult::new(Box::new(result), status, iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iteration_controller::{GradientNormConfig, GradientNormController};
    use approx::assert_abs_diff_eq;
    use ift::Domain;

    fn controller(tol: f64, limit: usize) -> Box<dyn IterationController<f64>> {
        Box::new(GradientNormController::new(GradientNormConfig {
            tol_abs: Some(tol),
            iteration_limit: Some(limit),
            ..Default::default()
        }))
    }

    fn diag_problem(diag: &[f64], b: &[f64]) -> QuadraticEnergy<f64> {
        let d = Domain::unstructured(diag.len());
        let a = Operator::diagonal(Field::new(d.clone(), diag.to_vec()).unwrap());
        let b = Field::new(d.clone(), b.to_vec()).unwrap();
        QuadraticEnergy::new(Field::zeros(d), a, Some(b)).unwrap()
    }

    #[test]
    fn diagonal_system_within_n_iterations() {
        let mut cg = ConjugateGradient::new(controller(1e-12, 4));
        let (e, status) = cg
            .solve(diag_problem(&[1.0, 2.0, 4.0, 8.0], &[1.0; 4]), None)
            .unwrap();
        assert_eq!(status, Status::Converged);
        assert!(cg.controller().iterations() <= 4);
        for (x, want) in e.position().values().iter().zip([1.0, 0.5, 0.25, 0.125]) {
            assert_abs_diff_eq!(*x, want, epsilon = 1e-10);
        }
    }

    #[test]
    fn exact_preconditioner_converges_in_one_step() {
        let d = Domain::unstructured(3);
        let inv = Operator::diagonal(Field::new(d, vec![1.0, 0.5, 0.25]).unwrap());
        let mut cg = ConjugateGradient::new(controller(1e-12, 10));
        let (e, status) = cg
            .solve(diag_problem(&[1.0, 2.0, 4.0], &[2.0, 2.0, 2.0]), Some(&inv))
            .unwrap();
        assert_eq!(status, Status::Converged);
        assert_abs_diff_eq!(e.position().values()[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn indefinite_operator_is_an_error_status() {
        let mut cg = ConjugateGradient::new(controller(1e-12, 50));
        let (_, status) = cg
            .solve(diag_problem(&[1.0, -1.0], &[1.0, 1.0]), None)
            .unwrap();
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn zero_rhs_is_immediately_solved() {
        let mut cg = ConjugateGradient::new(controller(0.0, 10));
        let (e, status) = cg.solve(diag_problem(&[1.0, 3.0], &[0.0, 0.0]), None).unwrap();
        assert_eq!(status, Status::Converged);
        assert_eq!(e.position().values(), &[0.0, 0.0]);
    }

    #[test]
    fn frequent_resets_give_the_same_answer() {
        let mut cg = ConjugateGradient::new(controller(1e-12, 20)).with_nreset(1);
        let (e, _) = cg
            .solve(diag_problem(&[1.0, 2.0, 4.0, 8.0], &[1.0; 4]), None)
            .unwrap();
        assert_abs_diff_eq!(e.position().values()[3], 0.125, epsilon = 1e-10);
    }
}
