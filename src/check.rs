//! Numerical consistency checks for operators and models.
//!
//! Both checks draw random test fields and return
//! [`OperatorError::Inconsistent`] describing the first violated relation.

use log::debug;
use rand::RngCore;

use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;
use crate::linearization::Linearization;
use crate::model::Model;
use crate::operator::{Mode, Operator};

fn close<F: Float>(a: F, b: F, atol: F, rtol: F) -> bool {
    (a - b).abs() <= atol + rtol * a.abs().max(b.abs())
}

fn fields_close<F: Float>(a: &Field<F>, b: &Field<F>, atol: F, rtol: F) -> bool {
    (a - b).norm() <= atol + rtol * a.norm().max(b.norm())
}

/// Verify the adjoint and inverse relations an operator claims:
///
/// * `<A x, y> = <x, A^† y>` if both forward modes are available,
/// * `A^{-1} A x = x` and `<A^{-1} y, x> = <y, A^{-†} x>` for the inverse modes,
/// * `A^{-†} A^† y = y` for the adjoint inverse.
pub fn check_linear_operator<F: Float>(
    op: &Operator<F>,
    rng: &mut dyn RngCore,
    atol: F,
    rtol: F,
) -> Result<()> {
    let cap = op.capability();
    let x = Field::from_random(op.domain().clone(), rng);
    let y = Field::from_random(op.target().clone(), rng);

    if cap.contains(Mode::Times) && cap.contains(Mode::AdjointTimes) {
        let lhs = op.times(&x)?.vdot(&y);
        let rhs = x.vdot(&op.adjoint_times(&y)?);
        debug!("adjoint check: {lhs} vs {rhs}");
        if !close(lhs, rhs, atol, rtol) {
            return Err(OperatorError::Inconsistent(format!(
                "<Ax, y> = {lhs} but <x, A^† y> = {rhs}"
            )));
        }
    }
    if cap.contains(Mode::InverseTimes) && cap.contains(Mode::AdjointInverseTimes) {
        let lhs = op.inverse_times(&y)?.vdot(&x);
        let rhs = y.vdot(&op.adjoint_inverse_times(&x)?);
        if !close(lhs, rhs, atol, rtol) {
            return Err(OperatorError::Inconsistent(format!(
                "<A^-1 y, x> = {lhs} but <y, A^-† x> = {rhs}"
            )));
        }
    }
    if cap.contains(Mode::Times) && cap.contains(Mode::InverseTimes) {
        let back = op.inverse_times(&op.times(&x)?)?;
        if !fields_close(&back, &x, atol, rtol) {
            return Err(OperatorError::Inconsistent(
                "A^-1 A x differs from x".into(),
            ));
        }
    }
    if cap.contains(Mode::AdjointTimes) && cap.contains(Mode::AdjointInverseTimes) {
        let back = op.adjoint_inverse_times(&op.adjoint_times(&y)?)?;
        if !fields_close(&back, &y, atol, rtol) {
            return Err(OperatorError::Inconsistent(
                "A^-† A^† y differs from y".into(),
            ));
        }
    }
    Ok(())
}

/// Compare the Jacobian of `model` at `position` with central finite
/// differences along a random direction. The step is halved up to `ntries`
/// times before giving up.
pub fn check_value_gradient_consistency<F: Float>(
    model: &dyn Model<F>,
    position: &Field<F>,
    rng: &mut dyn RngCore,
    tol: F,
    ntries: usize,
) -> Result<()> {
    let lin = model.apply_lin(&Linearization::variable(position.clone(), false))?;
    let dir = Field::from_random(position.domain().clone(), rng);
    let analytic = lin.jacobian().times(&dir)?;
    let two = F::lit(2.0);
    let mut step = F::lit(1e-2);
    let mut err = F::infinity();
    for _ in 0..ntries.max(1) {
        let up = model.apply(&position.add_scaled(step, &dir))?;
        let down = model.apply(&position.add_scaled(-step, &dir))?;
        let numeric = (&up - &down) / (two * step);
        err = (&numeric - &analytic).norm();
        let scale = analytic.norm().max(numeric.norm()).max(F::one());
        debug!("finite-difference check: step {step}, error {err}");
        if err <= tol * scale {
            return Ok(());
        }
        step = step / two;
    }
    Err(OperatorError::Inconsistent(format!(
        "Jacobian differs from finite differences by {err}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::model::{Pointwise, PointwiseFn};
    use crate::operator::{LinearMap, Capability};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Debug)]
    struct BrokenAdjoint(Domain);

    impl LinearMap<f64> for BrokenAdjoint {
        fn domain(&self) -> &Domain {
            &self.0
        }
        fn target(&self) -> &Domain {
            &self.0
        }
        fn capability(&self) -> Capability {
            Capability::TIMES | Capability::ADJOINT_TIMES
        }
        fn apply(&self, x: &Field<f64>, mode: Mode) -> Result<Field<f64>> {
            Ok(match mode {
                Mode::Times => x * 2.0,
                _ => x * 3.0,
            })
        }
    }

    #[test]
    fn detects_wrong_adjoint() {
        let mut rng = StdRng::seed_from_u64(0);
        let op = Operator::atomic(BrokenAdjoint(Domain::unstructured(4)));
        assert!(matches!(
            check_linear_operator(&op, &mut rng, 1e-12, 1e-10),
            Err(OperatorError::Inconsistent(_))
        ));
    }

    #[test]
    fn diagonal_passes() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = Field::new(Domain::unstructured(3), vec![1.0f64, 2.0, 4.0]).unwrap();
        check_linear_operator(&Operator::diagonal(d), &mut rng, 1e-12, 1e-10).unwrap();
    }

    #[test]
    fn pointwise_gradient_consistent() {
        let mut rng = StdRng::seed_from_u64(2);
        let d = Domain::unstructured(5);
        let m = Pointwise::new(d.clone(), PointwiseFn::Tanh);
        let x = Field::from_random(d, &mut rng);
        check_value_gradient_consistency(&m, &x, &mut rng, 1e-6, 8).unwrap();
    }
}
