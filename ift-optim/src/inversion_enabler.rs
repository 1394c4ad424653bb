use log::warn;
use rand::RngCore;

use ift::{Capability, Domain, Field, Float, LinearMap, Mode, Operator, OperatorError, Result};

use crate::conjugate_gradient::ConjugateGradient;
use crate::energy::Energy;
use crate::iteration_controller::IterationController;
use crate::quadratic::QuadraticEnergy;
use crate::result::Status;

/// Supplies the modes an operator lacks by solving with conjugate gradient.
///
/// For a missing mode `m` the wrapper solves `op.flip(m⁻¹) y = x` starting
/// from zero. The operator is assumed to be positive definite in the mode
/// being inverted. Non-convergence is logged and the last iterate returned.
#[derive(Debug)]
pub struct InversionEnabler<F: Float> {
    op: Operator<F>,
    controller: Box<dyn IterationController<F>>,
    approximation: Option<Operator<F>>,
}

impl<F: Float> InversionEnabler<F> {
    /// `approximation`, if given, should approximate `op` and support the
    /// inverse modes cheaply; it preconditions the solves.
    pub fn new(
        op: Operator<F>,
        controller: Box<dyn IterationController<F>>,
        approximation: Option<Operator<F>>,
    ) -> Result<Self> {
        if let Some(approx) = &approximation {
            if approx.domain() != op.domain() {
                return Err(OperatorError::mismatch(op.domain(), approx.domain()));
            }
            if approx.target() != op.target() {
                return Err(OperatorError::mismatch(op.target(), approx.target()));
            }
        }
        Ok(InversionEnabler {
            op,
            controller,
            approximation,
        })
    }

    /// Wrap `op` and return it as an [`Operator`].
    pub fn make(
        op: Operator<F>,
        controller: Box<dyn IterationController<F>>,
        approximation: Option<Operator<F>>,
    ) -> Result<Operator<F>> {
        Ok(Operator::atomic(Self::new(op, controller, approximation)?))
    }

    pub fn operator(&self) -> &Operator<F> {
        &self.op
    }

    /// Solve for `mode` numerically, returning the iterate and CG status.
    pub fn solve(&self, x: &Field<F>, mode: Mode) -> Result<(Field<F>, Status)> {
        let invop = self.op.flip(mode.inverse());
        let preconditioner = self
            .approximation
            .as_ref()
            .map(|a| a.flip(mode))
            .filter(|p| p.capability().contains(Mode::Times));
        let start = Field::zeros(invop.domain().clone());
        let energy = QuadraticEnergy::new(start, invop, Some(x.clone()))?;
        let mut cg = ConjugateGradient::new(self.controller.box_clone());
        let (energy, status) = cg.solve(energy, preconditioner.as_ref())?;
        Ok((energy.position().clone(), status))
    }
}

impl<F: Float> LinearMap<F> for InversionEnabler<F> {
    fn domain(&self) -> &Domain {
        self.op.domain()
    }

    fn target(&self) -> &Domain {
        self.op.target()
    }

    fn capability(&self) -> Capability {
        self.op.capability().with_inverse()
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        if self.op.capability().contains(mode) {
            return self.op.apply(x, mode);
        }
        let (y, status) = self.solve(x, mode)?;
        if status != Status::Converged {
            warn!("InversionEnabler: {mode} did not converge ({status})");
        }
        Ok(y)
    }

    fn is_unitary(&self) -> bool {
        self.op.is_unitary()
    }

    fn is_self_adjoint(&self) -> bool {
        self.op.is_self_adjoint()
    }

    /// With `from_inverse`, a sample `s` of the wrapped operator is mapped
    /// through the numerical inverse, giving covariance `A^{-1} A A^{-1}`.
    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        let s = self.op.draw_sample(rng, false)?;
        if !from_inverse {
            return Ok(s);
        }
        self.apply(&s, Mode::InverseTimes)
    }
}
