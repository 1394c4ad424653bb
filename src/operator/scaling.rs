use rand::RngCore;

use super::{Capability, LinearMap, Mode, Operator};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// Multiplication by a real constant.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalingOperator<F: Float> {
    factor: F,
    domain: Domain,
}

impl<F: Float> ScalingOperator<F> {
    pub fn new(factor: F, domain: Domain) -> Self {
        ScalingOperator { factor, domain }
    }

    pub fn factor(&self) -> F {
        self.factor
    }

    pub(super) fn flip(&self, transform: Mode) -> Option<Operator<F>> {
        match transform {
            Mode::Times | Mode::AdjointTimes => Some(Operator::Scaling(self.clone())),
            _ if self.factor != F::zero() => Some(Operator::scaling(
                self.factor.recip(),
                self.domain.clone(),
            )),
            _ => None,
        }
    }
}

impl<F: Float> LinearMap<F> for ScalingOperator<F> {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn target(&self) -> &Domain {
        &self.domain
    }

    fn capability(&self) -> Capability {
        if self.factor == F::zero() {
            Capability::TIMES | Capability::ADJOINT_TIMES
        } else {
            Capability::ALL
        }
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        if self.factor == F::one() {
            return Ok(x.clone());
        }
        Ok(match mode {
            Mode::Times | Mode::AdjointTimes => x * self.factor,
            Mode::InverseTimes | Mode::AdjointInverseTimes => x / self.factor,
        })
    }

    fn is_self_adjoint(&self) -> bool {
        true
    }

    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        if !(self.factor > F::zero()) {
            return Err(OperatorError::Sampling(format!(
                "scaling factor {} is not positive",
                self.factor
            )));
        }
        let std = if from_inverse {
            self.factor.sqrt().recip()
        } else {
            self.factor.sqrt()
        };
        Ok(Field::from_random(self.domain.clone(), rng) * std)
    }
}
