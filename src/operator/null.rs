use super::{Capability, LinearMap, Mode};
use crate::domain::Domain;
use crate::error::Result;
use crate::field::Field;
use crate::float::Float;

/// Maps everything to zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullOperator {
    domain: Domain,
    target: Domain,
}

impl NullOperator {
    pub fn new(domain: Domain, target: Domain) -> Self {
        NullOperator { domain, target }
    }

    pub(super) fn adjoint(&self) -> Self {
        NullOperator::new(self.target.clone(), self.domain.clone())
    }
}

impl<F: Float> LinearMap<F> for NullOperator {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn target(&self) -> &Domain {
        &self.target
    }

    fn capability(&self) -> Capability {
        Capability::TIMES | Capability::ADJOINT_TIMES
    }

    fn apply(&self, _x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        let out = if mode.is_backward() {
            &self.domain
        } else {
            &self.target
        };
        Ok(Field::zeros(out.clone()))
    }
}
