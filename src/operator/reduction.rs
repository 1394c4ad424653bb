use super::{Capability, LinearMap, Mode};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// `x -> <f, x>`, mapping onto the scalar domain.
#[derive(Clone, Debug, PartialEq)]
pub struct VdotOperator<F: Float> {
    field: Field<F>,
    target: Domain,
}

impl<F: Float> VdotOperator<F> {
    pub fn new(field: Field<F>) -> Self {
        VdotOperator {
            field,
            target: Domain::scalar(),
        }
    }
}

impl<F: Float> LinearMap<F> for VdotOperator<F> {
    fn domain(&self) -> &Domain {
        self.field.domain()
    }

    fn target(&self) -> &Domain {
        &self.target
    }

    fn capability(&self) -> Capability {
        Capability::TIMES | Capability::ADJOINT_TIMES
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        match mode {
            Mode::Times => Ok(Field::scalar(self.field.vdot(x))),
            Mode::AdjointTimes => Ok(&self.field * x.scalar_value()?),
            _ => Err(OperatorError::CapabilityUnsupported {
                mode,
                capability: LinearMap::<F>::capability(self),
            }),
        }
    }
}

/// Sum over all entries of the domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractionOperator {
    domain: Domain,
    target: Domain,
}

impl ContractionOperator {
    pub fn new(domain: Domain) -> Self {
        ContractionOperator {
            domain,
            target: Domain::scalar(),
        }
    }
}

impl<F: Float> LinearMap<F> for ContractionOperator {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn target(&self) -> &Domain {
        &self.target
    }

    fn capability(&self) -> Capability {
        Capability::TIMES | Capability::ADJOINT_TIMES
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        match mode {
            Mode::Times => Ok(Field::scalar(x.sum())),
            Mode::AdjointTimes => Ok(Field::full(self.domain.clone(), x.scalar_value()?)),
            _ => Err(OperatorError::CapabilityUnsupported {
                mode,
                capability: Capability::TIMES | Capability::ADJOINT_TIMES,
            }),
        }
    }
}
