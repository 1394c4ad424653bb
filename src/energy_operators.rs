//! Scalar-valued models that serve as negative log-probabilities.

use std::sync::Arc;

use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;
use crate::linearization::Linearization;
use crate::model::Model;
use crate::operator::{Operator, SandwichOperator, VdotOperator};

/// `0.5 (x - m)^† N^{-1} (x - m)` with metric `J^† N^{-1} J`.
///
/// Without an inverse covariance `N` is the identity; without a mean `m`
/// is zero.
#[derive(Clone, Debug)]
pub struct GaussianEnergy<F: Float> {
    domain: Domain,
    target: Domain,
    mean: Option<Field<F>>,
    inverse_covariance: Option<Operator<F>>,
}

impl<F: Float> GaussianEnergy<F> {
    pub fn new(
        domain: Domain,
        mean: Option<Field<F>>,
        inverse_covariance: Option<Operator<F>>,
    ) -> Result<Self> {
        if let Some(m) = &mean {
            if m.domain() != &domain {
                return Err(OperatorError::mismatch(&domain, m.domain()));
            }
        }
        if let Some(ic) = &inverse_covariance {
            if ic.domain() != &domain || ic.target() != &domain {
                return Err(OperatorError::Construction(format!(
                    "inverse covariance {} -> {} is not an endomorphism of {domain}",
                    ic.domain(),
                    ic.target()
                )));
            }
        }
        Ok(GaussianEnergy {
            domain,
            target: Domain::scalar(),
            mean,
            inverse_covariance,
        })
    }

    /// Unit-covariance, zero-mean energy `0.5 |x|²`.
    pub fn standard(domain: Domain) -> Self {
        GaussianEnergy {
            domain,
            target: Domain::scalar(),
            mean: None,
            inverse_covariance: None,
        }
    }

    pub fn inverse_covariance(&self) -> Option<&Operator<F>> {
        self.inverse_covariance.as_ref()
    }
}

impl<F: Float> Model<F> for GaussianEnergy<F> {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn target(&self) -> &Domain {
        &self.target
    }

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>> {
        if lin.target() != &self.domain {
            return Err(OperatorError::mismatch(&self.domain, lin.target()));
        }
        let residual = match &self.mean {
            Some(m) => lin.add_constant(&-m)?,
            None => lin.clone(),
        };
        let r = residual.value();
        let t = match &self.inverse_covariance {
            Some(ic) => ic.times(r)?,
            None => r.clone(),
        };
        let value = Field::scalar(F::lit(0.5) * r.vdot(&t));
        let grad_op = Operator::from(VdotOperator::new(t));
        let energy = Linearization::new(
            value,
            grad_op.compose(residual.jacobian())?,
            None,
            lin.want_metric(),
        )?;
        if !lin.want_metric() {
            return Ok(energy);
        }
        let metric =
            SandwichOperator::make(residual.jacobian().clone(), self.inverse_covariance.clone())?;
        Ok(energy.add_metric(metric))
    }
}

/// `likelihood(x) + 0.5 |x|²`: a likelihood in standardized coordinates
/// plus the white prior.
#[derive(Clone, Debug)]
pub struct StandardHamiltonian<F: Float> {
    likelihood: Arc<dyn Model<F>>,
    prior: GaussianEnergy<F>,
}

impl<F: Float> StandardHamiltonian<F> {
    /// `likelihood` must be scalar-valued.
    pub fn new(likelihood: Arc<dyn Model<F>>) -> Result<Self> {
        if !likelihood.target().is_scalar() {
            return Err(OperatorError::Construction(format!(
                "likelihood target {} is not scalar",
                likelihood.target()
            )));
        }
        let prior = GaussianEnergy::standard(likelihood.domain().clone());
        Ok(StandardHamiltonian { likelihood, prior })
    }

    pub fn likelihood(&self) -> &Arc<dyn Model<F>> {
        &self.likelihood
    }
}

impl<F: Float> Model<F> for StandardHamiltonian<F> {
    fn domain(&self) -> &Domain {
        self.likelihood.domain()
    }

    fn target(&self) -> &Domain {
        self.likelihood.target()
    }

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>> {
        let lh = self.likelihood.apply_lin(lin)?;
        let prior = self.prior.apply_lin(lin)?;
        lh.add(&prior)
    }
}
