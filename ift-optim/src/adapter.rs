use std::sync::Arc;

use ift::{Field, Float, Linearization, Model, Operator, OperatorError, Result};

use crate::energy::{Energy, Memo};

/// [`Energy`] view of a scalar-valued [`Model`].
///
/// The model is linearized once per position; the gradient is the adjoint
/// Jacobian applied to one and the metric is the one the model attaches when
/// asked for it.
#[derive(Debug)]
pub struct EnergyAdapter<F: Float> {
    position: Field<F>,
    model: Arc<dyn Model<F>>,
    want_metric: bool,
    nan_is_inf: bool,
    lin: Memo<Linearization<F>>,
}

impl<F: Float> EnergyAdapter<F> {
    pub fn new(position: Field<F>, model: Arc<dyn Model<F>>, want_metric: bool) -> Result<Self> {
        if !model.target().is_scalar() {
            return Err(OperatorError::Construction(format!(
                "an energy needs a scalar model, not one with target {}",
                model.target()
            )));
        }
        if position.domain() != model.domain() {
            return Err(OperatorError::mismatch(model.domain(), position.domain()));
        }
        Ok(EnergyAdapter {
            position,
            model,
            want_metric,
            nan_is_inf: false,
            lin: Memo::new(),
        })
    }

    /// Report NaN values as `+inf`, so that a line search backs off from
    /// positions where the model overflows instead of failing.
    pub fn nan_is_inf(mut self, yes: bool) -> Self {
        self.nan_is_inf = yes;
        self
    }

    pub fn model(&self) -> &Arc<dyn Model<F>> {
        &self.model
    }

    fn linearization(&self) -> Result<&Linearization<F>> {
        self.lin
            .get_or_try_init(|| self.model.linearize(&self.position, self.want_metric))
    }
}

impl<F: Float> Energy<F> for EnergyAdapter<F> {
    fn position(&self) -> &Field<F> {
        &self.position
    }

    fn at(&self, position: Field<F>) -> Result<Box<dyn Energy<F>>> {
        let e = EnergyAdapter::new(position, self.model.clone(), self.want_metric)?
            .nan_is_inf(self.nan_is_inf);
        Ok(Box::new(e))
    }

    fn value(&self) -> Result<F> {
        let v = self.linearization()?.value().scalar_value()?;
        Ok(if self.nan_is_inf && v.is_nan() {
            F::infinity()
        } else {
            v
        })
    }

    fn gradient(&self) -> Result<Field<F>> {
        self.linearization()?.gradient()
    }

    fn metric(&self) -> Result<Operator<F>> {
        self.linearization()?
            .metric()
            .cloned()
            .ok_or_else(|| OperatorError::Unavailable("adapter built without metric".into()))
    }
}
