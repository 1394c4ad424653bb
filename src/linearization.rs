//! Values bundled with their Jacobian.
//!
//! A [`Linearization`] is what a nonlinear model produces when it is fed a
//! variable position: the output value, the derivative as a linear
//! [`Operator`] and, for scalar energies, an optional metric. Every
//! combinator composes Jacobians through the operator algebra, so the
//! gradient of a composite model is exact without hand-written derivatives.

use crate::domain::Domain;
use crate::dual::Dual;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;
use crate::operator::{
    ChainOperator, ContractionOperator, DiagonalOperator, Operator, SumOperator, VdotOperator,
};

#[derive(Clone, Debug)]
pub struct Linearization<F: Float> {
    value: Field<F>,
    jacobian: Operator<F>,
    metric: Option<Operator<F>>,
    want_metric: bool,
}

impl<F: Float> Linearization<F> {
    /// `jacobian` must map onto `value`'s domain.
    pub fn new(
        value: Field<F>,
        jacobian: Operator<F>,
        metric: Option<Operator<F>>,
        want_metric: bool,
    ) -> Result<Self> {
        if jacobian.target() != value.domain() {
            return Err(OperatorError::mismatch(value.domain(), jacobian.target()));
        }
        Ok(Linearization {
            value,
            jacobian,
            metric: metric.filter(|_| want_metric),
            want_metric,
        })
    }

    fn with(&self, value: Field<F>, jacobian: Operator<F>) -> Self {
        Linearization {
            value,
            jacobian,
            metric: None,
            want_metric: self.want_metric,
        }
    }

    /// The identity linearization at `position`.
    pub fn variable(position: Field<F>, want_metric: bool) -> Self {
        let jacobian = Operator::identity(position.domain().clone());
        Linearization {
            value: position,
            jacobian,
            metric: None,
            want_metric,
        }
    }

    /// A value independent of the inputs on `domain`.
    pub fn constant(value: Field<F>, domain: Domain) -> Self {
        let jacobian = Operator::null(domain, value.domain().clone());
        Linearization {
            value,
            jacobian,
            metric: None,
            want_metric: false,
        }
    }

    pub fn value(&self) -> &Field<F> {
        &self.value
    }

    pub fn into_value(self) -> Field<F> {
        self.value
    }

    pub fn jacobian(&self) -> &Operator<F> {
        &self.jacobian
    }

    pub fn metric(&self) -> Option<&Operator<F>> {
        self.metric.as_ref()
    }

    pub fn want_metric(&self) -> bool {
        self.want_metric
    }

    /// Domain of the underlying variable.
    pub fn domain(&self) -> &Domain {
        self.jacobian.domain()
    }

    pub fn target(&self) -> &Domain {
        self.value.domain()
    }

    /// Attach a metric (kept only if one was asked for).
    pub fn add_metric(mut self, metric: Operator<F>) -> Self {
        if self.want_metric {
            self.metric = Some(metric);
        }
        self
    }

    /// Gradient of a scalar-valued linearization: `J^† 1`.
    pub fn gradient(&self) -> Result<Field<F>> {
        if self.value.len() != 1 {
            return Err(OperatorError::Unavailable(format!(
                "gradient of a linearization with target {}",
                self.target()
            )));
        }
        self.jacobian
            .adjoint_times(&Field::full(self.target().clone(), F::one()))
    }

    /// `op(self)` for a linear `op`.
    pub fn apply_linear(&self, op: &Operator<F>) -> Result<Self> {
        let value = op.times(&self.value)?;
        let jac = ChainOperator::make(vec![op.clone(), self.jacobian.clone()])?;
        Ok(self.with(value, jac))
    }

    fn check_domain(&self, other: &Self) -> Result<()> {
        if self.domain() != other.domain() {
            return Err(OperatorError::mismatch(self.domain(), other.domain()));
        }
        Ok(())
    }

    /// Both sides must share input domain and target.
    fn check_compatible(&self, other: &Self) -> Result<()> {
        self.check_domain(other)?;
        if self.target() != other.target() {
            return Err(OperatorError::mismatch(self.target(), other.target()));
        }
        Ok(())
    }

    fn combine(&self, other: &Self, negate_other: bool) -> Result<Self> {
        self.check_compatible(other)?;
        let value = if negate_other {
            &self.value - &other.value
        } else {
            &self.value + &other.value
        };
        let jac = SumOperator::make(
            vec![self.jacobian.clone(), other.jacobian.clone()],
            vec![false, negate_other],
        )?;
        let mut out = self.with(value, jac);
        out.want_metric = self.want_metric && other.want_metric;
        if out.want_metric {
            if let (Some(a), Some(b)) = (&self.metric, &other.metric) {
                out.metric = Some(SumOperator::make(
                    vec![a.clone(), b.clone()],
                    vec![false, negate_other],
                )?);
            }
        }
        Ok(out)
    }

    /// `self + other`; metrics add when both sides carry one.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.combine(other, false)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.combine(other, true)
    }

    pub fn neg(&self) -> Result<Self> {
        self.scale(-F::one())
    }

    /// `factor * self`, metric included.
    pub fn scale(&self, factor: F) -> Result<Self> {
        let jac = self.jacobian.scale(factor)?;
        let mut out = self.with(&self.value * factor, jac);
        if let Some(m) = &self.metric {
            out.metric = Some(m.scale(factor)?);
        }
        Ok(out)
    }

    /// `self + c` for a constant field `c`.
    pub fn add_constant(&self, c: &Field<F>) -> Result<Self> {
        if c.domain() != self.target() {
            return Err(OperatorError::mismatch(self.target(), c.domain()));
        }
        let mut out = self.with(&self.value + c, self.jacobian.clone());
        out.metric = self.metric.clone();
        Ok(out)
    }

    /// Pointwise product by a constant field.
    pub fn mul_field(&self, f: &Field<F>) -> Result<Self> {
        self.apply_linear(&Operator::diagonal(f.clone()))
    }

    /// Pointwise product with the product rule.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let value = &self.value * &other.value;
        let left = ChainOperator::make(vec![
            Operator::diagonal(other.value.clone()),
            self.jacobian.clone(),
        ])?;
        let right = ChainOperator::make(vec![
            Operator::diagonal(self.value.clone()),
            other.jacobian.clone(),
        ])?;
        let jac = SumOperator::make(vec![left, right], vec![false, false])?;
        Ok(self.with(value, jac))
    }

    /// `<self, other>` as a scalar linearization.
    pub fn vdot(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let value = Field::scalar(self.value.vdot(&other.value));
        let left = ChainOperator::make(vec![
            Operator::from(VdotOperator::new(other.value.clone())),
            self.jacobian.clone(),
        ])?;
        let right = ChainOperator::make(vec![
            Operator::from(VdotOperator::new(self.value.clone())),
            other.jacobian.clone(),
        ])?;
        let jac = SumOperator::make(vec![left, right], vec![false, false])?;
        Ok(self.with(value, jac))
    }

    /// `<f, self>` for a constant field `f`.
    pub fn vdot_field(&self, f: &Field<F>) -> Result<Self> {
        self.apply_linear(&Operator::from(VdotOperator::new(f.clone())))
    }

    /// Sum of all entries.
    pub fn sum(&self) -> Result<Self> {
        self.apply_linear(&Operator::from(ContractionOperator::new(
            self.target().clone(),
        )))
    }

    /// Apply a pointwise function written over dual numbers.
    pub fn pointwise(&self, f: impl Fn(Dual<F>) -> Dual<F>) -> Result<Self> {
        let (vals, derivs): (Vec<F>, Vec<F>) = self
            .value
            .values()
            .iter()
            .map(|&x| {
                let d = f(Dual::variable(x));
                (d.re, d.eps)
            })
            .unzip();
        let value = Field::new(self.target().clone(), vals)?;
        let deriv = Field::new(self.target().clone(), derivs)?;
        let jac = ChainOperator::make(vec![
            Operator::Diagonal(DiagonalOperator::new(deriv)),
            self.jacobian.clone(),
        ])?;
        Ok(self.with(value, jac))
    }

    pub fn exp(&self) -> Result<Self> {
        self.pointwise(Dual::exp)
    }

    pub fn ln(&self) -> Result<Self> {
        self.pointwise(Dual::ln)
    }

    pub fn sqrt(&self) -> Result<Self> {
        self.pointwise(Dual::sqrt)
    }

    pub fn tanh(&self) -> Result<Self> {
        self.pointwise(Dual::tanh)
    }

    pub fn sigmoid(&self) -> Result<Self> {
        self.pointwise(Dual::sigmoid)
    }

    pub fn softplus(&self) -> Result<Self> {
        self.pointwise(Dual::softplus)
    }

    pub fn sin(&self) -> Result<Self> {
        self.pointwise(Dual::sin)
    }

    pub fn cos(&self) -> Result<Self> {
        self.pointwise(Dual::cos)
    }

    pub fn powi(&self, n: i32) -> Result<Self> {
        self.pointwise(|d| d.powi(n))
    }
}
