//! Nonlinear models: maps between domains that can be linearized.

use std::fmt;
use std::sync::Arc;

use crate::domain::Domain;
use crate::dual::Dual;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;
use crate::linearization::Linearization;
use crate::operator::Operator;

/// A (generally nonlinear) map from `domain` to `target`.
///
/// `apply_lin` receives a linearization whose value lives on `domain` and
/// returns one whose value lives on `target`, with the Jacobians chained.
pub trait Model<F: Float>: fmt::Debug + Send + Sync {
    fn domain(&self) -> &Domain;

    fn target(&self) -> &Domain;

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>>;

    /// Plain evaluation.
    fn apply(&self, x: &Field<F>) -> Result<Field<F>> {
        Ok(self
            .apply_lin(&Linearization::variable(x.clone(), false))?
            .into_value())
    }

    /// Linearize around `position`.
    fn linearize(&self, position: &Field<F>, want_metric: bool) -> Result<Linearization<F>> {
        if position.domain() != self.domain() {
            return Err(OperatorError::mismatch(self.domain(), position.domain()));
        }
        self.apply_lin(&Linearization::variable(position.clone(), want_metric))
    }
}

fn check_input<F: Float>(expected: &Domain, lin: &Linearization<F>) -> Result<()> {
    if lin.target() != expected {
        return Err(OperatorError::mismatch(expected, lin.target()));
    }
    Ok(())
}

/// A linear operator seen as a model.
#[derive(Clone, Debug)]
pub struct LinearModel<F: Float> {
    op: Operator<F>,
}

impl<F: Float> LinearModel<F> {
    pub fn new(op: Operator<F>) -> Self {
        LinearModel { op }
    }

    pub fn operator(&self) -> &Operator<F> {
        &self.op
    }
}

impl<F: Float> Model<F> for LinearModel<F> {
    fn domain(&self) -> &Domain {
        self.op.domain()
    }

    fn target(&self) -> &Domain {
        self.op.target()
    }

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>> {
        check_input(self.domain(), lin)?;
        lin.apply_linear(&self.op)
    }

    fn apply(&self, x: &Field<F>) -> Result<Field<F>> {
        self.op.times(x)
    }
}

/// Elementwise nonlinearities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PointwiseFn {
    Exp,
    Ln,
    Sqrt,
    Tanh,
    Sigmoid,
    Softplus,
    Sin,
    Cos,
    Powi(i32),
}

impl PointwiseFn {
    pub fn eval<F: Float>(self, x: Dual<F>) -> Dual<F> {
        match self {
            PointwiseFn::Exp => x.exp(),
            PointwiseFn::Ln => x.ln(),
            PointwiseFn::Sqrt => x.sqrt(),
            PointwiseFn::Tanh => x.tanh(),
            PointwiseFn::Sigmoid => x.sigmoid(),
            PointwiseFn::Softplus => x.softplus(),
            PointwiseFn::Sin => x.sin(),
            PointwiseFn::Cos => x.cos(),
            PointwiseFn::Powi(n) => x.powi(n),
        }
    }
}

/// `f(x)` applied entry by entry on one domain.
#[derive(Clone, Debug)]
pub struct Pointwise {
    domain: Domain,
    func: PointwiseFn,
}

impl Pointwise {
    pub fn new(domain: Domain, func: PointwiseFn) -> Self {
        Pointwise { domain, func }
    }
}

impl<F: Float> Model<F> for Pointwise {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn target(&self) -> &Domain {
        &self.domain
    }

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>> {
        check_input(&self.domain, lin)?;
        let func = self.func;
        lin.pointwise(|d| func.eval(d))
    }

    fn apply(&self, x: &Field<F>) -> Result<Field<F>> {
        if x.domain() != &self.domain {
            return Err(OperatorError::mismatch(&self.domain, x.domain()));
        }
        let func = self.func;
        Ok(x.map(|v| func.eval(Dual::constant(v)).re))
    }
}

/// `models[0] ∘ models[1] ∘ …`; the last model sees the input first.
#[derive(Clone, Debug)]
pub struct ChainModel<F: Float> {
    models: Vec<Arc<dyn Model<F>>>,
}

impl<F: Float> ChainModel<F> {
    pub fn new(models: Vec<Arc<dyn Model<F>>>) -> Result<Self> {
        if models.is_empty() {
            return Err(OperatorError::Construction("empty model chain".into()));
        }
        for pair in models.windows(2) {
            if pair[1].target() != pair[0].domain() {
                return Err(OperatorError::mismatch(pair[0].domain(), pair[1].target()));
            }
        }
        Ok(ChainModel { models })
    }
}

impl<F: Float> Model<F> for ChainModel<F> {
    fn domain(&self) -> &Domain {
        self.models[self.models.len() - 1].domain()
    }

    fn target(&self) -> &Domain {
        self.models[0].target()
    }

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>> {
        let mut cur = lin.clone();
        for m in self.models.iter().rev() {
            cur = m.apply_lin(&cur)?;
        }
        Ok(cur)
    }

    fn apply(&self, x: &Field<F>) -> Result<Field<F>> {
        let mut cur = x.clone();
        for m in self.models.iter().rev() {
            cur = m.apply(&cur)?;
        }
        Ok(cur)
    }
}

/// Signed sum of models with common domain and target.
#[derive(Clone, Debug)]
pub struct SumModel<F: Float> {
    terms: Vec<(Arc<dyn Model<F>>, bool)>,
}

impl<F: Float> SumModel<F> {
    /// `terms[i].1` marks a subtracted term.
    pub fn new(terms: Vec<(Arc<dyn Model<F>>, bool)>) -> Result<Self> {
        let first = terms
            .first()
            .ok_or_else(|| OperatorError::Construction("empty model sum".into()))?;
        let (dom, tgt) = (first.0.domain().clone(), first.0.target().clone());
        for (m, _) in &terms {
            if m.domain() != &dom || m.target() != &tgt {
                return Err(OperatorError::Construction(format!(
                    "cannot sum {dom} -> {tgt} with {} -> {}",
                    m.domain(),
                    m.target()
                )));
            }
        }
        Ok(SumModel { terms })
    }
}

impl<F: Float> Model<F> for SumModel<F> {
    fn domain(&self) -> &Domain {
        self.terms[0].0.domain()
    }

    fn target(&self) -> &Domain {
        self.terms[0].0.target()
    }

    fn apply_lin(&self, lin: &Linearization<F>) -> Result<Linearization<F>> {
        let mut acc: Option<Linearization<F>> = None;
        for (m, neg) in &self.terms {
            let part = m.apply_lin(lin)?;
            acc = Some(match acc {
                None if *neg => part.neg()?,
                None => part,
                Some(a) if *neg => a.sub(&part)?,
                Some(a) => a.add(&part)?,
            });
        }
        acc.ok_or_else(|| OperatorError::Construction("empty model sum".into()))
    }
}
