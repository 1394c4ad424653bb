use rand::RngCore;

use super::{Capability, ChainOperator, LinearMap, Mode, Operator};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// One endomorphic operator per component of a multi-domain.
///
/// A component whose entry is `None` passes through unchanged in every mode.
#[derive(Clone, Debug)]
pub struct BlockDiagonalOperator<F: Float> {
    domain: Domain,
    ops: Vec<Option<Operator<F>>>,
    capability: Capability,
}

impl<F: Float> BlockDiagonalOperator<F> {
    /// Every key of `domain` must be listed exactly once; `Some(op)` must map
    /// its component onto itself.
    pub fn new<'a, I>(domain: Domain, ops: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Option<Operator<F>>)>,
    {
        if !domain.is_multi() {
            return Err(OperatorError::Construction(format!(
                "block-diagonal operator needs a multi-domain, got {domain}"
            )));
        }
        let mut slots: Vec<Option<Option<Operator<F>>>> = vec![None; domain.components().len()];
        for (key, op) in ops {
            let idx = domain
                .components()
                .iter()
                .position(|(k, _)| k == key)
                .ok_or_else(|| {
                    OperatorError::Construction(format!("key '{key}' not in {domain}"))
                })?;
            let comp = &domain.components()[idx].1;
            if let Some(op) = &op {
                if op.domain() != comp {
                    return Err(OperatorError::mismatch(comp, op.domain()));
                }
                if op.target() != comp {
                    return Err(OperatorError::mismatch(comp, op.target()));
                }
            }
            if slots[idx].replace(op).is_some() {
                return Err(OperatorError::Construction(format!("key '{key}' given twice")));
            }
        }
        let ops = domain
            .components()
            .iter()
            .zip(slots)
            .map(|((key, _), slot)| {
                slot.ok_or_else(|| {
                    OperatorError::Construction(format!("no operator for key '{key}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_parts(domain, ops))
    }

    fn from_parts(domain: Domain, ops: Vec<Option<Operator<F>>>) -> Self {
        let capability = ops
            .iter()
            .flatten()
            .fold(Capability::ALL, |cap, op| cap & op.capability());
        BlockDiagonalOperator {
            domain,
            ops,
            capability,
        }
    }

    /// Sub-operator for `key` (`None` for pass-through or unknown keys).
    pub fn operator(&self, key: &str) -> Option<&Operator<F>> {
        self.domain
            .components()
            .iter()
            .position(|(k, _)| k == key)
            .and_then(|i| self.ops[i].as_ref())
    }

    /// Key-wise `self ∘ other`.
    pub fn combine_chain(&self, other: &Self) -> Result<Self> {
        if self.domain != other.domain {
            return Err(OperatorError::mismatch(&self.domain, &other.domain));
        }
        let ops = self
            .ops
            .iter()
            .zip(&other.ops)
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => ChainOperator::make(vec![a.clone(), b.clone()]).map(Some),
                (Some(op), None) | (None, Some(op)) => Ok(Some(op.clone())),
                (None, None) => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_parts(self.domain.clone(), ops))
    }

    pub(super) fn flip(&self, transform: Mode) -> Self {
        let ops = self
            .ops
            .iter()
            .map(|op| op.as_ref().map(|op| op.flip(transform)))
            .collect();
        Self::from_parts(self.domain.clone(), ops)
    }
}

impl<F: Float> LinearMap<F> for BlockDiagonalOperator<F> {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn target(&self) -> &Domain {
        &self.domain
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        let mut values = Vec::with_capacity(x.len());
        for ((key, _, range), op) in self.domain.component_ranges().into_iter().zip(&self.ops) {
            match op {
                Some(op) => values.extend_from_slice(op.apply(&x.component(key)?, mode)?.values()),
                None => values.extend_from_slice(&x.values()[range]),
            }
        }
        Field::new(self.domain.clone(), values)
    }

    fn is_self_adjoint(&self) -> bool {
        self.ops.iter().flatten().all(Operator::is_self_adjoint)
    }

    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        let mut values = Vec::with_capacity(self.domain.size());
        for ((_, dom), op) in self.domain.components().iter().zip(&self.ops) {
            let part = match op {
                Some(op) => op.draw_sample(rng, from_inverse)?,
                None => Field::from_random(dom.clone(), rng),
            };
            values.extend_from_slice(part.values());
        }
        Field::new(self.domain.clone(), values)
    }
}
