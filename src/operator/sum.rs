use rand::RngCore;

use super::{Capability, LinearMap, Mode, Operator};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// Signed sum `±ops[0] ± ops[1] ± …` of operators sharing domain and target.
///
/// Only the forward and adjoint modes are offered, even if every member
/// is invertible.
#[derive(Clone, Debug)]
pub struct SumOperator<F: Float> {
    ops: Vec<Operator<F>>,
    neg: Vec<bool>,
    capability: Capability,
}

impl<F: Float> SumOperator<F> {
    /// Build a simplified sum; `neg[i]` marks `ops[i]` as subtracted.
    ///
    /// Nested sums are unpacked, scalings are folded into one signed factor
    /// (absorbed by a diagonal when there is one), and diagonals with the
    /// same space selection are merged. A single remaining, non-negated
    /// operator is returned unwrapped.
    pub fn make(ops: Vec<Operator<F>>, neg: Vec<bool>) -> Result<Operator<F>> {
        if ops.len() != neg.len() {
            return Err(OperatorError::Construction(format!(
                "{} operators but {} sign flags",
                ops.len(),
                neg.len()
            )));
        }
        if ops.is_empty() {
            return Err(OperatorError::Construction("empty operator sum".into()));
        }
        let (mut ops, neg) = Self::simplify(ops, neg)?;
        if ops.len() == 1 && !neg[0] {
            return Ok(ops.remove(0));
        }
        let capability = ops.iter().fold(
            Capability::TIMES | Capability::ADJOINT_TIMES,
            |cap, op| cap & op.capability(),
        );
        Ok(Operator::Sum(SumOperator {
            ops,
            neg,
            capability,
        }))
    }

    fn simplify(ops: Vec<Operator<F>>, neg: Vec<bool>) -> Result<(Vec<Operator<F>>, Vec<bool>)> {
        let (domain, target) = (ops[0].domain().clone(), ops[0].target().clone());
        if let Some(bad) = ops
            .iter()
            .find(|op| op.domain() != &domain || op.target() != &target)
        {
            return Err(OperatorError::Construction(format!(
                "cannot sum {domain} -> {target} with {} -> {}",
                bad.domain(),
                bad.target()
            )));
        }

        let mut terms: Vec<(Operator<F>, bool)> = Vec::with_capacity(ops.len());
        for (op, ng) in ops.into_iter().zip(neg) {
            match op {
                Operator::Sum(s) => {
                    terms.extend(s.ops.into_iter().zip(s.neg.into_iter().map(|n| n != ng)))
                }
                other => terms.push((other, ng)),
            }
        }

        let mut sum = F::zero();
        let mut rest: Vec<(Operator<F>, bool)> = Vec::with_capacity(terms.len());
        for (op, ng) in terms {
            match op {
                Operator::Scaling(s) => {
                    sum = if ng { sum - s.factor() } else { sum + s.factor() };
                }
                other => rest.push((other, ng)),
            }
        }
        if sum != F::zero() {
            if let Some((Operator::Diagonal(d), ng)) = rest
                .iter_mut()
                .find(|(op, _)| matches!(op, Operator::Diagonal(_)))
            {
                *d = d.add_scalar(if *ng { -sum } else { sum });
                sum = F::zero();
            }
        }
        if sum != F::zero() || rest.is_empty() {
            rest.push((Operator::scaling(sum, domain.clone()), false));
        }

        let mut processed = vec![false; rest.len()];
        let mut out_ops = Vec::with_capacity(rest.len());
        let mut out_neg = Vec::with_capacity(rest.len());
        for i in 0..rest.len() {
            if processed[i] {
                continue;
            }
            match &rest[i] {
                (Operator::Diagonal(first), ng) => {
                    let mut acc = if *ng { first.scale(-F::one()) } else { first.clone() };
                    for j in i + 1..rest.len() {
                        if let (Operator::Diagonal(other), ngj) = &rest[j] {
                            if let Some(merged) = acc.combine_sum(false, other, *ngj) {
                                acc = merged;
                                processed[j] = true;
                            }
                        }
                    }
                    out_ops.push(Operator::Diagonal(acc));
                    out_neg.push(false);
                }
                (op, ng) => {
                    out_ops.push(op.clone());
                    out_neg.push(*ng);
                }
            }
        }

        if out_ops.iter().any(|op| matches!(op, Operator::Null(_))) {
            let (kept_ops, kept_neg): (Vec<_>, Vec<_>) = out_ops
                .into_iter()
                .zip(out_neg)
                .filter(|(op, _)| !matches!(op, Operator::Null(_)))
                .unzip();
            if kept_ops.is_empty() {
                return Ok((vec![Operator::null(domain, target)], vec![false]));
            }
            return Ok((kept_ops, kept_neg));
        }
        Ok((out_ops, out_neg))
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Operator<F>, bool)> {
        self.ops.iter().zip(self.neg.iter().copied())
    }

    pub(super) fn adjoint(&self) -> Operator<F> {
        let ops: Vec<Operator<F>> = self.ops.iter().map(Operator::adjoint).collect();
        let capability = ops.iter().fold(
            Capability::TIMES | Capability::ADJOINT_TIMES,
            |cap, op| cap & op.capability(),
        );
        Operator::Sum(SumOperator {
            ops,
            neg: self.neg.clone(),
            capability,
        })
    }
}

impl<F: Float> LinearMap<F> for SumOperator<F> {
    fn domain(&self) -> &Domain {
        self.ops[0].domain()
    }

    fn target(&self) -> &Domain {
        self.ops[0].target()
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        let mut acc: Option<Field<F>> = None;
        for (op, ng) in self.terms() {
            let y = op.apply(x, mode)?;
            acc = Some(match acc {
                None if ng => -y,
                None => y,
                Some(a) if ng => a - y,
                Some(a) => a + y,
            });
        }
        acc.ok_or_else(|| OperatorError::Construction("empty operator sum".into()))
    }

    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        if from_inverse {
            return Err(OperatorError::Sampling(
                "no closed-form inverse sample for a sum".into(),
            ));
        }
        let mut acc: Option<Field<F>> = None;
        for (op, ng) in self.terms() {
            if ng {
                return Err(OperatorError::Sampling(
                    "cannot draw from a sum with a subtracted term".into(),
                ));
            }
            let s = op.draw_sample(rng, false)?;
            acc = Some(match acc {
                None => s,
                Some(a) => a + s,
            });
        }
        acc.ok_or_else(|| OperatorError::Construction("empty operator sum".into()))
    }
}
