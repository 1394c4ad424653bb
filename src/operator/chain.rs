use super::{BlockDiagonalOperator, Capability, LinearMap, Mode, Operator};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// `ops[0] ∘ ops[1] ∘ … ∘ ops[n-1]`; the last operator sees the input first.
#[derive(Clone, Debug)]
pub struct ChainOperator<F: Float> {
    ops: Vec<Operator<F>>,
    capability: Capability,
}

impl<F: Float> ChainOperator<F> {
    /// Build a simplified chain.
    ///
    /// Nested chains are flattened, a null member collapses the whole chain,
    /// real scalings are folded into one factor (absorbed by a diagonal when
    /// there is one), and adjacent diagonal or block-diagonal members are
    /// merged. A single remaining operator is returned unwrapped.
    pub fn make(ops: Vec<Operator<F>>) -> Result<Operator<F>> {
        if ops.is_empty() {
            return Err(OperatorError::Construction("empty operator chain".into()));
        }
        let mut ops = Self::simplify(ops)?;
        if ops.len() == 1 {
            return Ok(ops.remove(0));
        }
        Ok(Operator::Chain(Self::from_parts(ops)))
    }

    fn from_parts(ops: Vec<Operator<F>>) -> Self {
        let capability = ops
            .iter()
            .fold(Capability::ALL, |cap, op| cap & op.capability());
        ChainOperator { ops, capability }
    }

    fn simplify(ops: Vec<Operator<F>>) -> Result<Vec<Operator<F>>> {
        for pair in ops.windows(2) {
            if pair[1].target() != pair[0].domain() {
                return Err(OperatorError::mismatch(pair[0].domain(), pair[1].target()));
            }
        }

        let mut flat = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                Operator::Chain(c) => flat.extend(c.ops),
                other => flat.push(other),
            }
        }

        if flat.iter().any(|op| matches!(op, Operator::Null(_))) {
            let domain = flat[flat.len() - 1].domain().clone();
            let target = flat[0].target().clone();
            flat = vec![Operator::null(domain, target)];
        }

        let lastdom = flat[flat.len() - 1].domain().clone();
        let mut fct = F::one();
        let mut rest: Vec<Operator<F>> = Vec::with_capacity(flat.len());
        for op in flat {
            match op {
                Operator::Scaling(s) => fct = fct * s.factor(),
                other => rest.push(other),
            }
        }
        if fct != F::one() {
            if let Some(Operator::Diagonal(d)) =
                rest.iter_mut().find(|op| matches!(op, Operator::Diagonal(_)))
            {
                *d = d.scale(fct);
                fct = F::one();
            }
        }
        if fct != F::one() || rest.is_empty() {
            rest.push(Operator::scaling(fct, lastdom));
        }

        let mut merged: Vec<Operator<F>> = Vec::with_capacity(rest.len());
        for op in rest {
            if let (Some(Operator::Diagonal(prev)), Operator::Diagonal(cur)) =
                (merged.last(), &op)
            {
                if let Some(prod) = prev.combine_prod(cur) {
                    let last = merged.len() - 1;
                    merged[last] = Operator::Diagonal(prod);
                    continue;
                }
            }
            merged.push(op);
        }

        let mut out: Vec<Operator<F>> = Vec::with_capacity(merged.len());
        for op in merged {
            if let (Some(Operator::BlockDiagonal(prev)), Operator::BlockDiagonal(cur)) =
                (out.last(), &op)
            {
                let combined: BlockDiagonalOperator<F> = prev.combine_chain(cur)?;
                let last = out.len() - 1;
                out[last] = Operator::BlockDiagonal(combined);
                continue;
            }
            out.push(op);
        }
        Ok(out)
    }

    pub fn operators(&self) -> &[Operator<F>] {
        &self.ops
    }

    /// Single adjoint or inverse reverses the order; both together keep it.
    pub(super) fn flip(&self, transform: Mode) -> Operator<F> {
        let ops: Vec<Operator<F>> = match transform {
            Mode::Times => return Operator::Chain(self.clone()),
            Mode::AdjointTimes | Mode::InverseTimes => {
                self.ops.iter().rev().map(|op| op.flip(transform)).collect()
            }
            Mode::AdjointInverseTimes => self.ops.iter().map(|op| op.flip(transform)).collect(),
        };
        Operator::Chain(Self::from_parts(ops))
    }
}

impl<F: Float> LinearMap<F> for ChainOperator<F> {
    fn domain(&self) -> &Domain {
        self.ops[self.ops.len() - 1].domain()
    }

    fn target(&self) -> &Domain {
        self.ops[0].target()
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        let mut y = x.clone();
        if mode.is_backward() {
            for op in &self.ops {
                y = op.apply(&y, mode)?;
            }
        } else {
            for op in self.ops.iter().rev() {
                y = op.apply(&y, mode)?;
            }
        }
        Ok(y)
    }
}
