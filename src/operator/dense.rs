//! Explicit matrices as operators.

use super::{Capability, LinearMap, Mode};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// Row-major `target.size() × domain.size()` matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseOperator<F: Float> {
    domain: Domain,
    target: Domain,
    matrix: Vec<F>,
}

impl<F: Float> DenseOperator<F> {
    pub fn new(domain: Domain, target: Domain, matrix: Vec<F>) -> Result<Self> {
        let expected = domain.size() * target.size();
        if matrix.len() != expected {
            return Err(OperatorError::Construction(format!(
                "matrix has {} entries, {} -> {} needs {expected}",
                matrix.len(),
                domain,
                target
            )));
        }
        Ok(DenseOperator {
            domain,
            target,
            matrix,
        })
    }

    pub fn rows(&self) -> usize {
        self.target.size()
    }

    pub fn cols(&self) -> usize {
        self.domain.size()
    }

    pub fn matrix(&self) -> &[F] {
        &self.matrix
    }

    fn matvec(&self, x: &[F]) -> Vec<F> {
        let n = self.cols();
        self.matrix
            .chunks(n.max(1))
            .take(self.rows())
            .map(|row| row.iter().zip(x).map(|(&a, &b)| a * b).sum())
            .collect()
    }

    fn rmatvec(&self, y: &[F]) -> Vec<F> {
        let n = self.cols();
        let mut out = vec![F::zero(); n];
        for (row, &yi) in self.matrix.chunks(n.max(1)).zip(y) {
            for (o, &a) in out.iter_mut().zip(row) {
                *o = *o + a * yi;
            }
        }
        out
    }
}

impl<F: Float> LinearMap<F> for DenseOperator<F> {
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
            Mode::Times => Field::new(self.target.clone(), self.matvec(x.values())),
            Mode::AdjointTimes => Field::new(self.domain.clone(), self.rmatvec(x.values())),
            _ => Err(OperatorError::CapabilityUnsupported {
                mode,
                capability: LinearMap::<F>::capability(self),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matvec_and_transpose() {
        let op = DenseOperator::new(
            Domain::unstructured(3),
            Domain::unstructured(2),
            vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap();
        let x = Field::full(Domain::unstructured(3), 1.0);
        assert_eq!(op.apply(&x, Mode::Times).unwrap().values(), &[6.0, 15.0]);
        let y = Field::new(Domain::unstructured(2), vec![1.0, -1.0]).unwrap();
        assert_eq!(op.apply(&y, Mode::AdjointTimes).unwrap().values(), &[-3.0, -3.0, -3.0]);
    }

    #[test]
    fn wrong_entry_count() {
        let d = Domain::unstructured(3);
        let t = Domain::unstructured(2);
        assert!(DenseOperator::new(d, t, vec![0.0f64; 5]).is_err());
    }
}
