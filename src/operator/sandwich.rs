use rand::RngCore;

use super::{Capability, ChainOperator, LinearMap, Mode, Operator};
use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// `bun^† ∘ cheese ∘ bun`, self-adjoint by construction.
///
/// Sampling draws from `cheese` (white noise if absent) and pushes the draw
/// through `bun^†`.
#[derive(Clone, Debug)]
pub struct SandwichOperator<F: Float> {
    bun: Box<Operator<F>>,
    cheese: Option<Box<Operator<F>>>,
    op: Box<Operator<F>>,
}

impl<F: Float> SandwichOperator<F> {
    /// `cheese` must be an endomorphism of `bun.target()`. Sandwiches that
    /// simplify to a scaling or diagonal are returned as such.
    pub fn make(bun: Operator<F>, cheese: Option<Operator<F>>) -> Result<Operator<F>> {
        let op = match &cheese {
            Some(c) => {
                if c.domain() != bun.target() || c.target() != bun.target() {
                    return Err(OperatorError::Construction(format!(
                        "sandwich cheese on {} -> {} does not match bun target {}",
                        c.domain(),
                        c.target(),
                        bun.target()
                    )));
                }
                ChainOperator::make(vec![bun.adjoint(), c.clone(), bun.clone()])?
            }
            None => ChainOperator::make(vec![bun.adjoint(), bun.clone()])?,
        };
        if matches!(op, Operator::Scaling(_) | Operator::Diagonal(_)) {
            return Ok(op);
        }
        Ok(Operator::Sandwich(SandwichOperator {
            bun: Box::new(bun),
            cheese: cheese.map(Box::new),
            op: Box::new(op),
        }))
    }

    pub fn bun(&self) -> &Operator<F> {
        &self.bun
    }

    pub fn cheese(&self) -> Option<&Operator<F>> {
        self.cheese.as_deref()
    }
}

impl<F: Float> LinearMap<F> for SandwichOperator<F> {
    fn domain(&self) -> &Domain {
        self.bun.domain()
    }

    fn target(&self) -> &Domain {
        self.bun.domain()
    }

    fn capability(&self) -> Capability {
        self.op.capability()
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        self.op.apply(x, mode)
    }

    fn is_self_adjoint(&self) -> bool {
        true
    }

    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        if from_inverse {
            return Err(OperatorError::Sampling(
                "no closed-form inverse sample for a sandwich; wrap it in an inversion enabler"
                    .into(),
            ));
        }
        let inner = match &self.cheese {
            Some(c) => c.draw_sample(rng, false)?,
            None => Field::from_random(self.bun.target().clone(), rng),
        };
        self.bun.adjoint_times(&inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DenseOperator;

    #[test]
    fn diagonal_sandwich_collapses() {
        let d = Domain::unstructured(2);
        let bun = Operator::diagonal(Field::new(d.clone(), vec![2.0f64, 3.0]).unwrap());
        let cheese = Operator::diagonal(Field::new(d, vec![1.0, 0.5]).unwrap());
        match SandwichOperator::make(bun, Some(cheese)).unwrap() {
            Operator::Diagonal(diag) => assert_eq!(diag.diagonal().values(), &[4.0, 4.5]),
            other => panic!("expected a diagonal, got {other:?}"),
        }
    }

    #[test]
    fn dense_sandwich_is_gram_matrix() {
        // bun = [[1, 2], [0, 1], [1, 0]] : R^2 -> R^3, bun^T bun = [[2, 2], [2, 5]]
        let bun = Operator::from(
            DenseOperator::new(
                Domain::unstructured(2),
                Domain::unstructured(3),
                vec![1.0f64, 2.0, 0.0, 1.0, 1.0, 0.0],
            )
            .unwrap(),
        );
        let s = SandwichOperator::make(bun, None).unwrap();
        assert!(s.is_self_adjoint());
        let e1 = Field::new(Domain::unstructured(2), vec![0.0, 1.0]).unwrap();
        assert_eq!(s.times(&e1).unwrap().values(), &[2.0, 5.0]);
        assert_eq!(s.adjoint_times(&e1).unwrap().values(), &[2.0, 5.0]);
    }
}
