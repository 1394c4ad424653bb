use rand::RngCore;

use super::{Capability, LinearMap, Mode, Operator};
use crate::domain::{Domain, Space};
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

/// Pointwise multiplication by a real field.
///
/// The diagonal may live on a subset of the domain's spaces, in which case
/// it is broadcast over the remaining ones.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagonalOperator<F: Float> {
    diag: Field<F>,
    spaces: Option<Vec<usize>>,
    full: Field<F>,
}

impl<F: Float> DiagonalOperator<F> {
    /// Diagonal over the whole of `diag`'s domain.
    pub fn new(diag: Field<F>) -> Self {
        DiagonalOperator {
            full: diag.clone(),
            diag,
            spaces: None,
        }
    }

    /// Diagonal acting on the spaces `spaces` (sorted, unique indices) of
    /// `domain`; `diag` must live on exactly those spaces.
    pub fn on_spaces(diag: Field<F>, domain: Domain, spaces: Vec<usize>) -> Result<Self> {
        if domain.is_multi() {
            return Err(OperatorError::Construction(
                "a diagonal cannot act on a multi-domain".into(),
            ));
        }
        let all = domain.spaces();
        if spaces.windows(2).any(|w| w[0] >= w[1]) || spaces.iter().any(|&i| i >= all.len()) {
            return Err(OperatorError::Construction(format!(
                "invalid space selection {spaces:?} for {domain}"
            )));
        }
        let sub = Domain::new(spaces.iter().map(|&i| all[i].clone()).collect());
        if diag.domain() != &sub {
            return Err(OperatorError::mismatch(&sub, diag.domain()));
        }
        if spaces.len() == all.len() {
            return Ok(Self::new(diag.with_domain(domain)?));
        }

        let values = index_map(&domain, &spaces)
            .into_iter()
            .map(|d| diag.values()[d])
            .collect();
        Ok(DiagonalOperator {
            full: Field::new(domain, values)?,
            diag,
            spaces: Some(spaces),
        })
    }

    /// The diagonal on its own (possibly reduced) domain.
    pub fn diagonal(&self) -> &Field<F> {
        &self.diag
    }

    pub fn spaces(&self) -> Option<&[usize]> {
        self.spaces.as_deref()
    }

    fn with_diag(&self, diag: Field<F>) -> Self {
        match &self.spaces {
            None => Self::new(diag),
            Some(sp) => {
                let full = if diag == self.diag {
                    self.full.clone()
                } else {
                    self.broadcast(&diag)
                };
                DiagonalOperator {
                    diag,
                    spaces: Some(sp.clone()),
                    full,
                }
            }
        }
    }

    fn broadcast(&self, diag: &Field<F>) -> Field<F> {
        let domain = self.full.domain();
        let sel = self.spaces.as_deref().unwrap_or(&[]);
        let values = index_map(domain, sel)
            .into_iter()
            .map(|d| diag.values()[d])
            .collect();
        Field::from_parts(domain.clone(), values)
    }

    /// `fct * self`.
    pub fn scale(&self, fct: F) -> Self {
        self.with_diag(self.diag.map(|d| d * fct))
    }

    /// `self + fct * 1`.
    pub fn add_scalar(&self, fct: F) -> Self {
        self.with_diag(self.diag.map(|d| d + fct))
    }

    fn same_layout(&self, other: &Self) -> bool {
        self.spaces == other.spaces && self.full.domain() == other.full.domain()
    }

    /// Product of two diagonals with the same space selection.
    pub fn combine_prod(&self, other: &Self) -> Option<Self> {
        self.same_layout(other)
            .then(|| self.with_diag(&self.diag * &other.diag))
    }

    /// `±self ± other` for diagonals with the same space selection.
    pub fn combine_sum(&self, neg_self: bool, other: &Self, neg_other: bool) -> Option<Self> {
        if !self.same_layout(other) {
            return None;
        }
        let a = if neg_self { -F::one() } else { F::one() };
        let b = if neg_other { -F::one() } else { F::one() };
        Some(self.with_diag(self.diag.zip_map(&other.diag, |x, y| a * x + b * y)))
    }

    pub(super) fn flip(&self, transform: Mode) -> Option<Operator<F>> {
        match transform {
            Mode::Times | Mode::AdjointTimes => Some(Operator::Diagonal(self.clone())),
            _ if self.invertible() => {
                Some(Operator::Diagonal(self.with_diag(self.diag.map(F::recip))))
            }
            _ => None,
        }
    }

    fn invertible(&self) -> bool {
        self.diag.values().iter().all(|&d| d != F::zero())
    }
}

/// For every flat index of `domain`, the flat index into a field living on
/// the selected `spaces` only.
fn index_map(domain: &Domain, spaces: &[usize]) -> Vec<usize> {
    let sizes: Vec<usize> = domain.spaces().iter().map(Space::size).collect();
    let mut idx = vec![0usize; sizes.len()];
    (0..domain.size())
        .map(|flat| {
            let mut rem = flat;
            for k in (0..sizes.len()).rev() {
                idx[k] = rem % sizes[k];
                rem /= sizes[k];
            }
            spaces.iter().fold(0, |acc, &k| acc * sizes[k] + idx[k])
        })
        .collect()
}

impl<F: Float> LinearMap<F> for DiagonalOperator<F> {
    fn domain(&self) -> &Domain {
        self.full.domain()
    }

    fn target(&self) -> &Domain {
        self.full.domain()
    }

    fn capability(&self) -> Capability {
        if self.invertible() {
            Capability::ALL
        } else {
            Capability::TIMES | Capability::ADJOINT_TIMES
        }
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        Ok(match mode {
            Mode::Times | Mode::AdjointTimes => x * &self.full,
            Mode::InverseTimes | Mode::AdjointInverseTimes => x / &self.full,
        })
    }

    fn is_self_adjoint(&self) -> bool {
        true
    }

    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        let bad = self
            .full
            .values()
            .iter()
            .any(|&d| d < F::zero() || (from_inverse && d == F::zero()));
        if bad {
            return Err(OperatorError::Sampling(
                "diagonal is not positive definite".into(),
            ));
        }
        let xi = Field::from_random(self.full.domain().clone(), rng);
        Ok(if from_inverse {
            xi.zip_map(&self.full, |x, d| x / d.sqrt())
        } else {
            xi.zip_map(&self.full, |x, d| x * d.sqrt())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_space_domain() -> Domain {
        Domain::new(vec![
            Space::unstructured(vec![2]),
            Space::unstructured(vec![3]),
        ])
    }

    #[test]
    fn broadcast_over_unselected_space() {
        let dom = two_space_domain();
        let diag = Field::new(Domain::unstructured(3), vec![1.0f64, 10.0, 100.0]).unwrap();
        let op = DiagonalOperator::on_spaces(diag, dom.clone(), vec![1]).unwrap();
        let x = Field::full(dom, 1.0);
        let y = op.apply(&x, Mode::Times).unwrap();
        assert_eq!(y.values(), &[1.0, 10.0, 100.0, 1.0, 10.0, 100.0]);
    }

    #[test]
    fn broadcast_first_space() {
        let dom = two_space_domain();
        let diag = Field::new(Domain::unstructured(2), vec![2.0f64, 3.0]).unwrap();
        let op = DiagonalOperator::on_spaces(diag, dom.clone(), vec![0]).unwrap();
        let y = op.apply(&Field::full(dom, 1.0), Mode::Times).unwrap();
        assert_eq!(y.values(), &[2.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
        let scaled = op.scale(0.5).apply(&y, Mode::InverseTimes).unwrap();
        assert_eq!(scaled.values(), &[2.0; 6]);
    }

    #[test]
    fn rejects_bad_selection() {
        let diag = Field::<f64>::zeros(Domain::unstructured(3));
        assert!(DiagonalOperator::on_spaces(diag.clone(), two_space_domain(), vec![0]).is_err());
        assert!(DiagonalOperator::on_spaces(diag, two_space_domain(), vec![1, 1]).is_err());
    }

    #[test]
    fn combine_requires_same_selection() {
        let dom = two_space_domain();
        let a = DiagonalOperator::on_spaces(
            Field::full(Domain::unstructured(3), 2.0f64),
            dom.clone(),
            vec![1],
        )
        .unwrap();
        let b = DiagonalOperator::new(Field::full(dom, 3.0f64));
        assert!(a.combine_prod(&b).is_none());
        let p = a.combine_prod(&a).unwrap();
        assert_eq!(p.diagonal().values(), &[4.0; 3]);
        let s = a.combine_sum(false, &a, true).unwrap();
        assert_eq!(s.diagonal().values(), &[0.0; 3]);
        assert!(!s.capability().contains(Mode::InverseTimes));
    }
}
