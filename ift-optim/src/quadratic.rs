use ift::{Field, Float, Operator, OperatorError, Result};

use crate::energy::{Energy, Memo};

/// `E(x) = 0.5 x^† A x - b^† x` with gradient `A x - b` and metric `A`.
///
/// `A` must be an endomorphism of the position's domain; the minimum solves
/// `A x = b` when `A` is positive definite.
#[derive(Debug)]
pub struct QuadraticEnergy<F: Float> {
    position: Field<F>,
    a: Operator<F>,
    b: Option<Field<F>>,
    gradient: Memo<Field<F>>,
    value: Memo<F>,
}

impl<F: Float> QuadraticEnergy<F> {
    /// `b = None` means `b = 0`.
    pub fn new(position: Field<F>, a: Operator<F>, b: Option<Field<F>>) -> Result<Self> {
        let dom = position.domain();
        if a.domain() != dom {
            return Err(OperatorError::mismatch(a.domain(), dom));
        }
        if a.target() != dom {
            return Err(OperatorError::Construction(format!(
                "quadratic form maps {} to {}; it must be an endomorphism",
                a.domain(),
                a.target()
            )));
        }
        if let Some(b) = &b {
            if b.domain() != dom {
                return Err(OperatorError::mismatch(dom, b.domain()));
            }
        }
        Ok(QuadraticEnergy {
            position,
            a,
            b,
            gradient: Memo::new(),
            value: Memo::new(),
        })
    }

    pub fn operator(&self) -> &Operator<F> {
        &self.a
    }

    pub fn b(&self) -> Option<&Field<F>> {
        self.b.as_ref()
    }

    /// Same `A` and `b` at another position.
    pub fn with_position(&self, position: Field<F>) -> Result<Self> {
        Self::new(position, self.a.clone(), self.b.clone())
    }

    /// Like [`with_position`](Self::with_position) but with the gradient
    /// already known, saving one application of `A`.
    pub fn at_with_grad(&self, position: Field<F>, gradient: Field<F>) -> Result<Self> {
        if gradient.domain() != position.domain() {
            return Err(OperatorError::mismatch(position.domain(), gradient.domain()));
        }
        let mut e = self.with_position(position)?;
        e.gradient = Memo::with(gradient);
        Ok(e)
    }
}

impl<F: Float> Energy<F> for QuadraticEnergy<F> {
    fn position(&self) -> &Field<F> {
        &self.position
    }

    fn at(&self, position: Field<F>) -> Result<Box<dyn Energy<F>>> {
        Ok(Box::new(self.with_position(position)?))
    }

    fn value(&self) -> Result<F> {
        self.value
            .get_or_try_init(|| {
                // A x = g + b, so 0.5 x^†(A x) - b^† x = 0.5 x^†(g - b).
                let g = self.gradient()?;
                let half = F::lit(0.5);
                Ok(match &self.b {
                    Some(b) => half * self.position.vdot(&(&g - b)),
                    None => half * self.position.vdot(&g),
                })
            })
            .copied()
    }

    fn gradient(&self) -> Result<Field<F>> {
        self.gradient
            .get_or_try_init(|| {
                let ax = self.a.times(&self.position)?;
                Ok(match &self.b {
                    Some(b) => ax - b,
                    None => ax,
                })
            })
            .cloned()
    }

    fn metric(&self) -> Result<Operator<F>> {
        Ok(self.a.clone())
    }

    fn apply_metric(&self, x: &Field<F>) -> Result<Field<F>> {
        self.a.times(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ift::Domain;

    fn setup() -> (Field<f64>, Operator<f64>, Field<f64>) {
        let d = Domain::unstructured(3);
        let a = Operator::diagonal(Field::new(d.clone(), vec![1.0, 2.0, 4.0]).unwrap());
        let b = Field::new(d.clone(), vec![1.0, 1.0, 1.0]).unwrap();
        let x = Field::new(d, vec![1.0, -1.0, 0.5]).unwrap();
        (x, a, b)
    }

    #[test]
    fn value_and_gradient() {
        let (x, a, b) = setup();
        let e = QuadraticEnergy::new(x, a, Some(b)).unwrap();
        assert_eq!(e.gradient().unwrap().values(), &[0.0, -3.0, 1.0]);
        // 0.5 (1 + 2 + 1) - (1 - 1 + 0.5)
        assert_relative_eq!(e.value().unwrap(), 1.5);
    }

    #[test]
    fn supplied_gradient_is_used() {
        let (x, a, b) = setup();
        let e = QuadraticEnergy::new(x.clone(), a, Some(b)).unwrap();
        let fake = Field::full(x.domain().clone(), 10.0);
        let moved = e.at_with_grad(x, fake.clone()).unwrap();
        assert_eq!(moved.gradient().unwrap(), fake);
    }

    #[test]
    fn rejects_non_endomorphism() {
        let (x, _, _) = setup();
        let a = Operator::null(Domain::unstructured(3), Domain::unstructured(2));
        assert!(QuadraticEnergy::new(x, a, None).is_err());
    }
}
