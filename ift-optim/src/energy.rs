//! Scalar functionals evaluated at a fixed position.
//!
//! An [`Energy`] is a snapshot: it owns its position and lazily computes
//! value, gradient and metric once. Moving somewhere else means asking for a
//! new snapshot with [`Energy::at`]; the old one is never changed.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::{Arc, OnceLock};

use ift::{Field, Float, Operator, OperatorError, Result, SumOperator};

/// A scalar functional at one position.
pub trait Energy<F: Float>: fmt::Debug {
    /// The point at which everything is evaluated.
    fn position(&self) -> &Field<F>;

    /// The same functional at `position`.
    fn at(&self, position: Field<F>) -> Result<Box<dyn Energy<F>>>;

    fn value(&self) -> Result<F>;

    fn gradient(&self) -> Result<Field<F>>;

    fn gradient_norm(&self) -> Result<F> {
        Ok(self.gradient()?.norm())
    }

    /// Curvature operator at the position: self-adjoint and positive
    /// semi-definite.
    fn metric(&self) -> Result<Operator<F>> {
        Err(OperatorError::Unavailable(
            "this energy does not provide a metric".into(),
        ))
    }

    fn apply_metric(&self, x: &Field<F>) -> Result<Field<F>> {
        self.metric()?.times(x)
    }

    /// Largest step allowed along `direction` from the position, `None` if
    /// unbounded.
    fn longest_step(&self, _direction: &Field<F>) -> Option<F> {
        None
    }

    /// The weighted terms if this energy is an [`EnergySum`].
    fn as_sum(&self) -> Option<&EnergySum<F>> {
        None
    }
}

/// Once-computed cache slot for a lazily evaluated quantity.
pub struct Memo<T>(OnceLock<T>);

impl<T> Memo<T> {
    pub fn new() -> Self {
        Memo(OnceLock::new())
    }

    /// A slot that already holds `value`.
    pub fn with(value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Memo(cell)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    /// Return the cached value, computing it with `f` on first access.
    /// Failures are not cached.
    pub fn get_or_try_init(&self, f: impl FnOnce() -> Result<T>) -> Result<&T> {
        if let Some(v) = self.0.get() {
            return Ok(v);
        }
        let v = f()?;
        Ok(self.0.get_or_init(|| v))
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Memo::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(v) => write!(f, "Memo({v:?})"),
            None => write!(f, "Memo(<pending>)"),
        }
    }
}

/// `Σ factor_i E_i` over energies sharing one position.
#[derive(Debug)]
pub struct EnergySum<F: Float> {
    position: Field<F>,
    terms: Vec<(Arc<dyn Energy<F>>, F)>,
    value: Memo<F>,
    gradient: Memo<Field<F>>,
}

impl<F: Float> EnergySum<F> {
    /// Weighted sum of `energies`. Nested sums are flattened with their
    /// weights multiplied through.
    pub fn make(energies: Vec<Box<dyn Energy<F>>>, factors: Vec<F>) -> Result<Self> {
        if energies.is_empty() {
            return Err(OperatorError::Construction(
                "an energy sum needs at least one term".into(),
            ));
        }
        if energies.len() != factors.len() {
            return Err(OperatorError::Construction(format!(
                "{} energies but {} factors",
                energies.len(),
                factors.len()
            )));
        }
        let position = energies[0].position().clone();
        let mut terms = Vec::with_capacity(energies.len());
        for (e, f) in energies.into_iter().zip(factors) {
            if e.position() != &position {
                return Err(OperatorError::Construction(
                    "energies in a sum must share their position".into(),
                ));
            }
            match e.as_sum() {
                Some(sum) => terms.extend(sum.terms.iter().map(|(t, g)| (t.clone(), f * *g))),
                None => terms.push((Arc::from(e), f)),
            }
        }
        Ok(Self::from_terms(position, terms))
    }

    fn from_terms(position: Field<F>, terms: Vec<(Arc<dyn Energy<F>>, F)>) -> Self {
        EnergySum {
            position,
            terms,
            value: Memo::new(),
            gradient: Memo::new(),
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = (&dyn Energy<F>, F)> {
        self.terms.iter().map(|(e, f)| (e.as_ref(), *f))
    }
}

impl<F: Float> Energy<F> for EnergySum<F> {
    fn position(&self) -> &Field<F> {
        &self.position
    }

    fn at(&self, position: Field<F>) -> Result<Box<dyn Energy<F>>> {
        let terms = self
            .terms
            .iter()
            .map(|(e, f)| Ok((Arc::from(e.at(position.clone())?), *f)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(Self::from_terms(position, terms)))
    }

    fn value(&self) -> Result<F> {
        self.value
            .get_or_try_init(|| {
                self.terms
                    .iter()
                    .try_fold(F::zero(), |acc, (e, f)| Ok(acc + *f * e.value()?))
            })
            .copied()
    }

    fn gradient(&self) -> Result<Field<F>> {
        self.gradient
            .get_or_try_init(|| {
                let mut acc = Field::zeros(self.position.domain().clone());
                for (e, f) in &self.terms {
                    acc = acc.add_scaled(*f, &e.gradient()?);
                }
                Ok(acc)
            })
            .cloned()
    }

    fn metric(&self) -> Result<Operator<F>> {
        let ops = self
            .terms
            .iter()
            .map(|(e, f)| e.metric()?.scale(*f))
            .collect::<Result<Vec<_>>>()?;
        let neg = vec![false; ops.len()];
        SumOperator::make(ops, neg)
    }

    fn longest_step(&self, direction: &Field<F>) -> Option<F> {
        self.terms
            .iter()
            .filter_map(|(e, _)| e.longest_step(direction))
            .reduce(F::min)
    }

    fn as_sum(&self) -> Option<&EnergySum<F>> {
        Some(self)
    }
}

// Boxed energies combine into sums. Addition and subtraction check that the
// positions agree; scaling and negation cannot fail.

impl<F: Float> Add for Box<dyn Energy<F>> {
    type Output = Result<Box<dyn Energy<F>>>;

    fn add(self, rhs: Box<dyn Energy<F>>) -> Self::Output {
        Ok(Box::new(EnergySum::make(vec![self, rhs], vec![F::one(), F::one()])?))
    }
}

impl<F: Float> Sub for Box<dyn Energy<F>> {
    type Output = Result<Box<dyn Energy<F>>>;

    fn sub(self, rhs: Box<dyn Energy<F>>) -> Self::Output {
        Ok(Box::new(EnergySum::make(vec![self, rhs], vec![F::one(), -F::one()])?))
    }
}

impl<F: Float> Mul<F> for Box<dyn Energy<F>> {
    type Output = Box<dyn Energy<F>>;

    fn mul(self, factor: F) -> Self::Output {
        scaled(self, factor)
    }
}

impl<F: Float> Neg for Box<dyn Energy<F>> {
    type Output = Box<dyn Energy<F>>;

    fn neg(self) -> Self::Output {
        scaled(self, -F::one())
    }
}

fn scaled<F: Float>(energy: Box<dyn Energy<F>>, factor: F) -> Box<dyn Energy<F>> {
    let position = energy.position().clone();
    let terms = match energy.as_sum() {
        Some(sum) => sum
            .terms
            .iter()
            .map(|(e, f)| (e.clone(), factor * *f))
            .collect(),
        None => vec![(Arc::from(energy), factor)],
    };
    Box::new(EnergySum::from_terms(position, terms))
}
