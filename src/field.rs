use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use rand::Rng;

use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::float::Float;

/// Immutable array of values tagged with the [`Domain`] it lives on.
///
/// Multi-domain fields store their components back to back in key order.
/// Values sit behind an `Arc`, so cloning a field is cheap and no operation
/// here writes into an existing field.
#[derive(Clone, PartialEq)]
pub struct Field<F: Float> {
    domain: Domain,
    values: Arc<[F]>,
}

impl<F: Float> Field<F> {
    /// Wrap `values`; their number must equal `domain.size()`.
    pub fn new(domain: Domain, values: Vec<F>) -> Result<Self> {
        if values.len() != domain.size() {
            return Err(OperatorError::Construction(format!(
                "{} values given for {domain} of size {}",
                values.len(),
                domain.size()
            )));
        }
        Ok(Field {
            domain,
            values: values.into(),
        })
    }

    pub(crate) fn from_parts(domain: Domain, values: Vec<F>) -> Self {
        debug_assert_eq!(values.len(), domain.size());
        Field {
            domain,
            values: values.into(),
        }
    }

    /// Constant field.
    pub fn full(domain: Domain, value: F) -> Self {
        let n = domain.size();
        Self::from_parts(domain, vec![value; n])
    }

    pub fn zeros(domain: Domain) -> Self {
        Self::full(domain, F::zero())
    }

    /// Field on the scalar domain.
    pub fn scalar(value: F) -> Self {
        Self::from_parts(Domain::scalar(), vec![value])
    }

    /// I.i.d. standard-normal entries.
    pub fn from_random<R: Rng + ?Sized>(domain: Domain, rng: &mut R) -> Self {
        let values = (0..domain.size()).map(|_| F::standard_normal(rng)).collect();
        Self::from_parts(domain, values)
    }

    /// Assemble a multi-field from per-key fields. Every key of `domain`
    /// must be given exactly once with the matching component domain.
    pub fn from_components<'a, I>(domain: &Domain, parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Field<F>)>,
    {
        if !domain.is_multi() {
            return Err(OperatorError::Construction(format!(
                "{domain} is not a multi-domain"
            )));
        }
        let mut slots: Vec<Option<Field<F>>> = vec![None; domain.components().len()];
        for (key, field) in parts {
            let idx = domain
                .components()
                .iter()
                .position(|(k, _)| k == key)
                .ok_or_else(|| {
                    OperatorError::Construction(format!("key '{key}' not in {domain}"))
                })?;
            let expected = &domain.components()[idx].1;
            if field.domain() != expected {
                return Err(OperatorError::mismatch(expected, field.domain()));
            }
            slots[idx] = Some(field);
        }
        let mut values = Vec::with_capacity(domain.size());
        for ((key, _), slot) in domain.components().iter().zip(slots) {
            let part = slot.ok_or_else(|| {
                OperatorError::Construction(format!("missing component '{key}'"))
            })?;
            values.extend_from_slice(part.values());
        }
        Ok(Self::from_parts(domain.clone(), values))
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn values(&self) -> &[F] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_vec(&self) -> Vec<F> {
        self.values.to_vec()
    }

    /// Same values reinterpreted on another domain of equal size.
    pub fn with_domain(&self, domain: Domain) -> Result<Self> {
        if domain.size() != self.len() {
            return Err(OperatorError::mismatch(&domain, &self.domain));
        }
        Ok(Field {
            domain,
            values: Arc::clone(&self.values),
        })
    }

    /// Component `key` of a multi-field.
    pub fn component(&self, key: &str) -> Result<Self> {
        let range = self.domain.component_range(key).ok_or_else(|| {
            OperatorError::Unavailable(format!("component '{key}' of {}", self.domain))
        })?;
        let dom = self
            .domain
            .component(key)
            .cloned()
            .ok_or_else(|| OperatorError::Unavailable(format!("component '{key}'")))?;
        Ok(Self::from_parts(dom, self.values[range].to_vec()))
    }

    /// The single value of a size-one field.
    pub fn scalar_value(&self) -> Result<F> {
        if self.len() != 1 {
            return Err(OperatorError::Unavailable(format!(
                "scalar value of a field on {}",
                self.domain
            )));
        }
        Ok(self.values[0])
    }

    pub fn map(&self, f: impl Fn(F) -> F) -> Self {
        Self::from_parts(self.domain.clone(), self.values.iter().map(|&v| f(v)).collect())
    }

    /// Elementwise combination.
    ///
    /// # Panics
    /// If the domains differ.
    pub fn zip_map(&self, other: &Self, f: impl Fn(F, F) -> F) -> Self {
        self.assert_same_domain(other);
        Self::from_parts(
            self.domain.clone(),
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        )
    }

    /// Unweighted inner product `sum(self * other)`.
    ///
    /// # Panics
    /// If the domains differ.
    pub fn vdot(&self, other: &Self) -> F {
        self.assert_same_domain(other);
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| a * b)
            .sum()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> F {
        self.values.iter().map(|&v| v * v).sum::<F>().sqrt()
    }

    pub fn sum(&self) -> F {
        self.values.iter().copied().sum()
    }

    /// Largest absolute entry (zero for an empty field).
    pub fn max_abs(&self) -> F {
        self.values
            .iter()
            .fold(F::zero(), |m, &v| if v.abs() > m { v.abs() } else { m })
    }

    /// Multiply by the domain's volume element raised to `power`.
    pub fn weight(&self, power: i32) -> Self {
        let mut values = self.values.to_vec();
        self.domain.weight(&mut values, power);
        Self::from_parts(self.domain.clone(), values)
    }

    /// `self + alpha * other`.
    pub fn add_scaled(&self, alpha: F, other: &Self) -> Self {
        self.zip_map(other, |a, b| a + alpha * b)
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    fn assert_same_domain(&self, other: &Self) {
        assert!(
            self.domain == other.domain,
            "field domains differ: {} vs {}",
            self.domain,
            other.domain
        );
    }
}

impl<F: Float> fmt::Debug for Field<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("domain", &self.domain)
            .field("values", &&self.values[..])
            .finish()
    }
}

macro_rules! field_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<F: Float> $trait<&Field<F>> for &Field<F> {
            type Output = Field<F>;
            #[inline]
            fn $method(self, rhs: &Field<F>) -> Field<F> {
                self.zip_map(rhs, |a, b| a $op b)
            }
        }

        impl<F: Float> $trait<Field<F>> for Field<F> {
            type Output = Field<F>;
            #[inline]
            fn $method(self, rhs: Field<F>) -> Field<F> {
                (&self).$method(&rhs)
            }
        }

        impl<F: Float> $trait<&Field<F>> for Field<F> {
            type Output = Field<F>;
            #[inline]
            fn $method(self, rhs: &Field<F>) -> Field<F> {
                (&self).$method(rhs)
            }
        }

        impl<F: Float> $trait<F> for &Field<F> {
            type Output = Field<F>;
            #[inline]
            fn $method(self, rhs: F) -> Field<F> {
                self.map(|a| a $op rhs)
            }
        }

        impl<F: Float> $trait<F> for Field<F> {
            type Output = Field<F>;
            #[inline]
            fn $method(self, rhs: F) -> Field<F> {
                (&self).$method(rhs)
            }
        }
    };
}

field_binop!(Add, add, +);
field_binop!(Sub, sub, -);
field_binop!(Mul, mul, *);
field_binop!(Div, div, /);

impl<F: Float> Neg for &Field<F> {
    type Output = Field<F>;
    #[inline]
    fn neg(self) -> Field<F> {
        self.map(|a| -a)
    }
}

impl<F: Float> Neg for Field<F> {
    type Output = Field<F>;
    #[inline]
    fn neg(self) -> Field<F> {
        -&self
    }
}
