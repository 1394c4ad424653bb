use std::fmt::{self, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::Float;

/// Forward-mode dual number: a value paired with its tangent.
///
/// `Dual { re, eps }` represents `re + eps·ε` where `ε² = 0`. Pointwise
/// nonlinearities are written once over `Dual` and yield both the value and
/// the diagonal of their Jacobian.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Dual<F: Float> {
    /// Primal value.
    pub re: F,
    /// Tangent.
    pub eps: F,
}

impl<F: Float> Display for Dual<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}ε", self.re, self.eps)
    }
}

impl<F: Float> Dual<F> {
    #[inline]
    pub fn new(re: F, eps: F) -> Self {
        Dual { re, eps }
    }

    /// Zero tangent.
    #[inline]
    pub fn constant(re: F) -> Self {
        Dual { re, eps: F::zero() }
    }

    /// Unit tangent.
    #[inline]
    pub fn variable(re: F) -> Self {
        Dual { re, eps: F::one() }
    }

    /// Given `f(re)` and `f'(re)`, push the tangent through.
    #[inline]
    fn chain(self, f_val: F, f_deriv: F) -> Self {
        Dual {
            re: f_val,
            eps: self.eps * f_deriv,
        }
    }

    #[inline]
    pub fn recip(self) -> Self {
        let inv = F::one() / self.re;
        self.chain(inv, -inv * inv)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        self.chain(s, F::one() / (F::lit(2.0) * s))
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let deriv = if n == 0 {
            F::zero()
        } else {
            F::lit(f64::from(n)) * self.re.powi(n - 1)
        };
        self.chain(self.re.powi(n), deriv)
    }

    #[inline]
    pub fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e)
    }

    #[inline]
    pub fn ln(self) -> Self {
        self.chain(self.re.ln(), self.re.recip())
    }

    #[inline]
    pub fn sin(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(s, c)
    }

    #[inline]
    pub fn cos(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(c, -s)
    }

    #[inline]
    pub fn tanh(self) -> Self {
        let t = self.re.tanh();
        self.chain(t, F::one() - t * t)
    }

    /// Logistic function `1 / (1 + exp(-x))`.
    #[inline]
    pub fn sigmoid(self) -> Self {
        let s = F::one() / (F::one() + (-self.re).exp());
        self.chain(s, s * (F::one() - s))
    }

    /// `ln(1 + exp(x))`, evaluated without overflow for large `x`.
    #[inline]
    pub fn softplus(self) -> Self {
        let x = self.re;
        let val = if x > F::zero() {
            x + (-x).exp().ln_1p()
        } else {
            x.exp().ln_1p()
        };
        let s = F::one() / (F::one() + (-x).exp());
        self.chain(val, s)
    }

    #[inline]
    pub fn abs(self) -> Self {
        self.chain(self.re.abs(), self.re.signum())
    }
}

impl<F: Float> Add for Dual<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Dual::new(self.re + rhs.re, self.eps + rhs.eps)
    }
}

impl<F: Float> Sub for Dual<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Dual::new(self.re - rhs.re, self.eps - rhs.eps)
    }
}

impl<F: Float> Mul for Dual<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Dual::new(self.re * rhs.re, self.eps * rhs.re + self.re * rhs.eps)
    }
}

impl<F: Float> Div for Dual<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = F::one() / rhs.re;
        Dual::new(
            self.re * inv,
            (self.eps * rhs.re - self.re * rhs.eps) * inv * inv,
        )
    }
}

impl<F: Float> Neg for Dual<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Dual::new(-self.re, -self.eps)
    }
}

impl<F: Float> Mul<F> for Dual<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: F) -> Self {
        Dual::new(self.re * rhs, self.eps * rhs)
    }
}

impl<F: Float> Add<F> for Dual<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: F) -> Self {
        Dual::new(self.re + rhs, self.eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fd(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-6;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let x = 0.7;
        let v = Dual::variable(x);
        assert_relative_eq!(v.exp().eps, fd(f64::exp, x), epsilon = 1e-8);
        assert_relative_eq!(v.ln().eps, fd(f64::ln, x), epsilon = 1e-8);
        assert_relative_eq!(v.tanh().eps, fd(f64::tanh, x), epsilon = 1e-8);
        assert_relative_eq!(v.sqrt().eps, fd(f64::sqrt, x), epsilon = 1e-8);
        assert_relative_eq!(v.powi(3).eps, 3.0 * x * x, epsilon = 1e-12);
        assert_relative_eq!(
            v.sigmoid().eps,
            fd(|t| 1.0 / (1.0 + (-t).exp()), x),
            epsilon = 1e-8
        );
        assert_relative_eq!(
            v.softplus().eps,
            fd(|t| t.exp().ln_1p(), x),
            epsilon = 1e-8
        );
    }

    #[test]
    fn product_and_quotient_rules() {
        let x = Dual::variable(2.0f64);
        let y = x * x.sin();
        assert_relative_eq!(y.eps, 2.0f64.sin() + 2.0 * 2.0f64.cos(), epsilon = 1e-12);
        let q = Dual::constant(1.0) / x;
        assert_relative_eq!(q.eps, -0.25, epsilon = 1e-12);
    }

    #[test]
    fn softplus_large_argument() {
        let y = Dual::variable(800.0f64).softplus();
        assert!(y.re.is_finite());
        assert_relative_eq!(y.eps, 1.0, epsilon = 1e-12);
    }
}
