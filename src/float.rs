use std::fmt::{Debug, Display, LowerExp};
use std::iter::Sum;

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};
use rand::Rng;
use rand_distr::StandardNormal;

/// Marker trait for the element types of fields (`f32`, `f64`).
///
/// Bundles the numeric and utility traits needed throughout ift, plus a
/// standard-normal draw so sampling code can stay generic.
pub trait Float:
    NumFloat
    + FloatConst
    + FromPrimitive
    + Sum
    + Copy
    + Send
    + Sync
    + Default
    + Debug
    + Display
    + LowerExp
    + 'static
{
    /// Draw one value from `N(0, 1)`.
    fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Convert an `f64` constant, falling back to NaN if unrepresentable.
    #[inline]
    fn lit(v: f64) -> Self {
        Self::from_f64(v).unwrap_or_else(Self::nan)
    }
}

impl Float for f32 {
    #[inline]
    fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl Float for f64 {
    #[inline]
    fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}
