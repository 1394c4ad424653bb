//! Linear operators and their composition algebra.
//!
//! Every operator declares which of the four application modes it supports
//! through a [`Capability`] mask. Atomic operators implement [`LinearMap`];
//! the closed [`Operator`] enum wraps them together with the composite
//! variants, validates modes and domains, and applies the unitary and
//! self-adjoint shortcuts before dispatching.

mod block_diagonal;
mod chain;
mod diagonal;
mod null;
mod reduction;
mod sandwich;
mod scaling;
mod sum;

pub mod dense;

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

use rand::RngCore;

use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;

pub use block_diagonal::BlockDiagonalOperator;
pub use chain::ChainOperator;
pub use dense::DenseOperator;
pub use diagonal::DiagonalOperator;
pub use null::NullOperator;
pub use reduction::{ContractionOperator, VdotOperator};
pub use sandwich::SandwichOperator;
pub use scaling::ScalingOperator;
pub use sum::SumOperator;

/// One of the four ways a linear operator `A` can be applied.
///
/// Modes form a group under [`Mode::compose`]: with indices
/// `Times = 0, AdjointTimes = 1, InverseTimes = 2, AdjointInverseTimes = 3`,
/// composition is XOR of the indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// `A x`
    Times,
    /// `A^† x`
    AdjointTimes,
    /// `A^{-1} x`
    InverseTimes,
    /// `(A^†)^{-1} x`
    AdjointInverseTimes,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::Times,
        Mode::AdjointTimes,
        Mode::InverseTimes,
        Mode::AdjointInverseTimes,
    ];

    #[inline]
    pub fn index(self) -> u8 {
        match self {
            Mode::Times => 0,
            Mode::AdjointTimes => 1,
            Mode::InverseTimes => 2,
            Mode::AdjointInverseTimes => 3,
        }
    }

    #[inline]
    fn from_index(i: u8) -> Mode {
        Mode::ALL[usize::from(i & 3)]
    }

    /// The capability bit for this mode.
    #[inline]
    pub fn bit(self) -> Capability {
        Capability(1 << self.index())
    }

    /// True if the input lives on the operator's target.
    #[inline]
    pub fn is_backward(self) -> bool {
        matches!(self, Mode::AdjointTimes | Mode::InverseTimes)
    }

    /// Apply `transform` on top of this mode.
    #[inline]
    pub fn compose(self, transform: Mode) -> Mode {
        Mode::from_index(self.index() ^ transform.index())
    }

    #[inline]
    pub fn adjoint(self) -> Mode {
        self.compose(Mode::AdjointTimes)
    }

    #[inline]
    pub fn inverse(self) -> Mode {
        self.compose(Mode::InverseTimes)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Times => "TIMES",
            Mode::AdjointTimes => "ADJOINT_TIMES",
            Mode::InverseTimes => "INVERSE_TIMES",
            Mode::AdjointInverseTimes => "ADJOINT_INVERSE_TIMES",
        })
    }
}

/// Bitmask over the four [`Mode`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capability(u8);

impl Capability {
    pub const NONE: Capability = Capability(0);
    pub const TIMES: Capability = Capability(1);
    pub const ADJOINT_TIMES: Capability = Capability(2);
    pub const INVERSE_TIMES: Capability = Capability(4);
    pub const ADJOINT_INVERSE_TIMES: Capability = Capability(8);
    pub const ALL: Capability = Capability(15);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Option<Capability> {
        (bits <= 15).then_some(Capability(bits))
    }

    #[inline]
    pub fn contains(self, mode: Mode) -> bool {
        self.0 & mode.bit().0 != 0
    }

    #[inline]
    pub fn contains_all(self, other: Capability) -> bool {
        self.0 & other.0 == other.0
    }

    /// Capability of the operator obtained by applying `transform`: the
    /// flipped operator supports `m` iff this one supports `m ∘ transform`.
    pub fn flip(self, transform: Mode) -> Capability {
        Mode::ALL
            .iter()
            .filter(|m| self.contains(m.compose(transform)))
            .fold(Capability::NONE, |acc, m| acc | m.bit())
    }

    /// Add the modes an iterative inversion can provide.
    pub fn with_inverse(self) -> Capability {
        self | self.flip(Mode::InverseTimes)
    }

    pub fn modes(self) -> impl Iterator<Item = Mode> {
        Mode::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl BitOr for Capability {
    type Output = Capability;
    #[inline]
    fn bitor(self, rhs: Capability) -> Capability {
        Capability(self.0 | rhs.0)
    }
}

impl BitAnd for Capability {
    type Output = Capability;
    #[inline]
    fn bitand(self, rhs: Capability) -> Capability {
        Capability(self.0 & rhs.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        let names: Vec<String> = self.modes().map(|m| m.to_string()).collect();
        f.write_str(&names.join("|"))
    }
}

/// An atomic linear map between two domains.
///
/// `apply` may assume that `mode` is in `capability()` and that `x` lives on
/// the side `mode` expects; [`Operator::apply`] checks both before calling it.
pub trait LinearMap<F: Float>: fmt::Debug + Send + Sync {
    fn domain(&self) -> &Domain;

    fn target(&self) -> &Domain;

    /// Natively supported modes.
    fn capability(&self) -> Capability;

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>>;

    /// `A^{-1} = A^†`.
    fn is_unitary(&self) -> bool {
        false
    }

    /// `A^† = A`.
    fn is_self_adjoint(&self) -> bool {
        false
    }

    /// Zero-mean Gaussian draw with this operator (or its inverse) as
    /// covariance.
    fn draw_sample(&self, _rng: &mut dyn RngCore, _from_inverse: bool) -> Result<Field<F>> {
        Err(OperatorError::Sampling(format!("{self:?} is not a covariance")))
    }
}

/// Any linear operator: the built-in composite variants or a user atomic map.
///
/// Composites are built through their `make` constructors, which simplify
/// and may return a different variant than the one asked for.
#[derive(Clone, Debug)]
pub enum Operator<F: Float> {
    Scaling(ScalingOperator<F>),
    Diagonal(DiagonalOperator<F>),
    Null(NullOperator),
    Chain(ChainOperator<F>),
    Sum(SumOperator<F>),
    BlockDiagonal(BlockDiagonalOperator<F>),
    Sandwich(SandwichOperator<F>),
    Flipped(FlippedOperator<F>),
    Atomic(Arc<dyn LinearMap<F>>),
}

impl<F: Float> Operator<F> {
    pub fn inner(&self) -> &dyn LinearMap<F> {
        match self {
            Operator::Scaling(op) => op,
            Operator::Diagonal(op) => op,
            Operator::Null(op) => op,
            Operator::Chain(op) => op,
            Operator::Sum(op) => op,
            Operator::BlockDiagonal(op) => op,
            Operator::Sandwich(op) => op,
            Operator::Flipped(op) => op,
            Operator::Atomic(op) => op.as_ref(),
        }
    }

    // ── Constructors ──

    /// `factor * 1` on `domain`.
    pub fn scaling(factor: F, domain: Domain) -> Self {
        Operator::Scaling(ScalingOperator::new(factor, domain))
    }

    pub fn identity(domain: Domain) -> Self {
        Self::scaling(F::one(), domain)
    }

    /// Diagonal operator on the diagonal's own domain.
    pub fn diagonal(diag: Field<F>) -> Self {
        Operator::Diagonal(DiagonalOperator::new(diag))
    }

    /// Everything maps to zero.
    pub fn null(domain: Domain, target: Domain) -> Self {
        Operator::Null(NullOperator::new(domain, target))
    }

    pub fn atomic(map: impl LinearMap<F> + 'static) -> Self {
        Operator::Atomic(Arc::new(map))
    }

    // ── Metadata ──

    pub fn domain(&self) -> &Domain {
        self.inner().domain()
    }

    pub fn target(&self) -> &Domain {
        self.inner().target()
    }

    pub fn is_unitary(&self) -> bool {
        self.inner().is_unitary()
    }

    pub fn is_self_adjoint(&self) -> bool {
        self.inner().is_self_adjoint()
    }

    /// Native capability plus the modes reachable through the unitary and
    /// self-adjoint shortcuts.
    pub fn capability(&self) -> Capability {
        Mode::ALL
            .iter()
            .filter(|m| self.resolve_mode(**m).is_some())
            .fold(Capability::NONE, |acc, m| acc | m.bit())
    }

    fn resolve_mode(&self, mode: Mode) -> Option<Mode> {
        let inner = self.inner();
        let cap = inner.capability();
        let mut m = mode;
        if inner.is_unitary() && matches!(m, Mode::InverseTimes | Mode::AdjointInverseTimes) {
            m = m.compose(Mode::AdjointInverseTimes);
        }
        if inner.is_self_adjoint() && matches!(m, Mode::AdjointTimes | Mode::AdjointInverseTimes) {
            m = m.adjoint();
        }
        if cap.contains(m) {
            Some(m)
        } else if cap.contains(mode) {
            Some(mode)
        } else {
            None
        }
    }

    // ── Application ──

    /// Apply in `mode` after checking capability and the input domain
    /// (domain for `Times`/`AdjointInverseTimes`, target otherwise).
    pub fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        let inner = self.inner();
        let resolved = self
            .resolve_mode(mode)
            .ok_or_else(|| OperatorError::CapabilityUnsupported {
                mode,
                capability: self.capability(),
            })?;
        let expected = if mode.is_backward() {
            inner.target()
        } else {
            inner.domain()
        };
        if x.domain() != expected {
            return Err(OperatorError::mismatch(expected, x.domain()));
        }
        inner.apply(x, resolved)
    }

    pub fn times(&self, x: &Field<F>) -> Result<Field<F>> {
        self.apply(x, Mode::Times)
    }

    pub fn adjoint_times(&self, x: &Field<F>) -> Result<Field<F>> {
        self.apply(x, Mode::AdjointTimes)
    }

    pub fn inverse_times(&self, x: &Field<F>) -> Result<Field<F>> {
        self.apply(x, Mode::InverseTimes)
    }

    pub fn adjoint_inverse_times(&self, x: &Field<F>) -> Result<Field<F>> {
        self.apply(x, Mode::AdjointInverseTimes)
    }

    /// Gaussian draw with this operator (or its inverse) as covariance.
    pub fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        self.inner().draw_sample(rng, from_inverse)
    }

    // ── Views ──

    pub fn adjoint(&self) -> Self {
        self.flip(Mode::AdjointTimes)
    }

    pub fn inverse(&self) -> Self {
        self.flip(Mode::InverseTimes)
    }

    /// Operator whose mode `m` is this operator's mode `m ∘ transform`.
    pub fn flip(&self, transform: Mode) -> Self {
        if transform == Mode::Times {
            return self.clone();
        }
        match self {
            Operator::Scaling(op) => op.flip(transform).unwrap_or_else(|| self.wrap(transform)),
            Operator::Diagonal(op) => op.flip(transform).unwrap_or_else(|| self.wrap(transform)),
            Operator::Null(op) if transform == Mode::AdjointTimes => Operator::Null(op.adjoint()),
            Operator::Chain(op) => op.flip(transform),
            Operator::Sum(op) if transform == Mode::AdjointTimes => op.adjoint(),
            Operator::BlockDiagonal(op) => Operator::BlockDiagonal(op.flip(transform)),
            Operator::Flipped(op) => {
                let composed = op.transform.compose(transform);
                if composed == Mode::Times {
                    (*op.op).clone()
                } else {
                    op.op.wrap(composed)
                }
            }
            _ if self.is_self_adjoint() && transform == Mode::AdjointTimes => self.clone(),
            _ => self.wrap(transform),
        }
    }

    fn wrap(&self, transform: Mode) -> Self {
        Operator::Flipped(FlippedOperator::new(self.clone(), transform))
    }

    // ── Algebra ──

    /// `self ∘ other` (`other` applied first).
    pub fn compose(&self, other: &Operator<F>) -> Result<Self> {
        ChainOperator::make(vec![self.clone(), other.clone()])
    }

    /// `self + other`.
    pub fn add(&self, other: &Operator<F>) -> Result<Self> {
        SumOperator::make(vec![self.clone(), other.clone()], vec![false, false])
    }

    /// `self - other`.
    pub fn sub(&self, other: &Operator<F>) -> Result<Self> {
        SumOperator::make(vec![self.clone(), other.clone()], vec![false, true])
    }

    /// `factor * self`.
    pub fn scale(&self, factor: F) -> Result<Self> {
        ChainOperator::make(vec![
            Operator::scaling(factor, self.target().clone()),
            self.clone(),
        ])
    }
}

impl<F: Float> From<DenseOperator<F>> for Operator<F> {
    fn from(op: DenseOperator<F>) -> Self {
        Operator::atomic(op)
    }
}

impl<F: Float> From<VdotOperator<F>> for Operator<F> {
    fn from(op: VdotOperator<F>) -> Self {
        Operator::atomic(op)
    }
}

impl<F: Float> From<ContractionOperator> for Operator<F> {
    fn from(op: ContractionOperator) -> Self {
        Operator::atomic(op)
    }
}

/// An operator seen through a mode transform (adjoint, inverse or both).
#[derive(Clone, Debug)]
pub struct FlippedOperator<F: Float> {
    op: Box<Operator<F>>,
    transform: Mode,
}

impl<F: Float> FlippedOperator<F> {
    fn new(op: Operator<F>, transform: Mode) -> Self {
        FlippedOperator {
            op: Box::new(op),
            transform,
        }
    }

    pub fn operator(&self) -> &Operator<F> {
        &self.op
    }

    pub fn transform(&self) -> Mode {
        self.transform
    }

    fn swaps_sides(&self) -> bool {
        matches!(self.transform, Mode::AdjointTimes | Mode::InverseTimes)
    }
}

impl<F: Float> LinearMap<F> for FlippedOperator<F> {
    fn domain(&self) -> &Domain {
        if self.swaps_sides() {
            self.op.target()
        } else {
            self.op.domain()
        }
    }

    fn target(&self) -> &Domain {
        if self.swaps_sides() {
            self.op.domain()
        } else {
            self.op.target()
        }
    }

    fn capability(&self) -> Capability {
        self.op.capability().flip(self.transform)
    }

    fn apply(&self, x: &Field<F>, mode: Mode) -> Result<Field<F>> {
        self.op.apply(x, mode.compose(self.transform))
    }

    fn is_unitary(&self) -> bool {
        self.op.is_unitary()
    }

    fn is_self_adjoint(&self) -> bool {
        self.op.is_self_adjoint()
    }

    fn draw_sample(&self, rng: &mut dyn RngCore, from_inverse: bool) -> Result<Field<F>> {
        let adjoint = matches!(
            self.transform,
            Mode::AdjointTimes | Mode::AdjointInverseTimes
        );
        if adjoint && !self.op.is_self_adjoint() {
            return Err(OperatorError::Sampling(
                "adjoint of a non-self-adjoint operator".into(),
            ));
        }
        let inverted = matches!(
            self.transform,
            Mode::InverseTimes | Mode::AdjointInverseTimes
        );
        self.op.draw_sample(rng, from_inverse != inverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_composition_is_xor() {
        assert_eq!(Mode::Times.adjoint(), Mode::AdjointTimes);
        assert_eq!(Mode::AdjointTimes.inverse(), Mode::AdjointInverseTimes);
        assert_eq!(Mode::AdjointInverseTimes.adjoint(), Mode::InverseTimes);
        for m in Mode::ALL {
            assert_eq!(m.compose(m), Mode::Times);
        }
    }

    #[test]
    fn capability_flip() {
        let fwd = Capability::TIMES | Capability::ADJOINT_TIMES;
        assert_eq!(
            fwd.flip(Mode::InverseTimes),
            Capability::INVERSE_TIMES | Capability::ADJOINT_INVERSE_TIMES
        );
        assert_eq!(fwd.flip(Mode::AdjointTimes), fwd);
        assert_eq!(fwd.with_inverse(), Capability::ALL);
        assert_eq!(Capability::TIMES.flip(Mode::AdjointTimes), Capability::ADJOINT_TIMES);
    }

    #[test]
    fn capability_display() {
        assert_eq!(
            Capability::ALL.to_string(),
            "TIMES|ADJOINT_TIMES|INVERSE_TIMES|ADJOINT_INVERSE_TIMES"
        );
        assert_eq!(Capability::NONE.to_string(), "NONE");
    }

    #[test]
    fn apply_checks_domain_side() {
        let d = Domain::unstructured(3);
        let op = Operator::scaling(2.0f64, d);
        let wrong = Field::zeros(Domain::unstructured(4));
        assert!(matches!(
            op.times(&wrong),
            Err(OperatorError::DomainMismatch { .. })
        ));
    }

    #[test]
    fn unsupported_mode_reports_capability() {
        let op = Operator::null(Domain::unstructured(2), Domain::unstructured(3));
        let y = Field::<f64>::zeros(Domain::unstructured(3));
        let err = op.inverse_times(&y).unwrap_err();
        assert!(matches!(
            err,
            OperatorError::CapabilityUnsupported {
                mode: Mode::InverseTimes,
                ..
            }
        ));
    }

    #[test]
    fn flipped_inverse_swaps_sides() {
        let diag = Field::new(Domain::unstructured(2), vec![2.0f64, 0.0]).unwrap();
        let op = Operator::diagonal(diag);
        // A singular diagonal has no closed-form inverse, so the view wraps.
        let inv = op.inverse();
        assert!(matches!(inv, Operator::Flipped(_)));
        assert_eq!(inv.capability(), Capability::INVERSE_TIMES | Capability::ADJOINT_INVERSE_TIMES);
        assert!(matches!(inv.inverse(), Operator::Diagonal(_)));
    }
}
