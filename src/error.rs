//! Error type shared by every fallible operation in ift and ift-optim.
//!
//! Structural problems (wrong domain, missing capability, malformed
//! composite) are errors. Numerical outcomes of iterative solvers are not:
//! they travel as status values next to the result.

use thiserror::Error;

use crate::domain::Domain;
use crate::operator::{Capability, Mode};

/// Failure of an operator, field or energy operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperatorError {
    /// A field was handed to something living on a different domain.
    #[error("domain mismatch: expected {expected}, found {found}")]
    DomainMismatch { expected: Domain, found: Domain },

    /// The requested mode is not in the operator's capability mask.
    #[error("operator does not support {mode} (capability {capability})")]
    CapabilityUnsupported { mode: Mode, capability: Capability },

    /// A composite or value could not be built from its parts.
    #[error("invalid construction: {0}")]
    Construction(String),

    /// The operator cannot act as a covariance to draw samples from.
    #[error("cannot draw sample: {0}")]
    Sampling(String),

    /// A quantity was requested that this object does not provide.
    #[error("not available: {0}")]
    Unavailable(String),

    /// A consistency check (adjointness, inverse, gradient) failed.
    #[error("consistency check failed: {0}")]
    Inconsistent(String),
}

impl OperatorError {
    pub fn mismatch(expected: &Domain, found: &Domain) -> Self {
        OperatorError::DomainMismatch {
            expected: expected.clone(),
            found: found.clone(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = OperatorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_domain_mismatch() {
        let err = OperatorError::mismatch(&Domain::unstructured(8), &Domain::unstructured(16));
        let msg = err.to_string();
        assert!(msg.starts_with("domain mismatch"), "{msg}");
        assert!(msg.contains('8') && msg.contains("16"), "{msg}");
    }

    #[test]
    fn display_capability() {
        let err = OperatorError::CapabilityUnsupported {
            mode: Mode::InverseTimes,
            capability: Capability::TIMES | Capability::ADJOINT_TIMES,
        };
        assert_eq!(
            err.to_string(),
            "operator does not support INVERSE_TIMES (capability TIMES|ADJOINT_TIMES)"
        );
    }

    #[test]
    fn error_trait_works() {
        let err = OperatorError::Construction("empty operator list".into());
        let dyn_err: &dyn std::error::Error = &err;
        assert_eq!(dyn_err.to_string(), "invalid construction: empty operator list");
    }
}
