//! Candidate price validation.
//!
//! Zero is the store's "unknown" sentinel, so a usable price must be strictly
//! positive as well as finite.

use crate::error::PriceError;

pub fn is_valid(candidate: f64) -> bool {
    candidate.is_finite() && candidate > 0.0
}

/// Accepts `candidate` or explains why `provider`'s value was rejected.
pub fn validate(provider: &str, candidate: f64) -> Result<f64, PriceError> {
    if is_valid(candidate) {
        Ok(candidate)
    } else {
        Err(PriceError::Validation {
            provider: provider.to_owned(),
            value: candidate,
        })
    }
}
