//! Errors for the search domain. Fusion, weight resolution, and calibration
//! are I/O-free and deterministic (§4.12), so this enum carries no transport
//! variants — only domain-validation failures.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("invalid channel weight for '{channel}': {reason}")]
    InvalidWeight { channel: String, reason: String },

    #[error("at least one channel weight must be greater than zero")]
    AllWeightsZero,

    #[error("cannot redistribute: all channels disabled")]
    AllChannelsDisabled,
}
