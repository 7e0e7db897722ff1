//! Public driver error type.

use crate::protocol;
use crate::value::TagKind;
use thiserror::Error;

/// Result alias for driver-level operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Failures surfaced to users of the client, either as return values of
/// synchronous operations or through the error stream for background work.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Connection parameter out of range at construction.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Read or write invoked before the session finished initializing.
    #[error("session is not initialized")]
    NotInitialized,

    /// Address string unparsable or semantically impossible.
    #[error("invalid address '{address}': {reason}")]
    AddressInvalid { address: String, reason: String },

    /// Address plus length exceeds the capability table, or the area is not
    /// available on the detected controller.
    #[error("range error: {0}")]
    RangeInvalid(String),

    /// A value of one kind was supplied where another was registered.
    #[error("type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch { expected: TagKind, actual: TagKind },

    /// Operation rejected by the capability table.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Wire-level failure from the protocol stack.
    #[error(transparent)]
    Protocol(#[from] protocol::Error),
}

impl DriverError {
    /// Convenience constructor keeping the offending address with the reason.
    pub fn address_invalid(address: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::AddressInvalid {
            address: address.into(),
            reason: reason.into(),
        }
    }
}
