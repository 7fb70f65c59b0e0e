//! Error types for digital I/O and pin ownership.

#![warn(missing_docs)]

use thiserror::Error;

/// Errors raised by a digital I/O port or the hardware registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpioError {
    /// The pin name does not exist on this board.
    #[error("unknown pin: {0}")]
    UnknownPin(String),
    /// The pin was used before `configure` was called on it.
    #[error("pin {0} has not been configured")]
    NotConfigured(String),
    /// A write was attempted on a pin that is not configured as an output.
    #[error("pin {0} is not configured as an output")]
    NotOutput(String),
    /// The underlying read or write failed.
    #[error("I/O failure on pin {pin}: {reason}")]
    Io {
        /// Pin the operation targeted.
        pin: String,
        /// Platform supplied description.
        reason: String,
    },
    /// A resource key is already held by an instance of a different type.
    #[error("resource {0} is already held by a different driver type")]
    ResourceConflict(String),
}
