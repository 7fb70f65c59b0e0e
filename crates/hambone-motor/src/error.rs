//! Error types for the motion core.

#![warn(missing_docs)]

use core::fmt;
use std::time::Duration;

use hambone_gpio::GpioError;
use thiserror::Error;

/// Failure marker carried by a `TimeExpired` breaker when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorTimeout {
    /// Configured ceiling for the motion.
    pub limit: Duration,
    /// Time actually elapsed when the breaker fired.
    pub elapsed: Duration,
}

impl fmt::Display for MotorTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "motion exceeded {} ms (ran {} ms)",
            self.limit.as_millis(),
            self.elapsed.as_millis()
        )
    }
}

impl std::error::Error for MotorTimeout {}

/// Errors surfaced by the motor driver, limit reader and paw controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotorError {
    /// A pin read or write failed. Never retried.
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
    /// A timing breaker fired before a limit switch was reached.
    #[error("motor timeout: {0}")]
    Timeout(#[from] MotorTimeout),
    /// A breaker was registered under a category that does not exist.
    #[error("unknown breaker category: {0}")]
    UnknownBreakerCategory(String),
    /// A breaker aborted the motion.
    #[error("breaker aborted motion: {0}")]
    Aborted(String),
}
