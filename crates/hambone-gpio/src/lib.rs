#![warn(missing_docs)]
#![doc = "Digital I/O for the HAMBone presenter board."]
#![doc = ""]
#![doc = "This crate defines the port capability the motion core consumes, a simulated"]
#![doc = "BeagleBone header used for tests and the demo, and the reference-counted"]
#![doc = "registry that arbitrates ownership of the pins behind each driver."]

use core::fmt;

pub mod error;
pub mod ownership;
pub mod sim;

pub use error::GpioError;
pub use ownership::{HardwareRegistry, Lease, Release, ResourceKey};
pub use sim::{SimulatedBoard, Travel};

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Logic 0.
    Low,
    /// Logic 1.
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Returns `true` for [`Level::Low`].
    pub const fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Pin is sampled by the host.
    Input,
    /// Pin is driven by the host.
    Output,
}

/// Internal pull resistor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// No pull resistor.
    Off,
    /// Pull toward logic 1.
    Up,
    /// Pull toward logic 0.
    Down,
}

/// Capability to drive and sample named pins on a board.
///
/// Implementations are handles: cloning one must address the same physical
/// pins, which is how the motor driver and the limit reader share a header.
/// Nothing in this crate retries a failed operation.
pub trait DigitalIo: Send + Sync + 'static {
    /// Configures `pin` as input or output with the given pull resistor.
    fn configure(&self, pin: &str, direction: Direction, pull: Pull) -> Result<(), GpioError>;

    /// Drives an output pin to `level`.
    fn write(&self, pin: &str, level: Level) -> Result<(), GpioError>;

    /// Samples the current level of a configured pin.
    fn read(&self, pin: &str) -> Result<Level, GpioError>;

    /// Returns every pin to its unconfigured, power-on state.
    fn release_all(&self) -> Result<(), GpioError>;
}
