//! Motor driver and limit switch reader.

pub mod driver;
pub mod limits;

pub use driver::{MotorConfig, MotorDriver};
pub use limits::{LimitsConfig, MotorLimits};
