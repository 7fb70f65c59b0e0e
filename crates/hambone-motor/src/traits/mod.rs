//! Hardware capability traits.

pub mod motor;

pub use motor::{Heading, LimitSensing, MotorControl, MotorState, Side};
