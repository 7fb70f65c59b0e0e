//! Capability traits and shared vocabulary for the paw motor.

use core::fmt;

use hambone_gpio::Lease;

use crate::error::MotorError;

/// Commanded state of a two-input H-bridge.
///
/// Exactly one state is current at a time and it only changes through
/// [`MotorControl::set_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorState {
    /// Both inputs low, the motor coasts.
    #[default]
    Stop,
    /// Drive away from the board, toward the front limit.
    Forward,
    /// Drive toward the board, toward the rear limit.
    Backward,
    /// Both inputs high, short brake.
    Brake,
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorState::Stop => write!(f, "STOP"),
            MotorState::Forward => write!(f, "FORWARD"),
            MotorState::Backward => write!(f, "BACKWARD"),
            MotorState::Brake => write!(f, "BRAKE"),
        }
    }
}

/// Direction of a commanded paw move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    /// Toward the front limit.
    Forward,
    /// Toward the rear limit.
    Backward,
}

impl Heading {
    /// The reverse heading.
    pub const fn opposite(self) -> Self {
        match self {
            Heading::Forward => Heading::Backward,
            Heading::Backward => Heading::Forward,
        }
    }

    /// Motor state that drives in this heading.
    pub const fn motor_state(self) -> MotorState {
        match self {
            Heading::Forward => MotorState::Forward,
            Heading::Backward => MotorState::Backward,
        }
    }
}

/// One end of the paw's travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Fully presented.
    Front,
    /// Fully retracted.
    Rear,
}

impl Side {
    /// Lower-case name used in logs and configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Rear => "rear",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core trait for driving the paw motor.
pub trait MotorControl {
    /// Writes the pin pattern for `state`.
    fn set_state(&mut self, state: MotorState) -> Result<(), MotorError>;

    /// Last state successfully written. Never touches hardware.
    fn state(&self) -> MotorState;

    /// Drive toward the front limit.
    fn forward(&mut self) -> Result<(), MotorError> {
        self.set_state(MotorState::Forward)
    }

    /// Drive toward the rear limit.
    fn backward(&mut self) -> Result<(), MotorError> {
        self.set_state(MotorState::Backward)
    }

    /// Coast.
    fn stop(&mut self) -> Result<(), MotorError> {
        self.set_state(MotorState::Stop)
    }

    /// Short brake.
    fn brake(&mut self) -> Result<(), MotorError> {
        self.set_state(MotorState::Brake)
    }
}

/// Read access to the two end-of-travel switches.
pub trait LimitSensing {
    /// Whether the front switch is pressed.
    fn is_front_pressed(&self) -> Result<bool, MotorError>;

    /// Whether the rear switch is pressed.
    fn is_rear_pressed(&self) -> Result<bool, MotorError>;
}

impl<T: MotorControl> MotorControl for Lease<T> {
    fn set_state(&mut self, state: MotorState) -> Result<(), MotorError> {
        self.lock().set_state(state)
    }

    fn state(&self) -> MotorState {
        self.lock().state()
    }
}

impl<T: LimitSensing> LimitSensing for Lease<T> {
    fn is_front_pressed(&self) -> Result<bool, MotorError> {
        self.lock().is_front_pressed()
    }

    fn is_rear_pressed(&self) -> Result<bool, MotorError> {
        self.lock().is_rear_pressed()
    }
}
