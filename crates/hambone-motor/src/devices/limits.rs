//! Front and rear end-of-travel switches.
//!
//! Both switches are wired active-low against the internal pull-up: an
//! open switch reads HIGH, a pressed one pulls the pin LOW.

use hambone_gpio::{DigitalIo, Direction, HardwareRegistry, Lease, Pull, ResourceKey};
use tracing::debug;

use super::driver::release_port;
use crate::error::MotorError;
use crate::traits::motor::LimitSensing;

/// Default front limit switch pin.
pub const FRONT_LIMIT_SWITCH_PIN: &str = "P8_12";
/// Default rear limit switch pin.
pub const REAR_LIMIT_SWITCH_PIN: &str = "P8_10";

/// Pin assignment for the limit switches.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LimitsConfig {
    /// Front switch pin.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "frontLimitSwitchPin", alias = "frontlimitswitchpin")
    )]
    pub front_pin: String,
    /// Rear switch pin.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "rearLimitSwitchPin", alias = "rearlimitswitchpin")
    )]
    pub rear_pin: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            front_pin: FRONT_LIMIT_SWITCH_PIN.to_string(),
            rear_pin: REAR_LIMIT_SWITCH_PIN.to_string(),
        }
    }
}

/// Reader for the two limit switches.
#[derive(Debug)]
pub struct MotorLimits<P> {
    port: P,
    front: String,
    rear: String,
}

impl<P: DigitalIo> MotorLimits<P> {
    /// Configures both pins as pulled-up inputs.
    pub fn new(port: P, config: &LimitsConfig) -> Result<Self, MotorError> {
        port.configure(&config.front_pin, Direction::Input, Pull::Up)?;
        port.configure(&config.rear_pin, Direction::Input, Pull::Up)?;
        debug!(front = %config.front_pin, rear = %config.rear_pin, "Limit switches ready");

        Ok(Self {
            port,
            front: config.front_pin.clone(),
            rear: config.rear_pin.clone(),
        })
    }

    /// Registry key for a reader on the configured pins.
    pub fn resource_key(config: &LimitsConfig) -> ResourceKey {
        ResourceKey::new("MotorLimits", [config.front_pin.as_str(), config.rear_pin.as_str()])
    }

    /// Returns a lease on the reader for these pins, constructing it on the
    /// first request. The last lease to go releases every pin on `port`,
    /// including the motor driver's, so a still-leased
    /// [`MotorDriver`](crate::devices::MotorDriver) fails its next write.
    pub fn acquire(
        registry: &HardwareRegistry,
        port: &P,
        config: &LimitsConfig,
    ) -> Result<Lease<Self>, MotorError>
    where
        P: Clone,
    {
        let cleanup_port = port.clone();
        registry.acquire(
            Self::resource_key(config),
            || Self::new(port.clone(), config),
            move || release_port(&cleanup_port),
        )
    }

    /// Front and rear pin names.
    pub fn pins(&self) -> (&str, &str) {
        (&self.front, &self.rear)
    }
}

impl<P: DigitalIo> LimitSensing for MotorLimits<P> {
    fn is_front_pressed(&self) -> Result<bool, MotorError> {
        Ok(self.port.read(&self.front)?.is_low())
    }

    fn is_rear_pressed(&self) -> Result<bool, MotorError> {
        Ok(self.port.read(&self.rear)?.is_low())
    }
}
