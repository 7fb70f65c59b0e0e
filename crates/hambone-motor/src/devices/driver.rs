//! H-bridge motor driver on two GPIO outputs.
//!
//! | IN1  | IN2  | State    |
//! |------|------|----------|
//! | LOW  | LOW  | Stop     |
//! | LOW  | HIGH | Forward  |
//! | HIGH | LOW  | Backward |
//! | HIGH | HIGH | Brake    |

use hambone_gpio::{DigitalIo, Direction, HardwareRegistry, Lease, Level, Pull, ResourceKey};
use tracing::{debug, trace, warn};

use crate::error::MotorError;
use crate::traits::motor::{MotorControl, MotorState};

/// Default IN1 pin. Driving it high moves the paw backward, toward the board.
pub const MOTOR_IN1_PIN: &str = "P8_7";
/// Default IN2 pin. Driving it high moves the paw forward, away from the board.
pub const MOTOR_IN2_PIN: &str = "P8_9";

/// Pin assignment for the motor driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotorConfig {
    /// H-bridge IN1 pin.
    #[cfg_attr(feature = "serde", serde(rename = "motorIN1Pin", alias = "motorin1pin"))]
    pub in1_pin: String,
    /// H-bridge IN2 pin.
    #[cfg_attr(feature = "serde", serde(rename = "motorIN2Pin", alias = "motorin2pin"))]
    pub in2_pin: String,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            in1_pin: MOTOR_IN1_PIN.to_string(),
            in2_pin: MOTOR_IN2_PIN.to_string(),
        }
    }
}

/// Bang-bang motor driver. There is no speed control: the motor is either
/// driven at full speed, coasting or braking.
#[derive(Debug)]
pub struct MotorDriver<P> {
    port: P,
    in1: String,
    in2: String,
    state: MotorState,
}

impl<P: DigitalIo> MotorDriver<P> {
    /// Configures both pins as pulled-down outputs and forces the motor to
    /// [`MotorState::Stop`], so creating a driver never actuates the paw.
    pub fn new(port: P, config: &MotorConfig) -> Result<Self, MotorError> {
        port.configure(&config.in1_pin, Direction::Output, Pull::Down)?;
        port.configure(&config.in2_pin, Direction::Output, Pull::Down)?;

        let mut driver = Self {
            port,
            in1: config.in1_pin.clone(),
            in2: config.in2_pin.clone(),
            state: MotorState::Stop,
        };
        driver.stop()?;
        debug!(in1 = %driver.in1, in2 = %driver.in2, "Motor driver ready");
        Ok(driver)
    }

    /// Registry key for a driver on the configured pins.
    pub fn resource_key(config: &MotorConfig) -> ResourceKey {
        ResourceKey::new("MotorDriver", [config.in1_pin.as_str(), config.in2_pin.as_str()])
    }

    /// Returns a lease on the driver for these pins, constructing it on the
    /// first request. The last lease to go releases every pin on `port`.
    ///
    /// That includes pins held by other classes on the same port: once the
    /// last driver lease drops, a still-leased [`MotorLimits`] reads
    /// [`GpioError::NotConfigured`](hambone_gpio::GpioError::NotConfigured)
    /// until it is acquired again. Drop the driver and the limit reader
    /// together, as [`Paw`](crate::paw::Paw) does.
    ///
    /// [`MotorLimits`]: crate::devices::MotorLimits
    pub fn acquire(
        registry: &HardwareRegistry,
        port: &P,
        config: &MotorConfig,
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

    /// IN1 and IN2 pin names.
    pub fn pins(&self) -> (&str, &str) {
        (&self.in1, &self.in2)
    }
}

impl<P: DigitalIo> MotorControl for MotorDriver<P> {
    fn set_state(&mut self, state: MotorState) -> Result<(), MotorError> {
        let (in1, in2) = match state {
            MotorState::Stop => (Level::Low, Level::Low),
            MotorState::Forward => (Level::Low, Level::High),
            MotorState::Backward => (Level::High, Level::Low),
            MotorState::Brake => (Level::High, Level::High),
        };

        // IN2 is written first unless it is the pin being raised, so a
        // falling pin always goes low before the other one moves: forward
        // lowers IN1 then raises IN2, stop and backward lower IN2 first.
        if in2.is_high() {
            self.port.write(&self.in1, in1)?;
            self.port.write(&self.in2, in2)?;
        } else {
            self.port.write(&self.in2, in2)?;
            self.port.write(&self.in1, in1)?;
        }

        trace!(from = %self.state, to = %state, "Motor state written");
        self.state = state;
        Ok(())
    }

    fn state(&self) -> MotorState {
        self.state
    }
}

pub(crate) fn release_port<P: DigitalIo>(port: &P) {
    debug!("GPIO cleanup is being called");
    if let Err(e) = port.release_all() {
        warn!(error = %e, "GPIO cleanup failed");
    }
}
