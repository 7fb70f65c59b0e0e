#![warn(missing_docs)]
#![doc = "Motion core of the HAMBone presenter paw."]
#![doc = ""]
#![doc = "A two-pin H-bridge moves the paw between a front and a rear limit switch."]
#![doc = "The [`paw::Paw`] controller drives it to either end, consulting registered"]
#![doc = "[`breaker::Breaker`]s while it moves, and backs off the switch it reached."]

pub mod breaker;
pub mod devices;
pub mod error;
pub mod paw;
pub mod traits;

pub use breaker::{Breaker, BreakerId, BreakerRegistry, Condition, MotionKind, TimeExpired, Verdict};
pub use devices::{LimitsConfig, MotorConfig, MotorDriver, MotorLimits};
pub use error::{MotorError, MotorTimeout};
pub use paw::{Halt, Paw, PawConfig, PawState, SharedPaw};
pub use traits::{Heading, LimitSensing, MotorControl, MotorState, Side};
