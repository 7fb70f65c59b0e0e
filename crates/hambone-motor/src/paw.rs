//! Present/retract state machine for the paw.
//!
//! ```text
//! Idle -> Moving(heading) -> BackingOff(heading) -> Idle
//! ```
//!
//! Every motion drives the motor, then spins in a tight polling loop until
//! either limit switch reads pressed or a breaker ends the move. The loop is
//! deliberately not sleep-based: the motor is stopped while breakers run, so
//! any delay in the loop body shows up as motor stutter.
//!
//! On each iteration the motor is stopped *before* the breakers are
//! evaluated and only re-energized if none of them fired, so breaker code
//! never runs with the motor driving.

use core::fmt;
use std::time::Duration;

use hambone_gpio::{DigitalIo, HardwareRegistry, Lease};
use tracing::{debug, info, warn};

use crate::breaker::{Breaker, BreakerId, BreakerRegistry, MotionKind};
use crate::devices::{LimitsConfig, MotorConfig, MotorDriver, MotorLimits};
use crate::error::MotorError;
use crate::traits::motor::{Heading, LimitSensing, MotorControl, MotorState, Side};

/// Timeout registered on both motions by [`Paw::acquire`] unless configured.
pub const DEFAULT_MOTION_TIMEOUT_MS: u64 = 5000;

/// Where the paw is in its motion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PawState {
    /// No motion in progress.
    #[default]
    Idle,
    /// Driving toward a limit.
    Moving(Heading),
    /// Easing off the limit reached by a move in this heading.
    BackingOff(Heading),
}

/// Why a primary move ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// A limit switch read pressed. Front wins if both did.
    LimitSwitch(Side),
    /// A breaker asked the move to stop.
    Breaker(BreakerId),
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::LimitSwitch(side) => write!(f, "{side} limit switch"),
            Halt::Breaker(id) => write!(f, "breaker {id}"),
        }
    }
}

/// Hardware and guard settings for a paw.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PawConfig {
    /// Motor driver pins.
    #[cfg_attr(feature = "serde", serde(rename = "motorConfig", alias = "motorconfig"))]
    pub motor: MotorConfig,
    /// Limit switch pins.
    #[cfg_attr(feature = "serde", serde(rename = "motorLimitsConfig", alias = "motorlimitsconfig"))]
    pub limits: LimitsConfig,
    /// Ceiling for each motion in milliseconds; `0` registers no timing
    /// breaker.
    #[cfg_attr(feature = "serde", serde(rename = "motionTimeoutMs", alias = "motiontimeoutms"))]
    pub motion_timeout_ms: u64,
}

impl Default for PawConfig {
    fn default() -> Self {
        Self {
            motor: MotorConfig::default(),
            limits: LimitsConfig::default(),
            motion_timeout_ms: DEFAULT_MOTION_TIMEOUT_MS,
        }
    }
}

impl PawConfig {
    /// Motion ceiling, or `None` when disabled.
    pub fn motion_timeout(&self) -> Option<Duration> {
        (self.motion_timeout_ms > 0).then(|| Duration::from_millis(self.motion_timeout_ms))
    }
}

/// Paw controller over shared, leased hardware.
pub type SharedPaw<P> = Paw<Lease<MotorDriver<P>>, Lease<MotorLimits<P>>>;

/// Paw controller.
///
/// A single logical owner drives a paw at a time; motion calls block until
/// the move and its back-off are done.
#[derive(Debug)]
pub struct Paw<M, L> {
    motor: M,
    limits: L,
    breakers: BreakerRegistry,
    state: PawState,
}

impl<P> SharedPaw<P>
where
    P: DigitalIo + Clone,
{
    /// Leases the motor driver and limit reader for the configured pins and
    /// registers a [`Breaker::TimeExpired`] on both motions when
    /// `motion_timeout_ms` is non-zero.
    pub fn acquire(
        registry: &HardwareRegistry,
        port: &P,
        config: &PawConfig,
    ) -> Result<Self, MotorError> {
        let motor = MotorDriver::acquire(registry, port, &config.motor)?;
        let limits = MotorLimits::acquire(registry, port, &config.limits)?;
        let mut paw = Paw::new(motor, limits);

        if let Some(limit) = config.motion_timeout() {
            paw.register(MotionKind::Present, Breaker::time_expired(limit));
            paw.register(MotionKind::Retract, Breaker::time_expired(limit));
        }
        Ok(paw)
    }
}

impl<M, L> Paw<M, L>
where
    M: MotorControl,
    L: LimitSensing,
{
    /// Builds a paw with no breakers. Without a timing breaker a motion only
    /// ends at a limit switch.
    pub fn new(motor: M, limits: L) -> Self {
        Self {
            motor,
            limits,
            breakers: BreakerRegistry::new(),
            state: PawState::Idle,
        }
    }

    /// Current state of the motion cycle.
    pub fn state(&self) -> PawState {
        self.state
    }

    /// Last state written to the motor.
    pub fn motor_state(&self) -> MotorState {
        self.motor.state()
    }

    /// Registered breakers.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Drives forward to the front limit, then backs off it.
    pub fn present(&mut self) -> Result<Halt, MotorError> {
        self.run(MotionKind::Present)
    }

    /// Drives backward to the rear limit, then backs off it.
    pub fn retract(&mut self) -> Result<Halt, MotorError> {
        self.run(MotionKind::Retract)
    }

    /// Same as [`Paw::retract`].
    pub fn reset(&mut self) -> Result<Halt, MotorError> {
        self.retract()
    }

    /// Registers `breaker` under a category name, `"present"` or
    /// `"retract"`. Any other name fails before anything moves.
    pub fn register_breaker(
        &mut self,
        category: &str,
        breaker: Breaker,
    ) -> Result<BreakerId, MotorError> {
        let kind = category.parse()?;
        Ok(self.register(kind, breaker))
    }

    /// Registers `breaker` on `kind`; it runs after those already registered.
    pub fn register(&mut self, kind: MotionKind, breaker: Breaker) -> BreakerId {
        self.breakers.register(kind, breaker)
    }

    /// Removes a breaker from whichever motion holds it.
    pub fn unregister_breaker(&mut self, id: BreakerId) -> Option<Breaker> {
        self.breakers.unregister(id)
    }

    /// Releases the paw's hardware handles.
    pub fn into_parts(self) -> (M, L) {
        (self.motor, self.limits)
    }

    fn run(&mut self, kind: MotionKind) -> Result<Halt, MotorError> {
        let heading = match kind {
            MotionKind::Present => Heading::Forward,
            MotionKind::Retract => Heading::Backward,
        };
        info!(motion = %kind, "Motion started");

        let result = self
            .drive(kind, heading)
            .and_then(|halt| self.back_off(heading).map(|()| halt));
        self.state = PawState::Idle;

        match &result {
            Ok(halt) => info!(motion = %kind, %halt, "Motion finished"),
            Err(e) => warn!(
                motion = %kind,
                error = %e,
                motor = %self.motor.state(),
                "Motion failed"
            ),
        }
        result
    }

    fn drive(&mut self, kind: MotionKind, heading: Heading) -> Result<Halt, MotorError> {
        self.state = PawState::Moving(heading);
        let outcome = self.poll_until_halt(kind, heading);
        self.breakers.cleanup(kind);
        outcome
    }

    fn poll_until_halt(&mut self, kind: MotionKind, heading: Heading) -> Result<Halt, MotorError> {
        self.motor.set_state(heading.motor_state())?;

        let side = loop {
            if self.limits.is_front_pressed()? {
                break Side::Front;
            }
            if self.limits.is_rear_pressed()? {
                break Side::Rear;
            }

            let resume = self.motor.state();
            self.motor.stop()?;
            if let Some(id) = self.breakers.scan(kind)? {
                debug!(motion = %kind, breaker = %id, "Breaker stopped motion");
                return Ok(Halt::Breaker(id));
            }
            self.motor.set_state(resume)?;
        };

        self.motor.stop()?;
        debug!(motion = %kind, %side, "Limit switch reached");
        Ok(Halt::LimitSwitch(side))
    }

    /// Drives away from the limit just reached until it releases or the
    /// opposite one presses. No breakers and no timeout apply here.
    fn back_off(&mut self, heading: Heading) -> Result<(), MotorError> {
        self.state = PawState::BackingOff(heading);
        let (held, opposite) = match heading {
            Heading::Forward => (Side::Front, Side::Rear),
            Heading::Backward => (Side::Rear, Side::Front),
        };

        self.motor.stop()?;
        self.motor.set_state(heading.opposite().motor_state())?;
        while self.is_pressed(held)? && !self.is_pressed(opposite)? {
            std::hint::spin_loop();
        }
        self.motor.stop()?;

        debug!(side = %held, "Backed off limit");
        Ok(())
    }

    fn is_pressed(&self, side: Side) -> Result<bool, MotorError> {
        match side {
            Side::Front => self.limits.is_front_pressed(),
            Side::Rear => self.limits.is_rear_pressed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{Condition, Verdict};
    use crate::devices::driver::{MOTOR_IN1_PIN, MOTOR_IN2_PIN};
    use crate::devices::limits::{FRONT_LIMIT_SWITCH_PIN, REAR_LIMIT_SWITCH_PIN};
    use hambone_gpio::{GpioError, Level, SimulatedBoard, Travel};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    type SimPaw = Paw<MotorDriver<SimulatedBoard>, MotorLimits<SimulatedBoard>>;

    fn paw(board: &SimulatedBoard) -> SimPaw {
        let motor = MotorDriver::new(board.clone(), &MotorConfig::default()).unwrap();
        let limits = MotorLimits::new(board.clone(), &LimitsConfig::default()).unwrap();
        Paw::new(motor, limits)
    }

    fn travel(length: u32) -> Travel {
        Travel::new(
            MOTOR_IN1_PIN,
            MOTOR_IN2_PIN,
            FRONT_LIMIT_SWITCH_PIN,
            REAR_LIMIT_SWITCH_PIN,
            length,
        )
    }

    fn motor_pins(board: &SimulatedBoard) -> (Level, Level) {
        (
            board.level(MOTOR_IN1_PIN).unwrap(),
            board.level(MOTOR_IN2_PIN).unwrap(),
        )
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Breaker {
        let counter = Arc::clone(counter);
        Breaker::custom(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Verdict::Continue
        })
    }

    #[test]
    fn test_motor_stopped_before_every_breaker_evaluation() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.attach_travel(travel(1000).at(500)).unwrap();

        let energized = Arc::new(AtomicBool::new(false));
        let evaluations = Arc::new(AtomicUsize::new(0));
        let probe = {
            let board = board.clone();
            let energized = Arc::clone(&energized);
            let evaluations = Arc::clone(&evaluations);
            move || {
                if motor_pins(&board) != (Level::Low, Level::Low) {
                    energized.store(true, Ordering::SeqCst);
                }
                if evaluations.fetch_add(1, Ordering::SeqCst) + 1 >= 20 {
                    Verdict::Stop
                } else {
                    Verdict::Continue
                }
            }
        };
        let id = paw.register(MotionKind::Present, Breaker::custom(probe));

        assert_eq!(paw.present().unwrap(), Halt::Breaker(id));
        assert_eq!(evaluations.load(Ordering::SeqCst), 20);
        assert!(!energized.load(Ordering::SeqCst));
        assert_eq!(paw.motor_state(), MotorState::Stop);
        assert_eq!(motor_pins(&board), (Level::Low, Level::Low));
        assert_eq!(paw.state(), PawState::Idle);
    }

    #[test]
    fn test_present_then_retract_terminates() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.attach_travel(travel(20)).unwrap();

        assert_eq!(paw.present().unwrap(), Halt::LimitSwitch(Side::Front));
        // Backed off the front stop by one tick.
        assert_eq!(board.travel_position(), Some(19));
        assert_eq!(paw.motor_state(), MotorState::Stop);

        assert_eq!(paw.retract().unwrap(), Halt::LimitSwitch(Side::Rear));
        assert_eq!(board.travel_position(), Some(1));
        assert_eq!(paw.motor_state(), MotorState::Stop);
        assert_eq!(paw.state(), PawState::Idle);
    }

    #[test]
    fn test_retract_from_front_stop_end_to_end() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.attach_travel(travel(5).at(5)).unwrap();
        assert_eq!(board.level(FRONT_LIMIT_SWITCH_PIN).unwrap(), Level::Low);
        assert_eq!(board.level(REAR_LIMIT_SWITCH_PIN).unwrap(), Level::High);
        let before = board.writes().len();

        assert_eq!(paw.reset().unwrap(), Halt::LimitSwitch(Side::Rear));

        let writes = board.writes()[before..].to_vec();
        let backward = [
            (MOTOR_IN2_PIN.to_string(), Level::Low),
            (MOTOR_IN1_PIN.to_string(), Level::High),
        ];
        let forward = [
            (MOTOR_IN1_PIN.to_string(), Level::Low),
            (MOTOR_IN2_PIN.to_string(), Level::High),
        ];
        assert_eq!(writes[..2], backward);
        let backoff_at = writes.windows(2).rposition(|pair| pair == forward).unwrap();
        // Back-off drives forward, then the final write pair is a stop.
        assert_eq!(writes.len(), backoff_at + 4);
        assert_eq!(motor_pins(&board), (Level::Low, Level::Low));
        assert_eq!(board.level(REAR_LIMIT_SWITCH_PIN).unwrap(), Level::High);
        assert_eq!(paw.motor_state(), MotorState::Stop);
    }

    #[test]
    fn test_front_wins_when_both_limits_pressed() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.drive_input(FRONT_LIMIT_SWITCH_PIN, Level::Low).unwrap();
        board.drive_input(REAR_LIMIT_SWITCH_PIN, Level::Low).unwrap();
        let stop = [
            (MOTOR_IN2_PIN.to_string(), Level::Low),
            (MOTOR_IN1_PIN.to_string(), Level::Low),
        ];

        for motion in [SimPaw::present, SimPaw::retract] {
            let before = board.writes().len();
            assert_eq!(motion(&mut paw).unwrap(), Halt::LimitSwitch(Side::Front));

            // Drive, stop, stop, reverse, stop: the back-off exits at once
            // because the opposite switch is pressed too.
            let writes = board.writes()[before..].to_vec();
            assert_eq!(writes.len(), 10);
            assert_eq!(writes[8..], stop);
            assert_eq!(paw.motor_state(), MotorState::Stop);
            assert_eq!(paw.state(), PawState::Idle);
        }
    }

    #[test]
    fn test_unknown_category_fails_before_motion() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        let before = board.writes().len();

        assert!(matches!(
            paw.register_breaker("sideways", Breaker::Null),
            Err(MotorError::UnknownBreakerCategory(name)) if name == "sideways"
        ));
        assert_eq!(board.writes().len(), before);
        assert!(paw.breakers().ids(MotionKind::Present).is_empty());
        assert!(paw.breakers().ids(MotionKind::Retract).is_empty());

        assert!(paw.register_breaker("retract", Breaker::Null).is_ok());
        assert_eq!(paw.breakers().ids(MotionKind::Retract).len(), 1);
    }

    #[test]
    fn test_time_expired_fails_present_after_deadline() {
        // No travel attached: the pulled-up switches never press.
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        let limit = Duration::from_millis(40);
        paw.register_breaker("present", Breaker::time_expired(limit)).unwrap();

        let started = Instant::now();
        let err = paw.present().unwrap_err();
        let elapsed = started.elapsed();

        match err {
            MotorError::Timeout(timeout) => {
                assert_eq!(timeout.limit, limit);
                assert!(timeout.elapsed >= limit);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(elapsed >= limit);
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(paw.motor_state(), MotorState::Stop);
        assert_eq!(paw.state(), PawState::Idle);
    }

    #[test]
    fn test_unregistered_breaker_is_not_evaluated() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = paw.register(MotionKind::Present, counting(&evaluations));
        let null = paw.register(MotionKind::Present, Breaker::Null);

        assert_eq!(paw.present().unwrap(), Halt::Breaker(null));
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        assert!(paw.unregister_breaker(counter).is_some());
        assert_eq!(paw.present().unwrap(), Halt::Breaker(null));
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    }

    struct CleanupProbe {
        cleanups: Arc<AtomicUsize>,
    }

    impl Condition for CleanupProbe {
        fn evaluate(&mut self) -> Verdict {
            Verdict::Continue
        }

        fn cleanup(&mut self) -> Result<(), MotorError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failing_breaker_cleans_up_and_stops_motor() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        let cleanups = Arc::new(AtomicUsize::new(0));
        paw.register(
            MotionKind::Retract,
            Breaker::custom(CleanupProbe {
                cleanups: Arc::clone(&cleanups),
            }),
        );
        paw.register(MotionKind::Retract, Breaker::Error("door open".into()));

        assert_eq!(paw.retract(), Err(MotorError::Aborted("door open".into())));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(paw.motor_state(), MotorState::Stop);
        assert_eq!(motor_pins(&board), (Level::Low, Level::Low));
    }

    #[test]
    fn test_null_breaker_still_backs_off() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.attach_travel(travel(10).at(5)).unwrap();
        let id = paw.register_breaker("retract", Breaker::Null).unwrap();

        assert_eq!(paw.retract().unwrap(), Halt::Breaker(id));
        // Neither switch pressed: the back-off drives forward and stops at once.
        let writes = board.writes();
        let tail = &writes[writes.len() - 2..];
        assert_eq!(
            tail,
            [
                (MOTOR_IN2_PIN.to_string(), Level::Low),
                (MOTOR_IN1_PIN.to_string(), Level::Low)
            ]
        );
        assert_eq!(paw.motor_state(), MotorState::Stop);
    }

    #[test]
    fn test_timeout_breaker_rearms_for_next_motion() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.attach_travel(travel(10).at(5)).unwrap();
        let timer = paw
            .register_breaker("present", Breaker::time_expired(Duration::from_secs(60)))
            .unwrap();

        assert_eq!(paw.present().unwrap(), Halt::LimitSwitch(Side::Front));
        match paw.unregister_breaker(timer) {
            Some(Breaker::TimeExpired(timer)) => assert!(!timer.is_armed()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_read_fault_propagates_without_implicit_stop() {
        let board = SimulatedBoard::new();
        let mut paw = paw(&board);
        board.fail_next_read(FRONT_LIMIT_SWITCH_PIN);

        assert!(matches!(paw.present(), Err(MotorError::Gpio(GpioError::Io { .. }))));
        assert_eq!(paw.motor_state(), MotorState::Forward);
        assert_eq!(paw.state(), PawState::Idle);
    }

    #[test]
    fn test_acquire_registers_default_timeouts() {
        let board = SimulatedBoard::new();
        let registry = HardwareRegistry::new();

        let paw = Paw::acquire(&registry, &board, &PawConfig::default()).unwrap();
        assert_eq!(paw.breakers().ids(MotionKind::Present).len(), 1);
        assert_eq!(paw.breakers().ids(MotionKind::Retract).len(), 1);
        drop(paw);
        // One cleanup per resource class.
        assert_eq!(board.release_count(), 2);

        let config = PawConfig {
            motion_timeout_ms: 0,
            ..PawConfig::default()
        };
        assert_eq!(config.motion_timeout(), None);
        let paw = Paw::acquire(&registry, &board, &config).unwrap();
        assert!(paw.breakers().ids(MotionKind::Present).is_empty());
    }

    #[test]
    fn test_shared_paws_share_hardware() {
        let board = SimulatedBoard::new();
        let registry = HardwareRegistry::new();
        let config = PawConfig::default();

        let first = Paw::acquire(&registry, &board, &config).unwrap();
        let second = Paw::acquire(&registry, &board, &config).unwrap();
        let (motor_a, _) = first.into_parts();
        let (motor_b, _) = second.into_parts();
        assert!(motor_a.same_instance(&motor_b));
        assert_eq!(
            registry.count(&MotorDriver::<SimulatedBoard>::resource_key(&config.motor)),
            2
        );
    }
}
