//! Abort conditions evaluated while the paw is moving.
//!
//! A [`Breaker`] is polled once per iteration of a motion's polling loop,
//! with the motor already stopped, and answers with a [`Verdict`]. Breakers
//! are kept per [`MotionKind`] in a [`BreakerRegistry`] and evaluated in
//! registration order; the first one that does not say
//! [`Verdict::Continue`] ends the scan.
//!
//! Evaluation sits on the motor's hot path: every microsecond spent here is
//! a microsecond the motor is coasting, so conditions should be cheap and
//! free of side effects beyond their own bookkeeping.

use core::fmt;
use core::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{MotorError, MotorTimeout};
use crate::traits::motor::Side;

/// Answer of a single breaker evaluation.
#[derive(Debug)]
pub enum Verdict {
    /// Keep moving.
    Continue,
    /// End the move normally.
    Stop,
    /// Abort the move with a failure.
    Fail(MotorError),
}

/// User-defined abort condition.
///
/// Any `FnMut() -> Verdict + Send` closure is a condition.
pub trait Condition: Send {
    /// Evaluates the condition once.
    fn evaluate(&mut self) -> Verdict;

    /// Resets internal state after a motion. Failures are logged, never raised.
    fn cleanup(&mut self) -> Result<(), MotorError> {
        Ok(())
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> Condition for F
where
    F: FnMut() -> Verdict + Send,
{
    fn evaluate(&mut self) -> Verdict {
        self()
    }
}

/// Deadline armed by the first evaluation of a motion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeExpired {
    limit: Duration,
    started: Option<Instant>,
}

impl TimeExpired {
    /// Creates a disarmed deadline of `limit`.
    pub const fn new(limit: Duration) -> Self {
        Self {
            limit,
            started: None,
        }
    }

    /// Configured ceiling.
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Whether the deadline has been started by an evaluation.
    pub const fn is_armed(&self) -> bool {
        self.started.is_some()
    }

    /// Arms on first call; fails with [`MotorTimeout`] once `limit` has
    /// elapsed, disarming itself so the next motion starts fresh.
    pub fn evaluate(&mut self) -> Verdict {
        let now = Instant::now();
        let started = *self.started.get_or_insert(now);
        let elapsed = now.duration_since(started);

        if elapsed >= self.limit {
            self.reset();
            return Verdict::Fail(MotorError::Timeout(MotorTimeout {
                limit: self.limit,
                elapsed,
            }));
        }
        Verdict::Continue
    }

    /// Disarms the deadline.
    pub fn reset(&mut self) {
        self.started = None;
    }
}

/// An abort condition registered on a motion.
pub enum Breaker {
    /// Always stops, on the first evaluation.
    Null,
    /// Fails with a timeout once the motion has run too long.
    TimeExpired(TimeExpired),
    /// Marker for a switch ending the move; behaves like [`Breaker::Null`]
    /// if registered.
    LimitSwitch(Side),
    /// Always fails with [`MotorError::Aborted`] carrying the message.
    Error(String),
    /// User-defined condition.
    Custom(Box<dyn Condition>),
}

impl Breaker {
    /// Timing breaker with the given ceiling.
    pub const fn time_expired(limit: Duration) -> Self {
        Breaker::TimeExpired(TimeExpired::new(limit))
    }

    /// Wraps a user-defined condition.
    pub fn custom(condition: impl Condition + 'static) -> Self {
        Breaker::Custom(Box::new(condition))
    }

    /// Evaluates the breaker once.
    pub fn evaluate(&mut self) -> Verdict {
        match self {
            Breaker::Null | Breaker::LimitSwitch(_) => Verdict::Stop,
            Breaker::TimeExpired(timer) => timer.evaluate(),
            Breaker::Error(reason) => Verdict::Fail(MotorError::Aborted(reason.clone())),
            Breaker::Custom(condition) => condition.evaluate(),
        }
    }

    /// Resets any internal state left by a motion.
    pub fn cleanup(&mut self) -> Result<(), MotorError> {
        match self {
            Breaker::TimeExpired(timer) => {
                timer.reset();
                Ok(())
            }
            Breaker::Custom(condition) => condition.cleanup(),
            Breaker::Null | Breaker::LimitSwitch(_) | Breaker::Error(_) => Ok(()),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Breaker::Null => "null",
            Breaker::TimeExpired(_) => "time_expired",
            Breaker::LimitSwitch(side) => side.name(),
            Breaker::Error(_) => "error",
            Breaker::Custom(condition) => condition.name(),
        }
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Breaker::Null => write!(f, "Null"),
            Breaker::TimeExpired(timer) => f.debug_tuple("TimeExpired").field(timer).finish(),
            Breaker::LimitSwitch(side) => f.debug_tuple("LimitSwitch").field(side).finish(),
            Breaker::Error(reason) => f.debug_tuple("Error").field(reason).finish(),
            Breaker::Custom(condition) => f.debug_tuple("Custom").field(&condition.name()).finish(),
        }
    }
}

/// Motion a breaker applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionKind {
    /// Drive forward to the front limit.
    Present,
    /// Drive backward to the rear limit.
    Retract,
}

impl MotionKind {
    /// Category name accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            MotionKind::Present => "present",
            MotionKind::Retract => "retract",
        }
    }
}

impl fmt::Display for MotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotionKind {
    type Err = MotorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(MotionKind::Present),
            "retract" => Ok(MotionKind::Retract),
            other => Err(MotorError::UnknownBreakerCategory(other.to_string())),
        }
    }
}

/// Handle returned by registration, used to unregister a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakerId(u64);

impl fmt::Display for BreakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered breaker lists, one per motion kind.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    present: Vec<(BreakerId, Breaker)>,
    retract: Vec<(BreakerId, Breaker)>,
    next_id: u64,
}

impl BreakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: MotionKind) -> &[(BreakerId, Breaker)] {
        match kind {
            MotionKind::Present => &self.present,
            MotionKind::Retract => &self.retract,
        }
    }

    fn list_mut(&mut self, kind: MotionKind) -> &mut Vec<(BreakerId, Breaker)> {
        match kind {
            MotionKind::Present => &mut self.present,
            MotionKind::Retract => &mut self.retract,
        }
    }

    /// Appends `breaker` to the list for `kind`.
    pub fn register(&mut self, kind: MotionKind, breaker: Breaker) -> BreakerId {
        let id = BreakerId(self.next_id);
        self.next_id += 1;
        debug!(%kind, %id, breaker = breaker.name(), "Breaker registered");
        self.list_mut(kind).push((id, breaker));
        id
    }

    /// Removes the breaker with `id` from whichever list holds it.
    pub fn unregister(&mut self, id: BreakerId) -> Option<Breaker> {
        for kind in [MotionKind::Present, MotionKind::Retract] {
            let list = self.list_mut(kind);
            if let Some(index) = list.iter().position(|(held, _)| *held == id) {
                let (_, breaker) = list.remove(index);
                debug!(%kind, %id, "Breaker unregistered");
                return Some(breaker);
            }
        }
        None
    }

    /// Ids registered for `kind`, in evaluation order.
    pub fn ids(&self, kind: MotionKind) -> Vec<BreakerId> {
        self.list(kind).iter().map(|(id, _)| *id).collect()
    }

    /// Evaluates the breakers for `kind` in order.
    ///
    /// Returns the id of the first breaker that stops, the failure of the
    /// first that fails, or `None` when all of them continue.
    pub fn scan(&mut self, kind: MotionKind) -> Result<Option<BreakerId>, MotorError> {
        for (id, breaker) in self.list_mut(kind).iter_mut() {
            match breaker.evaluate() {
                Verdict::Continue => {}
                Verdict::Stop => return Ok(Some(*id)),
                Verdict::Fail(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Cleans up every breaker for `kind`. Failures are logged and dropped
    /// so they cannot mask the outcome of the motion.
    pub fn cleanup(&mut self, kind: MotionKind) {
        for (id, breaker) in self.list_mut(kind).iter_mut() {
            if let Err(e) = breaker.cleanup() {
                warn!(%kind, %id, breaker = breaker.name(), error = %e, "Breaker cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>, verdict: fn() -> Verdict) -> Breaker {
        let counter = Arc::clone(counter);
        Breaker::custom(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            verdict()
        })
    }

    #[test]
    fn test_motion_kind_parsing() {
        assert_eq!("present".parse::<MotionKind>().unwrap(), MotionKind::Present);
        assert_eq!("retract".parse::<MotionKind>().unwrap(), MotionKind::Retract);
        assert!(matches!(
            "rear".parse::<MotionKind>(),
            Err(MotorError::UnknownBreakerCategory(name)) if name == "rear"
        ));
    }

    #[test]
    fn test_fixed_variants() {
        assert!(matches!(Breaker::Null.evaluate(), Verdict::Stop));
        assert!(matches!(Breaker::LimitSwitch(Side::Rear).evaluate(), Verdict::Stop));
        assert!(matches!(
            Breaker::Error("boom".into()).evaluate(),
            Verdict::Fail(MotorError::Aborted(reason)) if reason == "boom"
        ));
        assert_eq!(Breaker::LimitSwitch(Side::Front).name(), "front");
    }

    #[test]
    fn test_time_expired_arms_then_fires() {
        let mut timer = TimeExpired::new(Duration::from_millis(20));
        assert!(!timer.is_armed());
        let started = Instant::now();
        assert!(matches!(timer.evaluate(), Verdict::Continue));
        assert!(timer.is_armed());

        let failure = loop {
            if let Verdict::Fail(e) = timer.evaluate() {
                break e;
            }
        };
        assert!(started.elapsed() >= Duration::from_millis(20));
        match failure {
            MotorError::Timeout(timeout) => {
                assert_eq!(timeout.limit, Duration::from_millis(20));
                assert!(timeout.elapsed >= timeout.limit);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_cleanup_disarms_timer() {
        let mut breaker = Breaker::time_expired(Duration::from_secs(60));
        breaker.evaluate();
        breaker.cleanup().unwrap();
        match breaker {
            Breaker::TimeExpired(timer) => assert!(!timer.is_armed()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_scan_stops_at_first_non_continue() {
        let first = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let mut registry = BreakerRegistry::new();
        registry.register(MotionKind::Present, counting(&first, || Verdict::Continue));
        let stopper = registry.register(MotionKind::Present, Breaker::Null);
        registry.register(MotionKind::Present, counting(&last, || Verdict::Continue));

        assert_eq!(registry.scan(MotionKind::Present).unwrap(), Some(stopper));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 0);

        // The other kind is untouched.
        assert_eq!(registry.scan(MotionKind::Retract).unwrap(), None);
    }

    #[test]
    fn test_scan_surfaces_failure() {
        let mut registry = BreakerRegistry::new();
        registry.register(MotionKind::Retract, Breaker::Error("jammed".into()));
        assert_eq!(
            registry.scan(MotionKind::Retract),
            Err(MotorError::Aborted("jammed".into()))
        );
    }

    #[test]
    fn test_unregister_searches_all_kinds() {
        let mut registry = BreakerRegistry::new();
        let a = registry.register(MotionKind::Present, Breaker::Null);
        let b = registry.register(MotionKind::Retract, Breaker::Null);
        assert_ne!(a, b);

        assert!(matches!(registry.unregister(b), Some(Breaker::Null)));
        assert!(registry.ids(MotionKind::Retract).is_empty());
        assert_eq!(registry.ids(MotionKind::Present), vec![a]);
        assert!(registry.unregister(b).is_none());
    }

    struct FailingCleanup {
        cleanups: Arc<AtomicUsize>,
    }

    impl Condition for FailingCleanup {
        fn evaluate(&mut self) -> Verdict {
            Verdict::Continue
        }

        fn cleanup(&mut self) -> Result<(), MotorError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Err(MotorError::Aborted("cleanup".into()))
        }
    }

    #[test]
    fn test_cleanup_is_best_effort() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let mut registry = BreakerRegistry::new();
        registry.register(
            MotionKind::Present,
            Breaker::custom(FailingCleanup {
                cleanups: Arc::clone(&cleanups),
            }),
        );
        registry.register(
            MotionKind::Present,
            Breaker::custom(FailingCleanup {
                cleanups: Arc::clone(&cleanups),
            }),
        );
        registry.cleanup(MotionKind::Present);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }
}
