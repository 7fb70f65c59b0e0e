//! Simulated BeagleBone Black headers.
//!
//! The board exposes the P8 and P9 expansion headers (pins 1 to 46) behind
//! the [`DigitalIo`] capability. Every clone of a [`SimulatedBoard`] shares
//! the same pin state, so a motor driver and a limit reader built from two
//! clones see each other's writes exactly as they would on real hardware.
//!
//! A [`Travel`] can be attached to stand in for the paw mechanism: it is a
//! tick counter moved by the motor pins, not a model of the arm's dynamics.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{DigitalIo, Direction, GpioError, Level, Pull};

const PINS_PER_HEADER: usize = 46;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header {
    P8,
    P9,
}

#[derive(Debug, Clone, Copy)]
struct PinSlot {
    level: Level,
    mode: Option<(Direction, Pull)>,
    // Set once a test or the travel script has forced the level, so a later
    // `configure` does not overwrite it with the pull level.
    driven: bool,
}

impl Default for PinSlot {
    fn default() -> Self {
        Self {
            level: Level::Low,
            mode: None,
            driven: false,
        }
    }
}

/// Scripted paw mechanism driven by the motor pins.
///
/// Position `0` is the rear end stop and `length` the front end stop. Each
/// read of either limit pin moves the position one tick in the direction the
/// motor pins currently command, then refreshes both limit pins (active-low).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Travel {
    /// Motor IN1 pin name.
    pub in1: String,
    /// Motor IN2 pin name.
    pub in2: String,
    /// Front limit switch pin name.
    pub front: String,
    /// Rear limit switch pin name.
    pub rear: String,
    /// Number of ticks between the two end stops.
    pub length: u32,
    /// Current position in ticks.
    pub position: u32,
}

impl Travel {
    /// Creates a travel resting at the rear end stop.
    pub fn new(
        in1: impl Into<String>,
        in2: impl Into<String>,
        front: impl Into<String>,
        rear: impl Into<String>,
        length: u32,
    ) -> Self {
        Self {
            in1: in1.into(),
            in2: in2.into(),
            front: front.into(),
            rear: rear.into(),
            length,
            position: 0,
        }
    }

    /// Places the mechanism at `position`, clamped to the travel length.
    pub fn at(mut self, position: u32) -> Self {
        self.position = position.min(self.length);
        self
    }
}

#[derive(Debug)]
struct BoardState {
    p8: [PinSlot; PINS_PER_HEADER + 1],
    p9: [PinSlot; PINS_PER_HEADER + 1],
    writes: Vec<(String, Level)>,
    releases: usize,
    failing_writes: HashSet<String>,
    failing_reads: HashSet<String>,
    travel: Option<Travel>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            p8: [PinSlot::default(); PINS_PER_HEADER + 1],
            p9: [PinSlot::default(); PINS_PER_HEADER + 1],
            writes: Vec::new(),
            releases: 0,
            failing_writes: HashSet::new(),
            failing_reads: HashSet::new(),
            travel: None,
        }
    }
}

impl BoardState {
    fn slot(&self, pin: &str) -> Result<&PinSlot, GpioError> {
        let (header, index) = parse_pin_name(pin)?;
        Ok(match header {
            Header::P8 => &self.p8[index],
            Header::P9 => &self.p9[index],
        })
    }

    fn slot_mut(&mut self, pin: &str) -> Result<&mut PinSlot, GpioError> {
        let (header, index) = parse_pin_name(pin)?;
        Ok(match header {
            Header::P8 => &mut self.p8[index],
            Header::P9 => &mut self.p9[index],
        })
    }

    fn force_level(&mut self, pin: &str, level: Level) -> Result<(), GpioError> {
        let slot = self.slot_mut(pin)?;
        slot.level = level;
        slot.driven = true;
        Ok(())
    }

    fn sync_travel(&mut self) -> Result<(), GpioError> {
        let Some(travel) = self.travel.clone() else {
            return Ok(());
        };
        self.force_level(&travel.front, Level::from(travel.position < travel.length))?;
        self.force_level(&travel.rear, Level::from(travel.position > 0))
    }

    fn step_travel(&mut self, pin: &str) -> Result<(), GpioError> {
        let Some(travel) = self.travel.as_ref() else {
            return Ok(());
        };
        if pin != travel.front && pin != travel.rear {
            return Ok(());
        }

        let in1 = self.slot(&travel.in1)?.level;
        let in2 = self.slot(&travel.in2)?.level;
        if let Some(travel) = self.travel.as_mut() {
            match (in1, in2) {
                (Level::Low, Level::High) => {
                    travel.position = (travel.position + 1).min(travel.length);
                }
                (Level::High, Level::Low) => {
                    travel.position = travel.position.saturating_sub(1);
                }
                _ => {}
            }
        }
        self.sync_travel()
    }
}

fn parse_pin_name(pin: &str) -> Result<(Header, usize), GpioError> {
    let unknown = || GpioError::UnknownPin(pin.to_string());
    let (header, number) = pin.split_once('_').ok_or_else(unknown)?;

    let header = match header.to_ascii_uppercase().as_str() {
        "P8" => Header::P8,
        "P9" => Header::P9,
        _ => return Err(unknown()),
    };
    let index: usize = number.parse().map_err(|_| unknown())?;
    if !(1..=PINS_PER_HEADER).contains(&index) {
        return Err(unknown());
    }
    Ok((header, index))
}

/// In-memory stand-in for the BeagleBone GPIO headers.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    /// Creates a board with every pin unconfigured and low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the level seen on an input pin, as an external switch would.
    pub fn drive_input(&self, pin: &str, level: Level) -> Result<(), GpioError> {
        self.state.lock().force_level(pin, level)
    }

    /// Current level of `pin` without any side effect.
    pub fn level(&self, pin: &str) -> Result<Level, GpioError> {
        Ok(self.state.lock().slot(pin)?.level)
    }

    /// Direction and pull the pin was last configured with, if any.
    pub fn configuration(&self, pin: &str) -> Result<Option<(Direction, Pull)>, GpioError> {
        Ok(self.state.lock().slot(pin)?.mode)
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(String, Level)> {
        self.state.lock().writes.clone()
    }

    /// Number of times [`DigitalIo::release_all`] has been called.
    pub fn release_count(&self) -> usize {
        self.state.lock().releases
    }

    /// Makes the next write to `pin` fail with [`GpioError::Io`].
    pub fn fail_next_write(&self, pin: &str) {
        self.state.lock().failing_writes.insert(pin.to_string());
    }

    /// Makes the next read of `pin` fail with [`GpioError::Io`].
    pub fn fail_next_read(&self, pin: &str) {
        self.state.lock().failing_reads.insert(pin.to_string());
    }

    /// Attaches a scripted mechanism and immediately publishes its limit levels.
    pub fn attach_travel(&self, travel: Travel) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        state.travel = Some(travel);
        state.sync_travel()
    }

    /// Current travel position, if a travel is attached.
    pub fn travel_position(&self) -> Option<u32> {
        self.state.lock().travel.as_ref().map(|t| t.position)
    }
}

impl DigitalIo for SimulatedBoard {
    fn configure(&self, pin: &str, direction: Direction, pull: Pull) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        let slot = state.slot_mut(pin)?;
        slot.mode = Some((direction, pull));
        if direction == Direction::Input && !slot.driven {
            match pull {
                Pull::Up => slot.level = Level::High,
                Pull::Down => slot.level = Level::Low,
                Pull::Off => {}
            }
        }
        Ok(())
    }

    fn write(&self, pin: &str, level: Level) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        if state.failing_writes.remove(pin) {
            return Err(GpioError::Io {
                pin: pin.to_string(),
                reason: "injected write fault".to_string(),
            });
        }

        let slot = state.slot_mut(pin)?;
        match slot.mode {
            Some((Direction::Output, _)) => slot.level = level,
            _ => return Err(GpioError::NotOutput(pin.to_string())),
        }
        state.writes.push((pin.to_string(), level));
        Ok(())
    }

    fn read(&self, pin: &str) -> Result<Level, GpioError> {
        let mut state = self.state.lock();
        if state.failing_reads.remove(pin) {
            return Err(GpioError::Io {
                pin: pin.to_string(),
                reason: "injected read fault".to_string(),
            });
        }
        if state.slot(pin)?.mode.is_none() {
            return Err(GpioError::NotConfigured(pin.to_string()));
        }

        state.step_travel(pin)?;
        Ok(state.slot(pin)?.level)
    }

    fn release_all(&self) -> Result<(), GpioError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for slot in state.p8.iter_mut().chain(state.p9.iter_mut()) {
            slot.mode = None;
        }
        state.releases += 1;
        Ok(())
    }
}
