use std::time::{Duration, Instant};

use anyhow::Context;
use hambone_gpio::{HardwareRegistry, SimulatedBoard, Travel};
use hambone_motor::{Halt, MotorError, Paw, SharedPaw};
use spin_sleep::SpinSleeper;
use tracing::info;

use crate::settings::AppConfig;

type DemoPaw = SharedPaw<SimulatedBoard>;
type Motion = fn(&mut DemoPaw) -> Result<Halt, MotorError>;

/// Reset, present, then reset again, pausing between motions.
const SEQUENCE: [(&str, Motion); 3] = [
    ("reset", DemoPaw::reset),
    ("present", DemoPaw::present),
    ("reset", DemoPaw::reset),
];

/// Runs the present/retract cycle against a simulated board whose travel
/// follows the configured pins.
pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let paw_config = &config.paw;
    let board = SimulatedBoard::new();
    board
        .attach_travel(Travel::new(
            paw_config.motor.in1_pin.as_str(),
            paw_config.motor.in2_pin.as_str(),
            paw_config.limits.front_pin.as_str(),
            paw_config.limits.rear_pin.as_str(),
            config.demo.travel_ticks,
        ))
        .context("failed to attach simulated travel")?;

    let mut paw = Paw::acquire(HardwareRegistry::global(), &board, paw_config)
        .context("failed to set up the paw")?;
    info!(timeout_ms = paw_config.motion_timeout_ms, "Paw ready");

    let sleeper = SpinSleeper::new(1_000);
    let pause = Duration::from_millis(config.demo.pause_ms);

    for (index, (name, motion)) in SEQUENCE.iter().enumerate() {
        if index > 0 {
            info!(pause_ms = config.demo.pause_ms, "Pausing");
            sleeper.sleep(pause);
        }

        let started = Instant::now();
        let halt = motion(&mut paw).with_context(|| format!("{name} failed"))?;
        info!(
            step = *name,
            %halt,
            elapsed_us = started.elapsed().as_micros() as u64,
            position = ?board.travel_position(),
            "Step complete"
        );
    }
    Ok(())
}
