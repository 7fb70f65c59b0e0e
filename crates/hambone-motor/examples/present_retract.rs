use hambone_gpio::{HardwareRegistry, SimulatedBoard, Travel};
use hambone_motor::{Breaker, MotionKind, Paw, PawConfig, Verdict};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TRAVEL_TICKS: u32 = 50;

fn main() -> Result<(), hambone_motor::MotorError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .init();

    let config = PawConfig::default();
    let board = SimulatedBoard::new();
    board.attach_travel(Travel::new(
        config.motor.in1_pin.as_str(),
        config.motor.in2_pin.as_str(),
        config.limits.front_pin.as_str(),
        config.limits.rear_pin.as_str(),
        TRAVEL_TICKS,
    ))?;

    let mut paw = Paw::acquire(HardwareRegistry::global(), &board, &config)?;

    // Count polling iterations on the way out.
    let mut polls = 0u32;
    let probe = paw.register(
        MotionKind::Present,
        Breaker::custom(move || {
            polls += 1;
            info!(polls, "Present poll");
            Verdict::Continue
        }),
    );

    let halt = paw.reset()?;
    info!(%halt, position = ?board.travel_position(), "Reset");

    let halt = paw.present()?;
    info!(%halt, position = ?board.travel_position(), "Presented");

    paw.unregister_breaker(probe);
    let halt = paw.retract()?;
    info!(%halt, position = ?board.travel_position(), "Retracted");

    Ok(())
}
