mod demo; // present/retract cycle on the simulated board
mod settings; // `config/default.toml` + HAMBONE__ environment overrides

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("HAMBone presenter started.");
    let config = settings::load_config().context("failed to load configuration")?;

    demo::run(&config)?;
    info!("HAMBone presenter finished.");
    Ok(())
}
