use std::env;

use config::{Config, ConfigError, Environment, File, FileFormat};
use hambone_motor::PawConfig;
use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const CONFIG_PATH_VAR: &str = "HAMBONE_CONFIG";
const ENV_PREFIX: &str = "HAMBONE";

/// Top-level settings for the presenter binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paw: PawConfig,
    pub demo: DemoConfig,
}

/// Settings for the scripted present/retract cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Pause between motions.
    pub pause_ms: u64,
    /// Ticks between the simulated end stops.
    pub travel_ticks: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pause_ms: 10_000,
            travel_ticks: 200,
        }
    }
}

/// Layers the optional TOML file and `HAMBONE__`-prefixed environment
/// variables (e.g. `HAMBONE__DEMO__PAUSE_MS=500`) over the defaults.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    info!("Attempting to load configuration from {}", path);

    let settings = Config::builder()
        .add_source(File::new(&path, FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|config| config.try_deserialize::<AppConfig>());

    match settings {
        Ok(config) => {
            info!("Successfully loaded configuration: {:?}", config);
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}
