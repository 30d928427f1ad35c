use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub booking: BookingConfig,
    pub ticket: TicketConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// Upper bound on how long the slot acquisition may wait on a
    /// concurrent holder before reporting the slot as unavailable.
    #[serde(default = "default_slot_lock_timeout_ms")]
    pub slot_lock_timeout_ms: u64,
}

fn default_slot_lock_timeout_ms() -> u64 {
    750
}

#[derive(Debug, Deserialize, Clone)]
pub struct TicketConfig {
    /// Per-step timeout for render and channel sends.
    #[serde(default = "default_step_timeout_seconds")]
    pub step_timeout_seconds: u64,
}

fn default_step_timeout_seconds() -> u64 {
    20
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of RESERVA)
            .add_source(config::Environment::with_prefix("RESERVA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
