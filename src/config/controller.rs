//! Controller configuration structures.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "FLEET_CONFIG";

/// Renegotiation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenegotiationConfig {
    /// Minimum ticks between two offers for the same entry.
    pub notice_interval_ticks: u64,
    /// Offers are never earlier than `now + min_offer_lead_ticks`.
    pub min_offer_lead_ticks: u64,
    /// Horizon used when no slot carries a completion estimate.
    pub default_horizon_ticks: u64,
    /// Offers per entry before it is dropped.
    pub max_rounds: u32,
}

impl Default for RenegotiationConfig {
    fn default() -> Self {
        Self {
            notice_interval_ticks: 5,
            min_offer_lead_ticks: 5,
            default_horizon_ticks: 10,
            max_rounds: 3,
        }
    }
}

/// Named-pipe locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Directory holding all pipes.
    pub dir: PathBuf,
    /// Well-known controller-bound pipe name.
    pub controller_pipe: String,
    /// Reply pipe name prefix; the client pid is appended.
    pub client_pipe_prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            controller_pipe: "controlador_fifo".into(),
            client_pipe_prefix: "pipe".into(),
        }
    }
}

impl ChannelConfig {
    /// Full path of the controller pipe.
    #[must_use]
    pub fn controller_pipe_path(&self) -> PathBuf {
        self.dir.join(&self.controller_pipe)
    }
}

/// Root controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Number of fleet slots.
    pub max_vehicles: usize,
    /// Number of session slots.
    pub max_clients: usize,
    /// Schedule queue capacity.
    pub max_schedule: usize,
    /// Wall-clock length of one tick in milliseconds.
    pub tick_ms: u64,
    /// Renegotiation policy.
    pub renegotiation: RenegotiationConfig,
    /// Worker progress line cadence, in percent.
    pub progress_step_percent: u32,
    /// Pipe locations.
    pub channel: ChannelConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_vehicles: 10,
            max_clients: 2,
            max_schedule: 50,
            tick_ms: 1000,
            renegotiation: RenegotiationConfig::default(),
            progress_step_percent: 10,
            channel: ChannelConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Wall-clock length of one tick.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_vehicles == 0 {
            return Err("max_vehicles must be greater than 0".into());
        }
        if self.max_clients == 0 {
            return Err("max_clients must be greater than 0".into());
        }
        if self.max_schedule == 0 {
            return Err("max_schedule must be greater than 0".into());
        }
        if self.tick_ms == 0 {
            return Err("tick_ms must be greater than 0".into());
        }
        if self.progress_step_percent == 0 || self.progress_step_percent > 100 {
            return Err("progress_step_percent must be between 1 and 100".into());
        }
        if self.channel.controller_pipe.is_empty() {
            return Err("channel.controller_pipe must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present, then the JSON file named by `FLEET_CONFIG`
    /// (defaults otherwise), then applies `FLEET_VEHICLES`, `FLEET_CLIENTS`,
    /// `FLEET_TICK_MS` and `FLEET_PIPE_DIR` overrides.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unreadable or invalid value.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();

        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read {path}: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error in {path}: {e}"))?
            }
            Err(_) => Self::default(),
        };

        if let Some(v) = env_parse("FLEET_VEHICLES")? {
            cfg.max_vehicles = v;
        }
        if let Some(v) = env_parse("FLEET_CLIENTS")? {
            cfg.max_clients = v;
        }
        if let Some(v) = env_parse("FLEET_TICK_MS")? {
            cfg.tick_ms = v;
        }
        if let Ok(dir) = std::env::var("FLEET_PIPE_DIR") {
            cfg.channel.dir = PathBuf::from(dir);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{key}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}
