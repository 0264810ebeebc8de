//! Configuration: an optional TOML file layered under CLI flags. Recognized
//! options are `event_port`, `client_port`, `log_level`, `max_capacity`,
//! `timeout_s`.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_EVENT_PORT: u16 = 9090;
const DEFAULT_CLIENT_PORT: u16 = 9099;
const DEFAULT_LOG_LEVEL: u8 = 2; // Warn, in log::LevelFilter ordinal order

/// The validated, fully-defaulted configuration the rest of the service
/// consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  pub event_port: u16,
  pub client_port: u16,
  pub log_level: u8,
  pub max_capacity: Option<usize>,
  pub timeout: Option<Duration>,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      event_port: DEFAULT_EVENT_PORT,
      client_port: DEFAULT_CLIENT_PORT,
      log_level: DEFAULT_LOG_LEVEL,
      max_capacity: None,
      timeout: None,
    }
  }
}

/// The raw shape of the optional TOML config file; every field is
/// optional so a file may set as few or as many options as it likes.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
  event_port: Option<u16>,
  client_port: Option<u16>,
  log_level: Option<u8>,
  max_capacity: Option<usize>,
  timeout_s: Option<f64>,
}

impl RawConfig {
  fn into_config(self) -> Result<Config, ConfigError> {
    let timeout = match self.timeout_s {
      Some(secs) if secs < 0.0 => {
        return Err(ConfigError::InvalidValue {
          field: "timeout_s",
          reason: "must be non-negative".to_owned(),
        })
      }
      Some(secs) => Some(Duration::from_secs_f64(secs)),
      None => None,
    };
    Ok(Config {
      event_port: self.event_port.unwrap_or(DEFAULT_EVENT_PORT),
      client_port: self.client_port.unwrap_or(DEFAULT_CLIENT_PORT),
      log_level: self.log_level.unwrap_or(DEFAULT_LOG_LEVEL),
      max_capacity: self.max_capacity,
      timeout,
    })
  }
}

/// Loads and validates a config file. Every field is optional in the
/// file itself; defaults are applied for anything left unset.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.display().to_string(),
    source,
  })?;
  let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
    path: path.display().to_string(),
    source,
  })?;
  raw.into_config()
}

/// Command-line flags. Any flag the caller actually passes overrides
/// whatever the config file (if any) supplied.
#[derive(Debug, Parser)]
#[command(name = "eventrelay", about = "Sequenced social-graph event relay")]
pub struct CliArgs {
  /// Optional TOML config file to load before applying flag overrides.
  #[arg(long)]
  pub config: Option<std::path::PathBuf>,

  #[arg(long)]
  pub event_port: Option<u16>,

  #[arg(long)]
  pub client_port: Option<u16>,

  /// Severity ordinal: 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace.
  #[arg(long)]
  pub log_level: Option<u8>,

  #[arg(long)]
  pub max_capacity: Option<usize>,

  /// Reorder queue timeout, in fractional seconds.
  #[arg(long)]
  pub timeout_s: Option<f64>,
}

impl CliArgs {
  /// Resolves this command line into a concrete `Config`, loading
  /// `--config` first if given.
  pub fn resolve(self) -> Result<Config, ConfigError> {
    let mut config = match &self.config {
      Some(path) => load_config_file(path)?,
      None => Config::default(),
    };
    if let Some(v) = self.event_port {
      config.event_port = v;
    }
    if let Some(v) = self.client_port {
      config.client_port = v;
    }
    if let Some(v) = self.log_level {
      config.log_level = v;
    }
    if let Some(v) = self.max_capacity {
      config.max_capacity = Some(v);
    }
    if let Some(secs) = self.timeout_s {
      if secs < 0.0 {
        return Err(ConfigError::InvalidValue {
          field: "timeout_s",
          reason: "must be non-negative".to_owned(),
        });
      }
      config.timeout = Some(Duration::from_secs_f64(secs));
    }
    Ok(config)
  }
}
