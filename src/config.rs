//! Launch configuration (SPEC_FULL §6). Mirrors the teacher's
//! `serde_yaml` + `#[serde(deny_unknown_fields)]` convention for PLC
//! definitions, scaled down to this daemon's handful of knobs.

use serde::Deserialize;
use std::fs;
use std::path::Path;

fn default_listen() -> String {
    "0.0.0.0:7002".to_owned()
}

fn default_max_clients() -> usize {
    16
}

fn default_pv_name_max() -> usize {
    64
}

fn default_buffer_size() -> usize {
    4096
}

fn default_select_timeout_ms() -> u64 {
    10
}

fn default_tick_period_ms() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Target-name truncation length (spec §4.4), read by
    /// [`crate::protocol::parse`].
    #[serde(default = "default_pv_name_max")]
    pub pv_name_max: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_select_timeout_ms")]
    pub select_timeout_ms: u64,
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_clients: default_max_clients(),
            pv_name_max: default_pv_name_max(),
            buffer_size: default_buffer_size(),
            select_timeout_ms: default_select_timeout_ms(),
            tick_period_ms: default_tick_period_ms(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl Config {
    /// Loads a YAML config file. A missing file is not an error: this
    /// falls back to all defaults (and the caller logs that choice), since
    /// the daemon must still be runnable with zero setup.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        Ok(serde_yaml::from_str(&text)?)
    }
}
