//! Runtime configuration from environment variables.
//!
//! | Variable                  | Default      |
//! |---------------------------|--------------|
//! | `KB_IMPORT_DATA_DIR`      | `.kb-import` |
//! | `KB_IMPORT_ROW_DELAY_MS`  | `50`         |
//! | `KB_IMPORT_PORT`          | `3000`       |
//! | `KB_IMPORT_MAX_FILE_SIZE` | 50 MiB       |
//!
//! A `.env` file is loaded first when present. CLI flags override these
//! values per command.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_DATA_DIR: &str = ".kb-import";
pub const DEFAULT_ROW_DELAY_MS: u64 = 50;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the document store, mapping registry and backups
    pub data_dir: PathBuf,
    pub row_delay_ms: u64,
    pub port: u16,
    /// Upload limit for the HTTP API, in bytes
    pub max_file_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            row_delay_ms: DEFAULT_ROW_DELAY_MS,
            port: DEFAULT_PORT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`; unset or blank keys keep their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            data_dir: value("KB_IMPORT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            row_delay_ms: parse_var("KB_IMPORT_ROW_DELAY_MS", value("KB_IMPORT_ROW_DELAY_MS"))?
                .unwrap_or(defaults.row_delay_ms),
            port: parse_var("KB_IMPORT_PORT", value("KB_IMPORT_PORT"))?.unwrap_or(defaults.port),
            max_file_size: parse_var("KB_IMPORT_MAX_FILE_SIZE", value("KB_IMPORT_MAX_FILE_SIZE"))?
                .unwrap_or(defaults.max_file_size),
        })
    }

    pub fn row_delay(&self) -> Duration {
        Duration::from_millis(self.row_delay_ms)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

fn parse_var<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|v| {
        v.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: v })
    })
    .transpose()
}
