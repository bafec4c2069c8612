//! Runtime configuration loaded from defaults, an optional JSON file and the
//! process environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::DEFAULT_SAMPLE_ROWS;
use crate::translate::{DEFAULT_ENDPOINT, DEFAULT_MODEL};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
pub const DEFAULT_TABLE_NAME: &str = "dataset";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_upload_bytes: usize,
    pub sample_rows: usize,
    pub table_name: String,
    /// Where raw uploads are kept. A temporary directory when unset.
    pub upload_dir: Option<PathBuf>,
    pub model_name: String,
    pub model_endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            upload_dir: None,
            model_name: DEFAULT_MODEL.to_string(),
            model_endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            request_timeout_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Reads a JSON file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies every variable `lookup` knows about on top of `self`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TABLESAGE_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_number("TABLESAGE_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("TABLESAGE_SAMPLE_ROWS") {
            self.sample_rows = parse_number("TABLESAGE_SAMPLE_ROWS", &v)?;
        }
        if let Some(v) = lookup("TABLESAGE_TABLE_NAME") {
            self.table_name = v;
        }
        if let Some(v) = lookup("TABLESAGE_UPLOAD_DIR") {
            self.upload_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TABLESAGE_MODEL") {
            self.model_name = v;
        }
        if let Some(v) = lookup("TABLESAGE_MODEL_ENDPOINT") {
            self.model_endpoint = v;
        }
        if let Some(v) = lookup("GOOGLE_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("TABLESAGE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("TABLESAGE_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TABLESAGE_LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(self)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
