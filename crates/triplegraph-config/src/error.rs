//! Failures while assembling the settings of an import run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings file exists but could not be read
    #[error("cannot read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A settings file is not TOML, or names a key or value the import
    /// policy does not know
    #[error("bad settings in '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Settings files that are each valid but do not combine
    #[error("combined settings files are inconsistent: {0}")]
    Layering(#[source] toml::de::Error),

    /// A flat parameter map could not be read as an import policy
    #[error("invalid import parameters: {0}")]
    ParseParams(#[from] serde_json::Error),

    #[error("cannot render settings as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot write settings file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create settings directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One policy option holds a value outside its range
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Options that are fine alone but contradict each other
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Reject `key` with a short reason, e.g. "must be greater than zero".
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
