//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find project root with build/.env file (searched {searched} levels up from {start})")]
    RootNotFound { start: PathBuf, searched: usize },

    #[error("Environment file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load environment from {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("{0} must be set in build/.env")]
    MissingKey(&'static str),

    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config at {path}: {source}")]
    TomlParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to determine config directory")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
