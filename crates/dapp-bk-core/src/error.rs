//! Error types for dapp-bk-core

use dapp_bk_provider::ContainerStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] dapp_bk_config::ConfigError),

    #[error(transparent)]
    Provider(#[from] dapp_bk_provider::ProviderError),

    #[error("Container '{0}' not found")]
    ContainerNotFound(String),

    #[error("Container '{name}' is not running (status: {status})")]
    NotRunning {
        name: String,
        status: ContainerStatus,
    },

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("containers-names.txt not found at {0}\nRun the build command first to create containers")]
    NamesFileMissing(PathBuf),

    #[error("No container names listed in {0}")]
    NamesFileEmpty(PathBuf),

    #[error("Failed to create network {name}: {source}")]
    NetworkCreate {
        name: String,
        source: dapp_bk_provider::ProviderError,
    },

    #[error("Failed to build/run container: {0}")]
    BuildFailed(dapp_bk_provider::ProviderError),

    #[error("{0}")]
    ComposerSetup(String),

    #[error("Composer install failed (exit code {0})")]
    InstallFailed(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
