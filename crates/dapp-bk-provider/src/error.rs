//! Error types for container providers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Could not connect to container engine: {0}")]
    ConnectionError(String),

    #[error("Build failed: {0}")]
    BuildError(String),

    #[error("Exec failed: {0}")]
    ExecError(String),

    #[error("Container engine error: {0}")]
    RuntimeError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<bollard::errors::Error> for ProviderError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError { message, .. } => {
                ProviderError::RuntimeError(message)
            }
            other => ProviderError::RuntimeError(other.to_string()),
        }
    }
}

/// True when the engine answered 404 for the requested object
pub(crate) fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

pub type Result<T> = std::result::Result<T, ProviderError>;
