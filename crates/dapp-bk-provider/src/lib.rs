//! Container engine boundary for dapp-bk
//!
//! `ContainerProvider` is the only surface that talks to the container
//! engine. Orchestration in `dapp-bk-core` is written against the trait so it
//! can be exercised with a fake.

mod docker;
mod error;
mod types;

pub use docker::DockerProvider;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use dapp_bk_config::GlobalConfig;
use tokio::sync::mpsc;

/// Trait for container engines (Docker, Podman's Docker-compatible API)
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    /// Look up a network by name. `Ok(None)` when it does not exist.
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkDetails>>;

    /// Create a bridge network, returning its ID
    async fn create_network(&self, name: &str) -> Result<String>;

    /// Look up a container by name or ID. `Ok(None)` when it does not exist.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>>;

    /// Build an image from a Dockerfile
    async fn build(&self, config: &BuildConfig) -> Result<ImageId>;

    /// Build an image with progress streaming
    /// Build log lines are sent to the provided channel
    async fn build_with_progress(
        &self,
        config: &BuildConfig,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId>;

    /// Create a container from an image
    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId>;

    /// Start a container
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Stop a container
    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()>;

    /// Remove a container, optionally with its anonymous volumes
    async fn remove(&self, id: &ContainerId, remove_volumes: bool) -> Result<()>;

    /// Execute a command in a running container and collect its output
    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult>;

    /// Execute a command, streaming combined stdout/stderr to the channel.
    /// Returns the exit code.
    async fn exec_with_progress(
        &self,
        id: &ContainerId,
        config: &ExecConfig,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<i64>;

    /// Check if the engine is reachable
    async fn ping(&self) -> Result<()>;

    /// Get provider information
    fn info(&self) -> ProviderInfo;
}

/// Factory function to create a provider based on type.
///
/// Fails unless the engine answers a ping.
pub async fn create_provider(
    provider_type: ProviderType,
    config: &GlobalConfig,
) -> Result<Box<dyn ContainerProvider>> {
    let provider: Box<dyn ContainerProvider> = match provider_type {
        ProviderType::Docker => Box::new(DockerProvider::new(&config.providers.docker.socket)?),
        ProviderType::Podman => {
            Box::new(DockerProvider::new_podman(&config.providers.podman.socket)?)
        }
    };

    provider.ping().await?;
    Ok(provider)
}

/// Create the provider selected by global config (or an explicit override).
/// Connection failures carry instructions for getting the engine running.
pub async fn create_default_provider(
    config: &GlobalConfig,
    override_type: Option<ProviderType>,
) -> Result<Box<dyn ContainerProvider>> {
    let provider_type = match override_type {
        Some(pt) => pt,
        None => config.defaults.provider.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Unknown provider '{}' in config, using docker",
                config.defaults.provider
            );
            ProviderType::Docker
        }),
    };

    let socket_path = match provider_type {
        ProviderType::Podman => &config.providers.podman.socket,
        ProviderType::Docker => &config.providers.docker.socket,
    };

    match create_provider(provider_type, config).await {
        Ok(provider) => Ok(provider),
        Err(e) => {
            let socket_exists = std::path::Path::new(socket_path).exists();
            Err(ProviderError::ConnectionError(format_connection_error(
                provider_type,
                socket_path,
                socket_exists,
                &e,
            )))
        }
    }
}

/// Format a helpful connection error message with actionable instructions
fn format_connection_error(
    provider: ProviderType,
    socket_path: &str,
    socket_exists: bool,
    underlying: &ProviderError,
) -> String {
    let provider_name = match provider {
        ProviderType::Podman => "Podman",
        ProviderType::Docker => "Docker",
    };

    let mut msg = format!("Cannot connect to {}\n\n", provider_name);

    if !socket_exists {
        msg.push_str(&format!(
            "The {} API socket was not found at:\n  {}\n\n",
            provider_name, socket_path
        ));

        match provider {
            ProviderType::Podman => {
                msg.push_str("To enable the Podman socket, run:\n");
                msg.push_str("  systemctl --user enable --now podman.socket\n");
            }
            ProviderType::Docker => {
                msg.push_str("To start Docker, run:\n");
                msg.push_str("  sudo systemctl enable --now docker\n");
                msg.push_str("If networking is broken, try: dapp-bk network:fix\n");
            }
        }
    } else {
        msg.push_str(&format!(
            "The socket exists at {} but the daemon is not responding.\n\n",
            socket_path
        ));
        msg.push_str(&format!("Underlying error: {}\n", underlying));
    }

    msg
}
