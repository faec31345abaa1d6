//! Stack manager - coordinates network, app, data, and dependency steps

mod app;
mod composer;
mod data;
mod network;

pub use app::AppOutcome;
pub use composer::{InstallOutcome, DEFAULT_CONTAINER_PROJECT_ROOT};
pub use data::{DataAcknowledgement, DataRole};
pub use network::NetworkOutcome;

use dapp_bk_provider::{ContainerProvider, ProviderInfo};
use tokio::sync::mpsc;

/// Runs provisioning steps against a single container provider.
///
/// Every step is awaited to completion before the next starts. Resources are
/// identified by name only; nothing guards against another invocation
/// touching the same names concurrently.
pub struct StackManager {
    provider: Box<dyn ContainerProvider>,
}

impl StackManager {
    pub fn new(provider: Box<dyn ContainerProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn ContainerProvider {
        self.provider.as_ref()
    }

    pub fn provider_info(&self) -> ProviderInfo {
        self.provider.info()
    }
}

// Send a status line to the channel, or log via tracing if no channel.
pub(crate) fn send_progress(progress: Option<&mpsc::UnboundedSender<String>>, msg: &str) {
    match progress {
        Some(tx) => {
            let _ = tx.send(format!("{}\n", msg));
        }
        None => tracing::info!("{}", msg),
    }
}
