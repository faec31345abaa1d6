//! CLI command implementations

mod build;
mod composer;
mod network;

use anyhow::Result;
use dapp_bk_config::{find_project_root, GlobalConfig};
use dapp_bk_core::StackManager;
use dapp_bk_provider::{create_default_provider, ProviderType};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use build::*;
pub use composer::*;
pub use network::*;

/// Width of the `=` rules around the configuration table
const TABLE_RULE: usize = 50;
/// Width of the `=` rules around the container summary
const SUMMARY_RULE: usize = 70;

/// Print a command heading followed by a blank line
fn title(text: &str) {
    println!("{}", text);
    println!();
}

/// Locate the project root from the current directory
fn current_project_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(find_project_root(&cwd)?)
}

/// Connect to the configured engine, or the `--provider` override
async fn connect(provider: Option<ProviderType>) -> Result<StackManager> {
    let config = GlobalConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Could not load global config, using defaults: {}", e);
        GlobalConfig::default()
    });

    let manager = StackManager::new(create_default_provider(&config, provider).await?);
    let info = manager.provider_info();
    tracing::debug!("Connected to {} (API {})", info.provider_type, info.api_version);

    Ok(manager)
}

/// Spawn a task that prints everything sent on the returned channel.
///
/// Drop the sender and await the handle to flush all output.
fn spawn_printer() -> (mpsc::UnboundedSender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            print!("{}", chunk);
            let _ = stdout.flush();
        }
    });
    (tx, handle)
}
