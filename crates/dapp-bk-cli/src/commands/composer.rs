//! `composer:install`: install PHP dependencies in the running app container

use anyhow::Result;
use dapp_bk_config::ProjectEnv;
use dapp_bk_core::{read_app_container_name, InstallOutcome, DEFAULT_CONTAINER_PROJECT_ROOT};
use dapp_bk_provider::ProviderType;
use std::path::Path;

use super::{connect, current_project_root, spawn_printer, title};

/// Entry point for `dapp-bk composer:install`
pub async fn composer_install(provider: Option<ProviderType>) -> Result<()> {
    title("App Container Composer Install");

    let root = current_project_root()?;
    let container = read_app_container_name(&root)?;
    println!("Container: {}", container);

    let workdir = container_workdir(&root);
    let manager = connect(provider).await?;

    let (tx, printer) = spawn_printer();
    let result = manager
        .install_dependencies(&container, &workdir, Some(&tx))
        .await;
    drop(tx);
    let _ = printer.await;

    if let InstallOutcome::Skipped { manifest } = result? {
        tracing::debug!("Skipped composer install, no {}", manifest);
    }

    Ok(())
}

/// Project root inside the container: `APP_CONTAINER_VOLUME_PATH` when
/// `build/.env` loads and sets it, otherwise the default.
pub fn container_workdir(project_root: &Path) -> String {
    match ProjectEnv::load(project_root) {
        Ok(env) => env
            .app_container_volume_path
            .unwrap_or_else(|| DEFAULT_CONTAINER_PROJECT_ROOT.to_string()),
        Err(e) => {
            tracing::debug!("Could not load build/.env ({}), using {}", e, DEFAULT_CONTAINER_PROJECT_ROOT);
            DEFAULT_CONTAINER_PROJECT_ROOT.to_string()
        }
    }
}
