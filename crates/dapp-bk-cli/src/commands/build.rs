//! `build`: provision the project network, app container, and data roles

use anyhow::Result;
use dapp_bk_config::ProjectEnv;
use dapp_bk_core::{write_container_names, AppOutcome, DataAcknowledgement, NetworkOutcome, StackManager};
use dapp_bk_provider::ProviderType;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::{connect, current_project_root, spawn_printer, title, SUMMARY_RULE, TABLE_RULE};

/// Flags accepted by `build`
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub rebuild_app: bool,
    pub rebuild_data: bool,
    pub import_data: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
}

/// What a completed build flow did
#[derive(Debug)]
pub struct BuildReport {
    pub network: NetworkOutcome,
    pub app: AppOutcome,
    pub data: Vec<DataAcknowledgement>,
    pub names_file: PathBuf,
}

/// Entry point for `dapp-bk build`
pub async fn build(options: BuildOptions, provider: Option<ProviderType>) -> Result<()> {
    title("Docker App Build Kit");

    let root = current_project_root()?;
    println!("Project root: {}", root.display());

    let env = ProjectEnv::load(&root)?;

    print!("{}", configuration_table(&env, &options));

    if !confirm(&options)? {
        println!("Aborted by user");
        return Ok(());
    }

    let manager = connect(provider).await?;

    let (tx, printer) = spawn_printer();
    let result = provision(&manager, &root, &env, &options, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;
    result?;

    println!();
    println!("✓ Build completed successfully!");
    print!("{}", summary(&env));

    Ok(())
}

/// Run every provisioning step in order, then record the container names.
///
/// Stops at the first failure; whatever was created before it stays.
pub async fn provision(
    manager: &StackManager,
    root: &Path,
    env: &ProjectEnv,
    options: &BuildOptions,
    progress: Option<&mpsc::UnboundedSender<String>>,
) -> Result<BuildReport> {
    section(progress, &format!("Docker Network: {}", env.network_name()));
    let network = manager.ensure_network(env, progress).await?;

    section(progress, &format!("App Container: {}", env.app_container_name()));
    let app = manager
        .ensure_app_container(env, root, options.rebuild_app, progress)
        .await?;

    let data = manager.handle_data_containers(
        env,
        options.rebuild_data,
        options.import_data,
        progress,
    );

    let names_file = write_container_names(root, env)?;
    tracing::debug!("Container names written to {}", names_file.display());

    Ok(BuildReport {
        network,
        app,
        data,
        names_file,
    })
}

fn section(progress: Option<&mpsc::UnboundedSender<String>>, heading: &str) {
    if let Some(tx) = progress {
        let _ = tx.send(format!("\n{}\n", heading));
    }
}

/// Ask before touching the engine. Non-interactive sessions without
/// `--yes` count as a decline.
fn confirm(options: &BuildOptions) -> Result<bool> {
    if options.yes {
        return Ok(true);
    }

    if !std::io::stdin().is_terminal() {
        eprintln!("Not running interactively; pass --yes to continue without a prompt");
        return Ok(false);
    }

    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Continue with these settings?")
        .default(false)
        .interact()?;
    Ok(answer)
}

/// The settings table shown before confirmation
pub fn configuration_table(env: &ProjectEnv, options: &BuildOptions) -> String {
    let rule = "=".repeat(TABLE_RULE);
    let rows = [
        ("REBUILD_APP_CONTAINER", options.rebuild_app.to_string()),
        ("REBUILD_DATA_CONTAINER", options.rebuild_data.to_string()),
        ("IMPORT_DATA", options.import_data.to_string()),
        ("PROJECT_NAME", env.project_name.clone()),
        (
            "APP_TYPE",
            env.app_type_name.clone().unwrap_or_else(|| "php-apache".into()),
        ),
        (
            "DATA_REL_TYPE",
            env.data_rel_type.clone().unwrap_or_else(|| "postgres".into()),
        ),
        (
            "DATA_NONREL_TYPE",
            env.data_nonrel_type.clone().unwrap_or_else(|| "(none)".into()),
        ),
    ];

    let mut out = String::from("\nBuild Configuration\n");
    out.push_str(&rule);
    out.push('\n');
    for (key, value) in rows {
        out.push_str(&format!("{:<25}{}\n", format!("{}:", key), value));
    }
    out.push_str(&rule);
    out.push_str("\n\n");
    out
}

/// The closing summary of a successful build
pub fn summary(env: &ProjectEnv) -> String {
    let rule = "=".repeat(SUMMARY_RULE);
    format!(
        "\nContainer Summary\n{rule}\nContainer: {}\nURL:       http://localhost:{}\nStatus:    Running\n{rule}\n",
        env.app_container_name(),
        env.app_host_port,
    )
}
