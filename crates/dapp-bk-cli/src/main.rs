//! dapp-bk - Docker App Build Kit CLI

use clap::{Parser, Subcommand};
use dapp_bk_cli::commands::{self, BuildOptions};
use dapp_bk_provider::ProviderType;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dapp-bk")]
#[command(author, version, about = "Docker App Build Kit", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override default provider (docker or podman)
    #[arg(long, global = true, value_parser = ["docker", "podman"])]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and manage Docker containers for your application
    Build {
        /// Rebuild the application container
        #[arg(long)]
        rebuild_app: bool,
        /// Rebuild the data container
        #[arg(long)]
        rebuild_data: bool,
        /// Import data into the database container
        #[arg(long)]
        import_data: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Install Composer dependencies in the app container
    #[command(name = "composer:install")]
    ComposerInstall,

    /// Fix Docker network issues
    #[command(name = "network:fix")]
    NetworkFix,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let provider = match cli.provider.as_deref() {
        Some(name) => Some(name.parse::<ProviderType>().map_err(anyhow::Error::msg)?),
        None => None,
    };

    match cli.command {
        Commands::Build {
            rebuild_app,
            rebuild_data,
            import_data,
            yes,
        } => {
            let options = BuildOptions {
                rebuild_app,
                rebuild_data,
                import_data,
                yes,
            };
            commands::build(options, provider).await?;
        }
        Commands::ComposerInstall => {
            commands::composer_install(provider).await?;
        }
        Commands::NetworkFix => {
            commands::network_fix().await?;
        }
    }

    Ok(())
}
