mod batch;
mod config;
mod credentials;
mod error;
mod indexing;
mod interactive;
mod launcher;
mod oauth;
mod server;
mod submission_log;
#[cfg(test)]
mod test_support;
mod workspace;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::AppConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "url-indexer")]
#[command(about = "Submit URL lists to the Google Indexing API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Submit every URL in the link file, prompting for an authorization code on the terminal.
    Run {
        /// Path to TOML config.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Serve the browser authorization flow and batch status page.
    Serve {
        /// Path to TOML config.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Start the server as a child process and open it in the browser.
    Launch {
        /// Path to TOML config.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Create the log files, link file and a placeholder credential file.
    Init {
        /// Path to TOML config.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let app_config = AppConfig::from_file(config)?;
            workspace::prepare(&app_config)?;
            interactive::run(&app_config).await?;
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::from_file(config)?;
            workspace::prepare(&app_config)?;
            server::serve(app_config).await?;
        }
        Commands::Launch { config } => {
            let app_config = AppConfig::from_file(&config)?;
            workspace::prepare(&app_config)?;
            credentials::ClientCredentials::load(
                &app_config.credentials_path,
                &app_config.oauth,
            )?;
            launcher::launch(&config, &app_config.bind, app_config.open_browser).await?;
        }
        Commands::Init { config } => {
            let app_config = AppConfig::from_file(config)?;
            let mut created = workspace::prepare(&app_config)?;
            if credentials::write_placeholder(&app_config.credentials_path)? {
                created.push(app_config.credentials_path.clone());
            }

            for path in &created {
                println!("created {}", path.display());
            }
            tracing::info!(created = created.len(), "workspace initialized");
        }
    }

    Ok(())
}
