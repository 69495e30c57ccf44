//! Command line entry point

use crate::dispatcher::RefactorDispatcher;
use anyhow::Context;
use clap::{Parser, Subcommand};
use lspr_config::AppConfig;
use lspr_lsp::{Language, LaunchTable, ServerVariant, SessionRegistry};
use lspr_transport::start_stdio_server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "lspr-server")]
#[command(about = "MCP server exposing LSP-backed refactoring tools")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: lspr.toml or .lspr/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve MCP over stdio (the default)
    Start,
    /// Print the language server launched for each language
    Servers,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            lspr_config::logging::initialize(&config);
            serve_stdio(&config).await
        }
        Commands::Servers => {
            let table = LaunchTable::builtin()
                .with_overrides(&config.lsp.servers)
                .context("Invalid server override")?;
            print!("{}", describe_servers(&table));
            Ok(())
        }
    }
}

/// Serve until stdin closes or the process is told to stop, then shut every
/// language server down.
async fn serve_stdio(config: &AppConfig) -> anyhow::Result<()> {
    let sessions = Arc::new(
        SessionRegistry::from_settings(&config.lsp).context("Invalid LSP configuration")?,
    );
    let dispatcher = Arc::new(RefactorDispatcher::new(sessions.clone()));

    info!(version = env!("CARGO_PKG_VERSION"), "lspr-server starting");

    let served = tokio::select! {
        result = start_stdio_server(dispatcher) => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    sessions.cleanup().await;

    if let Err(e) = &served {
        error!(error = %e, "Stdio server failed");
    }
    served.context("Stdio server failed")
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// One line per (language, variant) with a configured server
pub fn describe_servers(table: &LaunchTable) -> String {
    let mut out = String::new();
    for language in Language::ALL {
        for variant in [ServerVariant::Default, ServerVariant::Lint] {
            if let Some(spec) = table.get(language, variant) {
                let command = std::iter::once(spec.command.as_str())
                    .chain(spec.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!(
                    "{:<12} {:<8} {:<28} {}\n",
                    language.as_str(),
                    variant.as_str(),
                    spec.server_name,
                    command
                ));
            }
        }
    }
    out
}
