//! MCP aggregator entry point: CLI argument handling, config loading, and
//! dispatch into either the stdio server loop or the HTTP+SSE surface.

mod config_loader;
mod error;
mod http;
mod stdio;
mod stdout_guard;

use std::path::PathBuf;
use std::sync::Arc;

use aggregator_core::{AggregationController, AggregatorConfig};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "mcp-aggregator", version, about = "Aggregates multiple MCP servers behind one session")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run over stdio (the default when no subcommand is given).
    Stdio {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the HTTP+SSE surface.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn load_config(path: Option<&PathBuf>) -> AggregatorConfig {
    match path {
        Some(path) => match config_loader::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                std::process::exit(1);
            }
        },
        // A config file is optional: the controller runs with zero upstreams.
        None => AggregatorConfig::default(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Stdio { name: None, config: None }) {
        Command::Stdio { name, config } => {
            let _guard = stdout_guard::StdoutGuard::enter();
            let mut cfg = load_config(config.as_ref());
            if let Some(name) = name {
                cfg.name = name;
            }
            info!(name = %cfg.name, upstreams = cfg.upstream.len(), "starting stdio session");
            let controller = Arc::new(AggregationController::from_config(&cfg));
            stdio::run(controller).await;
        }
        Command::Serve { config, host, port } => {
            stdout_guard::init_logging();
            let cfg = load_config(config.as_ref());
            let host = host.unwrap_or_else(|| cfg.transport.host.clone());
            let port = port.unwrap_or(cfg.transport.port);
            info!(name = %cfg.name, upstreams = cfg.upstream.len(), %host, port, "starting HTTP+SSE surface");
            let controller = Arc::new(AggregationController::from_config(&cfg));

            let app = http::router(controller.clone());
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(%addr, "listening");
            axum::serve(listener, app).await?;
            controller.close().await;
        }
    }
    Ok(())
}
