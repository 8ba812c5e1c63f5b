//! MCP Engine - Model Context Protocol server
//!
//! Serves MCP over stdio (default) or HTTP/SSE.

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use mcp_engine::config::{Args, Config};
use mcp_engine::error::Result;
use mcp_engine::logging;
use mcp_engine::mcp::McpServer;
use mcp_engine::tools::EchoTool;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(args)?;
    logging::init(&config)?;

    info!("MCP Engine v{}", config.version);
    info!("Transport: {:?}", config.transport);

    let server = McpServer::new(config);
    server.service().add_tool(Arc::new(EchoTool::new())).await?;

    spawn_shutdown_listener(server.shutdown_token())?;

    let outcome = server.run().await;
    if let Err(e) = &outcome {
        error!("Server stopped with error: {}", e);
    }
    outcome
}

/// Cancel the root token on Ctrl-C or SIGTERM.
///
/// The SIGTERM handler is registered before this returns, so a signal sent
/// as soon as the server answers is never missed.
fn spawn_shutdown_listener(root: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            sigterm.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl-C"),
            _ = terminate => info!("Received SIGTERM"),
            _ = root.cancelled() => return,
        }
        root.cancel();
    });

    Ok(())
}
