//! MCP Engine - Model Context Protocol server core
//!
//! A JSON-RPC 2.0 dispatch engine speaking the Model Context Protocol over
//! stdio, plain HTTP, and HTTP with Server-Sent Events.
//!
//! # Architecture
//!
//! 1. **Protocol** (`mcp::protocol`) - message codec and wire types
//! 2. **Dispatch** (`mcp::router`, `mcp::methods`) - method table, deadlines, built-ins
//! 3. **Sessions** (`mcp::session`, `mcp::notify`) - SSE sessions and notification fan-out
//! 4. **Transports** (`mcp::transport`, `http`) - stdio loop, HTTP routes, SSE streams
//! 5. **Service** (`service`, `tools`) - repositories and tool strategies
//!
//! # Example
//!
//! ```no_run
//! use mcp_engine::config::Config;
//! use mcp_engine::mcp::McpServer;
//!
//! # async fn run() -> mcp_engine::Result<()> {
//! let server = McpServer::new(Config::default());
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod service;
pub mod tools;

pub use error::{Error, Result};

/// Crate version, reported as the default server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
