//! Configuration management for the MCP engine.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::mcp::session::QueueCapacity;

/// Command-line arguments for the MCP engine.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Model Context Protocol server over stdio or HTTP/SSE")]
pub struct Args {
    /// Transport mode: stdio or http
    #[arg(short, long, default_value = "stdio", env = "MCP_ENGINE_TRANSPORT")]
    pub transport: Transport,

    /// Bind address (only for http transport)
    #[arg(long, default_value = "127.0.0.1", env = "MCP_ENGINE_HOST")]
    pub host: String,

    /// HTTP port (only for http transport)
    #[arg(short, long, default_value = "3000", env = "MCP_ENGINE_PORT")]
    pub port: u16,

    /// Server name reported on initialize
    #[arg(long, default_value = "mcp-engine", env = "MCP_ENGINE_NAME")]
    pub name: String,

    /// Server version reported on initialize (defaults to the crate version)
    #[arg(long, env = "MCP_ENGINE_SERVER_VERSION")]
    pub server_version: Option<String>,

    /// Instructions returned to clients on initialize
    #[arg(long, env = "MCP_ENGINE_INSTRUCTIONS")]
    pub instructions: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "MCP_ENGINE_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, default_value = "text", env = "MCP_ENGINE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", env = "MCP_ENGINE_REQUEST_TIMEOUT")]
    pub request_timeout_secs: u64,

    /// Graceful shutdown bound in seconds
    #[arg(long, default_value = "5", env = "MCP_ENGINE_SHUTDOWN_GRACE")]
    pub shutdown_grace_secs: u64,

    /// Pause after closing sessions, in milliseconds
    #[arg(long, default_value = "500", env = "MCP_ENGINE_DRAIN_DELAY_MS")]
    pub drain_delay_ms: u64,

    /// Per-session SSE event queue capacity
    #[arg(long, default_value = "100", env = "MCP_ENGINE_EVENT_QUEUE")]
    pub event_queue_capacity: usize,

    /// Per-session notification inbox capacity
    #[arg(long, default_value = "100", env = "MCP_ENGINE_INBOX")]
    pub inbox_capacity: usize,

    /// SSE keep-alive interval in seconds
    #[arg(long, default_value = "30", env = "MCP_ENGINE_KEEP_ALIVE")]
    pub keep_alive_secs: u64,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transport mode
    pub transport: Transport,
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
    /// Initialize instructions
    pub instructions: Option<String>,
    /// Debug mode
    pub debug: bool,
    /// Log format
    pub log_format: LogFormat,
    pub request_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub drain_delay_ms: u64,
    pub event_queue_capacity: usize,
    pub inbox_capacity: usize,
    pub keep_alive_secs: u64,
}

impl Config {
    /// Build and validate a configuration from parsed arguments.
    pub fn from_args(args: Args) -> Result<Self> {
        let config = Self::from(args);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("server name must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }
        if self.keep_alive_secs == 0 {
            return Err(Error::Config("keep-alive interval must be positive".to_string()));
        }
        if self.event_queue_capacity == 0 || self.inbox_capacity == 0 {
            return Err(Error::Config("queue capacities must be positive".to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn queue_capacity(&self) -> QueueCapacity {
        QueueCapacity {
            events: self.event_queue_capacity,
            inbox: self.inbox_capacity,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            transport: args.transport,
            host: args.host,
            port: args.port,
            name: args.name,
            version: args
                .server_version
                .unwrap_or_else(|| crate::VERSION.to_string()),
            instructions: args.instructions,
            debug: args.debug,
            log_format: args.log_format,
            request_timeout_secs: args.request_timeout_secs,
            shutdown_grace_secs: args.shutdown_grace_secs,
            drain_delay_ms: args.drain_delay_ms,
            event_queue_capacity: args.event_queue_capacity,
            inbox_capacity: args.inbox_capacity,
            keep_alive_secs: args.keep_alive_secs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: "127.0.0.1".to_string(),
            port: 3000,
            name: "mcp-engine".to_string(),
            version: crate::VERSION.to_string(),
            instructions: None,
            debug: false,
            log_format: LogFormat::Text,
            request_timeout_secs: 30,
            shutdown_grace_secs: 5,
            drain_delay_ms: 500,
            event_queue_capacity: 100,
            inbox_capacity: 100,
            keep_alive_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_default() {
        assert_eq!(Transport::default(), Transport::Stdio);
    }

    #[test]
    fn test_transport_serialization() {
        let transports = [
            (Transport::Stdio, "\"stdio\""),
            (Transport::Http, "\"http\""),
        ];

        for (transport, expected) in &transports {
            let json = serde_json::to_string(transport).unwrap();
            assert_eq!(json, *expected);
        }
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.port, 3000);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.drain_delay(), Duration::from_millis(500));
        assert_eq!(config.queue_capacity().events, 100);
        assert_eq!(config.queue_capacity().inbox, 100);
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "transport": "http",
            "host": "0.0.0.0",
            "port": 8080,
            "name": "demo",
            "version": "9.9.9",
            "instructions": "Be nice.",
            "debug": true,
            "log_format": "json",
            "request_timeout_secs": 10,
            "shutdown_grace_secs": 2,
            "drain_delay_ms": 0,
            "event_queue_capacity": 8,
            "inbox_capacity": 4,
            "keep_alive_secs": 15
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.instructions.as_deref(), Some("Be nice."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_name = Config {
            name: "  ".to_string(),
            ..Config::default()
        };
        assert!(matches!(empty_name.validate(), Err(Error::Config(_))));

        let zero_timeout = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert!(zero_timeout.validate().is_err());

        let zero_queue = Config {
            inbox_capacity: 0,
            ..Config::default()
        };
        assert!(zero_queue.validate().is_err());
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "mcp-engine",
            "--transport",
            "http",
            "--port",
            "4000",
            "--name",
            "demo",
            "--log-format",
            "json",
            "--request-timeout-secs",
            "5",
        ]);

        let config = Config::from_args(args).unwrap();

        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.port, 4000);
        assert_eq!(config.name, "demo");
        assert_eq!(config.version, crate::VERSION);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_args_validates() {
        let args = Args::parse_from(["mcp-engine", "--inbox-capacity", "0"]);
        assert!(Config::from_args(args).is_err());
    }
}
