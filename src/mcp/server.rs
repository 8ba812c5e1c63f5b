//! MCP server assembly.
//!
//! Wires metrics, the session registry, the notification hub, the
//! application service and the method router together, then runs one
//! transport until shutdown.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, Transport};
use crate::error::Result;
use crate::http::{self, HttpState, ShutdownPolicy, SseSettings};
use crate::mcp::methods::register_builtin_methods;
use crate::mcp::notify::NotificationHub;
use crate::mcp::router::MethodRouter;
use crate::mcp::session::SessionRegistry;
use crate::mcp::transport::StdioTransport;
use crate::metrics::Metrics;
use crate::service::{AppService, Repositories, ServerIdentity};

/// MCP server.
pub struct McpServer {
    config: Config,
    metrics: Arc<Metrics>,
    registry: Arc<SessionRegistry>,
    service: Arc<AppService>,
    router: Arc<MethodRouter>,
    root: CancellationToken,
}

impl McpServer {
    /// Server backed by in-memory repositories and the built-in methods.
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Repositories::in_memory(), |_, _| {})
    }

    /// Server over the given repositories.
    ///
    /// `extend` runs after the built-ins are registered and may add or
    /// replace methods before the router is frozen.
    pub fn with_parts<F>(config: Config, repos: Repositories, extend: F) -> Self
    where
        F: FnOnce(&mut MethodRouter, &Arc<AppService>),
    {
        let metrics = Metrics::new();
        let registry = Arc::new(SessionRegistry::new(metrics.clone()));
        let hub = NotificationHub::new(registry.clone());

        let identity = ServerIdentity {
            name: config.name.clone(),
            version: config.version.clone(),
            instructions: config.instructions.clone(),
        };
        let service = Arc::new(AppService::new(identity, repos, hub));

        let mut router = MethodRouter::new(config.request_timeout(), metrics.clone());
        register_builtin_methods(&mut router, service.clone());
        extend(&mut router, &service);

        Self {
            config,
            metrics,
            registry,
            service,
            router: Arc::new(router),
            root: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn service(&self) -> &Arc<AppService> {
        &self.service
    }

    pub fn router(&self) -> &Arc<MethodRouter> {
        &self.router
    }

    /// The process root token. Cancelling it starts shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// State for the HTTP transport.
    pub fn http_state(&self) -> HttpState {
        HttpState {
            router: self.router.clone(),
            service: self.service.clone(),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            root: self.root.clone(),
            sse: SseSettings {
                queue: self.config.queue_capacity(),
                keep_alive: self.config.keep_alive(),
            },
        }
    }

    /// Run the configured transport.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting MCP server: {} v{} ({} methods)",
            self.config.name,
            self.config.version,
            self.router.method_count()
        );
        match self.config.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http => self.run_http().await,
        }
    }

    pub async fn run_stdio(&self) -> Result<()> {
        let mut transport = StdioTransport::new();
        let outcome = transport.run(&self.router, &self.root).await;
        info!("MCP server stopped");
        outcome
    }

    pub async fn run_http(&self) -> Result<()> {
        http::serve(
            self.http_state(),
            &self.config.bind_addr(),
            ShutdownPolicy::from(&self.config),
        )
        .await
    }
}
