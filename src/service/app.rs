//! Application service: the repositories plus server identity.
//!
//! Every mutation broadcasts the matching `<kind>/list/changed`
//! notification once the repository accepted it.

use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::mcp::notify::NotificationHub;
use crate::mcp::protocol::{ListKind, ServerInfo, Tool};
use crate::service::repository::{
    InMemoryPromptRepository, InMemoryResourceRepository, InMemorySessionRepository,
    InMemoryToolRepository, Prompt, PromptRepository, Resource, ResourceRepository,
    SessionRepository, ToolRepository,
};
use crate::tools::ToolHandler;

/// Name, version and optional instructions advertised on `initialize`.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: "mcp-engine".to_string(),
            version: crate::VERSION.to_string(),
            instructions: None,
        }
    }
}

/// The repository collaborators.
#[derive(Clone)]
pub struct Repositories {
    pub resources: Arc<dyn ResourceRepository>,
    pub tools: Arc<dyn ToolRepository>,
    pub prompts: Arc<dyn PromptRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            resources: Arc::new(InMemoryResourceRepository::new()),
            tools: Arc::new(InMemoryToolRepository::new()),
            prompts: Arc::new(InMemoryPromptRepository::new()),
            sessions: Arc::new(InMemorySessionRepository::new()),
        }
    }
}

pub struct AppService {
    identity: ServerIdentity,
    repos: Repositories,
    hub: NotificationHub,
}

impl AppService {
    pub fn new(identity: ServerIdentity, repos: Repositories, hub: NotificationHub) -> Self {
        Self {
            identity,
            repos,
            hub,
        }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.identity.name.clone(),
            version: self.identity.version.clone(),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRepository> {
        &self.repos.sessions
    }

    // ----- Resources -----

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.repos.resources.list().await
    }

    pub async fn get_resource(&self, uri: &str) -> Result<Resource> {
        self.repos.resources.get(uri).await
    }

    pub async fn add_resource(&self, resource: Resource) -> Result<()> {
        let uri = resource.uri.clone();
        self.repos.resources.add(resource).await?;
        info!(uri = %uri, "Resource added");
        self.hub.list_changed(ListKind::Resources).await;
        Ok(())
    }

    pub async fn delete_resource(&self, uri: &str) -> Result<()> {
        self.repos.resources.delete(uri).await?;
        info!(uri = %uri, "Resource deleted");
        self.hub.list_changed(ListKind::Resources).await;
        Ok(())
    }

    // ----- Tools -----

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.repos.tools.list().await
    }

    pub async fn get_tool(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.repos.tools.get(name).await
    }

    pub async fn add_tool(&self, tool: Arc<dyn ToolHandler>) -> Result<()> {
        let name = tool.definition().name;
        self.repos.tools.add(tool).await?;
        info!(tool = %name, "Tool added");
        self.hub.list_changed(ListKind::Tools).await;
        Ok(())
    }

    pub async fn delete_tool(&self, name: &str) -> Result<()> {
        self.repos.tools.delete(name).await?;
        info!(tool = %name, "Tool deleted");
        self.hub.list_changed(ListKind::Tools).await;
        Ok(())
    }

    // ----- Prompts -----

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        self.repos.prompts.list().await
    }

    pub async fn get_prompt(&self, name: &str) -> Result<Prompt> {
        self.repos.prompts.get(name).await
    }

    pub async fn add_prompt(&self, prompt: Prompt) -> Result<()> {
        let name = prompt.name.clone();
        self.repos.prompts.add(prompt).await?;
        info!(prompt = %name, "Prompt added");
        self.hub.list_changed(ListKind::Prompts).await;
        Ok(())
    }

    pub async fn delete_prompt(&self, name: &str) -> Result<()> {
        self.repos.prompts.delete(name).await?;
        info!(prompt = %name, "Prompt deleted");
        self.hub.list_changed(ListKind::Prompts).await;
        Ok(())
    }
}

impl std::fmt::Debug for AppService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppService")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
