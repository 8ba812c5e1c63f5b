//! Keyed repositories for resources, tools, prompts and session records.
//!
//! The engine only needs CRUD by key. The in-memory implementations keep
//! insertion order so list results are stable between calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::mcp::protocol::Tool;
use crate::tools::ToolHandler;

// ===== Entities =====

/// A resource exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Body returned by `resources/read`; not part of listings.
    #[serde(skip)]
    pub text: String,
}

impl Resource {
    pub fn text(uri: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: Some("text/plain".to_string()),
            text: text.into(),
        }
    }
}

/// Resource contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

impl From<&Resource> for ResourceContents {
    fn from(resource: &Resource) -> Self {
        Self {
            uri: resource.uri.clone(),
            mime_type: resource.mime_type.clone(),
            text: resource.text.clone(),
        }
    }
}

/// A prompt argument definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A prompt template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// Bookkeeping for one SSE connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_agent: String,
    pub connected_at: DateTime<Utc>,
}

// ===== Repository Traits =====

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn get(&self, uri: &str) -> Result<Resource>;
    async fn list(&self) -> Result<Vec<Resource>>;
    async fn add(&self, resource: Resource) -> Result<()>;
    async fn delete(&self, uri: &str) -> Result<()>;
}

#[async_trait]
pub trait ToolRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Arc<dyn ToolHandler>>;
    async fn list(&self) -> Result<Vec<Tool>>;
    async fn add(&self, tool: Arc<dyn ToolHandler>) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait PromptRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Prompt>;
    async fn list(&self) -> Result<Vec<Prompt>>;
    async fn add(&self, prompt: Prompt) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<SessionRecord>;
    async fn list(&self) -> Result<Vec<SessionRecord>>;
    async fn add(&self, record: SessionRecord) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

// ===== In-Memory Implementations =====

/// Insertion-ordered keyed store shared by the in-memory repositories.
struct MemoryStore<T> {
    kind: &'static str,
    items: RwLock<IndexMap<String, T>>,
}

impl<T: Clone> MemoryStore<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: RwLock::new(IndexMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Result<T> {
        self.items
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(self.kind, key))
    }

    async fn list(&self) -> Vec<T> {
        self.items.read().await.values().cloned().collect()
    }

    async fn insert(&self, key: String, value: T) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::Validation(format!(
                "{} key must not be empty",
                self.kind
            )));
        }
        self.items.write().await.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.items
            .write()
            .await
            .shift_remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(self.kind, key))
    }
}

/// In-memory resource repository keyed by URI.
pub struct InMemoryResourceRepository {
    store: MemoryStore<Resource>,
}

impl InMemoryResourceRepository {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new("Resource"),
        }
    }
}

impl Default for InMemoryResourceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn get(&self, uri: &str) -> Result<Resource> {
        self.store.get(uri).await
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        Ok(self.store.list().await)
    }

    async fn add(&self, resource: Resource) -> Result<()> {
        self.store.insert(resource.uri.clone(), resource).await
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        self.store.remove(uri).await
    }
}

/// In-memory tool repository keyed by tool name.
pub struct InMemoryToolRepository {
    store: MemoryStore<Arc<dyn ToolHandler>>,
}

impl InMemoryToolRepository {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new("Tool"),
        }
    }
}

impl Default for InMemoryToolRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn get(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.store.get(name).await
    }

    async fn list(&self) -> Result<Vec<Tool>> {
        Ok(self
            .store
            .list()
            .await
            .iter()
            .map(|h| h.definition())
            .collect())
    }

    async fn add(&self, tool: Arc<dyn ToolHandler>) -> Result<()> {
        let name = tool.definition().name;
        self.store.insert(name, tool).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.store.remove(name).await
    }
}

/// In-memory prompt repository keyed by prompt name.
pub struct InMemoryPromptRepository {
    store: MemoryStore<Prompt>,
}

impl InMemoryPromptRepository {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new("Prompt"),
        }
    }
}

impl Default for InMemoryPromptRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptRepository for InMemoryPromptRepository {
    async fn get(&self, name: &str) -> Result<Prompt> {
        self.store.get(name).await
    }

    async fn list(&self) -> Result<Vec<Prompt>> {
        Ok(self.store.list().await)
    }

    async fn add(&self, prompt: Prompt) -> Result<()> {
        self.store.insert(prompt.name.clone(), prompt).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.store.remove(name).await
    }
}

/// In-memory session record repository keyed by session id.
pub struct InMemorySessionRepository {
    store: MemoryStore<SessionRecord>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new("Session"),
        }
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get(&self, id: &str) -> Result<SessionRecord> {
        self.store.get(id).await
    }

    async fn list(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.store.list().await)
    }

    async fn add(&self, record: SessionRecord) -> Result<()> {
        self.store.insert(record.id.clone(), record).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.store.remove(id).await
    }
}
