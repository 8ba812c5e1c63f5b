//! Service layer.
//!
//! The application service owns the resource, tool, prompt and session
//! repositories and announces list changes through the notification hub.

pub mod app;
pub mod repository;

pub use app::{AppService, Repositories, ServerIdentity};
pub use repository::{
    InMemoryPromptRepository, InMemoryResourceRepository, InMemorySessionRepository,
    InMemoryToolRepository, Prompt, PromptArgument, PromptRepository, Resource, ResourceContents,
    ResourceRepository, SessionRecord, SessionRepository, ToolRepository,
};
