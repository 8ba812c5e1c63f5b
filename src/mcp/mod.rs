//! Model Context Protocol (MCP) implementation.
//!
//! # Architecture
//!
//! - `protocol` - JSON-RPC codec and MCP wire types
//! - `handler` - method handler trait and per-call context
//! - `router` - method table and dispatch
//! - `methods` - built-in methods bound to the application service
//! - `session` - SSE sessions and their registry
//! - `notify` - server-to-client notification fan-out
//! - `transport` - stdio transport
//! - `server` - assembly of the above

pub mod handler;
pub mod methods;
pub mod notify;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;

pub use handler::{handler_fn, MethodHandler, RequestContext};
pub use notify::NotificationHub;
pub use protocol::*;
pub use router::MethodRouter;
pub use server::McpServer;
pub use session::{Session, SessionRegistry};
pub use transport::StdioTransport;
