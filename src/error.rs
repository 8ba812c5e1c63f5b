//! Error types for the MCP engine.

use serde_json::Value;
use thiserror::Error;

use crate::mcp::protocol::{error_codes, JsonRpcError};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Protocol Errors =====
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method '{0}' not found")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Structured error chosen by a method handler; passed to the client as-is.
    #[error("{message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    // ===== Domain Errors =====
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    // ===== Session Errors =====
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Notification not delivered: {0}")]
    Delivery(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== HTTP Errors =====
    #[error("HTTP server error: {0}")]
    HttpServer(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Cancelled: operation was cancelled")]
    Cancelled,
}

impl Error {
    /// Create a domain not-found error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Create a handler-chosen structured error.
    pub fn rpc(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data,
        }
    }

    /// JSON-RPC error code for this error.
    ///
    /// Domain errors keep their HTTP-like pass-through codes (404, 400);
    /// everything the client cannot act on collapses to Internal Error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Rpc { code, .. } => *code,
            Self::NotFound { .. } => error_codes::NOT_FOUND,
            Self::Validation(_) => error_codes::VALIDATION_FAILED,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert into the wire error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let data = match self {
            Self::Rpc { data, .. } => data.clone(),
            _ => None,
        };
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }

    /// Whether this error must stop a serial transport loop.
    ///
    /// Only I/O faults can be terminal; see [`crate::mcp::transport::classify_io_error`].
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Io(e) => crate::mcp::transport::classify_io_error(e).is_terminal(),
            _ => false,
        }
    }
}
