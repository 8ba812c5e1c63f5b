//! Method handler trait, per-call context and argument helpers.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::mcp::protocol::RequestId;

/// Per-call context handed to every handler.
///
/// `cancel` fires when the call times out, the client cancels the request,
/// or the server shuts down. Long-running handlers should watch it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: Option<RequestId>,
    pub method: String,
    pub cancel: CancellationToken,
    /// SSE session the request arrived on, if any.
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(id: Option<RequestId>, method: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            id,
            method: method.into(),
            cancel,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Handler for one JSON-RPC method.
///
/// Returning `Ok(None)` yields an empty-object result.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, ctx: RequestContext, params: Option<Value>) -> Result<Option<Value>>;
}

/// Adapter turning an async closure into a [`MethodHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a method handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    FnHandler {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F, Fut>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    async fn call(&self, ctx: RequestContext, params: Option<Value>) -> Result<Option<Value>> {
        (self.f)(ctx, params).await
    }
}

/// Params as an object; `null`/absent become an empty map.
pub fn params_object(params: Option<Value>) -> Result<Map<String, Value>> {
    match params {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(Error::InvalidParams(format!(
            "params must be an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Tool arguments from `arguments`, falling back to `parameters`.
///
/// Neither key present yields an empty set.
pub fn call_arguments(params: &Map<String, Value>) -> Result<Map<String, Value>> {
    let raw = params
        .get("arguments")
        .filter(|v| !v.is_null())
        .or_else(|| params.get("parameters").filter(|v| !v.is_null()));

    match raw {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(Error::InvalidParams(format!(
            "arguments must be an object, got {}",
            type_name(other)
        ))),
    }
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &Map<String, Value>, name: &str) -> Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        None | Some(Value::Null) => Err(Error::InvalidParams(format!(
            "Missing required parameter: {}",
            name
        ))),
        Some(other) => Err(Error::InvalidParams(format!(
            "Parameter '{}' must be a string, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
