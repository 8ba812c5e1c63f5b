//! Built-in MCP methods bound to the application service.

use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mcp::handler::{
    call_arguments, get_string_arg, handler_fn, params_object, MethodHandler, RequestContext,
};
use crate::mcp::protocol::{
    InitializeResult, ListToolsResult, ServerCapabilities, MCP_VERSION,
};
use crate::mcp::router::MethodRouter;
use crate::metrics::Metrics;
use crate::service::{AppService, ResourceContents};
use crate::tools::validate_required;

/// What every built-in handler closes over.
struct Builtins {
    service: Arc<AppService>,
    metrics: Arc<Metrics>,
}

/// Register `initialize`, `ping`, and the resource, tool and prompt methods.
pub fn register_builtin_methods(router: &mut MethodRouter, service: Arc<AppService>) {
    let deps = Arc::new(Builtins {
        service,
        metrics: router.metrics().clone(),
    });

    router.register("initialize", bind(&deps, initialize));
    router.register("ping", bind(&deps, ping));
    router.register("resources/list", bind(&deps, list_resources));
    router.register("resources/read", bind(&deps, read_resource));
    router.register("tools/list", bind(&deps, list_tools));
    router.register("tools/call", bind(&deps, call_tool));
    router.register("prompts/list", bind(&deps, list_prompts));
    router.register("prompts/get", bind(&deps, get_prompt));

    debug!("Registered {} built-in methods", router.method_count());
}

fn bind<F, Fut>(deps: &Arc<Builtins>, f: F) -> impl MethodHandler + 'static
where
    F: Fn(Arc<Builtins>, RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    let deps = deps.clone();
    handler_fn(move |ctx, params| f(deps.clone(), ctx, params))
}

async fn initialize(
    deps: Arc<Builtins>,
    _ctx: RequestContext,
    _params: Option<Value>,
) -> Result<Option<Value>> {
    let result = InitializeResult {
        protocol_version: MCP_VERSION.to_string(),
        capabilities: ServerCapabilities::list_changed_everywhere(),
        server_info: deps.service.server_info(),
        instructions: deps.service.identity().instructions.clone(),
    };
    Ok(Some(serde_json::to_value(result)?))
}

async fn ping(
    _deps: Arc<Builtins>,
    _ctx: RequestContext,
    _params: Option<Value>,
) -> Result<Option<Value>> {
    Ok(Some(json!({})))
}

async fn list_resources(
    deps: Arc<Builtins>,
    _ctx: RequestContext,
    _params: Option<Value>,
) -> Result<Option<Value>> {
    let resources = deps.service.list_resources().await?;
    Ok(Some(json!({ "resources": resources })))
}

async fn read_resource(
    deps: Arc<Builtins>,
    _ctx: RequestContext,
    params: Option<Value>,
) -> Result<Option<Value>> {
    let params = params_object(params)?;
    let uri = get_string_arg(&params, "uri")?;

    let resource = match deps.service.get_resource(&uri).await {
        Ok(resource) => resource,
        Err(e @ Error::NotFound { .. }) => return Err(e),
        Err(e) => return Err(Error::Internal(e.to_string())),
    };

    Ok(Some(json!({
        "contents": [ResourceContents::from(&resource)]
    })))
}

async fn list_tools(
    deps: Arc<Builtins>,
    _ctx: RequestContext,
    _params: Option<Value>,
) -> Result<Option<Value>> {
    let tools = deps.service.list_tools().await?;
    Ok(Some(serde_json::to_value(ListToolsResult { tools })?))
}

async fn call_tool(
    deps: Arc<Builtins>,
    ctx: RequestContext,
    params: Option<Value>,
) -> Result<Option<Value>> {
    let params = params_object(params)?;
    let name = get_string_arg(&params, "name")?;
    let tool = deps.service.get_tool(&name).await?;

    let arguments = call_arguments(&params)?;
    validate_required(&tool.definition(), &arguments)?;

    deps.metrics.inc_tool_calls();
    debug!(tool = %name, session_id = ?ctx.session_id, "Calling tool");
    let result = tool.execute(&ctx, arguments).await?;
    Ok(Some(serde_json::to_value(result)?))
}

async fn list_prompts(
    deps: Arc<Builtins>,
    _ctx: RequestContext,
    _params: Option<Value>,
) -> Result<Option<Value>> {
    let prompts = deps.service.list_prompts().await?;
    Ok(Some(json!({ "prompts": prompts })))
}

async fn get_prompt(
    _deps: Arc<Builtins>,
    _ctx: RequestContext,
    _params: Option<Value>,
) -> Result<Option<Value>> {
    Err(Error::NotImplemented("prompts/get".to_string()))
}
