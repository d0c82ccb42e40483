//! Method dispatch.
//!
//! Maps MCP method names to behavior, enforcing allow-lists and
//! capabilities on the way. Runs on the session task, so it may mutate
//! session state freely; handler invocations are wrapped so a panic turns
//! into an `internal_error` reply instead of tearing the session down.

use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

use crate::frame::Frame;
use crate::session::{BatchGate, HandlerResult, PendingReply, RequestMeta, SessionState};
use crate::validator;
use tokio::sync::mpsc;
use wisp_mcp_json_rpc::{
    IncomingItem, JsonRpcError, JsonRpcErrorObject, JsonRpcMessage, JsonRpcRequest,
    JsonRpcResponse,
};
use wisp_mcp_protocol::elicitation::ElicitResult;
use wisp_mcp_protocol::initialize::{
    Implementation, InitializeParams, InitializeResult, PromptsCapability, ResourcesCapability,
    ServerCapabilities, ToolsCapability,
};
use wisp_mcp_protocol::logging::SetLevelParams;
use wisp_mcp_protocol::{
    CompleteParams, CompleteResult, CompletionRef, McpError, methods, PAGE_LIMIT,
};

enum Disposition {
    Reply(JsonRpcMessage),
    NoReply,
    Panic { message: String },
}

/// Handle one inbound batch: dispatch requests in order, acknowledge
/// notifications silently, route client responses to blocked elicitation
/// callers, and close the batch stream once every reply is out.
pub(crate) async fn process_batch(
    state: &mut SessionState,
    items: Vec<IncomingItem>,
    reply_to: mpsc::Sender<Frame>,
) {
    let gate = BatchGate::new(reply_to.clone());
    let mut panics: Vec<String> = Vec::new();
    let mut deferred = 0usize;

    for item in items {
        match item {
            IncomingItem::Invalid(err) => {
                let _ = reply_to.send(Frame::error(err)).await;
            }
            IncomingItem::Notification(notification) => {
                debug!(session = %state.id, method = %notification.method, "notification acknowledged");
            }
            IncomingItem::Response { id, result } => {
                let parsed = match result {
                    Ok(value) => serde_json::from_value::<ElicitResult>(value)
                        .unwrap_or_else(|_| ElicitResult::cancel()),
                    Err(_) => ElicitResult::cancel(),
                };
                state.resolve_elicitation(id, parsed).await;
            }
            IncomingItem::Request(request) => {
                match dispatch_request(state, &request).await {
                    Disposition::Reply(message) => {
                        let _ = reply_to.send(Frame::message(message)).await;
                    }
                    Disposition::NoReply => {
                        state.pending.insert(
                            request.id.clone(),
                            PendingReply {
                                reply_to: reply_to.clone(),
                                gate: gate.clone(),
                            },
                        );
                        deferred += 1;
                    }
                    Disposition::Panic { message } => {
                        let err = JsonRpcError::new(
                            Some(request.id.clone()),
                            JsonRpcErrorObject::internal_error(Some(message.clone())),
                        );
                        let _ = reply_to.send(Frame::error(err)).await;
                        panics.push(message);
                    }
                }
            }
        }
    }

    if deferred == 0 {
        let _ = reply_to.send(Frame::closed("finished")).await;
    } else {
        gate.arm(deferred);
    }

    // Each request's error was independent; exceptions surface to the host
    // once the batch's responses are out.
    if !panics.is_empty() {
        for message in &panics {
            error!(session = %state.id, "handler exception: {}", message);
        }
        state.core.router().report_exceptions(panics);
    }
}

async fn dispatch_request(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    debug!(session = %state.id, method = %request.method, id = %request.id, "dispatching");
    match request.method.as_str() {
        methods::INITIALIZE => handle_initialize(state, request),
        methods::PING => reply(request, Value::Object(Map::new())),
        methods::TOOLS_LIST => handle_tools_list(state, request),
        methods::PROMPTS_LIST => handle_prompts_list(state, request),
        methods::RESOURCES_TEMPLATES_LIST => handle_templates_list(state, request),
        methods::RESOURCES_LIST => handle_resources_list(state, request).await,
        methods::RESOURCES_READ => handle_resources_read(state, request).await,
        methods::RESOURCES_SUBSCRIBE => handle_subscribe(state, request, true).await,
        methods::RESOURCES_UNSUBSCRIBE => handle_subscribe(state, request, false).await,
        methods::LOGGING_SET_LEVEL => handle_set_level(state, request),
        methods::TOOLS_CALL => handle_tools_call(state, request).await,
        methods::PROMPTS_GET => handle_prompts_get(state, request).await,
        methods::COMPLETION_COMPLETE => handle_complete(state, request).await,
        method if method.starts_with(methods::NOTIFICATION_PREFIX) => {
            reply(request, Value::Object(Map::new()))
        }
        method => error_reply(request, McpError::MethodNotFound(method.to_string())),
    }
}

fn reply(request: &JsonRpcRequest, result: Value) -> Disposition {
    Disposition::Reply(JsonRpcResponse::new(request.id.clone(), result).into())
}

fn error_reply(request: &JsonRpcRequest, err: McpError) -> Disposition {
    Disposition::Reply(
        JsonRpcError::new(Some(request.id.clone()), err.to_error_object()).into(),
    )
}

fn handle_initialize(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let params: InitializeParams =
        match serde_json::from_value(request.params.clone().unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(err) => {
                return error_reply(
                    request,
                    McpError::invalid_params(format!("Bad initialize params: {}", err)),
                );
            }
        };

    if params.protocol_version != wisp_mcp_protocol::PROTOCOL_VERSION {
        return error_reply(
            request,
            McpError::UnsupportedVersion {
                supported: wisp_mcp_protocol::PROTOCOL_VERSION.to_string(),
                requested: params.protocol_version,
            },
        );
    }

    state.client_capabilities = Some(params.capabilities);
    state.client_info = Some(params.client_info);
    state.initialized = true;

    let core = state.core.clone();
    let registry = core.registry();
    let router_name = core.router().name();
    let distributed = core.tracker().is_distributed();

    let tools = registry.list_tools(router_name, state.allow_tools.as_ref());
    let prompts = registry.list_prompts(router_name, state.allow_prompts.as_ref());
    let templates = registry.list_templates(router_name, state.allow_resources.as_ref());
    let has_resources = !templates.is_empty() || core.router().list_resources_fn().is_some();

    let capabilities = ServerCapabilities {
        tools: (!tools.is_empty()).then_some(ToolsCapability {
            list_changed: Some(true),
        }),
        prompts: (!prompts.is_empty()).then_some(PromptsCapability {
            list_changed: Some(true),
        }),
        resources: has_resources.then_some(ResourcesCapability {
            subscribe: Some(distributed),
            list_changed: Some(true),
        }),
        completions: registry
            .has_completions(
                router_name,
                state.allow_prompts.as_ref(),
                state.allow_resources.as_ref(),
            )
            .then_some(Value::Object(Map::new())),
        logging: distributed.then_some(Value::Object(Map::new())),
    };

    let mut result = InitializeResult::new(
        capabilities,
        Implementation::new(core.router().name(), core.router().version()),
    );
    if let Some(instructions) = core.router().instructions() {
        result = result.with_instructions(instructions);
    }

    match serde_json::to_value(result) {
        Ok(value) => reply(request, value),
        Err(err) => error_reply(request, McpError::from(err)),
    }
}

/// Cursor-paged listing: up to [`PAGE_LIMIT`] entries plus an opaque
/// signed `nextCursor`.
fn paginate(
    state: &SessionState,
    request: &JsonRpcRequest,
    entries: Vec<Value>,
    key: &str,
) -> Disposition {
    let offset = match request.get_param("cursor").and_then(Value::as_str) {
        Some(cursor) => match state.core.cursor().decode(cursor) {
            Some(offset) => offset,
            None => return error_reply(request, McpError::invalid_params("Invalid cursor")),
        },
        None => 0,
    };

    let total = entries.len();
    let page: Vec<Value> = entries.into_iter().skip(offset).take(PAGE_LIMIT).collect();
    let mut result = Map::new();
    result.insert(key.to_string(), Value::Array(page));
    let next = offset + PAGE_LIMIT;
    if next < total {
        result.insert(
            "nextCursor".to_string(),
            Value::String(state.core.cursor().encode(next)),
        );
    }
    reply(request, Value::Object(result))
}

fn handle_tools_list(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let entries: Vec<Value> = state
        .core
        .registry()
        .list_tools(state.core.router().name(), state.allow_tools.as_ref())
        .iter()
        .map(|spec| spec.descriptor())
        .collect();
    paginate(state, request, entries, "tools")
}

fn handle_prompts_list(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let entries: Vec<Value> = state
        .core
        .registry()
        .list_prompts(state.core.router().name(), state.allow_prompts.as_ref())
        .iter()
        .map(|spec| spec.descriptor())
        .collect();
    paginate(state, request, entries, "prompts")
}

fn handle_templates_list(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let entries: Vec<Value> = state
        .core
        .registry()
        .list_templates(state.core.router().name(), state.allow_resources.as_ref())
        .iter()
        .map(|spec| spec.descriptor())
        .collect();
    paginate(state, request, entries, "resourceTemplates")
}

async fn handle_resources_list(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let Some(list) = state.core.router().list_resources_fn() else {
        return reply(request, serde_json::json!({ "resources": [] }));
    };
    let cursor = request
        .get_param("cursor")
        .and_then(Value::as_str)
        .map(str::to_string);
    match list(cursor, state.context()).await {
        Ok((resources, next_cursor)) => {
            let mut result = serde_json::json!({ "resources": resources });
            if let Some(next) = next_cursor {
                result["nextCursor"] = Value::String(next);
            }
            reply(request, result)
        }
        Err(err) => error_reply(request, err),
    }
}

async fn handle_resources_read(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let Some(uri) = request.get_param("uri").and_then(Value::as_str) else {
        return error_reply(request, McpError::missing_param("uri"));
    };
    let uri = uri.to_string();

    let matched = state.core.registry().match_resource(
        state.core.router().name(),
        state.allow_resources.as_ref(),
        &uri,
    );
    let Some((spec, params)) = matched else {
        return error_reply(request, McpError::ResourceNotFound(uri));
    };

    let meta = RequestMeta::from(request);
    let ctx = state.context();
    let outcome = AssertUnwindSafe(spec.handler.read(params, &meta, &ctx))
        .catch_unwind()
        .await;
    match outcome {
        Ok(HandlerResult::Reply(Value::Null)) => {
            error_reply(request, McpError::ResourceNotFound(uri))
        }
        Ok(HandlerResult::Reply(value)) => reply(request, value),
        Ok(HandlerResult::NoReply) => Disposition::NoReply,
        Ok(HandlerResult::Error(err)) => error_reply(request, err),
        Err(panic) => Disposition::Panic {
            message: panic_message(panic),
        },
    }
}

async fn handle_subscribe(
    state: &mut SessionState,
    request: &JsonRpcRequest,
    subscribe: bool,
) -> Disposition {
    let Some(uri) = request.get_param("uri").and_then(Value::as_str) else {
        return error_reply(request, McpError::missing_param("uri"));
    };

    let tracker = state.core.tracker();
    if subscribe {
        let handle = wisp_mcp_tracker::SessionHandle::local(
            state.id.clone(),
            tracker.node().to_string(),
            state.handle.clone(),
            Value::Object(Map::new()),
        );
        match tracker.subscribe_resource(uri, handle).await {
            Ok(()) => reply(request, Value::Object(Map::new())),
            Err(wisp_mcp_tracker::TrackerError::NotAvailable) => error_reply(
                request,
                McpError::NotAvailable("resources/subscribe".to_string()),
            ),
            Err(err) => error_reply(request, McpError::internal(err.to_string())),
        }
    } else {
        tracker.unsubscribe_resource(uri, &state.id).await;
        reply(request, Value::Object(Map::new()))
    }
}

fn handle_set_level(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let params: SetLevelParams =
        match serde_json::from_value(request.params.clone().unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(_) => return error_reply(request, McpError::invalid_params("Bad level")),
        };
    state.log_level = params.level;
    reply(request, Value::Object(Map::new()))
}

async fn handle_tools_call(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let Some(name) = request.get_param("name").and_then(Value::as_str) else {
        return error_reply(request, McpError::missing_param("name"));
    };

    let Some(spec) = state.core.registry().get_tool(
        state.core.router().name(),
        state.allow_tools.as_ref(),
        name,
    ) else {
        return error_reply(request, McpError::ToolNotFound(name.to_string()));
    };

    let args = match request.get_param("arguments") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return error_reply(
                request,
                McpError::invalid_params("arguments must be an object"),
            );
        }
        None => Map::new(),
    };

    let args = match validator::validate(&spec.input, args, state.core.router()) {
        Ok(args) => args,
        Err(errors) => return error_reply(request, McpError::Validation(errors)),
    };

    let meta = RequestMeta::from(request);
    let ctx = state.context();
    let outcome = AssertUnwindSafe(spec.handler.call(args, &meta, &ctx))
        .catch_unwind()
        .await;
    match outcome {
        Ok(HandlerResult::Reply(value)) => reply(request, value),
        Ok(HandlerResult::NoReply) => Disposition::NoReply,
        Ok(HandlerResult::Error(err)) => error_reply(request, err),
        Err(panic) => Disposition::Panic {
            message: panic_message(panic),
        },
    }
}

async fn handle_prompts_get(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let Some(name) = request.get_param("name").and_then(Value::as_str) else {
        return error_reply(request, McpError::missing_param("name"));
    };

    let Some(spec) = state.core.registry().get_prompt(
        state.core.router().name(),
        state.allow_prompts.as_ref(),
        name,
    ) else {
        return error_reply(request, McpError::PromptNotFound(name.to_string()));
    };

    let args = match request.get_param("arguments") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let args = match validator::validate(&spec.arguments, args, state.core.router()) {
        Ok(args) => args,
        Err(errors) => return error_reply(request, McpError::Validation(errors)),
    };

    let meta = RequestMeta::from(request);
    let ctx = state.context();
    let outcome = AssertUnwindSafe(spec.handler.get(args, &meta, &ctx))
        .catch_unwind()
        .await;
    match outcome {
        Ok(HandlerResult::Reply(value)) => reply(request, value),
        Ok(HandlerResult::NoReply) => Disposition::NoReply,
        Ok(HandlerResult::Error(err)) => error_reply(request, err),
        Err(panic) => Disposition::Panic {
            message: panic_message(panic),
        },
    }
}

async fn handle_complete(state: &mut SessionState, request: &JsonRpcRequest) -> Disposition {
    let params: CompleteParams =
        match serde_json::from_value(request.params.clone().unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(err) => {
                return error_reply(
                    request,
                    McpError::invalid_params(format!("Bad completion params: {}", err)),
                );
            }
        };

    let completion = match &params.reference {
        CompletionRef::Prompt { name } => state
            .core
            .registry()
            .get_prompt(state.core.router().name(), state.allow_prompts.as_ref(), name)
            .map(|spec| spec.completion.clone())
            .map(|completion| (completion, name.clone())),
        CompletionRef::Resource { uri } => state
            .core
            .registry()
            .list_templates(state.core.router().name(), state.allow_resources.as_ref())
            .into_iter()
            .find(|spec| spec.template.pattern() == uri)
            .map(|spec| (spec.completion.clone(), uri.clone())),
    };

    let Some((completion, _)) = completion else {
        return error_reply(
            request,
            McpError::invalid_params("Unknown completion reference"),
        );
    };

    let Some(completion) = completion else {
        return match serde_json::to_value(CompleteResult::clipped(Vec::new())) {
            Ok(value) => reply(request, value),
            Err(err) => error_reply(request, McpError::from(err)),
        };
    };

    let ctx = state.context();
    match completion
        .complete(&params.argument.name, &params.argument.value, &ctx)
        .await
    {
        Ok(values) => match serde_json::to_value(CompleteResult::clipped(values)) {
            Ok(value) => reply(request, value),
            Err(err) => error_reply(request, McpError::from(err)),
        },
        Err(err) => error_reply(request, err),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
