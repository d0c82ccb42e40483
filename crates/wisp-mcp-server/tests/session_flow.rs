//! End-to-end session behavior: dispatch through the session task and
//! assert on the exact frames a client would see.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use wisp_mcp_protocol::content::{CallToolResult, ReadResourceResult, ResourceContents};
use wisp_mcp_protocol::elicitation::Elicitation;
use wisp_mcp_protocol::logging::{LoggingLevel, LoggingMessageParams};
use wisp_mcp_protocol::{FieldSchema, InputSchema, McpError};
use wisp_mcp_server::{
    ConnectAccept, ConnectDecision, CoreOptions, Frame, FrameEvent, HandlerResult, OpenedSession,
    PromptSpec, ResourceTemplateSpec, Router, RouterBuilder, ServerCore, Session, SessionMessage,
    ToolSpec, TransportKind, completion_fn,
};

fn base_router() -> RouterBuilder {
    Router::builder("test-server", "0.1.0")
        .instructions("test instructions")
        .tool(
            ToolSpec::new(
                "echo_tool",
                InputSchema::fields(vec![("message", FieldSchema::string().required())]),
                |args, _req, _ctx| async move {
                    let message = args["message"].as_str().unwrap_or_default().to_string();
                    HandlerResult::reply(CallToolResult::text(message))
                },
            )
            .with_description("Echoes the message back"),
        )
        .tool(ToolSpec::new(
            "raising_tool",
            InputSchema::empty(),
            |_args, _req, _ctx| async move { panic!("boom") },
        ))
        .tool(ToolSpec::new(
            "slow_tool",
            InputSchema::empty(),
            |_args, req, ctx| async move {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    ctx.reply(
                        req.id.clone(),
                        serde_json::to_value(CallToolResult::text("done"))
                            .map_err(McpError::from),
                    );
                });
                HandlerResult::NoReply
            },
        ))
        .resource(
            ResourceTemplateSpec::new("text", "test:///text/:id", |params, _req, _ctx| async move {
                let id = params["id"].clone();
                let body = json!({ "id": id }).to_string();
                HandlerResult::reply(ReadResourceResult::new(vec![ResourceContents::text(
                    format!("test:///text/{}", id),
                    "application/json",
                    body,
                )]))
            })
            .unwrap(),
        )
        .prompt(
            PromptSpec::new(
                "greet",
                InputSchema::fields(vec![("lang", FieldSchema::string().required())]),
                |args, _req, _ctx| async move {
                    let lang = args["lang"].as_str().unwrap_or_default();
                    HandlerResult::reply(json!({
                        "messages": [{"role": "user", "content": {"type": "text", "text": format!("hello in {}", lang)}}]
                    }))
                },
            )
            .with_completion(completion_fn(|_argument, value| async move {
                Ok(vec!["en".to_string(), "eo".to_string()]
                    .into_iter()
                    .filter(|v| v.starts_with(&value))
                    .collect())
            })),
        )
}

async fn open(core: &Arc<ServerCore>) -> (OpenedSession, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(64);
    let opened = Session::open(core.clone(), tx, false, TransportKind::Http, HashMap::new())
        .await
        .expect("connect accepted");
    (opened, rx)
}

/// Dispatch a raw body and collect the frames of its reply stream, the
/// terminal `closed` frame included.
async fn post(opened: &OpenedSession, body: &str) -> Vec<Frame> {
    let (tx, mut rx) = mpsc::channel(64);
    let items = wisp_mcp_json_rpc::parse_body(body).expect("parseable body");
    opened
        .handle
        .send(SessionMessage::Dispatch { items, reply_to: tx })
        .await
        .expect("session alive");

    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame before timeout")
            .expect("stream open");
        let terminal = frame.is_terminal();
        frames.push(frame);
        if terminal {
            break;
        }
    }
    frames
}

fn data(frame: &Frame) -> &Value {
    frame.data.as_ref().expect("frame data")
}

#[tokio::test]
async fn initialize_handshake() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"T","version":"1"}}}"#,
    )
    .await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].event, FrameEvent::Message);
    let result = &data(&frames[0])["result"];
    assert_eq!(data(&frames[0])["id"], 1);
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], "test-server");
    assert_eq!(result["instructions"], "test instructions");
    // Tools and resources are registered, so those capability sections
    // exist; no pub/sub substrate means no logging and no subscribe.
    assert!(result["capabilities"]["tools"].is_object());
    assert_eq!(result["capabilities"]["resources"]["subscribe"], false);
    assert!(result["capabilities"]["logging"].is_null());
    // Prompt completion is declared.
    assert!(result["capabilities"]["completions"].is_object());

    assert_eq!(frames[1].event, FrameEvent::Closed);
    assert_eq!(data(&frames[1])["reason"], "finished");
}

#[tokio::test]
async fn initialize_rejects_unknown_version() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"1999-01-01","capabilities":{},"clientInfo":{"name":"T","version":"1"}}}"#,
    )
    .await;

    let error = &data(&frames[0])["error"];
    assert_eq!(error["code"], -32602);
    assert_eq!(error["data"]["supported"], "2025-03-26");
    assert_eq!(error["data"]["requested"], "1999-01-01");
}

#[tokio::test]
async fn echo_tool_call() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo_tool","arguments":{"message":"hello world"}}}"#,
    )
    .await;

    let result = &data(&frames[0])["result"];
    assert_eq!(
        result["content"],
        json!([{"type": "text", "text": "hello world"}])
    );
    assert_eq!(frames[1].event, FrameEvent::Closed);
}

#[tokio::test]
async fn validation_failure_lists_errors() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo_tool","arguments":{}}}"#,
    )
    .await;

    let error = &data(&frames[0])["error"];
    assert_eq!(error["code"], -32602);
    assert_eq!(
        error["data"]["validation_errors"],
        json!(["Missing required field: message"])
    );
}

#[tokio::test]
async fn batch_with_exceptions_reports_each_and_aggregates() {
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_hook = seen.clone();
    let router = base_router()
        .on_exceptions(move |batch| seen_hook.lock().unwrap().push(batch))
        .build();
    let core = ServerCore::new(router, CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"[
            {"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"raising_tool","arguments":{}}},
            {"jsonrpc":"2.0","id":11,"method":"tools/call","params":{"name":"raising_tool","arguments":{}}}
        ]"#,
    )
    .await;

    assert_eq!(frames.len(), 3);
    for (frame, id) in frames[..2].iter().zip([10, 11]) {
        let envelope = data(frame);
        assert_eq!(envelope["id"], id);
        assert_eq!(envelope["error"]["code"], -32603);
        assert_eq!(envelope["error"]["message"], "boom");
    }

    // One request's exception did not abort the other; the host observes
    // one aggregate with both entries after the responses are flushed.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], vec!["boom".to_string(), "boom".to_string()]);
}

#[tokio::test]
async fn resource_read_reflects_params() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":4,"method":"resources/read","params":{"uri":"test:///text/42"}}"#,
    )
    .await;

    let result = &data(&frames[0])["result"];
    assert_eq!(result["contents"][0]["uri"], "test:///text/42");
    assert_eq!(result["contents"][0]["mimeType"], "application/json");
    assert_eq!(result["contents"][0]["text"], "{\"id\":\"42\"}");
}

#[tokio::test]
async fn resource_read_unmatched_uri_is_not_found() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":5,"method":"resources/read","params":{"uri":"test:///other/42"}}"#,
    )
    .await;
    assert_eq!(data(&frames[0])["error"]["code"], -32002);

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":6,"method":"resources/read","params":{"uri":"no-scheme"}}"#,
    )
    .await;
    assert_eq!(data(&frames[0])["error"]["code"], -32002);
}

#[tokio::test]
async fn unknown_method_and_ping() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(&session, r#"{"jsonrpc":"2.0","id":7,"method":"no/such"}"#).await;
    assert_eq!(data(&frames[0])["error"]["code"], -32601);

    let frames = post(&session, r#"{"jsonrpc":"2.0","id":8,"method":"ping"}"#).await;
    assert_eq!(data(&frames[0])["result"], json!({}));
}

#[tokio::test]
async fn notifications_emit_zero_frames() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    // A batch of one notification plus one request: only the request's
    // reply and the closed frame come back.
    let frames = post(
        &session,
        r#"[
            {"jsonrpc":"2.0","method":"notifications/initialized"},
            {"jsonrpc":"2.0","id":9,"method":"ping"}
        ]"#,
    )
    .await;

    assert_eq!(frames.len(), 2);
    assert_eq!(data(&frames[0])["id"], 9);
    assert_eq!(frames[1].event, FrameEvent::Closed);
}

#[tokio::test]
async fn deferred_reply_resolves_and_closes() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":12,"method":"tools/call","params":{"name":"slow_tool","arguments":{}}}"#,
    )
    .await;

    assert_eq!(frames.len(), 2);
    assert_eq!(data(&frames[0])["id"], 12);
    assert_eq!(
        data(&frames[0])["result"]["content"][0]["text"],
        "done"
    );
    assert_eq!(frames[1].event, FrameEvent::Closed);
}

#[tokio::test]
async fn batch_replies_preserve_request_order() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"[
            {"jsonrpc":"2.0","id":1,"method":"ping"},
            {"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo_tool","arguments":{"message":"x"}}},
            {"jsonrpc":"2.0","id":3,"method":"ping"}
        ]"#,
    )
    .await;

    let ids: Vec<i64> = frames[..3]
        .iter()
        .map(|f| data(f)["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn log_messages_respect_session_level() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, mut owner) = open(&core).await;

    // Default level is info: an info message passes.
    session
        .handle
        .send(SessionMessage::Log {
            params: LoggingMessageParams::new(LoggingLevel::Info, json!("first")),
        })
        .await
        .unwrap();
    let frame = owner.recv().await.unwrap();
    assert_eq!(data(&frame)["method"], "notifications/message");
    assert_eq!(data(&frame)["params"]["data"], "first");

    // Raise the threshold to error via logging/setLevel.
    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":20,"method":"logging/setLevel","params":{"level":"error"}}"#,
    )
    .await;
    assert_eq!(data(&frames[0])["result"], json!({}));

    // Info is now dropped; error passes.
    session
        .handle
        .send(SessionMessage::Log {
            params: LoggingMessageParams::new(LoggingLevel::Info, json!("dropped")),
        })
        .await
        .unwrap();
    session
        .handle
        .send(SessionMessage::Log {
            params: LoggingMessageParams::new(LoggingLevel::Error, json!("kept")),
        })
        .await
        .unwrap();
    let frame = owner.recv().await.unwrap();
    assert_eq!(data(&frame)["params"]["data"], "kept");
}

#[tokio::test]
async fn progress_without_token_degrades_to_ping() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, mut owner) = open(&core).await;

    session
        .handle
        .send(SessionMessage::Progress {
            token: Some(json!("tok")),
            progress: 0.4,
            total: Some(1.0),
            message: None,
        })
        .await
        .unwrap();
    let frame = owner.recv().await.unwrap();
    assert_eq!(data(&frame)["method"], "notifications/progress");
    assert_eq!(data(&frame)["params"]["progressToken"], "tok");

    session
        .handle
        .send(SessionMessage::Progress {
            token: None,
            progress: 0.5,
            total: None,
            message: None,
        })
        .await
        .unwrap();
    let frame = owner.recv().await.unwrap();
    assert_eq!(frame.event, FrameEvent::Ping);
}

#[tokio::test]
async fn list_changed_respects_allow_lists() {
    let router = base_router()
        .on_connect(|info| async move {
            // Sessions carrying the restricted marker get a frozen view.
            if info.headers.contains_key("x-restricted") {
                ConnectDecision::Accept(ConnectAccept::all().allow_tools(["echo_tool"]))
            } else {
                ConnectDecision::Accept(ConnectAccept::all())
            }
        })
        .build();
    let core = ServerCore::new(router, CoreOptions::default());

    let (open_session, mut open_rx) = open(&core).await;
    let (tx, mut restricted_rx) = mpsc::channel(64);
    let restricted = Session::open(
        core.clone(),
        tx,
        false,
        TransportKind::Http,
        [("x-restricted".to_string(), "1".to_string())].into(),
    )
    .await
    .unwrap();

    core.add_tool(ToolSpec::new(
        "new_tool",
        InputSchema::empty(),
        |_a, _r, _c| async { HandlerResult::Reply(json!({})) },
    ))
    .await
    .unwrap();

    // The unrestricted session hears about it.
    let frame = tokio::time::timeout(Duration::from_secs(1), open_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data(&frame)["method"], "notifications/tools/list_changed");

    // The allow-listed session's view is frozen: no frame.
    let nothing =
        tokio::time::timeout(Duration::from_millis(100), restricted_rx.recv()).await;
    assert!(nothing.is_err());

    // And its tools/list stays filtered.
    let frames = post(&restricted, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;
    let tools = data(&frames[0])["result"]["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "echo_tool");

    drop(open_session);
}

#[tokio::test]
async fn tools_list_identity_without_allow_list() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(&session, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;
    let tools = data(&frames[0])["result"]["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["echo_tool", "raising_tool", "slow_tool"]);
}

#[tokio::test]
async fn list_pagination_with_signed_cursor() {
    let mut builder = Router::builder("paged", "1.0");
    for i in 0..120 {
        builder = builder.tool(ToolSpec::new(
            format!("tool_{:03}", i),
            InputSchema::empty(),
            |_a, _r, _c| async { HandlerResult::Reply(json!({})) },
        ));
    }
    let core = ServerCore::new(builder.build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(&session, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;
    let result = &data(&frames[0])["result"];
    assert_eq!(result["tools"].as_array().unwrap().len(), 100);
    let cursor = result["nextCursor"].as_str().unwrap().to_string();

    let body = format!(
        r#"{{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{{"cursor":"{}"}}}}"#,
        cursor
    );
    let frames = post(&session, &body).await;
    let result = &data(&frames[0])["result"];
    assert_eq!(result["tools"].as_array().unwrap().len(), 20);
    assert!(result.get("nextCursor").is_none());

    // A tampered cursor is invalid params.
    let body = format!(
        r#"{{"jsonrpc":"2.0","id":3,"method":"tools/list","params":{{"cursor":"{}x"}}}}"#,
        cursor
    );
    let frames = post(&session, &body).await;
    assert_eq!(data(&frames[0])["error"]["code"], -32602);
}

#[tokio::test]
async fn prompt_get_and_completion() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":1,"method":"prompts/get","params":{"name":"greet","arguments":{"lang":"eo"}}}"#,
    )
    .await;
    assert_eq!(
        data(&frames[0])["result"]["messages"][0]["content"]["text"],
        "hello in eo"
    );

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":2,"method":"completion/complete","params":{"ref":{"type":"ref/prompt","name":"greet"},"argument":{"name":"lang","value":"e"}}}"#,
    )
    .await;
    let completion = &data(&frames[0])["result"]["completion"];
    assert_eq!(completion["values"], json!(["en", "eo"]));
    assert_eq!(completion["hasMore"], false);
}

#[tokio::test]
async fn subscribe_without_pubsub_is_unavailable() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, _owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":1,"method":"resources/subscribe","params":{"uri":"test:///text/1"}}"#,
    )
    .await;
    assert_eq!(data(&frames[0])["error"]["code"], -32602);
}

#[tokio::test]
async fn subscribe_and_resource_updated_with_pubsub() {
    let options = CoreOptions {
        pubsub: Some(Arc::new(wisp_mcp_tracker::LocalPubSub::new())),
        ..Default::default()
    };
    let core = ServerCore::new(base_router().build(), options);
    let (session, mut owner) = open(&core).await;

    let frames = post(
        &session,
        r#"{"jsonrpc":"2.0","id":1,"method":"resources/subscribe","params":{"uri":"test:///text/1"}}"#,
    )
    .await;
    assert_eq!(data(&frames[0])["result"], json!({}));

    core.notify_resource_updated("test:///text/1").await;
    let frame = tokio::time::timeout(Duration::from_secs(1), owner.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        data(&frame)["method"],
        "notifications/resources/updated"
    );
    assert_eq!(data(&frame)["params"]["uri"], "test:///text/1");

    // A session that never subscribed hears nothing.
    let (_other, mut other_rx) = open(&core).await;
    core.notify_resource_updated("test:///text/1").await;
    owner.recv().await.unwrap();
    let nothing = tokio::time::timeout(Duration::from_millis(100), other_rx.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn elicitation_round_trip() {
    let router = base_router()
        .tool(ToolSpec::new(
            "asking_tool",
            InputSchema::empty(),
            |_args, req, ctx| async move {
                tokio::spawn(async move {
                    let result = ctx
                        .elicit(Elicitation::form("Your name?", json!({"type": "object"})))
                        .await;
                    let reply = match result {
                        Ok(outcome) => serde_json::to_value(CallToolResult::text(format!(
                            "action: {:?}",
                            outcome.action
                        )))
                        .map_err(McpError::from),
                        Err(err) => Err(err),
                    };
                    ctx.reply(req.id.clone(), reply);
                });
                HandlerResult::NoReply
            },
        ))
        .build();
    let core = ServerCore::new(router, CoreOptions::default());
    let (session, mut owner) = open(&core).await;

    // Kick off the tool on its own stream; the reply stays pending.
    let (tx, mut call_rx) = mpsc::channel(64);
    let items = wisp_mcp_json_rpc::parse_body(
        r#"{"jsonrpc":"2.0","id":30,"method":"tools/call","params":{"name":"asking_tool","arguments":{}}}"#,
    )
    .unwrap();
    session
        .handle
        .send(SessionMessage::Dispatch { items, reply_to: tx })
        .await
        .unwrap();

    // The elicitation/create request goes out on the owner stream with a
    // fresh id.
    let frame = tokio::time::timeout(Duration::from_secs(2), owner.recv())
        .await
        .unwrap()
        .unwrap();
    let envelope = data(&frame).clone();
    assert_eq!(envelope["method"], "elicitation/create");
    assert_eq!(envelope["params"]["mode"], "form");
    let elicit_id = envelope["id"].as_str().unwrap().to_string();

    // The client answers on a new POST: a bare JSON-RPC response.
    let body = format!(
        r#"{{"jsonrpc":"2.0","id":"{}","result":{{"action":"accept","content":{{"name":"alice"}}}}}}"#,
        elicit_id
    );
    let items = wisp_mcp_json_rpc::parse_body(&body).unwrap();
    let (ack_tx, _ack_rx) = mpsc::channel(64);
    session
        .handle
        .send(SessionMessage::Dispatch { items, reply_to: ack_tx })
        .await
        .unwrap();

    // The blocked caller resumes and resolves the original request.
    let frame = tokio::time::timeout(Duration::from_secs(2), call_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data(&frame)["id"], 30);
    assert_eq!(
        data(&frame)["result"]["content"][0]["text"],
        "action: Accept"
    );
}

#[tokio::test]
async fn duplicate_runtime_add_is_rejected() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());

    let err = core
        .add_tool(ToolSpec::new(
            "echo_tool",
            InputSchema::empty(),
            |_a, _r, _c| async { HandlerResult::Reply(json!({})) },
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[tokio::test]
async fn terminate_emits_closed_with_reason() {
    let core = ServerCore::new(base_router().build(), CoreOptions::default());
    let (session, mut owner) = open(&core).await;

    session
        .handle
        .send(SessionMessage::Terminate {
            reason: "terminate".to_string(),
        })
        .await
        .unwrap();

    let frame = owner.recv().await.unwrap();
    assert_eq!(frame.event, FrameEvent::Closed);
    assert_eq!(data(&frame)["reason"], "terminate");

    // The tracker forgets the session.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(core.tracker().get_session(&session.id).await.is_none());
}

#[tokio::test]
async fn inactivity_closes_idle_session() {
    let options = CoreOptions {
        session_timeout: Duration::from_millis(80),
        keepalive_interval: Duration::from_millis(40),
        ..Default::default()
    };
    let core = ServerCore::new(base_router().build(), options);
    let (_session, mut owner) = open(&core).await;

    // Eventually the inactivity probe closes the session.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let frame = tokio::time::timeout_at(deadline, owner.recv())
            .await
            .expect("closed before deadline")
            .expect("stream open");
        if frame.is_terminal() {
            assert_eq!(data(&frame)["reason"], "inactivity");
            break;
        }
        // Keep-alive pings may precede the close.
        assert_eq!(frame.event, FrameEvent::Ping);
    }
}
