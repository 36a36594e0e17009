//! Shared helpers: mock upstream servers and router request helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::body::{Body, to_bytes};
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chat_relay::{BackendKind, PollPolicy, RelayConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

pub async fn spawn_mock(app: Router) -> Result<Option<String>> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping relay upstream tests: local socket bind is not permitted");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Some(format!("http://{addr}")))
}

#[derive(Clone)]
struct CompletionMockState {
    status: StatusCode,
    response: Value,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

pub struct CompletionMock {
    pub url: String,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl CompletionMock {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn last_body(&self) -> Option<Value> {
        self.bodies.lock().expect("bodies lock").last().cloned()
    }
}

async fn handle_completion(
    State(state): State<CompletionMockState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.calls.fetch_add(1, Ordering::Relaxed);
    state.bodies.lock().expect("bodies lock").push(body);
    (state.status, Json(state.response.clone()))
}

/// Chat-completions endpoint answering every request with `response`.
pub async fn spawn_completion_mock(
    status: StatusCode,
    response: Value,
) -> Result<Option<CompletionMock>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let state = CompletionMockState {
        status,
        response,
        calls: Arc::clone(&calls),
        bodies: Arc::clone(&bodies),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(handle_completion))
        .with_state(state);
    let Some(base) = spawn_mock(app).await? else {
        return Ok(None);
    };
    Ok(Some(CompletionMock {
        url: format!("{base}/v1/chat/completions"),
        calls,
        bodies,
    }))
}

pub fn content_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

pub fn function_call_reply(name: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "function_call": { "name": name, "arguments": "{}" }
            },
            "finish_reason": "function_call"
        }]
    })
}

#[derive(Clone)]
struct AssistantMockState {
    statuses: Arc<Mutex<VecDeque<&'static str>>>,
    newest: Arc<str>,
    log: Arc<Mutex<Vec<String>>>,
}

impl AssistantMockState {
    fn record(&self, entry: String) {
        self.log.lock().expect("log lock").push(entry);
    }

    fn next_status(&self) -> &'static str {
        let mut statuses = self.statuses.lock().expect("statuses lock");
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or("in_progress")
        } else {
            statuses.front().copied().unwrap_or("in_progress")
        }
    }
}

pub struct AssistantMock {
    pub base_url: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl AssistantMock {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().expect("log lock").clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

fn run_json(status: &str) -> Value {
    let mut run = json!({ "id": "run_1", "object": "thread.run", "status": status });
    match status {
        "failed" => {
            run["last_error"] = json!({ "code": "server_error", "message": "model crashed" });
        }
        "requires_action" => {
            run["required_action"] = json!({
                "type": "submit_tool_outputs",
                "submit_tool_outputs": { "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "book_call", "arguments": "{}" }
                }]}
            });
        }
        _ => {}
    }
    run
}

async fn create_thread(State(state): State<AssistantMockState>) -> Json<Value> {
    state.record("create_thread".to_string());
    Json(json!({ "id": "thread_1", "object": "thread" }))
}

async fn add_message(
    State(state): State<AssistantMockState>,
    Path(thread_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record(format!(
        "add_message:{thread_id}:{}:{}",
        body["role"].as_str().unwrap_or_default(),
        body["content"].as_str().unwrap_or_default()
    ));
    Json(json!({ "id": "msg_user", "object": "thread.message" }))
}

async fn create_run(
    State(state): State<AssistantMockState>,
    Path(thread_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record(format!(
        "create_run:{thread_id}:{}",
        body["assistant_id"].as_str().unwrap_or_default()
    ));
    Json(run_json(state.next_status()))
}

async fn retrieve_run(
    State(state): State<AssistantMockState>,
    Path((_thread_id, _run_id)): Path<(String, String)>,
) -> Json<Value> {
    state.record("retrieve_run".to_string());
    Json(run_json(state.next_status()))
}

async fn cancel_run(
    State(state): State<AssistantMockState>,
    Path((_thread_id, _run_id)): Path<(String, String)>,
) -> Json<Value> {
    state.record("cancel_run".to_string());
    Json(run_json("cancelling"))
}

async fn list_messages(
    State(state): State<AssistantMockState>,
    Path(_thread_id): Path<String>,
) -> Json<Value> {
    state.record("list_messages".to_string());
    Json(json!({
        "object": "list",
        "data": [
            {
                "id": "msg_2",
                "role": "assistant",
                "content": [{ "type": "text", "text": { "value": &*state.newest, "annotations": [] } }]
            },
            {
                "id": "msg_1",
                "role": "user",
                "content": [{ "type": "text", "text": { "value": "older", "annotations": [] } }]
            }
        ]
    }))
}

/// Thread/run API following `statuses` (create_run takes the first; the last repeats).
pub async fn spawn_assistant_mock(
    statuses: &[&'static str],
    newest: &str,
) -> Result<Option<AssistantMock>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let state = AssistantMockState {
        statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
        newest: Arc::from(newest),
        log: Arc::clone(&log),
    };
    let app = Router::new()
        .route("/v1/threads", post(create_thread))
        .route(
            "/v1/threads/{thread_id}/messages",
            post(add_message).get(list_messages),
        )
        .route("/v1/threads/{thread_id}/runs", post(create_run))
        .route("/v1/threads/{thread_id}/runs/{run_id}", get(retrieve_run))
        .route(
            "/v1/threads/{thread_id}/runs/{run_id}/cancel",
            post(cancel_run),
        )
        .with_state(state);
    let Some(base) = spawn_mock(app).await? else {
        return Ok(None);
    };
    Ok(Some(AssistantMock {
        base_url: format!("{base}/v1"),
        log,
    }))
}

pub fn completion_config(url: &str) -> RelayConfig {
    RelayConfig {
        completion_url: url.to_string(),
        api_key: Some("sk-test".to_string()),
        ..RelayConfig::default()
    }
}

pub fn assistant_config(base_url: &str) -> RelayConfig {
    RelayConfig {
        backend: BackendKind::Assistant,
        assistants_base_url: base_url.to_string(),
        api_key: Some("sk-test".to_string()),
        assistant_id: Some("asst_test".to_string()),
        poll: PollPolicy {
            interval: std::time::Duration::from_millis(10),
            max_wait: std::time::Duration::from_secs(5),
        },
        ..RelayConfig::default()
    }
}

/// Send one request through the router; returns status and parsed JSON (Null when not JSON).
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, payload)
}

pub fn chat_request(body: &str) -> Request<Body> {
    Request::post("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}
