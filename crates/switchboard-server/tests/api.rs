use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard_core::errors::GraphError;
use switchboard_core::events::{GraphEvent, GraphState, StateDelta};
use switchboard_core::messages::Message;
use switchboard_engine::{
    default_registry, AgentRegistry, FnNode, MemoryCheckpointer, Node, NodeOutput, Pipeline,
    ScriptedGraph, DEFAULT_AGENT,
};
use switchboard_llm::{MockChatModel, MockReply};
use switchboard_server::{build_router, AppState};
use switchboard_store::{CheckpointRepo, Database};
use switchboard_telemetry::{FeedbackRecorder, LangfuseClient, LangfuseConfig};

const SECRET: &str = "test-secret";

fn app(registry: AgentRegistry, feedback: FeedbackRecorder) -> Router {
    build_router(AppState::new(
        registry,
        feedback,
        Some(SecretString::from(SECRET)),
    ))
}

fn scripted_app(graph: Arc<ScriptedGraph>) -> Router {
    let mut registry = AgentRegistry::new(DEFAULT_AGENT);
    registry.register(DEFAULT_AGENT, "scripted", graph);
    app(registry, FeedbackRecorder::default())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, auth: bool) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if auth {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {SECRET}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, text) = send(app, request).await;
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

/// Split an SSE body into frames; `[DONE]` decodes to the string "[DONE]".
fn sse_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let data = chunk.strip_prefix("data: ").unwrap();
            if data == "[DONE]" {
                Value::String(data.into())
            } else {
                serde_json::from_str(data).unwrap()
            }
        })
        .collect()
}

fn sqlite_research_app(dir: &tempfile::TempDir, replies: Vec<MockReply>) -> Router {
    let db = Database::open(&dir.path().join("checkpoints.db")).unwrap();
    let registry = default_registry(
        Arc::new(MockChatModel::new(replies)),
        Arc::new(CheckpointRepo::new(db)),
    )
    .unwrap();
    app(registry, FeedbackRecorder::default())
}

#[tokio::test]
async fn health_is_open_and_always_ok() {
    let graph = Arc::new(ScriptedGraph::new(vec![]).failing_state(GraphError::Checkpoint("down".into())));
    let app = scripted_app(graph);
    let (status, body) = send_json(&app, get("/health", false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn protected_routes_require_bearer() {
    let app = scripted_app(Arc::new(ScriptedGraph::new(vec![])));

    let resp = app.clone().oneshot(get("/info", false)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let wrong = Request::builder()
        .uri("/info")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid or missing API key");

    let lowercase = Request::builder()
        .uri("/info")
        .header(header::AUTHORIZATION, format!("bearer {SECRET}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, lowercase).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app, get("/info", true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default_agent"], "research-assistant");
    assert_eq!(body["agents"][0]["key"], "research-assistant");
}

#[tokio::test]
async fn auth_disabled_without_secret() {
    let mut registry = AgentRegistry::new(DEFAULT_AGENT);
    registry.register(DEFAULT_AGENT, "scripted", Arc::new(ScriptedGraph::new(vec![])));
    let app = build_router(AppState::new(registry, FeedbackRecorder::default(), None));
    let (status, _) = send(&app, get("/info", false)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reserved_keys_rejected_before_engine_runs() {
    let graph = Arc::new(ScriptedGraph::new(vec![]));
    let app = scripted_app(graph.clone());

    for uri in ["/invoke", "/stream"] {
        let (status, body) = send_json(
            &app,
            post(uri, json!({"message": "hi", "agent_config": {"user_id": "x", "model": "m"}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["detail"], "agent_config contains reserved keys: model, user_id");
    }
    assert_eq!(graph.run_count(), 0);
}

#[tokio::test]
async fn malformed_body_is_422_and_unknown_agent_404() {
    let app = scripted_app(Arc::new(ScriptedGraph::new(vec![])));
    let (status, _) = send(&app, post("/invoke", json!({"thread_id": "t"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, post("/nope/invoke", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invoke_engine_failure_is_opaque_500() {
    let graph = Arc::new(ScriptedGraph::new(vec![]).failing_after_events(GraphError::NodeFailed {
        node: "chatbot".into(),
        message: "secret internals".into(),
    }));
    let (status, body) = send_json(&scripted_app(graph), post("/invoke", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"detail": "Unexpected error"}));
}

#[tokio::test]
async fn stream_error_path_ends_with_single_done() {
    let graph = Arc::new(
        ScriptedGraph::new(vec![GraphEvent::Values(GraphState::default())])
            .failing_after_events(GraphError::Checkpoint("lost".into())),
    );
    let (status, body) = send(&scripted_app(graph), post("/stream", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);

    let frames = sse_frames(&body);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], json!({"type": "error", "content": "Internal server error"}));
    assert_eq!(frames[1], "[DONE]");
    assert_eq!(body.matches("[DONE]").count(), 1);
}

#[tokio::test]
async fn tokyo_stream_then_history_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = ["The", " weather", " in", " Tokyo", " is", " sunny", "."];
    let app = sqlite_research_app(&dir, vec![MockReply::tokens(&tokens)]);

    let resp = app
        .clone()
        .oneshot(post("/stream", json!({"message": "Weather in Tokyo?", "thread_id": "trip-1"})))
        .await
        .unwrap();
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    let body = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let frames = sse_frames(std::str::from_utf8(&body).unwrap());

    let streamed: String = frames
        .iter()
        .filter(|f| f["type"] == "token")
        .map(|f| f["content"].as_str().unwrap())
        .collect();
    assert_eq!(streamed, "The weather in Tokyo is sunny.");

    let messages: Vec<&Value> = frames.iter().filter(|f| f["type"] == "message").collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"]["type"], "ai");
    assert_eq!(messages[0]["content"]["content"], streamed);

    let nodes: Vec<&str> = frames
        .iter()
        .filter(|f| f["type"] == "node_update")
        .map(|f| f["content"]["node"].as_str().unwrap())
        .collect();
    assert_eq!(nodes, vec!["reformulate_query", "search", "chatbot", "suggest"]);
    assert_eq!(frames.last().unwrap(), "[DONE]");

    let (status, history) = send_json(&app, post("/history", json!({"thread_id": "trip-1"}))).await;
    assert_eq!(status, StatusCode::OK);
    let history = history["messages"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["type"], "human");
    assert_eq!(history[0]["content"], "Weather in Tokyo?");
    assert_eq!(history[1]["type"], "ai");
    assert_eq!(history[1]["content"], "The weather in Tokyo is sunny.");
}

#[tokio::test]
async fn invoke_continues_a_thread() {
    let dir = tempfile::tempdir().unwrap();
    let app = sqlite_research_app(&dir, vec![MockReply::text("Hello!"), MockReply::text("Fine.")]);

    let (status, first) =
        send_json(&app, post("/invoke", json!({"message": "hi", "thread_id": "t-inv"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["type"], "ai");
    assert_eq!(first["content"], "Hello!");
    assert!(first["run_id"].is_string());

    let (_, second) =
        send_json(&app, post("/research-assistant/invoke", json!({"message": "how are you?", "thread_id": "t-inv"})))
            .await;
    assert_eq!(second["content"], "Fine.");
    assert_ne!(first["run_id"], second["run_id"]);

    let (_, history) = send_json(&app, post("/history", json!({"thread_id": "t-inv"}))).await;
    let kinds: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["human", "ai", "human", "ai"]);
}

#[tokio::test]
async fn interrupted_thread_resumes_with_next_message() {
    let confirm: Arc<dyn Node> = Arc::new(FnNode::new("confirm", |_: &GraphState, resume: Option<&Value>| {
        Ok(match resume {
            None => NodeOutput::Interrupt(json!("Which city?")),
            Some(city) => NodeOutput::Update(StateDelta::messages(vec![Message::ai(format!(
                "Forecast for {}",
                city.as_str().unwrap_or_default()
            ))])),
        })
    }));
    let pipeline = Pipeline::new("weather", vec![confirm], Arc::new(MemoryCheckpointer::new())).unwrap();
    let mut registry = AgentRegistry::new(DEFAULT_AGENT);
    registry.register(DEFAULT_AGENT, "weather", Arc::new(pipeline));
    let app = app(registry, FeedbackRecorder::default());

    let (_, asked) = send_json(&app, post("/invoke", json!({"message": "weather?", "thread_id": "w"}))).await;
    assert_eq!(asked["type"], "ai");
    assert_eq!(asked["content"], "Which city?");

    let (_, answered) = send_json(&app, post("/invoke", json!({"message": "Osaka", "thread_id": "w"}))).await;
    assert_eq!(answered["content"], "Forecast for Osaka");
}

#[tokio::test]
async fn feedback_without_credentials_is_500() {
    let app = scripted_app(Arc::new(ScriptedGraph::new(vec![])));
    let (status, body) = send_json(
        &app,
        post("/feedback", json!({"run_id": "r-1", "key": "human-feedback-stars", "score": 0.8})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Langfuse credentials not found");
}

#[tokio::test]
async fn feedback_forwards_score_to_langfuse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/public/scores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = LangfuseClient::new(LangfuseConfig {
        public_key: SecretString::from("pk"),
        secret_key: SecretString::from("sk"),
        host: server.uri(),
    });
    let mut registry = AgentRegistry::new(DEFAULT_AGENT);
    registry.register(DEFAULT_AGENT, "scripted", Arc::new(ScriptedGraph::new(vec![])));
    let app = app(registry, FeedbackRecorder::new(Some(client)));

    let (status, body) = send_json(
        &app,
        post(
            "/feedback",
            json!({"run_id": "r-1", "key": "human-feedback-stars", "score": 1.0, "kwargs": {"comment": "great"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let requests = server.received_requests().await.unwrap();
    let score: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(score["traceId"], "r-1");
    assert_eq!(score["name"], "human-feedback-stars");
    assert_eq!(score["comment"], "great");
}
