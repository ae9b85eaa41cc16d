//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::error;

use switchboard_core::config::RunConfig;
use switchboard_core::graph::AgentGraph;
use switchboard_core::ids::ThreadId;
use switchboard_core::messages::ChatMessage;
use switchboard_telemetry::TraceCreate;

use crate::error::{ApiError, ServiceError};
use crate::invoke;
use crate::run::{prepare_run, run_config, PreparedRun};
use crate::schema::{
    ChatHistory, ChatHistoryInput, Feedback, FeedbackResponse, ServiceMetadata, StreamInput,
    UserInput,
};
use crate::server::AppState;
use crate::stream::envelope::FrameSink;
use crate::stream::{message_generator, sse_body_stream, sse_response, StreamOptions};

const SSE_CHANNEL_SIZE: usize = 64;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn info(State(state): State<AppState>) -> Json<ServiceMetadata> {
    Json(ServiceMetadata {
        agents: state.agents.info(),
        default_agent: state.agents.default_agent().to_string(),
    })
}

fn resolve_agent(state: &AppState, agent_id: Option<&str>) -> Result<Arc<dyn AgentGraph>, ApiError> {
    Ok(match agent_id {
        Some(id) => state.agents.get(id)?,
        None => state.agents.default_graph()?,
    })
}

/// Shared front half of `/invoke` and `/stream`: config, resume detection and
/// trace reporting.
async fn start_run(
    state: &AppState,
    graph: &dyn AgentGraph,
    agent_id: &str,
    input: &UserInput,
) -> Result<PreparedRun, ApiError> {
    let config = run_config(input)?;
    let run = prepare_run(graph, config, &input.message).await.map_err(|e| {
        if let ServiceError::Graph(ref g) = e {
            error!(error = %g, "failed to read thread state");
        }
        ApiError::from(e)
    })?;
    report_trace(state, agent_id, &run.config, input);
    Ok(run)
}

fn report_trace(state: &AppState, agent_id: &str, config: &RunConfig, input: &UserInput) {
    let Some(client) = state.feedback.client() else {
        return;
    };
    let mut metadata = Map::new();
    if let Some(model) = &config.model {
        metadata.insert("model".into(), Value::String(model.clone()));
    }
    client.report_trace(TraceCreate {
        id: config.run_id.to_string(),
        name: agent_id.to_string(),
        session_id: Some(config.thread_id.to_string()),
        user_id: config.user_id.clone(),
        input: Some(Value::String(input.message.clone())),
        metadata,
    });
}

async fn do_invoke(
    state: AppState,
    agent_id: Option<String>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> Result<Json<ChatMessage>, ApiError> {
    let Json(input) = body?;
    let graph = resolve_agent(&state, agent_id.as_deref())?;
    let agent = agent_id.as_deref().unwrap_or(state.agents.default_agent());
    let run = start_run(&state, graph.as_ref(), agent, &input).await?;
    let message = invoke::invoke(graph.as_ref(), run).await.map_err(|e| {
        error!(error = %e, "an exception occurred");
        ApiError::from(e)
    })?;
    Ok(Json(message))
}

pub async fn invoke_default(
    State(state): State<AppState>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> Result<Json<ChatMessage>, ApiError> {
    do_invoke(state, None, body).await
}

pub async fn invoke_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> Result<Json<ChatMessage>, ApiError> {
    do_invoke(state, Some(agent_id), body).await
}

async fn do_stream(
    state: AppState,
    agent_id: Option<String>,
    body: Result<Json<StreamInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = body?;
    let graph = resolve_agent(&state, agent_id.as_deref())?;
    let agent = agent_id.as_deref().unwrap_or(state.agents.default_agent());
    let run = start_run(&state, graph.as_ref(), agent, &input.input).await?;
    let options = StreamOptions {
        stream_tokens: input.stream_tokens,
        stream_node_updates: input.stream_node_updates,
    };

    let (tx, rx) = mpsc::channel::<Bytes>(SSE_CHANNEL_SIZE);
    tokio::spawn(message_generator(
        graph,
        run,
        options,
        state.roles.clone(),
        FrameSink::new(tx),
    ));
    Ok(sse_response(sse_body_stream(rx)))
}

pub async fn stream_default(
    State(state): State<AppState>,
    body: Result<Json<StreamInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    do_stream(state, None, body).await
}

pub async fn stream_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<StreamInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    do_stream(state, Some(agent_id), body).await
}

pub async fn feedback(
    State(state): State<AppState>,
    body: Result<Json<Feedback>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let Json(feedback) = body?;
    state
        .feedback
        .record(&feedback.run_id, &feedback.key, feedback.score, &feedback.kwargs)
        .await
        .map_err(|e| {
            error!(error = %e, "error recording feedback with Langfuse");
            ApiError::from(e)
        })?;
    Ok(Json(FeedbackResponse::success()))
}

/// Conversation of a thread on the default agent.
pub async fn history(
    State(state): State<AppState>,
    body: Result<Json<ChatHistoryInput>, JsonRejection>,
) -> Result<Json<ChatHistory>, ApiError> {
    let Json(input) = body?;
    let graph = state.agents.default_graph()?;
    let config = RunConfig::for_thread(ThreadId::from_raw(input.thread_id));
    let snapshot = graph.get_state(&config).await.map_err(|e| {
        error!(error = %e, "an exception occurred");
        ApiError::unexpected()
    })?;
    let messages = snapshot.values.messages.iter().map(ChatMessage::from).collect();
    Ok(Json(ChatHistory { messages }))
}
