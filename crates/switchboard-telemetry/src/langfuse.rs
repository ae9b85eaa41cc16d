use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TelemetryError;

#[derive(Clone, Debug)]
pub struct LangfuseConfig {
    pub public_key: SecretString,
    pub secret_key: SecretString,
    /// Base URL, e.g. `https://cloud.langfuse.com`.
    pub host: String,
}

/// Body of `POST /api/public/scores`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    pub id: String,
    pub trace_id: String,
    pub name: String,
    pub value: f64,
    pub comment: String,
}

/// A run reported as a Langfuse trace. The trace id is the run id so that
/// later feedback scores attach to it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceCreate {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Minimal client for the Langfuse public API.
#[derive(Clone)]
pub struct LangfuseClient {
    http: reqwest::Client,
    config: LangfuseConfig,
}

impl LangfuseClient {
    pub fn new(config: LangfuseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), TelemetryError> {
        let resp = self
            .http
            .post(self.url(path))
            .basic_auth(
                self.config.public_key.expose_secret(),
                Some(self.config.secret_key.expose_secret()),
            )
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelemetryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    pub async fn create_score(&self, score: &ScoreRequest) -> Result<(), TelemetryError> {
        self.post("/api/public/scores", score).await
    }

    pub async fn ingest_trace(&self, trace: &TraceCreate) -> Result<(), TelemetryError> {
        let body = json!({
            "batch": [{
                "id": Uuid::new_v4().to_string(),
                "type": "trace-create",
                "timestamp": Utc::now().to_rfc3339(),
                "body": trace,
            }]
        });
        self.post("/api/public/ingestion", &body).await
    }

    /// Send a trace in the background. Failures are logged and dropped.
    pub fn report_trace(&self, trace: TraceCreate) {
        let client = self.clone();
        tokio::spawn(async move {
            match client.ingest_trace(&trace).await {
                Ok(()) => debug!(trace_id = %trace.id, "langfuse trace recorded"),
                Err(e) => warn!(trace_id = %trace.id, error = %e, "langfuse trace failed"),
            }
        });
    }
}

/// Forwards user feedback to Langfuse as scores keyed by run id.
#[derive(Clone, Default)]
pub struct FeedbackRecorder {
    client: Option<LangfuseClient>,
}

impl FeedbackRecorder {
    pub fn new(client: Option<LangfuseClient>) -> Self {
        Self { client }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&LangfuseClient> {
        self.client.as_ref()
    }

    /// Record one score. `kwargs.comment` becomes the score comment.
    pub async fn record(
        &self,
        run_id: &str,
        key: &str,
        score: f64,
        kwargs: &Map<String, Value>,
    ) -> Result<(), TelemetryError> {
        let Some(client) = &self.client else {
            warn!("Langfuse credentials not found, cannot record feedback");
            return Err(TelemetryError::Unavailable);
        };
        info!(run_id, key, "submitting feedback");
        let request = ScoreRequest {
            id: Uuid::new_v4().to_string(),
            trace_id: run_id.to_string(),
            name: key.to_string(),
            value: score,
            comment: kwargs
                .get("comment")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        client.create_score(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LangfuseClient {
        LangfuseClient::new(LangfuseConfig {
            public_key: SecretString::from("pk-lf"),
            secret_key: SecretString::from("sk-lf"),
            host: server.uri(),
        })
    }

    #[tokio::test]
    async fn record_posts_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/public/scores"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s1"})))
            .expect(1)
            .mount(&server)
            .await;

        let recorder = FeedbackRecorder::new(Some(client_for(&server)));
        let mut kwargs = Map::new();
        kwargs.insert("comment".into(), json!("great answer"));
        recorder.record("run-1", "human-feedback-stars", 0.8, &kwargs).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["traceId"], "run-1");
        assert_eq!(body["name"], "human-feedback-stars");
        assert_eq!(body["value"], 0.8);
        assert_eq!(body["comment"], "great answer");
    }

    #[tokio::test]
    async fn record_without_credentials_is_unavailable() {
        let recorder = FeedbackRecorder::default();
        let err = recorder.record("run-1", "k", 1.0, &Map::new()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Unavailable));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/public/scores"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad keys"))
            .mount(&server)
            .await;

        let recorder = FeedbackRecorder::new(Some(client_for(&server)));
        let err = recorder.record("run-1", "k", 1.0, &Map::new()).await.unwrap_err();
        match err {
            TelemetryError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad keys");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn trace_ingestion_batches_one_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/public/ingestion"))
            .respond_with(ResponseTemplate::new(207).set_body_json(json!({"successes": [], "errors": []})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .ingest_trace(&TraceCreate {
                id: "run-9".into(),
                name: "research-assistant".into(),
                session_id: Some("thread-1".into()),
                user_id: None,
                input: Some(json!("hello")),
                metadata: Map::new(),
            })
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["batch"][0]["type"], "trace-create");
        assert_eq!(body["batch"][0]["body"]["id"], "run-9");
        assert_eq!(body["batch"][0]["body"]["sessionId"], "thread-1");
        assert!(body["batch"][0]["body"].get("userId").is_none());
    }
}
