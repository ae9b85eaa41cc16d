use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use switchboard_core::errors::{ConfigError, GraphError};
use switchboard_engine::EngineError;
use switchboard_telemetry::TelemetryError;

/// Failures of one run, before they are mapped onto HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("unexpected response shape: {0}")]
    UnexpectedResponseShape(String),
}

/// Errors returned to HTTP clients as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid or missing API key")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn unexpected() -> Self {
        Self::Internal("Unexpected error".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        let mut response = (status, body).into_response();
        if matches!(self, Self::Unauthorized) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::UnknownAgent(key) => Self::NotFound(format!("agent not found: {key}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Reserved-key clashes are the client's fault; everything else is logged by
/// the caller and hidden behind a generic message.
impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Config(c) => Self::Validation(c.to_string()),
            ServiceError::Graph(_) | ServiceError::UnexpectedResponseShape(_) => Self::unexpected(),
        }
    }
}

impl From<TelemetryError> for ApiError {
    fn from(e: TelemetryError) -> Self {
        match e {
            TelemetryError::Unavailable => Self::Internal(e.to_string()),
            other => Self::Internal(format!("Error recording feedback: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_carries_challenge() {
        let resp = ApiError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn service_errors_map_to_status() {
        let reserved: ApiError =
            ServiceError::Config(ConfigError::ReservedKeys(vec!["model".into()])).into();
        assert_eq!(reserved.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(reserved.to_string(), "agent_config contains reserved keys: model");

        let graph: ApiError = ServiceError::Graph(GraphError::Cancelled).into();
        assert_eq!(graph.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(graph.to_string(), "Unexpected error");
    }

    #[test]
    fn telemetry_errors_keep_detail() {
        let missing: ApiError = TelemetryError::Unavailable.into();
        assert_eq!(missing.to_string(), "Langfuse credentials not found");

        let failed: ApiError = TelemetryError::Status {
            status: 400,
            body: "bad".into(),
        }
        .into();
        assert_eq!(failed.to_string(), "Error recording feedback: Langfuse returned 400: bad");
    }

    #[test]
    fn unknown_agent_is_not_found() {
        let err: ApiError = EngineError::UnknownAgent("x".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
