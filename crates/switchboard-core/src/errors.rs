/// Failures raised by an agent graph while running or reading state.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cancelled")]
    Cancelled,
}

/// Chat-model client errors, classified like provider gateway failures.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ModelError {
    #[error("chat model is not configured")]
    NotConfigured,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited,
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::ServerError { .. }
                | Self::NetworkError(_)
                | Self::StreamInterrupted(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("agent_config contains reserved keys: {}", .0.join(", "))]
    ReservedKeys(Vec<String>),
}

/// A stream candidate that cannot be turned into a client message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("unsupported message payload of type {0}")]
    UnsupportedPayload(&'static str),
    #[error("malformed message: {0}")]
    Malformed(String),
}
