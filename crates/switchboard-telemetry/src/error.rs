/// Errors from the Langfuse integration.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// No Langfuse credentials are configured.
    #[error("Langfuse credentials not found")]
    Unavailable,
    #[error("request to Langfuse failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Langfuse returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to install log subscriber: {0}")]
    Init(String),
}
