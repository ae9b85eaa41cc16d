mod error;
mod langfuse;
mod logging;

pub use error::TelemetryError;
pub use langfuse::{FeedbackRecorder, LangfuseClient, LangfuseConfig, ScoreRequest, TraceCreate};
pub use logging::{init_logging, LogFormat, LoggingConfig};
