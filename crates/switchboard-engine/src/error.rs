/// Errors raised while assembling graphs and registries.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("pipeline has no nodes")]
    EmptyPipeline,

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("node name is reserved: {0}")]
    ReservedNode(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}
