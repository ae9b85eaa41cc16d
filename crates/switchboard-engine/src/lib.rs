//! In-process agent graph runtime: linear node pipelines with checkpointing,
//! interrupt/resume, and the built-in agents.

#![deny(unsafe_code)]

pub mod agents;
pub mod error;
pub mod memory;
pub mod mock;
pub mod node;
pub mod pipeline;

pub use agents::{default_registry, AgentInfo, AgentRegistry, DEFAULT_AGENT};
pub use error::EngineError;
pub use memory::MemoryCheckpointer;
pub use mock::ScriptedGraph;
pub use node::{Node, NodeContext, NodeOutput};
pub use pipeline::{FnNode, Pipeline};
