pub mod research_assistant;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use switchboard_core::checkpoint::Checkpointer;
use switchboard_core::graph::AgentGraph;
use switchboard_core::provider::ChatModel;

use crate::error::EngineError;

/// Agent used by routes that do not name one.
pub const DEFAULT_AGENT: &str = research_assistant::NAME;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub key: String,
    pub description: String,
}

struct AgentEntry {
    description: String,
    graph: Arc<dyn AgentGraph>,
}

/// Agents served by this process, keyed by id.
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentEntry>,
    default_agent: String,
}

impl AgentRegistry {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            agents: BTreeMap::new(),
            default_agent: default_agent.into(),
        }
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
        graph: Arc<dyn AgentGraph>,
    ) {
        self.agents.insert(
            key.into(),
            AgentEntry {
                description: description.into(),
                graph,
            },
        );
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn AgentGraph>, EngineError> {
        self.agents
            .get(key)
            .map(|e| Arc::clone(&e.graph))
            .ok_or_else(|| EngineError::UnknownAgent(key.to_string()))
    }

    pub fn default_graph(&self) -> Result<Arc<dyn AgentGraph>, EngineError> {
        self.get(&self.default_agent)
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    pub fn info(&self) -> Vec<AgentInfo> {
        self.agents
            .iter()
            .map(|(key, e)| AgentInfo {
                key: key.clone(),
                description: e.description.clone(),
            })
            .collect()
    }
}

/// Registry with the built-in agents.
pub fn default_registry(
    model: Arc<dyn ChatModel>,
    checkpointer: Arc<dyn Checkpointer>,
) -> Result<AgentRegistry, EngineError> {
    let mut registry = AgentRegistry::new(DEFAULT_AGENT);
    let research = research_assistant::build(model, checkpointer)?;
    registry.register(
        research_assistant::NAME,
        research_assistant::DESCRIPTION,
        Arc::new(research),
    );
    info!(agents = ?registry.agents.keys().collect::<Vec<_>>(), "agent registry ready");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCheckpointer;
    use switchboard_llm::MockChatModel;

    fn registry() -> AgentRegistry {
        default_registry(
            Arc::new(MockChatModel::echo()),
            Arc::new(MemoryCheckpointer::new()),
        )
        .unwrap()
    }

    #[test]
    fn default_agent_is_registered() {
        let registry = registry();
        assert_eq!(registry.default_agent(), "research-assistant");
        assert!(registry.default_graph().is_ok());
        assert_eq!(
            registry.info(),
            vec![AgentInfo {
                key: "research-assistant".into(),
                description: "A research assistant with web search and calculator.".into(),
            }]
        );
    }

    #[test]
    fn unknown_agent() {
        assert!(matches!(
            registry().get("nope"),
            Err(EngineError::UnknownAgent(k)) if k == "nope"
        ));
    }
}
