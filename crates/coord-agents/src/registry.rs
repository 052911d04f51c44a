use crate::agent::ReasoningAgent;
use crate::error::AgentError;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maps agent id to agent. Registration order is preserved (an
/// `IndexMap`, not a `HashMap`) because the coordination engine must query
/// non-initiator participants in registration order for deterministic
/// message logs. Lookups take a read lock and never block on each other or
/// on a concurrent registration beyond that registration's own critical
/// section.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<IndexMap<String, Arc<dyn ReasoningAgent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(IndexMap::new()),
        }
    }

    /// Idempotent per id: re-registering replaces the existing agent in
    /// place, preserving its original registration-order slot.
    pub async fn register(&self, agent: Arc<dyn ReasoningAgent>) {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id().to_string(), agent);
    }

    pub async fn get(&self, id: &str) -> Result<Arc<dyn ReasoningAgent>, AgentError> {
        let agents = self.agents.read().await;
        agents
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgent { id: id.to_string() })
    }

    /// All registered agents, in registration order.
    pub async fn list(&self) -> Vec<Arc<dyn ReasoningAgent>> {
        let agents = self.agents.read().await;
        agents.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAgent;

    #[tokio::test]
    async fn get_of_unknown_id_is_an_error() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.get("nobody").await,
            Err(AgentError::UnknownAgent { .. })
        ));
    }

    #[tokio::test]
    async fn list_preserves_registration_order() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(StubAgent::passthrough("SC", "initiator"))).await;
        registry.register(Arc::new(StubAgent::passthrough("FIN", "finance"))).await;
        registry.register(Arc::new(StubAgent::passthrough("FAC", "facilities"))).await;

        let ids: Vec<String> = registry.list().await.iter().map(|a| a.id().to_string()).collect();
        assert_eq!(ids, vec!["SC", "FIN", "FAC"]);
    }

    #[tokio::test]
    async fn re_registering_replaces_without_moving_slot() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(StubAgent::passthrough("SC", "initiator"))).await;
        registry.register(Arc::new(StubAgent::passthrough("FIN", "finance"))).await;
        registry.register(Arc::new(StubAgent::passthrough("SC", "initiator-v2"))).await;

        let roles: Vec<String> = registry.list().await.iter().map(|a| a.role().to_string()).collect();
        assert_eq!(roles, vec!["initiator-v2", "finance"]);
    }
}
