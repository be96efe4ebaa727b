use orquesta_core::{Agent, AgentCapability};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Central lookup table for all registered agents.
///
/// Populated at startup, read-only afterwards — safe for concurrent read
/// access across turns without extra locking.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.capability().name.clone();
        info!(agent = %name, action = %agent.capability().action_type, "Registered agent");
        self.agents.insert(name, agent);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn capability(&self, name: &str) -> Option<&AgentCapability> {
        self.agents.get(name).map(|a| a.capability())
    }

    pub fn capabilities(&self) -> Vec<&AgentCapability> {
        self.agents.values().map(|a| a.capability()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
