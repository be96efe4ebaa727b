use orquesta_core::{OrquestaError, OrquestaResult};
use serde::{Deserialize, Serialize};

/// Immutable configuration snapshot handed to each turn's executor.
///
/// No component reads ambient global state; everything tunable lives here
/// and is fixed for the duration of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-call agent deadline. A breach fails that step, not the turn.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
    /// Human-gate expiry. On breach the pending action resolves as
    /// rejected with a timeout reason; the turn still completes.
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_secs: u64,
    /// Trailing turns of conversation handed to the classifier and agents.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Visits allowed per node within one turn before the cycle guard
    /// short-circuits to assemble.
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: usize,
    /// Below this confidence the turn routes to the conversational
    /// fallback regardless of the detected intent.
    #[serde(default = "default_min_confidence")]
    pub min_intent_confidence: f64,
    /// Administratively disabled agents; the router skips them.
    #[serde(default)]
    pub disabled_agents: Vec<String>,
    /// Sets of agents with no data dependency, dispatched concurrently
    /// when adjacent in the queue.
    #[serde(default = "default_parallel_groups")]
    pub parallel_groups: Vec<Vec<String>>,
    /// Ring-buffer capacity of each session's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_agent_timeout() -> u64 {
    30
}
fn default_gate_timeout() -> u64 {
    300
}
fn default_history_window() -> usize {
    10
}
fn default_max_node_visits() -> usize {
    10
}
fn default_min_confidence() -> f64 {
    0.3
}
fn default_parallel_groups() -> Vec<Vec<String>> {
    vec![vec!["capi_datab".to_string(), "capi_noticias".to_string()]]
}
fn default_event_buffer() -> usize {
    128
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: default_agent_timeout(),
            gate_timeout_secs: default_gate_timeout(),
            history_window: default_history_window(),
            max_node_visits: default_max_node_visits(),
            min_intent_confidence: default_min_confidence(),
            disabled_agents: Vec::new(),
            parallel_groups: default_parallel_groups(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml(raw: &str) -> OrquestaResult<Self> {
        toml::from_str(raw).map_err(|e| OrquestaError::Config(e.to_string()))
    }

    pub fn is_disabled(&self, agent: &str) -> bool {
        self.disabled_agents.iter().any(|a| a == agent)
    }

    /// The parallel group an agent belongs to, if any.
    pub fn parallel_group_of(&self, agent: &str) -> Option<&[String]> {
        self.parallel_groups
            .iter()
            .find(|g| g.iter().any(|a| a == agent))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.agent_timeout_secs, 30);
        assert_eq!(config.gate_timeout_secs, 300);
        assert!(!config.is_disabled("summary"));
        assert!(config.parallel_group_of("capi_datab").is_some());
        assert!(config.parallel_group_of("summary").is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = OrchestratorConfig::from_toml(
            r#"
            agent_timeout_secs = 5
            disabled_agents = ["capi_desktop"]
            "#,
        )
        .unwrap();
        assert_eq!(config.agent_timeout_secs, 5);
        assert!(config.is_disabled("capi_desktop"));
        assert_eq!(config.gate_timeout_secs, 300);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = OrchestratorConfig::from_toml("agent_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, OrquestaError::Config(_)));
    }
}
