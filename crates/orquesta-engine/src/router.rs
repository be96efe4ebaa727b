use crate::config::OrchestratorConfig;
use orquesta_core::RoutingDecision;
use orquesta_agents::AgentRegistry;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Terminal pseudo-agent: consolidation instead of another specialist.
pub const ASSEMBLE: &str = "assemble";

/// Pick the next concrete agent to run.
///
/// Pops the queue front, skipping agents that are administratively disabled
/// or missing from the registry. An exhausted queue falls through to
/// `assemble`. The router never invents a name absent from the registry.
pub fn route(
    queue: &mut VecDeque<String>,
    registry: &AgentRegistry,
    config: &OrchestratorConfig,
) -> RoutingDecision {
    let mut skipped = 0usize;
    while let Some(agent) = queue.pop_front() {
        if agent == ASSEMBLE {
            return RoutingDecision {
                agent: ASSEMBLE.to_string(),
                reason: "queue reached assemble".to_string(),
            };
        }
        if config.is_disabled(&agent) {
            debug!(agent = %agent, "Router skipping disabled agent");
            skipped += 1;
            continue;
        }
        if !registry.contains(&agent) {
            warn!(agent = %agent, "Router skipping unregistered agent");
            skipped += 1;
            continue;
        }
        let reason = if skipped == 0 {
            "next in supervisor queue".to_string()
        } else {
            format!("next available after skipping {skipped}")
        };
        return RoutingDecision { agent, reason };
    }
    RoutingDecision {
        agent: ASSEMBLE.to_string(),
        reason: "queue exhausted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_agents::register_builtins;

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        register_builtins(&mut registry);
        registry
    }

    fn queue_of(agents: &[&str]) -> VecDeque<String> {
        agents.iter().map(|a| (*a).to_string()).collect()
    }

    #[test]
    fn pops_front_of_queue() {
        let mut queue = queue_of(&["capi_datab", "summary"]);
        let decision = route(&mut queue, &registry(), &OrchestratorConfig::default());
        assert_eq!(decision.agent, "capi_datab");
        assert_eq!(queue, ["summary"]);
    }

    #[test]
    fn empty_queue_routes_to_assemble() {
        let mut queue = VecDeque::new();
        let decision = route(&mut queue, &registry(), &OrchestratorConfig::default());
        assert_eq!(decision.agent, ASSEMBLE);
    }

    #[test]
    fn disabled_agent_is_skipped() {
        let config = OrchestratorConfig {
            disabled_agents: vec!["capi_datab".to_string()],
            ..OrchestratorConfig::default()
        };
        let mut queue = queue_of(&["capi_datab", "summary"]);
        let decision = route(&mut queue, &registry(), &config);
        assert_eq!(decision.agent, "summary");
    }

    #[test]
    fn all_disabled_falls_through_to_assemble() {
        let config = OrchestratorConfig {
            disabled_agents: vec!["capi_datab".to_string(), "summary".to_string()],
            ..OrchestratorConfig::default()
        };
        let mut queue = queue_of(&["capi_datab", "summary"]);
        let decision = route(&mut queue, &registry(), &config);
        assert_eq!(decision.agent, ASSEMBLE);
    }

    #[test]
    fn unregistered_name_is_never_selected() {
        let mut queue = queue_of(&["ghost_agent", "summary"]);
        let decision = route(&mut queue, &registry(), &OrchestratorConfig::default());
        assert_eq!(decision.agent, "summary");
    }
}
