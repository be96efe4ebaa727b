use crate::registry::AgentRegistry;
use orquesta_core::{
    AgentContext, AgentResult, ExecutionState, OrquestaError, OrquestaResult,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Error code recorded when an agent reports failure.
pub const ERR_AGENT: &str = "agent_error";
/// Error code recorded when an agent exceeds its per-call deadline.
pub const ERR_TIMEOUT: &str = "agent_timeout";

/// Classify a failed result for error bookkeeping.
pub fn error_code(result: &AgentResult) -> &'static str {
    if result
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("timed out"))
    {
        ERR_TIMEOUT
    } else {
        ERR_AGENT
    }
}

/// Uniform call adapter into external agent implementations.
///
/// A failing or timed-out agent never aborts the turn: the failure is
/// appended to `response_metadata.errors` and a failed [`AgentResult`] is
/// handed back so the graph can continue. The adapter does not write agent
/// output into the state — the executor applies it once the human gate has
/// had a chance to hold it.
pub struct AgentInvoker {
    registry: Arc<AgentRegistry>,
    timeout: Duration,
    history_window: usize,
}

impl AgentInvoker {
    pub fn new(registry: Arc<AgentRegistry>, timeout: Duration, history_window: usize) -> Self {
        Self {
            registry,
            timeout,
            history_window,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Build the read-only state view an agent receives.
    pub fn context_view(&self, state: &ExecutionState) -> AgentContext {
        let skip = state
            .conversation_history
            .len()
            .saturating_sub(self.history_window);
        AgentContext {
            session_id: state.session_id,
            trace_id: state.trace_id,
            intent: state.detected_intent.map(|i| i.to_string()),
            history: state.conversation_history[skip..].to_vec(),
            shared_artifacts: state.shared_artifacts.clone(),
            metadata: state.response_metadata.clone(),
        }
    }

    /// Invoke a registered agent with a per-call timeout.
    ///
    /// Returns `Err` only for an unregistered name (a routing bug, not an
    /// agent failure). Agent errors and timeouts come back as a failed
    /// result with the corresponding entry already recorded in the state.
    pub async fn invoke(
        &self,
        name: &str,
        instruction: &str,
        state: &mut ExecutionState,
    ) -> OrquestaResult<AgentResult> {
        let agent = self
            .registry
            .get(name)
            .ok_or_else(|| OrquestaError::Registry(format!("unknown agent: {name}")))?
            .clone();

        let ctx = self.context_view(state);
        let start = Instant::now();

        info!(session_id = %state.session_id, agent = %name, "Invoking agent");

        let outcome = tokio::time::timeout(self.timeout, agent.invoke(instruction, &ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(mut result)) => {
                result.metrics.duration_ms = duration_ms;
                if result.action.is_none() {
                    result.action = Some(agent.capability().action_type);
                }
                if !result.success {
                    let detail = result.error.as_deref().unwrap_or("agent reported failure");
                    warn!(agent = %name, detail = %detail, "Agent reported failure");
                    state.record_error(ERR_AGENT, name, detail);
                }
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(agent = %name, error = %e, "Agent invocation failed");
                state.record_error(ERR_AGENT, name, &e.to_string());
                let mut result = AgentResult::failed(e.to_string());
                result.metrics.duration_ms = duration_ms;
                Ok(result)
            }
            Err(_) => {
                warn!(agent = %name, timeout_secs = self.timeout.as_secs(), "Agent timed out");
                let detail = format!("timed out after {}s", self.timeout.as_secs());
                state.record_error(ERR_TIMEOUT, name, &detail);
                let mut result = AgentResult::failed(detail);
                result.metrics.duration_ms = duration_ms;
                Ok(result)
            }
        }
    }

    /// Invoke against a pre-built context view without touching any state.
    ///
    /// Used for parallel fan-out, where several agents share one snapshot
    /// and their results are merged back in queue order afterwards. Error
    /// bookkeeping is the caller's job here.
    pub async fn invoke_view(
        &self,
        name: &str,
        instruction: &str,
        ctx: &AgentContext,
    ) -> OrquestaResult<AgentResult> {
        let agent = self
            .registry
            .get(name)
            .ok_or_else(|| OrquestaError::Registry(format!("unknown agent: {name}")))?
            .clone();
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, agent.invoke(instruction, ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => AgentResult::failed(e.to_string()),
            Err(_) => AgentResult::failed(format!("timed out after {}s", self.timeout.as_secs())),
        };
        result.metrics.duration_ms = duration_ms;
        if result.action.is_none() {
            result.action = Some(agent.capability().action_type);
        }
        Ok(result)
    }

    /// Write a successful (and approved, where relevant) result into the
    /// turn state: message fragment, merged data, shared artifact, and
    /// hand-off metadata.
    pub fn apply(&self, name: &str, result: &AgentResult, state: &mut ExecutionState) {
        if !result.success {
            return;
        }
        if let Some(message) = &result.message {
            state.push_fragment(message.clone());
        }
        state.merge_data(name, result.data.clone());
        if let Some(artifacts) = &result.artifacts {
            state
                .shared_artifacts
                .insert(name.to_string(), artifacts.clone());
        }
        if let Some(target) = &result.handoff {
            state.set_meta("routing_agent", serde_json::json!(name));
            state.set_meta("target_agent", serde_json::json!(target));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orquesta_core::{ActionKind, Agent, AgentCapability};
    use uuid::Uuid;

    struct CannedAgent {
        capability: AgentCapability,
        result: AgentResult,
    }

    #[async_trait]
    impl Agent for CannedAgent {
        fn capability(&self) -> &AgentCapability {
            &self.capability
        }

        async fn invoke(&self, _: &str, _: &AgentContext) -> OrquestaResult<AgentResult> {
            Ok(self.result.clone())
        }
    }

    struct SlowAgent {
        capability: AgentCapability,
    }

    #[async_trait]
    impl Agent for SlowAgent {
        fn capability(&self) -> &AgentCapability {
            &self.capability
        }

        async fn invoke(&self, _: &str, _: &AgentContext) -> OrquestaResult<AgentResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AgentResult::ok("too late"))
        }
    }

    fn registry_with(agent: Arc<dyn Agent>) -> Arc<AgentRegistry> {
        let mut registry = AgentRegistry::new();
        registry.register(agent);
        Arc::new(registry)
    }

    #[tokio::test]
    async fn successful_invocation_fills_metrics_and_action() {
        let registry = registry_with(Arc::new(CannedAgent {
            capability: AgentCapability::new("capi_datab", "db", ActionKind::DatabaseQuery),
            result: AgentResult::ok("3 filas").with_data(serde_json::json!({"rows": 3})),
        }));
        let invoker = AgentInvoker::new(registry, Duration::from_secs(5), 10);
        let mut state = ExecutionState::new(Uuid::new_v4());

        let result = invoker.invoke("capi_datab", "consulta", &mut state).await.unwrap();
        assert!(result.success);
        assert_eq!(result.action, Some(ActionKind::DatabaseQuery));
        assert_eq!(state.error_count(), 0);

        invoker.apply("capi_datab", &result, &mut state);
        assert_eq!(state.response_message, vec!["3 filas"]);
        assert_eq!(state.response_data["rows"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_records_distinct_error_and_continues() {
        let registry = registry_with(Arc::new(SlowAgent {
            capability: AgentCapability::new("summary", "slow", ActionKind::SummaryGeneration),
        }));
        let invoker = AgentInvoker::new(registry, Duration::from_secs(1), 10);
        let mut state = ExecutionState::new(Uuid::new_v4());

        let result = invoker.invoke("summary", "resumen", &mut state).await.unwrap();
        assert!(!result.success);
        assert_eq!(state.error_count(), 1);
        let errors = state.response_metadata["errors"].as_array().unwrap();
        assert_eq!(errors[0]["code"], ERR_TIMEOUT);
    }

    #[tokio::test]
    async fn failed_result_is_recorded_but_not_applied() {
        let registry = registry_with(Arc::new(CannedAgent {
            capability: AgentCapability::new("capi_datab", "db", ActionKind::DatabaseQuery),
            result: AgentResult::failed("backend unavailable"),
        }));
        let invoker = AgentInvoker::new(registry, Duration::from_secs(5), 10);
        let mut state = ExecutionState::new(Uuid::new_v4());

        let result = invoker.invoke("capi_datab", "consulta", &mut state).await.unwrap();
        assert!(!result.success);
        assert_eq!(state.error_count(), 1);

        invoker.apply("capi_datab", &result, &mut state);
        assert!(state.response_message.is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_is_a_registry_error() {
        let invoker = AgentInvoker::new(
            Arc::new(AgentRegistry::new()),
            Duration::from_secs(5),
            10,
        );
        let mut state = ExecutionState::new(Uuid::new_v4());
        let err = invoker.invoke("ghost", "x", &mut state).await.unwrap_err();
        assert!(matches!(err, OrquestaError::Registry(_)));
    }
}
