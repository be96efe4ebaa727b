//! Minimal built-in agents.
//!
//! The real platform wires external specialists (database, documents, news,
//! desktop) behind the [`Agent`] contract. These built-ins keep their
//! contracts fully real — capability descriptors, artifacts, approval
//! requirements — while their internals stay deliberately trivial, so the
//! CLI and integration suites can run a complete registry.

use crate::registry::AgentRegistry;
use orquesta_core::{
    ActionKind, Agent, AgentCapability, AgentContext, AgentResult, OrquestaResult, TurnRole,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Summarizes the artifacts and history accumulated so far this turn.
pub struct SummaryAgent {
    capability: AgentCapability,
}

impl SummaryAgent {
    pub fn new() -> Self {
        Self {
            capability: AgentCapability::new(
                "summary",
                "Generates an executive summary of the session so far",
                ActionKind::SummaryGeneration,
            ),
        }
    }
}

impl Default for SummaryAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for SummaryAgent {
    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn invoke(&self, _instruction: &str, ctx: &AgentContext) -> OrquestaResult<AgentResult> {
        let sources: Vec<&str> = ctx.shared_artifacts.keys().map(String::as_str).collect();
        let user_turns = ctx
            .history
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .count();
        let message = if sources.is_empty() {
            format!("Resumen: {user_turns} consulta(s) en esta sesión, sin datos adicionales.")
        } else {
            format!(
                "Resumen: {user_turns} consulta(s) en esta sesión, con datos de {}.",
                sources.join(", ")
            )
        };
        Ok(AgentResult::ok(message).with_artifacts(serde_json::json!({
            "summarized_sources": sources,
        })))
    }
}

/// Canned business-data lookup (`capi_datab`).
pub struct DatabaseAgent {
    capability: AgentCapability,
}

impl DatabaseAgent {
    pub fn new() -> Self {
        Self {
            capability: AgentCapability::new(
                "capi_datab",
                "Queries the business database",
                ActionKind::DatabaseQuery,
            ),
        }
    }
}

impl Default for DatabaseAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DatabaseAgent {
    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn invoke(&self, instruction: &str, _ctx: &AgentContext) -> OrquestaResult<AgentResult> {
        let rows = serde_json::json!([
            {"cliente": "ACME SA", "saldo": 12500.0},
            {"cliente": "Norte SRL", "saldo": 8300.5},
        ]);
        Ok(AgentResult::ok(format!(
            "Encontré 2 registros para \"{instruction}\"."
        ))
        .with_data(serde_json::json!({"row_count": 2}))
        .with_artifacts(serde_json::json!({"rows": rows}))
        .with_handoff("summary"))
    }
}

/// Desktop file operations (`capi_desktop`). Write and delete actions must
/// pass the human gate before they run.
pub struct DesktopAgent {
    capability: AgentCapability,
}

impl DesktopAgent {
    pub fn new() -> Self {
        Self {
            capability: AgentCapability::new(
                "capi_desktop",
                "Performs desktop file operations",
                ActionKind::FileWrite,
            )
            .with_approval_for(vec![ActionKind::FileWrite, ActionKind::FileDelete]),
        }
    }
}

impl Default for DesktopAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DesktopAgent {
    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn invoke(&self, instruction: &str, _ctx: &AgentContext) -> OrquestaResult<AgentResult> {
        let lowered = instruction.to_lowercase();
        let action = if lowered.contains("borra") || lowered.contains("delete") {
            ActionKind::FileDelete
        } else if lowered.contains("lee") || lowered.contains("read") {
            ActionKind::FileRead
        } else {
            ActionKind::FileWrite
        };
        let result = AgentResult::ok(format!("Operación de escritorio lista: {instruction}"))
            .with_action(action);
        if action.is_destructive() {
            Ok(result.with_pending_action(format!("{action} on the user's desktop: {instruction}")))
        } else {
            Ok(result)
        }
    }
}

/// Canned news headlines (`capi_noticias`).
pub struct NewsAgent {
    capability: AgentCapability,
}

impl NewsAgent {
    pub fn new() -> Self {
        Self {
            capability: AgentCapability::new(
                "capi_noticias",
                "Fetches recent news headlines",
                ActionKind::NewsFetch,
            ),
        }
    }
}

impl Default for NewsAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for NewsAgent {
    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn invoke(&self, _instruction: &str, _ctx: &AgentContext) -> OrquestaResult<AgentResult> {
        let headlines = serde_json::json!([
            "Mercados estables tras el cierre",
            "Nueva línea de crédito para pymes",
        ]);
        Ok(AgentResult::ok("Estas son las últimas noticias.")
            .with_artifacts(serde_json::json!({"headlines": headlines})))
    }
}

/// Conversational fallback. The router lands here when classification comes
/// back `unknown` or low-confidence.
pub struct FallbackAgent {
    capability: AgentCapability,
}

impl FallbackAgent {
    pub fn new() -> Self {
        Self {
            capability: AgentCapability::new(
                "conversation",
                "Answers small talk and unclassified queries",
                ActionKind::Conversation,
            ),
        }
    }
}

impl Default for FallbackAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for FallbackAgent {
    fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    async fn invoke(&self, instruction: &str, _ctx: &AgentContext) -> OrquestaResult<AgentResult> {
        if instruction.trim().is_empty() {
            Ok(AgentResult::ok("¿En qué puedo ayudarte?"))
        } else {
            Ok(AgentResult::ok(format!(
                "Entendido: \"{instruction}\". ¿Querés que consulte datos, noticias o genere un resumen?"
            )))
        }
    }
}

/// Register the full built-in set on a registry.
pub fn register_builtins(registry: &mut AgentRegistry) {
    registry.register(Arc::new(SummaryAgent::new()));
    registry.register(Arc::new(DatabaseAgent::new()));
    registry.register(Arc::new(DesktopAgent::new()));
    registry.register(Arc::new(NewsAgent::new()));
    registry.register(Arc::new(FallbackAgent::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn empty_ctx() -> AgentContext {
        AgentContext {
            session_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            intent: None,
            history: Vec::new(),
            shared_artifacts: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn desktop_write_declares_pending_action() {
        let agent = DesktopAgent::new();
        let result = agent
            .invoke("escribe reporte.txt", &empty_ctx())
            .await
            .unwrap();
        assert_eq!(result.action, Some(ActionKind::FileWrite));
        assert!(result.pending_action.is_some());
        assert!(agent.capability().needs_approval(ActionKind::FileWrite));
    }

    #[tokio::test]
    async fn desktop_read_needs_no_approval() {
        let agent = DesktopAgent::new();
        let result = agent.invoke("lee reporte.txt", &empty_ctx()).await.unwrap();
        assert_eq!(result.action, Some(ActionKind::FileRead));
        assert!(result.pending_action.is_none());
        assert!(!agent.capability().needs_approval(ActionKind::FileRead));
    }

    #[tokio::test]
    async fn database_agent_hands_off_to_summary() {
        let agent = DatabaseAgent::new();
        let result = agent.invoke("saldos", &empty_ctx()).await.unwrap();
        assert_eq!(result.handoff.as_deref(), Some("summary"));
        assert!(result.artifacts.is_some());
    }

    #[test]
    fn builtin_set_registers_expected_names() {
        let mut registry = AgentRegistry::new();
        register_builtins(&mut registry);
        for name in ["summary", "capi_datab", "capi_desktop", "capi_noticias", "conversation"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }
}
