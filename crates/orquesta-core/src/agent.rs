//! The agent contract consumed by the orchestrator.
//!
//! These types live in `orquesta-core` so that the agent registry, the
//! invocation adapter, and the engine's router/human-gate can all share
//! them without circular deps. The orchestrator only ever depends on the
//! [`Agent`] trait and the [`AgentCapability`] descriptor — never on a
//! concrete agent type.

use crate::conversation::ConversationTurn;
use crate::error::OrquestaResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Semantic kind of the action an agent performs or proposes.
///
/// Used by the human-gate classifier (destructive/write kinds require
/// approval) and carried on live events for human-readable rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DatabaseQuery,
    DocumentGeneration,
    SummaryGeneration,
    NewsFetch,
    FileRead,
    FileWrite,
    FileDelete,
    Conversation,
}

impl ActionKind {
    /// Whether this action mutates external state.
    pub fn is_destructive(self) -> bool {
        matches!(self, ActionKind::FileWrite | ActionKind::FileDelete)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ActionKind::DatabaseQuery => "database_query",
            ActionKind::DocumentGeneration => "document_generation",
            ActionKind::SummaryGeneration => "summary_generation",
            ActionKind::NewsFetch => "news_fetch",
            ActionKind::FileRead => "file_read",
            ActionKind::FileWrite => "file_write",
            ActionKind::FileDelete => "file_delete",
            ActionKind::Conversation => "conversation",
        };
        write!(f, "{tag}")
    }
}

/// Static capability descriptor declared by every registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    /// Registry name (e.g. `capi_datab`).
    pub name: String,
    /// One-line description for introspection and narration.
    pub description: String,
    /// The primary action kind this agent performs.
    pub action_type: ActionKind,
    /// Action kinds that must pass the human gate before executing.
    #[serde(default)]
    pub requires_approval_for: Vec<ActionKind>,
}

impl AgentCapability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        action_type: ActionKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            action_type,
            requires_approval_for: Vec::new(),
        }
    }

    pub fn with_approval_for(mut self, kinds: Vec<ActionKind>) -> Self {
        self.requires_approval_for = kinds;
        self
    }

    /// Whether an action of the given kind needs human approval.
    pub fn needs_approval(&self, kind: ActionKind) -> bool {
        self.requires_approval_for.contains(&kind)
    }
}

/// Execution metrics collected per invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub duration_ms: u64,
    pub items_produced: u32,
}

/// Uniform result returned by every agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    /// Human-readable fragment contributed to the final answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured output merged into the turn's `response_data`.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    /// Structured artifact stored in `shared_artifacts` under this agent's
    /// name, readable by later agents in the same turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<serde_json::Value>,
    #[serde(default)]
    pub metrics: AgentMetrics,
    /// The action actually performed or proposed. Defaults to the agent's
    /// declared `action_type` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    /// Description of the pending action, shown to the human reviewer when
    /// the gate suspends on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<String>,
    /// Name of an agent this result recommends handing off to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<String>,
    /// Error detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// A successful result carrying a message fragment.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: serde_json::Value::Null,
            artifacts: None,
            metrics: AgentMetrics::default(),
            action: None,
            pending_action: None,
            handoff: None,
            error: None,
        }
    }

    /// A failed result with an error detail and no output.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: serde_json::Value::Null,
            artifacts: None,
            metrics: AgentMetrics::default(),
            action: None,
            pending_action: None,
            handoff: None,
            error: Some(error.into()),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_artifacts(mut self, artifacts: serde_json::Value) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_pending_action(mut self, description: impl Into<String>) -> Self {
        self.pending_action = Some(description.into());
        self
    }

    pub fn with_handoff(mut self, agent: impl Into<String>) -> Self {
        self.handoff = Some(agent.into());
        self
    }
}

/// Read-only view of the turn handed to an agent at invocation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub session_id: Uuid,
    pub trace_id: Uuid,
    /// Detected intent tag for the turn, when classification succeeded.
    pub intent: Option<String>,
    /// Trailing window of the conversation history.
    pub history: Vec<ConversationTurn>,
    /// Artifacts left by agents that already ran this turn.
    pub shared_artifacts: HashMap<String, serde_json::Value>,
    /// Snapshot of the turn's response metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Trait implemented by every specialist agent registered with the
/// orchestrator — whether a real backend integration or a test double.
#[async_trait]
pub trait Agent: Send + Sync {
    fn capability(&self) -> &AgentCapability;

    async fn invoke(&self, instruction: &str, ctx: &AgentContext) -> OrquestaResult<AgentResult>;
}
