//! Human-in-the-loop decision types shared by the gate and its callers.

use crate::agent::{ActionKind, AgentResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An action held at the human gate, awaiting a reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// Identifier the reviewer's decision must reference.
    pub interrupt_id: String,
    /// Agent whose action is suspended.
    pub agent: String,
    pub action: ActionKind,
    /// Human-readable description of what needs approval and why.
    pub description: String,
    pub requested_at: DateTime<Utc>,
    /// The agent's produced result, held back until the reviewer decides.
    /// Applied on approval; replaced by a rejection message otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held: Option<AgentResult>,
}

impl PendingAction {
    pub fn new(agent: impl Into<String>, action: ActionKind, description: impl Into<String>) -> Self {
        Self {
            interrupt_id: Uuid::new_v4().to_string(),
            agent: agent.into(),
            action,
            description: description.into(),
            requested_at: Utc::now(),
            held: None,
        }
    }

    pub fn with_held(mut self, result: AgentResult) -> Self {
        self.held = Some(result);
        self
    }
}

/// The decision submitted by a human reviewer to resume a paused session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanDecision {
    pub session_id: Uuid,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HumanDecision {
    pub fn approve(session_id: Uuid) -> Self {
        Self {
            session_id,
            approved: true,
            interrupt_id: None,
            reason: None,
            approved_by: None,
            metadata: HashMap::new(),
        }
    }

    pub fn reject(session_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            session_id,
            approved: false,
            interrupt_id: None,
            reason: Some(reason.into()),
            approved_by: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.approved_by = Some(reviewer.into());
        self
    }
}

/// Response returned to the caller of the decision endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResolution {
    pub success: bool,
    /// `"approved"` or `"rejected"`.
    pub decision: String,
    /// Snapshot the resumed turn continued from.
    pub resume_payload: serde_json::Value,
    /// Final assembled response of the resumed turn.
    pub response: String,
}
