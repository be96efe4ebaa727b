//! The mutable execution record threaded through every node of a turn.

use crate::conversation::ConversationTurn;
use crate::decision::PendingAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Discrete intent detected for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SummaryRequest,
    DatabaseQuery,
    DocumentRequest,
    NewsRequest,
    DesktopAction,
    Conversational,
    Unknown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Intent::SummaryRequest => "summary_request",
            Intent::DatabaseQuery => "database_query",
            Intent::DocumentRequest => "document_request",
            Intent::NewsRequest => "news_request",
            Intent::DesktopAction => "desktop_action",
            Intent::Conversational => "conversational",
            Intent::Unknown => "unknown",
        };
        write!(f, "{tag}")
    }
}

/// Lifecycle status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Initial state; the graph is being traversed.
    Processing,
    /// Suspended at the human gate, awaiting a decision.
    Paused,
    /// Terminal: the turn produced a final response.
    Completed,
    /// Terminal: the turn was aborted (checkpoint failure or cancellation).
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ExecutionStatus::Processing => "processing",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{tag}")
    }
}

/// One step of the cooperative reasoning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Target agent name.
    pub agent: String,
    /// The contribution expected from that agent.
    pub expected_role: String,
}

impl PlanStep {
    pub fn new(agent: impl Into<String>, expected_role: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            expected_role: expected_role.into(),
        }
    }
}

/// The router's selection and its informational rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub agent: String,
    /// Why the router picked this agent. Informational, not authoritative.
    pub reason: String,
}

/// Human-gate suspension record carried inside the checkpointed state.
///
/// `Awaiting` holds exactly one outstanding suspension; further
/// approval-requiring actions arriving while awaiting are queued, never
/// double-suspended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateStatus {
    None,
    Awaiting {
        pending: PendingAction,
        #[serde(default)]
        queued: Vec<PendingAction>,
        deadline: DateTime<Utc>,
    },
    Resolved {
        approved: bool,
        resolved_at: DateTime<Utc>,
    },
}

impl GateStatus {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, GateStatus::Awaiting { .. })
    }
}

/// The full execution state of one session, persisted to the checkpoint
/// store between turns and during human-gate suspension.
///
/// Owned exclusively by the orchestrator while a turn runs; exactly one
/// node mutates it at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Stable across turns of the same conversation.
    pub session_id: Uuid,
    /// Unique per turn.
    pub trace_id: Uuid,
    pub status: ExecutionStatus,
    pub current_node: String,
    /// Execution trail for audit and loop prevention. Append-only, never
    /// reordered, no consecutive duplicates.
    pub completed_nodes: Vec<String>,
    pub detected_intent: Option<Intent>,
    pub intent_confidence: f64,
    /// Replaced wholesale on re-plan, never patched in place.
    pub reasoning_plan: Vec<PlanStep>,
    /// Intent the current plan was built for; a mismatch with
    /// `detected_intent` on a later turn triggers a full replan.
    #[serde(default)]
    pub plan_intent: Option<Intent>,
    /// Ordered, de-duplicated agents still pending this turn.
    pub supervisor_queue: VecDeque<String>,
    pub routing_decision: Option<RoutingDecision>,
    pub active_agent: Option<String>,
    /// Open key/value bag: `semantic_result`, `requires_human_approval`,
    /// `target_agent`/`routing_agent` on hand-offs, `errors`, `needs_replan`.
    pub response_metadata: HashMap<String, serde_json::Value>,
    /// Accumulated structured output, merge-only until finalize.
    pub response_data: serde_json::Map<String, serde_json::Value>,
    /// Draft message fragments, append-only until assemble joins them.
    pub response_message: Vec<String>,
    /// The assembled answer, set exactly once per turn by `assemble`.
    pub final_response: Option<String>,
    /// Durable memory of the session. Ordering is the sole source of truth
    /// for turn order.
    pub conversation_history: Vec<ConversationTurn>,
    /// Most recent structured output per agent, readable by later agents
    /// within the same turn.
    pub shared_artifacts: HashMap<String, serde_json::Value>,
    pub gate: GateStatus,
    /// Node to dispatch to when resuming from a suspension checkpoint.
    pub resume_node: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            trace_id: Uuid::new_v4(),
            status: ExecutionStatus::Processing,
            current_node: "start".to_string(),
            completed_nodes: Vec::new(),
            detected_intent: None,
            intent_confidence: 0.0,
            reasoning_plan: Vec::new(),
            plan_intent: None,
            supervisor_queue: VecDeque::new(),
            routing_decision: None,
            active_agent: None,
            response_metadata: HashMap::new(),
            response_data: serde_json::Map::new(),
            response_message: Vec::new(),
            final_response: None,
            conversation_history: Vec::new(),
            shared_artifacts: HashMap::new(),
            gate: GateStatus::None,
            resume_node: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset per-turn fields and record the user's query, keeping the
    /// durable session memory (history, plan, artifacts) intact.
    pub fn begin_turn(&mut self, query: impl Into<String>) {
        self.trace_id = Uuid::new_v4();
        self.status = ExecutionStatus::Processing;
        self.current_node = "start".to_string();
        self.completed_nodes.clear();
        self.supervisor_queue.clear();
        self.routing_decision = None;
        self.active_agent = None;
        self.response_metadata.clear();
        self.response_data.clear();
        self.response_message.clear();
        self.final_response = None;
        self.gate = GateStatus::None;
        self.resume_node = None;
        self.conversation_history.push(ConversationTurn::user(query));
        self.touch();
    }

    /// Record entry into a node, keeping the trail free of consecutive
    /// duplicates.
    pub fn enter_node(&mut self, node: &str) {
        self.current_node = node.to_string();
        if self.completed_nodes.last().map(String::as_str) != Some(node) {
            self.completed_nodes.push(node.to_string());
        }
        self.touch();
    }

    /// Count of visits to a node this turn, for the cycle guard.
    pub fn node_visits(&self, node: &str) -> usize {
        self.completed_nodes.iter().filter(|n| *n == node).count()
    }

    pub fn set_meta(&mut self, key: &str, value: serde_json::Value) {
        self.response_metadata.insert(key.to_string(), value);
        self.touch();
    }

    pub fn meta_flag(&self, key: &str) -> bool {
        self.response_metadata
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Append an error entry to `response_metadata.errors`. Never
    /// overwrites prior entries.
    pub fn record_error(&mut self, code: &str, agent: &str, detail: &str) {
        let entry = serde_json::json!({
            "code": code,
            "agent": agent,
            "detail": detail,
            "at": Utc::now(),
        });
        match self
            .response_metadata
            .entry("errors".to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()))
        {
            serde_json::Value::Array(errors) => errors.push(entry),
            other => *other = serde_json::Value::Array(vec![entry]),
        }
        self.touch();
    }

    pub fn error_count(&self) -> usize {
        self.response_metadata
            .get("errors")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Merge a structured object into `response_data`. Non-object values
    /// are stored under the contributing agent's name.
    pub fn merge_data(&mut self, agent: &str, data: serde_json::Value) {
        match data {
            serde_json::Value::Null => {}
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    self.response_data.insert(k, v);
                }
            }
            other => {
                self.response_data.insert(agent.to_string(), other);
            }
        }
        self.touch();
    }

    pub fn push_fragment(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.response_message.push(fragment);
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_node_skips_consecutive_duplicates() {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.enter_node("intent");
        state.enter_node("router");
        state.enter_node("router");
        state.enter_node("summary");
        state.enter_node("router");
        assert_eq!(
            state.completed_nodes,
            vec!["intent", "router", "summary", "router"]
        );
        assert_eq!(state.node_visits("router"), 2);
    }

    #[test]
    fn record_error_appends_never_overwrites() {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.record_error("agent_timeout", "capi_datab", "deadline exceeded");
        state.record_error("agent_error", "summary", "backend unavailable");
        assert_eq!(state.error_count(), 2);
        let errors = state.response_metadata["errors"].as_array().unwrap();
        assert_eq!(errors[0]["code"], "agent_timeout");
        assert_eq!(errors[1]["agent"], "summary");
    }

    #[test]
    fn begin_turn_resets_turn_fields_but_keeps_history() {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.begin_turn("hola");
        let first_trace = state.trace_id;
        state.enter_node("intent");
        state.push_fragment("partial");
        state.set_meta("requires_human_approval", serde_json::json!(true));

        state.begin_turn("dame un resumen");
        assert_ne!(state.trace_id, first_trace);
        assert!(state.completed_nodes.is_empty());
        assert!(state.response_message.is_empty());
        assert!(state.response_metadata.is_empty());
        assert_eq!(state.conversation_history.len(), 2);
        assert_eq!(state.status, ExecutionStatus::Processing);
    }

    #[test]
    fn merge_data_is_additive() {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.merge_data("capi_datab", serde_json::json!({"rows": 3}));
        state.merge_data("summary", serde_json::json!({"summary": "ok"}));
        state.merge_data("capi_noticias", serde_json::json!(["headline"]));
        assert_eq!(state.response_data["rows"], 3);
        assert_eq!(state.response_data["summary"], "ok");
        assert!(state.response_data["capi_noticias"].is_array());
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.begin_turn("consulta");
        state.detected_intent = Some(Intent::DatabaseQuery);
        state.reasoning_plan = vec![PlanStep::new("capi_datab", "query business data")];
        state.supervisor_queue.push_back("capi_datab".to_string());

        let json = serde_json::to_string(&state).unwrap();
        let parsed: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.detected_intent, Some(Intent::DatabaseQuery));
        assert_eq!(parsed.supervisor_queue.front().map(String::as_str), Some("capi_datab"));
        assert_eq!(parsed.session_id, state.session_id);
    }
}
