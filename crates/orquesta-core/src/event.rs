//! Live event envelopes published to per-session subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NodeTransition,
    AgentStart,
    AgentEnd,
    Error,
}

/// Hand-off annotations, present when one agent's output is being routed to
/// another (enables "A → B" narration downstream).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_agent: Option<String>,
}

/// One envelope on the live event channel. Delivered at-most-once per
/// transition, in emission order per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Semantic payload; `data.action` carries the action tag used for
    /// human-readable rendering.
    pub data: serde_json::Value,
    #[serde(default)]
    pub meta: EventMeta,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            data,
            meta: EventMeta::default(),
        }
    }

    pub fn node_transition(session_id: Uuid, from: &str, to: &str) -> Self {
        Self::new(
            EventType::NodeTransition,
            serde_json::json!({
                "session_id": session_id,
                "from": from,
                "to": to,
            }),
        )
    }

    pub fn agent_start(session_id: Uuid, agent: &str, action: &str) -> Self {
        Self::new(
            EventType::AgentStart,
            serde_json::json!({
                "session_id": session_id,
                "agent": agent,
                "action": action,
            }),
        )
    }

    pub fn agent_end(session_id: Uuid, agent: &str, action: &str, success: bool) -> Self {
        Self::new(
            EventType::AgentEnd,
            serde_json::json!({
                "session_id": session_id,
                "agent": agent,
                "action": action,
                "success": success,
            }),
        )
    }

    pub fn error(session_id: Uuid, agent: &str, detail: &str) -> Self {
        Self::new(
            EventType::Error,
            serde_json::json!({
                "session_id": session_id,
                "agent": agent,
                "detail": detail,
            }),
        )
    }

    pub fn with_handoff(mut self, routing_agent: &str, target_agent: &str) -> Self {
        self.meta.routing_agent = Some(routing_agent.to_string());
        self.meta.target_agent = Some(target_agent.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_type_tag() {
        let ev = EventEnvelope::agent_start(Uuid::new_v4(), "capi_datab", "database_query");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "agent_start");
        assert_eq!(json["data"]["action"], "database_query");
    }

    #[test]
    fn handoff_meta_is_optional() {
        let plain = EventEnvelope::node_transition(Uuid::new_v4(), "router", "summary");
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json["meta"].get("target_agent").is_none());

        let handoff = plain.with_handoff("capi_datab", "summary");
        let json = serde_json::to_value(&handoff).unwrap();
        assert_eq!(json["meta"]["routing_agent"], "capi_datab");
        assert_eq!(json["meta"]["target_agent"], "summary");
    }
}
