use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of the participant that authored a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// A human end-user.
    User,
    /// The assistant (final assembled answer for a turn).
    Assistant,
    /// A system-level note (cancellations, gate rejections).
    System,
}

/// A single entry in the durable conversation history of a session.
///
/// The ordering of the history vector is the sole source of truth for turn
/// order; no component may reorder it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// The agent that contributed this entry, when it came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
        }
    }

    /// A turn authored by the end-user.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// The assistant's assembled answer, attributed to the agent that led it.
    pub fn assistant(content: impl Into<String>, agent: Option<String>) -> Self {
        Self {
            agent,
            ..Self::new(TurnRole::Assistant, content)
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }
}
