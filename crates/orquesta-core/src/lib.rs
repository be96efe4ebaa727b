//! Core types and error definitions for the Orquesta orchestration core.
//!
//! This crate provides the foundational types shared across all Orquesta
//! crates: the error enum, the per-session execution state, the conversation
//! model, the agent contract, live event envelopes, and human-in-the-loop
//! decision types.
//!
//! # Main types
//!
//! - [`OrquestaError`] — Unified error enum for all subsystems.
//! - [`OrquestaResult`] — Convenience alias for `Result<T, OrquestaError>`.
//! - [`ExecutionState`] — The mutable record threaded through every node of
//!   a turn, persisted to the checkpoint store between turns.
//! - [`Agent`] — The closed capability interface every specialist worker
//!   implements.
//! - [`EventEnvelope`] — Lifecycle events published to live subscribers.
//! - [`HumanDecision`] — The external decision that resumes a paused turn.

pub mod agent;
pub mod conversation;
pub mod decision;
pub mod error;
pub mod event;
pub mod state;

pub use agent::{
    ActionKind, Agent, AgentCapability, AgentContext, AgentMetrics, AgentResult,
};
pub use conversation::{ConversationTurn, TurnRole};
pub use decision::{GateResolution, HumanDecision, PendingAction};
pub use error::{OrquestaError, OrquestaResult};
pub use event::{EventEnvelope, EventMeta, EventType};
pub use state::{
    ExecutionState, ExecutionStatus, GateStatus, Intent, PlanStep, RoutingDecision,
};
