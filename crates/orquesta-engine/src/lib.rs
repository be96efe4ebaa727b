//! The orchestration graph: intent classification, cooperative planning,
//! supervision, routing, agent fan-out, human-in-the-loop suspension, and
//! response assembly — one turn at a time, with live event broadcasting
//! and checkpoint-backed resume.
//!
//! A turn walks a fixed node graph:
//!
//! ```text
//! start → intent → react → reasoning → supervisor → router
//!       → {agent nodes, possibly parallel} → human_gate → assemble → finalize
//! ```
//!
//! with the router short-circuiting straight to `assemble` when no action
//! remains. The human gate is the only indefinite suspension point: the
//! full [`orquesta_core::ExecutionState`] is checkpointed and control
//! returns to the caller until a [`orquesta_core::HumanDecision`] arrives.

pub mod assemble;
pub mod broadcast;
pub mod config;
pub mod executor;
pub mod gate;
pub mod intent;
pub mod planner;
pub mod router;
pub mod supervisor;

pub use broadcast::EventBroadcaster;
pub use config::OrchestratorConfig;
pub use executor::{Orchestrator, TurnOutcome};
pub use gate::{GateOutcome, HumanGate};
pub use intent::IntentClassifier;
pub use planner::ReasoningPlanner;
pub use supervisor::DEFAULT_TAIL;
