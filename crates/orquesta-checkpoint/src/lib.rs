//! Session-scoped persistence for [`ExecutionState`] snapshots.
//!
//! The checkpoint store is one of only two resources shared across turns
//! (the other is the agent registry). Writes are keyed by `session_id` with
//! single-writer-per-key semantics; the store must be linearizable per key,
//! cross-key ordering is irrelevant.

mod store;

pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
