use thiserror::Error;

/// A convenience `Result` alias using [`OrquestaError`].
pub type OrquestaResult<T> = Result<T, OrquestaError>;

/// Top-level error type for the Orquesta orchestration core.
///
/// Each variant corresponds to a subsystem that can produce errors. Most of
/// them are recovered locally (a failed agent never aborts a turn); only
/// [`OrquestaError::Checkpoint`] is fatal to an in-flight turn, because the
/// orchestrator cannot suspend or resume safely without durable state.
#[derive(Debug, Error)]
pub enum OrquestaError {
    /// Intent classification error.
    #[error("Intent error: {0}")]
    Intent(String),

    /// The reasoning planner could not produce a valid plan.
    #[error("Planning error: {0}")]
    Planning(String),

    /// An error raised by an agent during invocation.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An agent name was not found in the registry.
    #[error("Registry error: {0}")]
    Registry(String),

    /// Human-gate state machine error.
    #[error("Gate error: {0}")]
    Gate(String),

    /// A human decision arrived for a session that is not awaiting one.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Checkpoint persistence failed. Fatal to the turn.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration parsing or validation error.
    #[error("Config error: {0}")]
    Config(String),

    /// The turn was cancelled externally.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
