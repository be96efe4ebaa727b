use orquesta_checkpoint::CheckpointStore;
use orquesta_core::{ConversationTurn, ExecutionState, ExecutionStatus, OrquestaResult};
use tracing::info;

/// Fallback when no agent produced a usable message.
const GENERIC_ACK: &str =
    "Procesé tu solicitud, pero no obtuve contenido para mostrar. ¿Querés reformularla?";

/// Merge the accumulated message fragments into one response and snapshot
/// the structured data. Idempotent: a second call on the same state returns
/// the already-assembled answer unchanged.
pub fn assemble(state: &mut ExecutionState) -> String {
    if let Some(existing) = &state.final_response {
        return existing.clone();
    }

    let mut response = if state.response_message.is_empty() {
        GENERIC_ACK.to_string()
    } else {
        state.response_message.join("\n\n")
    };

    // The user always learns what partially failed, never an opaque error.
    if let Some(errors) = state
        .response_metadata
        .get("errors")
        .and_then(serde_json::Value::as_array)
    {
        let failed: Vec<String> = errors
            .iter()
            .filter_map(|e| {
                let agent = e.get("agent")?.as_str()?;
                let detail = e.get("detail")?.as_str()?;
                Some(format!("{agent} ({detail})"))
            })
            .collect();
        if !failed.is_empty() {
            response.push_str(&format!(
                "\n\nNo pude completar: {}.",
                failed.join(", ")
            ));
        }
    }

    state.set_meta(
        "assembled_data",
        serde_json::Value::Object(state.response_data.clone()),
    );
    state.final_response = Some(response.clone());
    info!(
        session_id = %state.session_id,
        fragments = state.response_message.len(),
        "Response assembled"
    );
    response
}

/// Mark the turn terminal: `status = Completed`, append the assistant's
/// turn to the conversation history, write the closing checkpoint.
/// Idempotent for at-least-once delivery from a retrying caller.
pub async fn finalize(
    state: &mut ExecutionState,
    store: &dyn CheckpointStore,
) -> OrquestaResult<String> {
    if state.status == ExecutionStatus::Completed && state.meta_flag("finalized") {
        return Ok(state
            .final_response
            .clone()
            .unwrap_or_else(|| GENERIC_ACK.to_string()));
    }

    let response = assemble(state);
    state.status = ExecutionStatus::Completed;
    state.conversation_history.push(ConversationTurn::assistant(
        response.clone(),
        state.active_agent.clone(),
    ));
    state.set_meta("finalized", serde_json::json!(true));
    store.save(state).await?;

    info!(session_id = %state.session_id, trace_id = %state.trace_id, "Turn finalized");
    Ok(response)
}
