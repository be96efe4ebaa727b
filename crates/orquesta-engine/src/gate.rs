use chrono::{Duration as ChronoDuration, Utc};
use orquesta_core::{
    AgentCapability, AgentResult, ExecutionState, ExecutionStatus, GateStatus, HumanDecision,
    OrquestaError, OrquestaResult, PendingAction,
};
use std::time::Duration;
use tracing::{info, warn};

/// Result of applying one human decision to a suspended session.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub approved: bool,
    /// The action that was decided.
    pub pending: PendingAction,
    pub reason: Option<String>,
    /// True when further queued actions keep the session paused.
    pub still_awaiting: bool,
}

/// The human-in-the-loop suspension point.
///
/// State machine per session: `None → Awaiting → Resolved`, with at most
/// one outstanding suspension; additional approval-requiring actions queue
/// behind the current one instead of double-suspending.
pub struct HumanGate {
    timeout: Duration,
}

impl HumanGate {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Whether a result's declared action must pass the gate.
    pub fn requires_approval(capability: &AgentCapability, result: &AgentResult) -> bool {
        let action = result.action.unwrap_or(capability.action_type);
        result.success && capability.needs_approval(action)
    }

    /// Hold an agent's result at the gate. The first held action suspends
    /// the session (`status = Paused`); later ones are queued.
    pub fn suspend(
        &self,
        state: &mut ExecutionState,
        capability: &AgentCapability,
        result: AgentResult,
    ) -> PendingAction {
        let action = result.action.unwrap_or(capability.action_type);
        let description = result
            .pending_action
            .clone()
            .unwrap_or_else(|| format!("{} requests {}", capability.name, action));
        let pending =
            PendingAction::new(capability.name.clone(), action, description).with_held(result);

        match &mut state.gate {
            GateStatus::Awaiting { queued, .. } => {
                info!(
                    session_id = %state.session_id,
                    agent = %pending.agent,
                    "Gate already awaiting, queueing action"
                );
                queued.push(pending.clone());
            }
            _ => {
                let deadline = Utc::now()
                    + ChronoDuration::from_std(self.timeout)
                        .unwrap_or_else(|_| ChronoDuration::seconds(300));
                info!(
                    session_id = %state.session_id,
                    agent = %pending.agent,
                    action = %pending.action,
                    interrupt_id = %pending.interrupt_id,
                    "Suspending for human approval"
                );
                state.gate = GateStatus::Awaiting {
                    pending: pending.clone(),
                    queued: Vec::new(),
                    deadline,
                };
                state.status = ExecutionStatus::Paused;
                state.set_meta("requires_human_approval", serde_json::json!(true));
            }
        }
        pending
    }

    /// Apply an external decision.
    ///
    /// Rejected with a conflict error — and without touching the state —
    /// when the session is not awaiting a decision or the decision names a
    /// different interrupt. A decision arriving after the configured
    /// deadline resolves as a timeout rejection regardless of its verdict.
    pub fn resolve(
        &self,
        state: &mut ExecutionState,
        decision: &HumanDecision,
    ) -> OrquestaResult<GateOutcome> {
        let (pending, queued, deadline) = match &state.gate {
            GateStatus::Awaiting {
                pending,
                queued,
                deadline,
            } => (pending.clone(), queued.clone(), *deadline),
            _ => {
                return Err(OrquestaError::Conflict(format!(
                    "session {} is not awaiting a decision",
                    state.session_id
                )))
            }
        };

        if let Some(id) = &decision.interrupt_id {
            if *id != pending.interrupt_id {
                return Err(OrquestaError::Conflict(format!(
                    "decision targets interrupt {id}, pending is {}",
                    pending.interrupt_id
                )));
            }
        }

        let expired = Utc::now() > deadline;
        let approved = decision.approved && !expired;
        let reason = if expired {
            warn!(session_id = %state.session_id, "Approval deadline passed, resolving as rejected");
            Some("approval timed out".to_string())
        } else {
            decision.reason.clone()
        };

        let still_awaiting = !queued.is_empty();
        if still_awaiting {
            let mut rest = queued;
            let next = rest.remove(0);
            let deadline = Utc::now()
                + ChronoDuration::from_std(self.timeout)
                    .unwrap_or_else(|_| ChronoDuration::seconds(300));
            state.gate = GateStatus::Awaiting {
                pending: next,
                queued: rest,
                deadline,
            };
            // Still paused: the next queued action needs its own decision.
        } else {
            state.gate = GateStatus::Resolved {
                approved,
                resolved_at: Utc::now(),
            };
            state.status = ExecutionStatus::Processing;
        }

        info!(
            session_id = %state.session_id,
            approved,
            still_awaiting,
            reviewer = decision.approved_by.as_deref().unwrap_or("anonymous"),
            "Gate decision applied"
        );

        Ok(GateOutcome {
            approved,
            pending,
            reason,
            still_awaiting,
        })
    }

    /// Resolve an overdue suspension as a timeout rejection. Returns `None`
    /// when the session is not awaiting or the deadline has not passed.
    pub fn expire_if_due(&self, state: &mut ExecutionState) -> Option<GateOutcome> {
        let due = matches!(&state.gate, GateStatus::Awaiting { deadline, .. } if Utc::now() > *deadline);
        if !due {
            return None;
        }
        let decision = HumanDecision::reject(state.session_id, "approval timed out");
        self.resolve(state, &decision).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_core::ActionKind;
    use uuid::Uuid;

    fn desktop_capability() -> AgentCapability {
        AgentCapability::new("capi_desktop", "desktop", ActionKind::FileWrite)
            .with_approval_for(vec![ActionKind::FileWrite, ActionKind::FileDelete])
    }

    fn write_result() -> AgentResult {
        AgentResult::ok("archivo listo")
            .with_action(ActionKind::FileWrite)
            .with_pending_action("write reporte.txt")
    }

    #[test]
    fn write_action_requires_approval_read_does_not() {
        let cap = desktop_capability();
        assert!(HumanGate::requires_approval(&cap, &write_result()));
        let read = AgentResult::ok("leído").with_action(ActionKind::FileRead);
        assert!(!HumanGate::requires_approval(&cap, &read));
    }

    #[test]
    fn failed_result_never_reaches_the_gate() {
        let cap = desktop_capability();
        let mut failed = AgentResult::failed("disk error");
        failed.action = Some(ActionKind::FileWrite);
        assert!(!HumanGate::requires_approval(&cap, &failed));
    }

    #[test]
    fn first_suspension_pauses_second_queues() {
        let gate = HumanGate::new(Duration::from_secs(300));
        let mut state = ExecutionState::new(Uuid::new_v4());
        let cap = desktop_capability();

        gate.suspend(&mut state, &cap, write_result());
        assert_eq!(state.status, ExecutionStatus::Paused);
        assert!(state.gate.is_awaiting());
        assert!(state.meta_flag("requires_human_approval"));

        gate.suspend(&mut state, &cap, write_result());
        match &state.gate {
            GateStatus::Awaiting { queued, .. } => assert_eq!(queued.len(), 1),
            other => panic!("expected Awaiting, got {other:?}"),
        }
    }

    #[test]
    fn decision_for_idle_session_is_a_conflict() {
        let gate = HumanGate::new(Duration::from_secs(300));
        let mut state = ExecutionState::new(Uuid::new_v4());
        let before = serde_json::to_string(&state.gate).unwrap();

        let session_id = state.session_id;
        let err = gate
            .resolve(&mut state, &HumanDecision::approve(session_id))
            .unwrap_err();
        assert!(matches!(err, OrquestaError::Conflict(_)));
        assert_eq!(serde_json::to_string(&state.gate).unwrap(), before);
    }

    #[test]
    fn mismatched_interrupt_id_is_a_conflict() {
        let gate = HumanGate::new(Duration::from_secs(300));
        let mut state = ExecutionState::new(Uuid::new_v4());
        gate.suspend(&mut state, &desktop_capability(), write_result());

        let mut decision = HumanDecision::approve(state.session_id);
        decision.interrupt_id = Some("not-the-one".to_string());
        let err = gate.resolve(&mut state, &decision).unwrap_err();
        assert!(matches!(err, OrquestaError::Conflict(_)));
        assert!(state.gate.is_awaiting());
    }

    #[test]
    fn queued_action_keeps_session_paused_after_first_decision() {
        let gate = HumanGate::new(Duration::from_secs(300));
        let mut state = ExecutionState::new(Uuid::new_v4());
        let cap = desktop_capability();
        gate.suspend(&mut state, &cap, write_result());
        gate.suspend(&mut state, &cap, write_result());

        let session_id = state.session_id;
        let outcome = gate
            .resolve(&mut state, &HumanDecision::approve(session_id))
            .unwrap();
        assert!(outcome.approved);
        assert!(outcome.still_awaiting);
        assert_eq!(state.status, ExecutionStatus::Paused);

        let outcome = gate
            .resolve(&mut state, &HumanDecision::reject(session_id, "no"))
            .unwrap();
        assert!(!outcome.approved);
        assert!(!outcome.still_awaiting);
        assert_eq!(state.status, ExecutionStatus::Processing);
    }

    #[test]
    fn overdue_suspension_expires_as_rejection() {
        let gate = HumanGate::new(Duration::from_secs(0));
        let mut state = ExecutionState::new(Uuid::new_v4());
        gate.suspend(&mut state, &desktop_capability(), write_result());

        let outcome = gate.expire_if_due(&mut state).unwrap();
        assert!(!outcome.approved);
        assert_eq!(outcome.reason.as_deref(), Some("approval timed out"));
        assert_eq!(state.status, ExecutionStatus::Processing);
    }

    #[test]
    fn late_approval_resolves_as_timeout_rejection() {
        let gate = HumanGate::new(Duration::from_secs(0));
        let mut state = ExecutionState::new(Uuid::new_v4());
        gate.suspend(&mut state, &desktop_capability(), write_result());

        let session_id = state.session_id;
        let outcome = gate
            .resolve(&mut state, &HumanDecision::approve(session_id))
            .unwrap();
        assert!(!outcome.approved);
        assert_eq!(outcome.reason.as_deref(), Some("approval timed out"));
    }
}
