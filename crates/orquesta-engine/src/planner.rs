use orquesta_core::{ExecutionState, Intent, OrquestaError, OrquestaResult, PlanStep};
use tracing::{info, warn};

/// Metadata flag set when planning fails or an agent cannot satisfy its
/// step; the next supervisor pass falls back to the default tail.
pub const META_NEEDS_REPLAN: &str = "needs_replan";

/// Produces and maintains the cooperative multi-agent plan for a session.
///
/// A full replan runs when (a) no plan exists, (b) the previously active
/// agent reported it could not satisfy its step, or (c) the detected intent
/// changed between turns. Replacement is atomic: the new plan is built
/// completely before it is swapped in, and on failure the previous plan
/// stays as-is with `needs_replan` flagged for the supervisor.
pub struct ReasoningPlanner {
    min_confidence: f64,
}

impl ReasoningPlanner {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Re-evaluate the plan for the current turn, replanning when one of
    /// the triggers holds.
    pub fn evaluate(&self, state: &mut ExecutionState) {
        if !Self::should_replan(state) {
            return;
        }
        match self.build_plan(state) {
            Ok(plan) => {
                info!(
                    session_id = %state.session_id,
                    steps = plan.len(),
                    intent = ?state.detected_intent,
                    "Plan replaced"
                );
                state.reasoning_plan = plan;
                state.plan_intent = state.detected_intent;
                state
                    .response_metadata
                    .remove(META_NEEDS_REPLAN);
            }
            Err(e) => {
                // Keep the previous plan intact; the supervisor's default
                // tail covers the turn.
                warn!(session_id = %state.session_id, error = %e, "Planning failed, keeping previous plan");
                state.set_meta(META_NEEDS_REPLAN, serde_json::json!(true));
            }
        }
    }

    fn should_replan(state: &ExecutionState) -> bool {
        state.reasoning_plan.is_empty()
            || state.meta_flag(META_NEEDS_REPLAN)
            || state.plan_intent != state.detected_intent
    }

    /// Build the ordered step list for the detected intent, excluding
    /// agents that already completed this turn (a mid-turn replan must not
    /// schedule them twice).
    fn build_plan(&self, state: &ExecutionState) -> OrquestaResult<Vec<PlanStep>> {
        let intent = state
            .detected_intent
            .ok_or_else(|| OrquestaError::Planning("no detected intent".to_string()))?;

        let intent = if state.intent_confidence < self.min_confidence {
            Intent::Conversational
        } else {
            intent
        };

        let steps: Vec<PlanStep> = match intent {
            Intent::SummaryRequest => vec![PlanStep::new("summary", "generate the executive summary")],
            Intent::DatabaseQuery => vec![
                PlanStep::new("capi_datab", "query the business database"),
                PlanStep::new("summary", "summarize the retrieved records"),
            ],
            Intent::DocumentRequest => vec![
                PlanStep::new("capi_datab", "gather the data for the document"),
                PlanStep::new("capi_noticias", "gather context headlines"),
                PlanStep::new("capi_desktop", "write the document to the desktop"),
            ],
            Intent::NewsRequest => vec![
                PlanStep::new("capi_noticias", "fetch current headlines"),
                PlanStep::new("summary", "condense the headlines"),
            ],
            Intent::DesktopAction => vec![PlanStep::new("capi_desktop", "perform the file operation")],
            Intent::Conversational | Intent::Unknown => {
                vec![PlanStep::new("conversation", "answer conversationally")]
            }
        };

        Ok(steps
            .into_iter()
            .filter(|s| !state.completed_nodes.contains(&s.agent))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state_with_intent(intent: Intent, confidence: f64) -> ExecutionState {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.begin_turn("consulta");
        state.detected_intent = Some(intent);
        state.intent_confidence = confidence;
        state
    }

    #[test]
    fn plans_database_query_chain() {
        let mut state = state_with_intent(Intent::DatabaseQuery, 0.6);
        ReasoningPlanner::new(0.3).evaluate(&mut state);
        let agents: Vec<&str> = state.reasoning_plan.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["capi_datab", "summary"]);
        assert_eq!(state.plan_intent, Some(Intent::DatabaseQuery));
    }

    #[test]
    fn low_confidence_falls_back_to_conversation() {
        let mut state = state_with_intent(Intent::DatabaseQuery, 0.1);
        ReasoningPlanner::new(0.3).evaluate(&mut state);
        let agents: Vec<&str> = state.reasoning_plan.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["conversation"]);
    }

    #[test]
    fn same_intent_keeps_existing_plan() {
        let mut state = state_with_intent(Intent::SummaryRequest, 0.6);
        let planner = ReasoningPlanner::new(0.3);
        planner.evaluate(&mut state);
        let original = state.reasoning_plan.clone();

        // No trigger: same intent, no replan flag.
        planner.evaluate(&mut state);
        assert_eq!(state.reasoning_plan, original);
    }

    #[test]
    fn intent_change_replaces_plan_wholesale() {
        let mut state = state_with_intent(Intent::SummaryRequest, 0.6);
        let planner = ReasoningPlanner::new(0.3);
        planner.evaluate(&mut state);

        state.detected_intent = Some(Intent::NewsRequest);
        planner.evaluate(&mut state);
        let agents: Vec<&str> = state.reasoning_plan.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["capi_noticias", "summary"]);
    }

    #[test]
    fn replan_excludes_completed_agents() {
        let mut state = state_with_intent(Intent::DatabaseQuery, 0.6);
        let planner = ReasoningPlanner::new(0.3);
        planner.evaluate(&mut state);

        // capi_datab ran and could not satisfy its step.
        state.enter_node("capi_datab");
        state.set_meta(META_NEEDS_REPLAN, serde_json::json!(true));
        planner.evaluate(&mut state);

        let agents: Vec<&str> = state.reasoning_plan.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["summary"]);
        assert!(!state.meta_flag(META_NEEDS_REPLAN));
    }

    #[test]
    fn planning_failure_keeps_previous_plan_and_flags_replan() {
        let mut state = state_with_intent(Intent::SummaryRequest, 0.6);
        let planner = ReasoningPlanner::new(0.3);
        planner.evaluate(&mut state);
        let original = state.reasoning_plan.clone();

        // Intent missing mid-session: trigger (c) fires but planning fails.
        state.detected_intent = None;
        planner.evaluate(&mut state);
        assert_eq!(state.reasoning_plan, original);
        assert!(state.meta_flag(META_NEEDS_REPLAN));
    }
}
