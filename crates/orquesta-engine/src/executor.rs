use crate::assemble;
use crate::broadcast::EventBroadcaster;
use crate::config::OrchestratorConfig;
use crate::gate::HumanGate;
use crate::intent::IntentClassifier;
use crate::planner::{ReasoningPlanner, META_NEEDS_REPLAN};
use crate::router::{self, ASSEMBLE};
use crate::supervisor;
use futures_util::future::join_all;
use orquesta_agents::{error_code, AgentInvoker, AgentRegistry};
use orquesta_checkpoint::CheckpointStore;
use orquesta_core::{
    AgentResult, EventEnvelope, ExecutionState, ExecutionStatus, GateResolution, GateStatus,
    HumanDecision, OrquestaError, OrquestaResult, PendingAction, RoutingDecision, TurnRole,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Named nodes of the execution graph. The graph is a fixed set of nodes
/// with an edge-selection function per node (the `match` in `drive`), not a
/// mutable pointer graph — traversal is a plain loop with a visited-count
/// guard against cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Start,
    Intent,
    React,
    Reasoning,
    Supervisor,
    Router,
    Agent(String),
    HumanGate,
    Assemble,
    Finalize,
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Node::Start => "start",
            Node::Intent => "intent",
            Node::React => "react",
            Node::Reasoning => "reasoning",
            Node::Supervisor => "supervisor",
            Node::Router => "router",
            Node::Agent(agent) => agent,
            Node::HumanGate => "human_gate",
            Node::Assemble => "assemble",
            Node::Finalize => "finalize",
        }
    }

    /// Node to dispatch to when reconstructing a suspended continuation.
    fn from_resume_tag(tag: Option<&str>) -> Node {
        match tag {
            Some("assemble") => Node::Assemble,
            _ => Node::React,
        }
    }
}

/// Outcome of one `run_turn` (or resumed) pass.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: Uuid,
    pub trace_id: Uuid,
    pub status: ExecutionStatus,
    /// Final response, or a pause notice while awaiting approval.
    pub response: String,
    /// Present when the turn suspended at the human gate.
    pub pending: Option<PendingAction>,
}

/// The orchestration core: one logical executor per active turn.
///
/// Turns of different sessions run fully independently; the checkpoint
/// store and the agent registry are the only shared resources, both safe
/// for concurrent reads.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<AgentRegistry>,
    invoker: AgentInvoker,
    store: Arc<dyn CheckpointStore>,
    broadcaster: Arc<EventBroadcaster>,
    classifier: IntentClassifier,
    planner: ReasoningPlanner,
    gate: HumanGate,
    /// Cancellation handles for in-flight turns, keyed by session.
    active: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> OrquestaResult<Self> {
        let invoker = AgentInvoker::new(
            registry.clone(),
            Duration::from_secs(config.agent_timeout_secs),
            config.history_window,
        );
        let broadcaster = Arc::new(EventBroadcaster::new(config.event_buffer));
        let classifier = IntentClassifier::new()?;
        let planner = ReasoningPlanner::new(config.min_intent_confidence);
        let gate = HumanGate::new(Duration::from_secs(config.gate_timeout_secs));
        Ok(Self {
            config,
            registry,
            invoker,
            store,
            broadcaster,
            classifier,
            planner,
            gate,
            active: RwLock::new(HashMap::new()),
        })
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Subscribe to a session's live events.
    pub async fn subscribe(
        &self,
        session_id: Uuid,
    ) -> tokio::sync::broadcast::Receiver<EventEnvelope> {
        self.broadcaster.subscribe(session_id).await
    }

    /// Load a session's current state, if any.
    pub async fn session_state(&self, session_id: Uuid) -> OrquestaResult<Option<ExecutionState>> {
        self.store.load(session_id).await
    }

    /// Explicitly destroy a session: checkpoint and event channel both go.
    /// Normal completion never does this — completed states stay queryable.
    pub async fn clear_session(&self, session_id: Uuid) -> OrquestaResult<()> {
        self.store.delete(session_id).await?;
        self.broadcaster.remove_session(session_id).await;
        Ok(())
    }

    /// Request cooperative cancellation of an in-flight turn. Returns
    /// false when no turn is running for the session.
    pub async fn cancel(&self, session_id: Uuid) -> bool {
        let active = self.active.read().await;
        match active.get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one full turn for a session, resuming its state from the
    /// checkpoint store (or starting fresh).
    pub async fn run_turn(&self, session_id: Uuid, query: &str) -> OrquestaResult<TurnOutcome> {
        let mut state = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| ExecutionState::new(session_id));

        if state.status == ExecutionStatus::Paused {
            return Err(OrquestaError::Conflict(format!(
                "session {session_id} is paused awaiting a human decision"
            )));
        }

        state.begin_turn(query);
        self.store.save(&state).await?;

        let token = self.register_turn(session_id).await;
        let result = self.drive(&mut state, Node::Start, &token).await;
        self.unregister_turn(session_id).await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.abort_turn(&mut state, &e).await;
                Err(e)
            }
        }
    }

    /// Terminal bookkeeping for a turn that errored out: mark the state
    /// failed and persist it best-effort (the store may be the thing that
    /// failed).
    async fn abort_turn(&self, state: &mut ExecutionState, error: &OrquestaError) {
        state.status = ExecutionStatus::Failed;
        state.record_error("turn_failed", "orchestrator", &error.to_string());
        let _ = self.store.save(state).await;
    }

    /// Apply an external human decision to a paused session and resume it.
    ///
    /// A decision for a session that is not awaiting one is rejected with
    /// a conflict error and changes nothing.
    pub async fn resolve_gate(&self, decision: HumanDecision) -> OrquestaResult<GateResolution> {
        let session_id = decision.session_id;
        let mut state = self.store.load(session_id).await?.ok_or_else(|| {
            OrquestaError::Conflict(format!("no session {session_id} to resume"))
        })?;

        let outcome = self.gate.resolve(&mut state, &decision)?;
        let decision_tag = if outcome.approved { "approved" } else { "rejected" };

        if outcome.approved {
            if let Some(held) = &outcome.pending.held {
                self.invoker.apply(&outcome.pending.agent, held, &mut state);
            }
        } else {
            // The rejection message substitutes for the pending action's
            // output; the held result is dropped unapplied.
            let reason = outcome
                .reason
                .clone()
                .unwrap_or_else(|| "sin motivo indicado".to_string());
            state.push_fragment(format!(
                "La acción \"{}\" no se ejecutó: {reason}.",
                outcome.pending.description
            ));
        }

        if outcome.still_awaiting {
            // Another held action needs its own decision before resuming.
            self.store.save(&state).await?;
            let next = match &state.gate {
                GateStatus::Awaiting { pending, .. } => Some(pending.clone()),
                _ => None,
            };
            return Ok(GateResolution {
                success: true,
                decision: decision_tag.to_string(),
                resume_payload: serde_json::json!({
                    "session_id": session_id,
                    "status": "paused",
                    "next_pending": next,
                }),
                response: "Queda otra acción pendiente de aprobación.".to_string(),
            });
        }

        let resume = if outcome.approved {
            Node::from_resume_tag(state.resume_node.as_deref())
        } else {
            Node::Assemble
        };
        info!(
            session_id = %session_id,
            decision = decision_tag,
            resume_node = resume.name(),
            "Resuming suspended turn"
        );

        let token = self.register_turn(session_id).await;
        let resumed = self.drive(&mut state, resume.clone(), &token).await;
        self.unregister_turn(session_id).await;
        let turn = match resumed {
            Ok(turn) => turn,
            Err(e) => {
                self.abort_turn(&mut state, &e).await;
                return Err(e);
            }
        };

        Ok(GateResolution {
            success: true,
            decision: decision_tag.to_string(),
            resume_payload: serde_json::json!({
                "session_id": session_id,
                "trace_id": turn.trace_id,
                "resumed_at": resume.name(),
            }),
            response: turn.response,
        })
    }

    /// Sweep a paused session whose approval deadline has passed, resolving
    /// it as a timeout rejection and completing the turn.
    pub async fn expire_gate(&self, session_id: Uuid) -> OrquestaResult<Option<TurnOutcome>> {
        let mut state = match self.store.load(session_id).await? {
            Some(state) => state,
            None => return Ok(None),
        };
        let Some(outcome) = self.gate.expire_if_due(&mut state) else {
            return Ok(None);
        };
        state.push_fragment(format!(
            "La acción \"{}\" no se ejecutó: la aprobación expiró.",
            outcome.pending.description
        ));
        if outcome.still_awaiting {
            // The next queued action got a fresh deadline; stay paused.
            self.store.save(&state).await?;
            return Ok(None);
        }
        let token = self.register_turn(session_id).await;
        let result = self.drive(&mut state, Node::Assemble, &token).await;
        self.unregister_turn(session_id).await;
        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                self.abort_turn(&mut state, &e).await;
                Err(e)
            }
        }
    }

    async fn register_turn(&self, session_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.active.write().await.insert(session_id, token.clone());
        token
    }

    async fn unregister_turn(&self, session_id: Uuid) {
        self.active.write().await.remove(&session_id);
    }

    /// The traversal loop: run nodes until the turn finalizes, suspends,
    /// or is cancelled.
    async fn drive(
        &self,
        state: &mut ExecutionState,
        start: Node,
        token: &CancellationToken,
    ) -> OrquestaResult<TurnOutcome> {
        let mut node = start;
        let mut prev = state.current_node.clone();

        loop {
            if token.is_cancelled() {
                return self.cancel_turn(state).await;
            }
            // Cycle guard: a node revisited past the budget short-circuits
            // the turn to assemble.
            if state.node_visits(node.name()) >= self.config.max_node_visits
                && !matches!(node, Node::Assemble | Node::Finalize)
            {
                warn!(session_id = %state.session_id, node = node.name(), "Visit budget exceeded");
                state.record_error("cycle_guard", node.name(), "node visit budget exceeded");
                node = Node::Assemble;
                continue;
            }

            if prev != node.name() {
                self.broadcaster
                    .publish(
                        state.session_id,
                        EventEnvelope::node_transition(state.session_id, &prev, node.name()),
                    )
                    .await;
            }
            prev = node.name().to_string();
            state.enter_node(node.name());

            node = match node {
                Node::Start => Node::Intent,
                Node::Intent => {
                    self.classify(state);
                    Node::React
                }
                Node::React => {
                    self.recommend(state);
                    Node::Reasoning
                }
                Node::Reasoning => {
                    self.planner.evaluate(state);
                    Node::Supervisor
                }
                Node::Supervisor => {
                    let recommendation = state
                        .response_metadata
                        .get("recommended_agent")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string);
                    state.supervisor_queue = supervisor::build_queue(
                        &state.reasoning_plan,
                        recommendation.as_deref(),
                        &state.completed_nodes,
                    );
                    Node::Router
                }
                Node::Router => {
                    if self.no_action_remains(state) {
                        state.routing_decision = Some(RoutingDecision {
                            agent: ASSEMBLE.to_string(),
                            reason: "no action remains".to_string(),
                        });
                        Node::Assemble
                    } else {
                        let decision =
                            router::route(&mut state.supervisor_queue, &self.registry, &self.config);
                        let next = if decision.agent == ASSEMBLE {
                            Node::Assemble
                        } else {
                            Node::Agent(decision.agent.clone())
                        };
                        state.routing_decision = Some(decision);
                        next
                    }
                }
                Node::Agent(agent) => match self.run_agents(state, agent, token).await {
                    Ok(next) => next,
                    Err(OrquestaError::Cancelled(_)) => return self.cancel_turn(state).await,
                    Err(e) => return Err(e),
                },
                Node::HumanGate => {
                    return self.suspend_turn(state).await;
                }
                Node::Assemble => {
                    assemble::assemble(state);
                    Node::Finalize
                }
                Node::Finalize => {
                    let response = assemble::finalize(state, self.store.as_ref()).await?;
                    return Ok(TurnOutcome {
                        session_id: state.session_id,
                        trace_id: state.trace_id,
                        status: state.status,
                        response,
                        pending: None,
                    });
                }
            };
        }
    }

    /// Intent node: classify the current query against the trailing
    /// history window and record the semantic result.
    fn classify(&self, state: &mut ExecutionState) {
        let query = current_query(state);
        let history = &state.conversation_history;
        // Context excludes the query itself (always the last user turn).
        let upto = history.len().saturating_sub(1);
        let skip = upto.saturating_sub(self.config.history_window);
        let (intent, confidence) = self.classifier.classify(&query, &history[skip..upto]);
        info!(
            session_id = %state.session_id,
            intent = %intent,
            confidence,
            "Intent classified"
        );
        state.detected_intent = Some(intent);
        state.intent_confidence = confidence;
        state.set_meta(
            "semantic_result",
            serde_json::json!({"intent": intent.to_string(), "confidence": confidence}),
        );
    }

    /// React node: surface a tactical recommendation from the latest
    /// agent hand-off, for the supervisor to slot into the queue.
    fn recommend(&self, state: &mut ExecutionState) {
        let target = state
            .response_metadata
            .get("target_agent")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        if let Some(target) = target {
            if self.registry.contains(&target) && !state.completed_nodes.contains(&target) {
                state.set_meta("recommended_agent", serde_json::json!(target));
            }
        }
    }

    /// Loop controller: true when nothing actionable remains and the turn
    /// should go straight to assemble.
    fn no_action_remains(&self, state: &ExecutionState) -> bool {
        if !state.reasoning_plan.is_empty() {
            state.reasoning_plan.iter().all(|step| {
                state.completed_nodes.contains(&step.agent)
                    || self.config.is_disabled(&step.agent)
                    || !self.registry.contains(&step.agent)
            })
        } else {
            // No plan (planning failed): let the default tail run until
            // something produced output.
            !state.response_message.is_empty()
        }
    }

    /// Run the routed agent — and, when it belongs to a parallel group with
    /// other members still queued, the whole group concurrently. Results
    /// are merged in queue order, not completion order.
    async fn run_agents(
        &self,
        state: &mut ExecutionState,
        first: String,
        token: &CancellationToken,
    ) -> OrquestaResult<Node> {
        let mut batch = vec![first.clone()];
        if let Some(group) = self.config.parallel_group_of(&first) {
            let mut remaining = std::collections::VecDeque::new();
            while let Some(queued) = state.supervisor_queue.pop_front() {
                let eligible = group.iter().any(|g| *g == queued)
                    && !batch.contains(&queued)
                    && !self.config.is_disabled(&queued)
                    && self.registry.contains(&queued);
                if eligible {
                    batch.push(queued);
                } else {
                    remaining.push_back(queued);
                }
            }
            state.supervisor_queue = remaining;
        }

        state.active_agent = Some(first.clone());
        let instruction = current_query(state);

        for name in &batch {
            let action = self
                .registry
                .capability(name)
                .map(|c| c.action_type.to_string())
                .unwrap_or_default();
            self.broadcaster
                .publish(
                    state.session_id,
                    EventEnvelope::agent_start(state.session_id, name, &action),
                )
                .await;
        }

        let results: Vec<(String, AgentResult)> = if batch.len() == 1 {
            let outcome = {
                let fut = self.invoker.invoke(&first, &instruction, state);
                tokio::select! {
                    r = fut => Some(r?),
                    _ = token.cancelled() => None,
                }
            };
            match outcome {
                Some(result) => vec![(first, result)],
                None => return Err(OrquestaError::Cancelled("agent call interrupted".into())),
            }
        } else {
            info!(
                session_id = %state.session_id,
                agents = ?batch,
                "Parallel fan-out"
            );
            let ctx = self.invoker.context_view(state);
            let futs: Vec<_> = batch
                .iter()
                .map(|n| self.invoker.invoke_view(n, &instruction, &ctx))
                .collect();
            let joined = tokio::select! {
                r = join_all(futs) => r,
                _ = token.cancelled() => {
                    return Err(OrquestaError::Cancelled("agent calls interrupted".into()));
                }
            };
            let mut merged = Vec::with_capacity(batch.len());
            for (name, outcome) in batch.iter().zip(joined) {
                let result = outcome?;
                if !result.success {
                    let detail = result.error.clone().unwrap_or_default();
                    state.record_error(error_code(&result), name, &detail);
                }
                merged.push((name.clone(), result));
            }
            merged
        };

        let mut next = Node::React;
        for (agent, result) in results {
            state.enter_node(&agent);
            let action = result
                .action
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let capability = self
                .registry
                .capability(&agent)
                .cloned()
                .ok_or_else(|| OrquestaError::Registry(format!("unknown agent: {agent}")))?;

            if !result.success {
                self.broadcaster
                    .publish(
                        state.session_id,
                        EventEnvelope::error(
                            state.session_id,
                            &agent,
                            result.error.as_deref().unwrap_or("agent failed"),
                        ),
                    )
                    .await;
                state.set_meta(META_NEEDS_REPLAN, serde_json::json!(true));
            } else if HumanGate::requires_approval(&capability, &result) {
                self.gate.suspend(state, &capability, result.clone());
                next = Node::HumanGate;
            } else {
                self.invoker.apply(&agent, &result, state);
            }

            let mut end =
                EventEnvelope::agent_end(state.session_id, &agent, &action, result.success);
            if let Some(target) = &result.handoff {
                end = end.with_handoff(&agent, target);
            }
            self.broadcaster.publish(state.session_id, end).await;
        }
        Ok(next)
    }

    /// Persist the suspension checkpoint and hand control back to the
    /// caller — no compute stays live while a human decides.
    async fn suspend_turn(&self, state: &mut ExecutionState) -> OrquestaResult<TurnOutcome> {
        state.resume_node = Some("react".to_string());
        self.store.save(state).await?;

        let pending = match &state.gate {
            GateStatus::Awaiting { pending, .. } => Some(pending.clone()),
            _ => None,
        };
        let description = pending
            .as_ref()
            .map(|p| p.description.clone())
            .unwrap_or_default();
        info!(
            session_id = %state.session_id,
            pending = %description,
            "Turn suspended for approval"
        );
        Ok(TurnOutcome {
            session_id: state.session_id,
            trace_id: state.trace_id,
            status: state.status,
            response: format!("Necesito tu aprobación: {description}"),
            pending,
        })
    }

    /// Cooperative cancellation: mark the turn failed, persist, notify.
    async fn cancel_turn(&self, state: &mut ExecutionState) -> OrquestaResult<TurnOutcome> {
        warn!(session_id = %state.session_id, "Turn cancelled");
        state.record_error("cancelled", "orchestrator", "turn cancelled externally");
        state.status = ExecutionStatus::Failed;
        let response = "La operación fue cancelada.".to_string();
        state.final_response = Some(response.clone());
        state
            .conversation_history
            .push(orquesta_core::ConversationTurn::system("turn cancelled"));
        self.store.save(state).await?;
        self.broadcaster
            .publish(
                state.session_id,
                EventEnvelope::error(state.session_id, "orchestrator", "turn cancelled"),
            )
            .await;
        Ok(TurnOutcome {
            session_id: state.session_id,
            trace_id: state.trace_id,
            status: state.status,
            response,
            pending: None,
        })
    }
}

/// The current turn's query: content of the most recent user entry.
fn current_query(state: &ExecutionState) -> String {
    state
        .conversation_history
        .iter()
        .rev()
        .find(|t| t.role == TurnRole::User)
        .map(|t| t.content.clone())
        .unwrap_or_default()
}
