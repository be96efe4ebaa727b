use orquesta_core::PlanStep;
use std::collections::VecDeque;

/// Last-resort tail appended to every queue so a turn always has a path to
/// an answer even when planning produced nothing useful.
pub const DEFAULT_TAIL: [&str; 4] = ["summary", "capi_datab", "capi_desktop", "assemble"];

/// Build the ordered, de-duplicated execution queue for a turn.
///
/// Order of precedence: reasoning-plan steps, then a tactically-recommended
/// agent surfaced by prior reasoning, then the fixed default tail. First
/// occurrence wins on duplicates; agents that already completed this turn
/// are excluded. Pure function of its inputs.
pub fn build_queue(
    plan: &[PlanStep],
    recommendation: Option<&str>,
    completed: &[String],
) -> VecDeque<String> {
    let mut queue = VecDeque::new();
    let mut push = |name: &str, queue: &mut VecDeque<String>| {
        if !queue.iter().any(|q| q == name) && !completed.iter().any(|c| c == name) {
            queue.push_back(name.to_string());
        }
    };

    for step in plan {
        push(&step.agent, &mut queue);
    }
    if let Some(agent) = recommendation {
        push(agent, &mut queue);
    }
    for agent in DEFAULT_TAIL {
        push(agent, &mut queue);
    }
    queue
}
