use orquesta_core::EventEnvelope;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;
use uuid::Uuid;

/// Fire-and-forget publication of lifecycle events to live subscribers.
///
/// One broadcast channel per session. Publication never blocks graph
/// execution: with no subscribers the event is dropped, and a lagging
/// subscriber loses old events from the ring buffer rather than applying
/// backpressure. Emission order is preserved per session.
pub struct EventBroadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<EventEnvelope>>>,
    capacity: usize,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a session's live events.
    pub async fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<EventEnvelope> {
        let mut channels = self.channels.write().await;
        channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe as a `Stream` for `while let Some(...)` consumption.
    pub async fn subscribe_stream(&self, session_id: Uuid) -> BroadcastStream<EventEnvelope> {
        BroadcastStream::new(self.subscribe(session_id).await)
    }

    /// Publish an event. Best-effort: a send error means no subscribers
    /// and is ignored.
    pub async fn publish(&self, session_id: Uuid, event: EventEnvelope) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(&session_id) {
            let _ = sender.send(event);
        } else {
            trace!(session_id = %session_id, "No subscribers, event dropped");
        }
    }

    /// Drop a session's channel, disconnecting its subscribers.
    pub async fn remove_session(&self, session_id: Uuid) {
        let mut channels = self.channels.write().await;
        channels.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_core::EventType;

    #[tokio::test]
    async fn subscriber_receives_events_in_emission_order() {
        let broadcaster = EventBroadcaster::new(16);
        let session_id = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(session_id).await;

        broadcaster
            .publish(session_id, EventEnvelope::node_transition(session_id, "start", "intent"))
            .await;
        broadcaster
            .publish(session_id, EventEnvelope::agent_start(session_id, "summary", "summary_generation"))
            .await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type, EventType::NodeTransition);
        assert_eq!(second.event_type, EventType::AgentStart);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_block_or_fail() {
        let broadcaster = EventBroadcaster::new(16);
        let session_id = Uuid::new_v4();
        broadcaster
            .publish(session_id, EventEnvelope::error(session_id, "x", "boom"))
            .await;
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let broadcaster = EventBroadcaster::new(16);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_b = broadcaster.subscribe(b).await;
        // Channel for `a` exists because someone subscribed to it.
        let _rx_a = broadcaster.subscribe(a).await;

        broadcaster
            .publish(a, EventEnvelope::node_transition(a, "start", "intent"))
            .await;
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn stream_subscription_yields_events_in_order() {
        use tokio_stream::StreamExt;

        let broadcaster = EventBroadcaster::new(16);
        let session_id = Uuid::new_v4();
        let mut stream = broadcaster.subscribe_stream(session_id).await;

        broadcaster
            .publish(session_id, EventEnvelope::node_transition(session_id, "start", "intent"))
            .await;
        broadcaster
            .publish(session_id, EventEnvelope::agent_end(session_id, "summary", "summary_generation", true))
            .await;
        broadcaster.remove_session(session_id).await;

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, EventType::NodeTransition);
        assert_eq!(second.event_type, EventType::AgentEnd);
        // Channel dropped: the stream terminates.
        assert!(stream.next().await.is_none());
    }
}
