use tokio::sync::broadcast;

use crate::agent_engine::state::AgentEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of agent events. Emitting with no subscriber is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("agent event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(AgentEvent::Status("a".into()));
        bus.emit(AgentEvent::Warning("b".into()));
        assert!(matches!(rx.recv().await.unwrap(), AgentEvent::Status(s) if s == "a"));
        assert!(matches!(rx.recv().await.unwrap(), AgentEvent::Warning(s) if s == "b"));
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(AgentEvent::Done("ok".into()));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
