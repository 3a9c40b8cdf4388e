//! Event broadcasting for any number of subscribers.
//!
//! `EventBroadcaster` is the in-process `AppEventEmitter`: the pool, the
//! connection manager and the orchestrator all emit into it, and UIs or
//! log forwarders subscribe.

use tokio::sync::broadcast;
use toolhost_core::{AppEvent, AppEventEmitter};
use tracing::debug;

/// Default broadcast channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcaster for lifecycle events
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event: AppEvent) {
        // Only log if there are receivers (avoid spam with no listeners)
        if self.sender.receiver_count() > 0 {
            debug!(event = event.event_name(), "Broadcasting event");
            let _ = self.sender.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEventEmitter for EventBroadcaster {
    fn emit(&self, event: AppEvent) {
        self.broadcast(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let broadcaster = EventBroadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.emit(AppEvent::process_created("fs", 10, 0));
        broadcaster.emit(AppEvent::process_terminated("fs", 10, None));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().event_name(), "process:created");
            assert_eq!(rx.recv().await.unwrap().event_name(), "process:terminated");
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.emit(AppEvent::services_ready());
        let boxed = broadcaster.clone_box();
        boxed.emit(AppEvent::services_stopped());
    }
}
