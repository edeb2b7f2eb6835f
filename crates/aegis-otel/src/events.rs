//! [`OpsEventBus`] fanned out over a `tokio::sync::broadcast` channel, so
//! any number of in-process observers (a health endpoint, a test
//! assertion, a metrics bridge) can `subscribe` independently of
//! whatever triggered the event.

use tokio::sync::broadcast;

use aegis_core::observability::{OpsEvent, OpsEventBus};

const DEFAULT_CAPACITY: usize = 256;

pub struct ChannelOpsEventBus {
    sender: broadcast::Sender<OpsEvent>,
}

impl ChannelOpsEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every `OpsEvent` published from this point on. Lagging
    /// receivers skip ahead rather than blocking publishers, per
    /// `broadcast`'s own overflow behavior.
    pub fn subscribe(&self) -> broadcast::Receiver<OpsEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelOpsEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl OpsEventBus for ChannelOpsEventBus {
    fn publish(&self, event: OpsEvent) {
        // No subscribers is the common case at startup; `send` returning
        // an error just means nobody is listening yet.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = ChannelOpsEventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(OpsEvent::InstanceRegistered {
            service: "orders".into(),
            instance_id: "i-1".into(),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, OpsEvent::InstanceRegistered { .. }));
    }
}
