//! In-memory [`Transport`] that delivers `publish` to every subscriber on
//! a subject and `request` to one subscriber at a time, round-robin
//! across however many are registered on that subject — a rough model of
//! a NATS queue group's own load balancing, enough to drive
//! `ServiceRuntime`/`Router`/`Registry` end to end in a single process.
//! `aegis-transport-nats` is what actually enforces `DurableMode`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{CoreError, Result};
use crate::ports::kv::KvStore;
use crate::ports::transport::{DurableMode, HandlerOutcome, MessageHandler, Subscription, Transport};
use crate::test_stubs::kv::MockKvStore;

#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    subscribers: DashMap<String, Vec<(String, Arc<dyn MessageHandler>)>>,
    request_cursors: DashMap<String, AtomicUsize>,
    kv_buckets: DashMap<String, Arc<dyn KvStore>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_subscriber(&self, subject: &str, handler: Arc<dyn MessageHandler>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.subscribers
            .entry(subject.to_string())
            .or_default()
            .push((id.clone(), handler));
        id
    }

}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _servers: &[String]) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CoreError::transport_unavailable("not connected"));
        }
        let Some(handlers) = self.subscribers.get(subject) else {
            return Ok(());
        };
        for (_, handler) in handlers.iter() {
            handler.handle(subject, payload.clone()).await;
        }
        Ok(())
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CoreError::transport_unavailable("not connected"));
        }
        let handler = {
            let handlers = self
                .subscribers
                .get(subject)
                .filter(|handlers| !handlers.is_empty())
                .ok_or_else(|| CoreError::new("SERVICE_UNAVAILABLE", format!("no subscriber on {subject}")))?;
            let cursor = self
                .request_cursors
                .entry(subject.to_string())
                .or_insert_with(|| AtomicUsize::new(0));
            let index = cursor.fetch_add(1, Ordering::Relaxed) % handlers.len();
            Arc::clone(&handlers[index].1)
        };

        match handler.handle(subject, payload).await {
            HandlerOutcome::Reply(bytes) => Ok(bytes),
            _ => Err(CoreError::new("INTERNAL_ERROR", "handler did not reply to request")),
        }
    }

    async fn subscribe(
        &self,
        subject_pattern: &str,
        _queue_group: Option<&str>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let id = self.add_subscriber(subject_pattern, handler);
        // Unsubscribe is a no-op here: tests run in-process and tear the
        // whole transport down via `close()` rather than unsubscribing
        // individual handlers mid-run.
        Ok(Subscription::new(id, || Ok(())))
    }

    async fn durable_subscribe(
        &self,
        _stream: &str,
        subject_pattern: &str,
        _consumer_name: &str,
        _mode: DurableMode,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        self.subscribe(subject_pattern, None, handler).await
    }

    async fn kv_bucket(&self, bucket: &str) -> Result<Arc<dyn KvStore>> {
        let entry = self
            .kv_buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(MockKvStore::new()));
        Ok(Arc::clone(&entry))
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.subscribers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct EchoHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&self, _subject: &str, payload: Vec<u8>) -> HandlerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            HandlerOutcome::Reply(payload)
        }
    }

    #[tokio::test]
    async fn request_returns_subscriber_reply() {
        let transport = MockTransport::new();
        transport.connect(&[]).await.unwrap();
        let handler = Arc::new(EchoHandler { calls: AtomicU32::new(0) });
        transport
            .subscribe("rpc.orders.get", None, handler.clone())
            .await
            .unwrap();

        let reply = transport
            .request("rpc.orders.get", vec![1, 2, 3], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, vec![1, 2, 3]);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_without_subscriber_is_service_unavailable() {
        let transport = MockTransport::new();
        transport.connect(&[]).await.unwrap();
        let err = transport
            .request("rpc.orders.get", vec![], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }
}
