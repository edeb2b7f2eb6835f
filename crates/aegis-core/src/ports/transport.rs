//! Message-substrate port (spec §4.1). One `Transport` implementation
//! wraps a connection pool over the underlying message system; the core
//! never talks to the substrate directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ports::kv::KvStore;

/// Durable-consumer shape for [`Transport::durable_subscribe`] (spec
/// §4.1, §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurableMode {
    /// Shared queue group: exactly one subscriber in the group processes
    /// each message.
    Compete,
    /// Per-instance durable consumer: every subscriber receives every
    /// message.
    Broadcast,
    /// Single-consumer durable: the substrate enforces at most one active
    /// consumer for the whole stream/filter.
    Exclusive,
}

/// What a handler tells the router to do with an inbound message.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// RPC-style reply: published to the message's reply subject.
    Reply(Vec<u8>),
    /// Event/command processed successfully; acknowledge to the substrate.
    Ack,
    /// Event/command processing failed; do not acknowledge so the
    /// substrate redelivers per its policy (spec §4.5, S5).
    Nack,
}

/// Object-safe inbound message handler passed to `subscribe`/
/// `durable_subscribe`. The [`crate::router::Router`] is the only
/// production implementor; `aegis-contract-tests` uses closures-backed
/// stand-ins for exercising the port directly.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, subject: &str, payload: Vec<u8>) -> HandlerOutcome;
}

/// A live subscription. Dropping it does not guarantee prompt unsubscribe
/// on every adapter; call [`Subscription::unsubscribe`] for a clean,
/// awaited teardown during `stop()` (spec §5, "drain subscriptions").
pub struct Subscription {
    id: String,
    closer: Option<Box<dyn FnOnce() -> crate::error::Result<()> + Send>>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, closer: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            id: id.into(),
            closer: Some(Box::new(closer)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(mut self) -> Result<()> {
        if let Some(closer) = self.closer.take() {
            closer()
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Abstract connection pool to the message substrate (spec §4.1).
///
/// # Contract
/// - `connect` is idempotent; calling it again on an already-connected
///   transport is a no-op.
/// - `publish`/`request` round-robin across the pool's healthy
///   connections; a connection that fails an operation is marked
///   unhealthy and re-probed on a bounded interval (handled inside the
///   adapter, not exposed here).
/// - `close` drains subscriptions and flushes pending publishes before
///   returning.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, servers: &[String]) -> Result<()>;

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>>;

    async fn subscribe(
        &self,
        subject_pattern: &str,
        queue_group: Option<&str>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;

    async fn durable_subscribe(
        &self,
        stream: &str,
        subject_pattern: &str,
        consumer_name: &str,
        mode: DurableMode,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;

    /// A KV handle scoped to `bucket`. Adapters create the bucket
    /// (stream-backed, `max_age` retention) on first use if absent.
    async fn kv_bucket(&self, bucket: &str) -> Result<Arc<dyn KvStore>>;

    async fn close(&self) -> Result<()>;
}
