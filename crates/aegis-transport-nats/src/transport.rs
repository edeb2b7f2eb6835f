//! [`Transport`] over a small round-robin connection pool, one
//! `async_nats::Client` per configured server. Grounded on the teacher's
//! `run_with_context` cancellable-future pattern for the pool's
//! background re-probe loop, and on its per-operation `OperationKind` ->
//! `CoreError` mapping style (here: `error.rs`).
//!
//! `DurableMode::Compete`/`Exclusive` share one JetStream durable
//! consumer name across every subscribing instance (the broker
//! load-balances pulls across however many pull loops attach to it);
//! `Broadcast` mints a unique durable name per instance so each one sees
//! every message.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::{pull::Config as PullConfig, AckPolicy, DeliverPolicy};
use async_nats::jetstream::kv::Config as KvConfig;
use async_nats::jetstream::stream::Config as StreamConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use aegis_core::error::{CoreError, Result};
use aegis_core::ports::kv::KvStore;
use aegis_core::ports::transport::{DurableMode, HandlerOutcome, MessageHandler, Subscription, Transport};

use crate::error::{connect_failed, publish_failed, request_failed, subscribe_failed};
use crate::kv::NatsKvStore;

struct PooledConnection {
    client: async_nats::Client,
    url: String,
    healthy: AtomicBool,
}

/// Connection pool + JetStream handle over however many `servers` were
/// supplied to `connect` (spec §4.1: "round-robin across the pool's
/// healthy connections").
pub struct NatsTransport {
    pool: Mutex<Vec<Arc<PooledConnection>>>,
    cursor: AtomicUsize,
    kv_buckets: DashMap<String, Arc<dyn KvStore>>,
    shutdown: watch::Sender<bool>,
    reprobe_interval: Duration,
}

impl Default for NatsTransport {
    fn default() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pool: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            kv_buckets: DashMap::new(),
            shutdown,
            reprobe_interval: Duration::from_secs(5),
        }
    }
}

impl NatsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn healthy_connection(&self) -> Result<Arc<PooledConnection>> {
        let pool = self.pool.lock().await;
        if pool.is_empty() {
            return Err(CoreError::transport_unavailable("not connected"));
        }
        let len = pool.len();
        for _ in 0..len {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let candidate = Arc::clone(&pool[index]);
            if candidate.healthy.load(Ordering::SeqCst) {
                return Ok(candidate);
            }
        }
        Err(CoreError::transport_unavailable("no healthy nats connection in pool"))
    }

    fn mark_unhealthy(&self, conn: &Arc<PooledConnection>) {
        if conn.healthy.swap(false, Ordering::SeqCst) {
            warn!(url = %conn.url, "nats connection marked unhealthy; scheduling re-probe");
            self.spawn_reprobe(Arc::clone(conn));
        }
    }

    fn spawn_reprobe(&self, conn: Arc<PooledConnection>) {
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.reprobe_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        // `connection_state()` reflects async-nats's own
                        // reconnect loop; the pool just stops routing to a
                        // connection until that loop reports it healthy
                        // again, rather than reconnecting itself.
                        if matches!(conn.client.connection_state(), async_nats::connection::State::Connected) {
                            conn.healthy.store(true, Ordering::SeqCst);
                            info!(url = %conn.url, "nats connection recovered");
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn connect(&self, servers: &[String]) -> Result<()> {
        let mut pool = self.pool.lock().await;
        if !pool.is_empty() {
            return Ok(()); // idempotent (spec §4.1 contract)
        }
        if servers.is_empty() {
            return Err(CoreError::new("INVALID_REQUEST", "no transport servers configured"));
        }

        let mut last_err = None;
        for url in servers {
            match async_nats::connect(url.as_str()).await {
                Ok(client) => pool.push(Arc::new(PooledConnection {
                    client,
                    url: url.clone(),
                    healthy: AtomicBool::new(true),
                })),
                Err(err) => {
                    warn!(%url, error = %err, "failed to connect to nats server");
                    last_err = Some(err);
                }
            }
        }

        if pool.is_empty() {
            return Err(connect_failed(last_err.expect("servers non-empty implies at least one attempt")));
        }
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let conn = self.healthy_connection().await?;
        match conn.client.publish(subject.to_string(), payload.clone().into()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mark_unhealthy(&conn);
                let retry = self.healthy_connection().await?;
                retry.client.publish(subject.to_string(), payload.into()).await.map_err(|_| publish_failed(err))
            }
        }
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let conn = self.healthy_connection().await?;
        let request = conn.client.request(subject.to_string(), payload.into());
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(message)) => Ok(message.payload.to_vec()),
            Ok(Err(err)) => {
                self.mark_unhealthy(&conn);
                Err(request_failed(err))
            }
            Err(_) => Err(CoreError::from_code(
                aegis_core::error::ErrorCode::Timeout,
                format!("request to {subject} timed out after {timeout:?}"),
            )),
        }
    }

    async fn subscribe(
        &self,
        subject_pattern: &str,
        queue_group: Option<&str>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let conn = self.healthy_connection().await?;
        let mut subscriber = match queue_group {
            Some(group) => conn
                .client
                .queue_subscribe(subject_pattern.to_string(), group.to_string())
                .await
                .map_err(subscribe_failed)?,
            None => conn
                .client
                .subscribe(subject_pattern.to_string())
                .await
                .map_err(subscribe_failed)?,
        };

        let client = conn.client.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let reply_to = message.reply.clone();
                match handler.handle(&message.subject, message.payload.to_vec()).await {
                    HandlerOutcome::Reply(bytes) => {
                        if let Some(reply_subject) = reply_to {
                            if let Err(err) = client.publish(reply_subject, bytes.into()).await {
                                warn!(error = %err, "failed to publish rpc reply");
                            }
                        }
                    }
                    HandlerOutcome::Ack | HandlerOutcome::Nack => {}
                }
            }
        });

        let subject = subject_pattern.to_string();
        Ok(Subscription::new(subject, move || {
            task.abort();
            Ok(())
        }))
    }

    async fn durable_subscribe(
        &self,
        stream: &str,
        subject_pattern: &str,
        consumer_name: &str,
        mode: DurableMode,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let conn = self.healthy_connection().await?;
        let jetstream = async_nats::jetstream::new(conn.client.clone());

        let stream_handle = jetstream
            .get_or_create_stream(StreamConfig {
                name: stream.to_string(),
                subjects: vec![subject_pattern.to_string()],
                ..Default::default()
            })
            .await
            .map_err(crate::error::consumer_failed)?;

        // Broadcast: every instance needs its own durable name so the
        // broker doesn't load-balance deliveries across them.
        let durable_name = match mode {
            DurableMode::Broadcast => format!("{consumer_name}-{}", uuid::Uuid::new_v4()),
            DurableMode::Compete | DurableMode::Exclusive => consumer_name.to_string(),
        };

        let consumer = stream_handle
            .get_or_create_consumer(
                &durable_name,
                PullConfig {
                    durable_name: Some(durable_name.clone()),
                    filter_subject: subject_pattern.to_string(),
                    deliver_policy: DeliverPolicy::New,
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(crate::error::consumer_failed)?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(crate::error::consumer_failed)?;

        let task = tokio::spawn(async move {
            while let Some(delivered) = messages.next().await {
                let message = match delivered {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(error = %err, "jetstream consumer delivery error");
                        continue;
                    }
                };
                let subject = message.subject.to_string();
                let payload = message.payload.to_vec();
                match handler.handle(&subject, payload).await {
                    HandlerOutcome::Ack | HandlerOutcome::Reply(_) => {
                        if let Err(err) = message.ack().await {
                            warn!(error = %err, "failed to ack jetstream message");
                        }
                    }
                    HandlerOutcome::Nack => {
                        if let Err(err) = message.ack_with(async_nats::jetstream::AckKind::Nak(None)).await {
                            warn!(error = %err, "failed to nack jetstream message");
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(durable_name, move || {
            task.abort();
            Ok(())
        }))
    }

    async fn kv_bucket(&self, bucket: &str) -> Result<Arc<dyn KvStore>> {
        if let Some(existing) = self.kv_buckets.get(bucket) {
            return Ok(Arc::clone(&existing));
        }
        let conn = self.healthy_connection().await?;
        let jetstream = async_nats::jetstream::new(conn.client.clone());
        let store = jetstream
            .create_key_value(KvConfig {
                bucket: bucket.to_string(),
                ..Default::default()
            })
            .await
            .map_err(crate::error::kv_failed)?;
        let handle: Arc<dyn KvStore> = Arc::new(NatsKvStore::new(store));
        self.kv_buckets.insert(bucket.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn close(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let pool = std::mem::take(&mut *self.pool.lock().await);
        for conn in pool {
            if let Err(err) = conn.client.flush().await {
                warn!(error = %err, "flush before close failed");
            }
        }
        Ok(())
    }
}
