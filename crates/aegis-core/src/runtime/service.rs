//! Load-balanced service runtime (spec §4.6): owns the startup/shutdown
//! sequence, the heartbeat task, and the handler subscriptions. Grounded
//! on the teacher's `kernel::model` state-machine shape plus its
//! `tokio::select!`-driven cancellable background loops (see
//! `spark-transport-tcp::util::run_with_context`) — adapted here from a
//! per-call cancellation race to a long-lived task cancelled by a
//! `tokio::sync::watch` shutdown signal, the pattern `spark-core`'s own
//! reconnect loops use for "run until told to stop".
//!
//! The steps are exposed individually (`pub(crate)`) as well as through
//! the single [`ServiceRuntime::start`]/[`ServiceRuntime::stop`] pair,
//! because [`crate::runtime::single_active::SingleActiveRuntime`] splices
//! its election sequence between registration and heartbeat startup
//! (spec §4.7: "after §4.6 step 4, before step 5") rather than running
//! the two lifecycles back to back.

use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::ids::InstanceId;
use crate::model::instance::{ServiceInstance, ServiceStatus, StickyActiveStatus};
use crate::observability::{LogContext, ObservabilityFacade, OpsEvent};
use crate::ports::transport::{DurableMode, MessageHandler, Subscription, Transport};
use crate::registry::Registry;
use crate::router::{HandlerRegistry, Router};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::state::{RuntimeState, RuntimeStatus};

/// Invoked locally (no callback into the registry, spec §8 "one-way
/// dependencies + event callbacks") after three consecutive heartbeat
/// failures, and again when a heartbeat subsequently succeeds.
pub type UnhealthyCallback = Arc<dyn Fn(&InstanceId) + Send + Sync>;

const CONSECUTIVE_FAILURES_BEFORE_UNHEALTHY: u32 = 3;

/// Orchestrates one service instance's lifecycle against a `Transport` +
/// `Registry` + `HandlerRegistry` (spec §4.6).
pub struct ServiceRuntime {
    pub(crate) config: RuntimeConfig,
    pub(crate) instance_id: InstanceId,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<Registry>,
    handlers: Arc<HandlerRegistry>,
    pub(crate) observability: Arc<dyn ObservabilityFacade>,
    on_unhealthy: Option<UnhealthyCallback>,

    status: Mutex<RuntimeStatus>,
    /// Set by `SingleActiveRuntime` so the heartbeat task's instance
    /// record carries `sticky_active_group`/`sticky_active_status`
    /// (spec §3); left `None` for a plain load-balanced runtime.
    sticky: ArcSwapOption<(String, StickyActiveStatus)>,
    shutdown: watch::Sender<bool>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ServiceRuntime {
    pub fn new(
        config: RuntimeConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<Registry>,
        handlers: Arc<HandlerRegistry>,
        observability: Arc<dyn ObservabilityFacade>,
    ) -> Self {
        let instance_id = config.instance_id();
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            instance_id,
            transport,
            registry,
            handlers,
            observability,
            on_unhealthy: None,
            status: Mutex::new(RuntimeStatus::Running(RuntimeState::Initialized)),
            sticky: ArcSwapOption::from(None),
            shutdown,
            heartbeat_task: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn on_unhealthy(mut self, callback: UnhealthyCallback) -> Self {
        self.on_unhealthy = Some(callback);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub async fn status(&self) -> RuntimeStatus {
        self.status.lock().await.clone()
    }

    pub(crate) fn log_context(&self) -> LogContext {
        LogContext {
            service: self.config.service_name.to_string(),
            instance_id: self.instance_id.to_string(),
            trace_id: None,
        }
    }

    pub(crate) async fn set_state(&self, state: RuntimeState) {
        *self.status.lock().await = RuntimeStatus::Running(state);
    }

    pub(crate) async fn fail(&self, error: CoreError) {
        let logger = self.observability.logger();
        logger.error(error.message(), Some(error.code()), &self.log_context());
        *self.status.lock().await = RuntimeStatus::Failed(Arc::new(error));
    }

    /// Records the election group/status `SingleActiveRuntime` wants
    /// reflected on every subsequent heartbeat-written instance record.
    pub(crate) fn set_sticky(&self, group: String, status: StickyActiveStatus) {
        self.sticky.store(Some(Arc::new((group, status))));
    }

    pub(crate) fn current_instance_record(&self, status: ServiceStatus, now: SystemTime) -> ServiceInstance {
        let sticky = self.sticky.load();
        let (sticky_active_group, sticky_active_status) = match sticky.as_deref() {
            Some((group, status)) => (Some(group.clone()), Some(*status)),
            None => (None, None),
        };
        ServiceInstance {
            service_name: self.config.service_name.clone(),
            instance_id: self.instance_id.clone(),
            version: self.config.version,
            status,
            sticky_active_group,
            sticky_active_status,
            last_heartbeat: now,
            metadata: Default::default(),
        }
    }

    /// Spec §4.6 steps 1-5, unabridged. `SingleActiveRuntime` calls the
    /// granular `pub(crate)` steps below instead, to splice its election
    /// sequence in between `register_self` and `spawn_heartbeat`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        match self.try_start().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail(CoreError::new(err.code().to_string(), err.message().to_string()))
                    .await;
                Err(err)
            }
        }
    }

    async fn try_start(self: &Arc<Self>) -> Result<()> {
        self.connect_and_subscribe().await?;
        self.register_self().await?;
        let handle = self.spawn_heartbeat(ServiceStatus::Active);
        self.store_heartbeat_handle(handle).await;
        self.set_state(RuntimeState::Started).await;
        info!(service = %self.config.service_name, instance = %self.instance_id, "service runtime started");
        Ok(())
    }

    /// Step 1-2: STARTING → `transport.connect` → subscribe every
    /// registered handler.
    pub(crate) async fn connect_and_subscribe(&self) -> Result<()> {
        self.set_state(RuntimeState::Starting).await;
        info!(service = %self.config.service_name, instance = %self.instance_id, "service runtime starting");
        self.transport.connect(&self.config.transport_servers).await?;
        self.subscribe_handlers().await
    }

    /// Step 4: write the instance record if registration is enabled.
    pub(crate) async fn register_self(&self) -> Result<()> {
        if !self.config.enable_registration {
            return Ok(());
        }
        let record = self.current_instance_record(ServiceStatus::Active, SystemTime::now());
        self.registry.register(&record).await?;
        self.observability.ops_bus().publish(OpsEvent::InstanceRegistered {
            service: self.config.service_name.to_string(),
            instance_id: self.instance_id.to_string(),
        });
        Ok(())
    }

    /// RPC stays on plain queue-group `subscribe` (spec §4.5: "load-balanced",
    /// no durability implied). Events and commands go through
    /// `durable_subscribe` so redelivery/dead-lettering and the
    /// COMPETE/BROADCAST/EXCLUSIVE consumer shapes actually apply (spec
    /// §4.5); commands have no per-entry mode in the registry, so they
    /// always get the COMPETE shape "same shape as events" falls back to
    /// absent an explicit one.
    async fn subscribe_handlers(&self) -> Result<()> {
        let service = &self.config.service_name;
        let router = Arc::new(Router::new(
            Arc::clone(&self.handlers),
            Arc::clone(&self.transport),
            service.clone(),
        )) as Arc<dyn MessageHandler>;
        let mut subscriptions = self.subscriptions.lock().await;

        for method in self.handlers.rpc_methods() {
            let subject = format!("rpc.{service}.{method}");
            let sub = self
                .transport
                .subscribe(&subject, Some(&format!("{service}-workers")), Arc::clone(&router))
                .await?;
            subscriptions.push(sub);
        }
        for (pattern, mode) in self.handlers.event_patterns() {
            let subject = format!("events.{service}.{pattern}");
            let stream = format!("{service}-events-{}", sanitize_consumer_token(&pattern));
            let consumer = format!("{service}-{}-consumer", sanitize_consumer_token(&pattern));
            let sub = self
                .transport
                .durable_subscribe(&stream, &subject, &consumer, mode, Arc::clone(&router))
                .await?;
            subscriptions.push(sub);
        }
        for name in self.handlers.command_names() {
            let subject = format!("commands.{service}.{name}");
            let stream = format!("{service}-commands-{}", sanitize_consumer_token(&name));
            let consumer = format!("{service}-{name}-workers");
            let sub = self
                .transport
                .durable_subscribe(&stream, &subject, &consumer, DurableMode::Compete, Arc::clone(&router))
                .await?;
            subscriptions.push(sub);
        }
        Ok(())
    }

    /// Every `heartbeat_interval`, refresh `last_heartbeat` in the
    /// registry. Three consecutive failures flip local status to
    /// `UNHEALTHY` and fire `on_unhealthy`; the task keeps retrying
    /// regardless (spec §4.6 step 5). `base_status` is the status written
    /// while heartbeats succeed — `SingleActiveRuntime` has no separate
    /// concept here, it always heartbeats as its current `ServiceStatus`.
    pub(crate) fn spawn_heartbeat(self: &Arc<Self>, base_status: ServiceStatus) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut shutdown = this.shutdown.subscribe();
        let interval = this.config.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            let mut consecutive_failures: u32 = 0;
            let mut unhealthy = false;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let status = if unhealthy { ServiceStatus::Unhealthy } else { base_status };
                        let record = this.current_instance_record(status, SystemTime::now());
                        match this.registry.update_heartbeat(&record).await {
                            Ok(_) => {
                                if unhealthy {
                                    unhealthy = false;
                                    this.observability.ops_bus().publish(OpsEvent::HeartbeatRestored {
                                        service: this.config.service_name.to_string(),
                                        instance_id: this.instance_id.to_string(),
                                    });
                                }
                                consecutive_failures = 0;
                            }
                            Err(err) => {
                                consecutive_failures += 1;
                                warn!(error = %err, consecutive_failures, "heartbeat write failed");
                                if consecutive_failures >= CONSECUTIVE_FAILURES_BEFORE_UNHEALTHY && !unhealthy {
                                    unhealthy = true;
                                    if let Some(callback) = &this.on_unhealthy {
                                        callback(&this.instance_id);
                                    }
                                    this.observability.ops_bus().publish(OpsEvent::HeartbeatFailed {
                                        service: this.config.service_name.to_string(),
                                        instance_id: this.instance_id.to_string(),
                                        consecutive_failures,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    pub(crate) async fn store_heartbeat_handle(&self, handle: JoinHandle<()>) {
        *self.heartbeat_task.lock().await = Some(handle);
    }

    /// STOPPING → drain subscriptions → cancel heartbeat → best-effort
    /// deregister → `transport.close()` → STOPPED (spec §4.6).
    pub async fn stop(&self) -> Result<()> {
        self.set_state(RuntimeState::Stopping).await;
        let _ = self.shutdown.send(true);
        self.join_heartbeat().await;
        self.drain_subscriptions().await;
        self.deregister_self().await?;
        self.transport.close().await?;
        self.set_state(RuntimeState::Stopped).await;
        info!(service = %self.config.service_name, instance = %self.instance_id, "service runtime stopped");
        Ok(())
    }

    pub(crate) async fn join_heartbeat(&self) {
        if let Some(handle) = self.heartbeat_task.lock().await.take() {
            let grace = self.config.shutdown_grace;
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("heartbeat task did not exit within shutdown_grace");
            }
        }
    }

    pub(crate) async fn drain_subscriptions(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock().await);
        for sub in subscriptions {
            if let Err(err) = sub.unsubscribe() {
                warn!(error = %err, "failed to cleanly unsubscribe during shutdown");
            }
        }
    }

    pub(crate) async fn deregister_self(&self) -> Result<()> {
        if !self.config.enable_registration {
            return Ok(());
        }
        self.registry
            .deregister(&self.config.service_name, &self.instance_id)
            .await?;
        self.observability.ops_bus().publish(OpsEvent::InstanceDeregistered {
            service: self.config.service_name.to_string(),
            instance_id: self.instance_id.to_string(),
        });
        Ok(())
    }
}

/// JetStream durable/stream names can't contain `.` (a subject token
/// separator); event patterns are free-form dotted strings, so names
/// derived from them need this before being handed to `durable_subscribe`.
fn sanitize_consumer_token(token: &str) -> String {
    token.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_threshold_matches_spec() {
        assert_eq!(CONSECUTIVE_FAILURES_BEFORE_UNHEALTHY, 3);
    }

    #[test]
    fn consumer_token_sanitization_strips_dots() {
        assert_eq!(sanitize_consumer_token("order.created"), "order_created");
    }
}
