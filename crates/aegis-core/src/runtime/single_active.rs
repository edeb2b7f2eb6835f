//! Single-active runtime (spec §4.7): extends [`ServiceRuntime`] with
//! leader election, lease refresh, failover observation, and exclusive-RPC
//! gating. Composed rather than inherited — Rust has no runtime
//! subclassing, so this type holds an `Arc<ServiceRuntime>` and splices
//! its own steps between the inner runtime's `register_self` and
//! `spawn_heartbeat`, exactly where spec §4.7 places them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::election::{AcquireOutcome, ElectionRepository, LeaderState, RefreshOutcome};
use crate::error::{ErrorCode, Result};
use crate::ids::InstanceId;
use crate::model::instance::{ServiceStatus, StickyActiveStatus};
use crate::observability::OpsEvent;
use crate::registry::election_key;
use crate::router::RpcHandler;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::service::ServiceRuntime;
use crate::runtime::state::RuntimeState;

pub struct SingleActiveRuntime {
    inner: Arc<ServiceRuntime>,
    election: Arc<dyn ElectionRepository>,
    group: String,
    key: String,
    sticky_status: ArcSwap<StickyActiveStatus>,
    revision: AtomicU64,
    shutdown: watch::Sender<bool>,
    lease_task: Mutex<Option<JoinHandle<()>>>,
    observer_task: Mutex<Option<JoinHandle<()>>>,
}

impl SingleActiveRuntime {
    pub fn new(
        config: RuntimeConfig,
        transport: Arc<dyn crate::ports::transport::Transport>,
        registry: Arc<crate::registry::Registry>,
        handlers: Arc<crate::router::HandlerRegistry>,
        observability: Arc<dyn crate::observability::ObservabilityFacade>,
        election: Arc<dyn ElectionRepository>,
    ) -> Self {
        let group = config.group_id.clone();
        let key = election_key(&config.service_name, &group);
        let inner = Arc::new(ServiceRuntime::new(
            config,
            transport,
            registry,
            handlers,
            observability,
        ));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner,
            election,
            group,
            key,
            sticky_status: ArcSwap::from_pointee(StickyActiveStatus::Electing),
            revision: AtomicU64::new(0),
            shutdown,
            lease_task: Mutex::new(None),
            observer_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.inner.config()
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.inner.instance_id()
    }

    pub fn sticky_active_status(&self) -> StickyActiveStatus {
        **self.sticky_status.load()
    }

    fn is_active(&self) -> bool {
        self.sticky_active_status() == StickyActiveStatus::Active
    }

    /// Wraps `handler` so it rejects with `NOT_ACTIVE` (spec §4.7
    /// "Exclusive RPC gating") whenever this instance is not the current
    /// leader, without ever invoking the wrapped handler.
    pub fn exclusive_rpc(self: &Arc<Self>, handler: Arc<dyn RpcHandler>) -> Arc<dyn RpcHandler> {
        Arc::new(ExclusiveRpcHandler {
            runtime: Arc::clone(self),
            inner: handler,
        })
    }

    /// Spec §4.6 steps 1-5 with the §4.7 election sequence spliced in
    /// between registration (step 4) and heartbeat startup (step 5).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        match self.try_start().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner
                    .fail(crate::error::CoreError::new(
                        err.code().to_string(),
                        err.message().to_string(),
                    ))
                    .await;
                Err(err)
            }
        }
    }

    async fn try_start(self: &Arc<Self>) -> Result<()> {
        self.inner.connect_and_subscribe().await?;
        self.inner.register_self().await?;

        self.sticky_status.store(Arc::new(StickyActiveStatus::Electing));
        self.inner.set_sticky(self.group.clone(), StickyActiveStatus::Electing);
        self.attempt_acquire().await?;

        let leader_ttl = self.config().leader_ttl;
        let status = if self.is_active() {
            ServiceStatus::Active
        } else {
            ServiceStatus::Standby
        };
        let heartbeat_handle = self.inner.spawn_heartbeat(status);
        self.inner.store_heartbeat_handle(heartbeat_handle).await;

        self.inner.set_state(RuntimeState::Started).await;
        info!(
            service = %self.config().service_name,
            instance = %self.instance_id(),
            group = %self.group,
            status = ?self.sticky_active_status(),
            leader_ttl_secs = leader_ttl.as_secs_f64(),
            "single-active runtime started"
        );
        Ok(())
    }

    /// Calls `try_acquire`; on success starts the lease-refresh task, on
    /// `HELD_BY` starts the observer task instead (spec §4.7 steps 2-4).
    async fn attempt_acquire(self: &Arc<Self>) -> Result<()> {
        let lease = self.config().leader_ttl;
        match self.election.try_acquire(&self.key, self.instance_id(), lease).await? {
            AcquireOutcome::Acquired { revision } => {
                self.revision.store(revision, Ordering::SeqCst);
                self.sticky_status.store(Arc::new(StickyActiveStatus::Active));
                self.inner.set_sticky(self.group.clone(), StickyActiveStatus::Active);
                self.inner.observability.ops_bus().publish(OpsEvent::LeaderAcquired {
                    service: self.config().service_name.to_string(),
                    group: self.group.clone(),
                    instance_id: self.instance_id().to_string(),
                });
                self.stop_observer().await;
                let handle = self.spawn_lease_refresh();
                *self.lease_task.lock().await = Some(handle);
            }
            AcquireOutcome::HeldBy { .. } => {
                self.sticky_status.store(Arc::new(StickyActiveStatus::Standby));
                self.inner.set_sticky(self.group.clone(), StickyActiveStatus::Standby);
                self.stop_lease_refresh().await;
                let handle = self.spawn_observer();
                *self.observer_task.lock().await = Some(handle);
            }
        }
        Ok(())
    }

    /// Every `leader_ttl / 3`, refresh the lease. On `Lost`, revert to
    /// `ELECTING` and re-attempt acquisition immediately; on persistent
    /// loss (another instance already holds it), fall through to
    /// `STANDBY` + observer (spec §4.7 step 3).
    fn spawn_lease_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut shutdown = this.shutdown.subscribe();
        let lease = this.config().leader_ttl;
        let refresh_interval = lease / 3;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let revision = this.revision.load(Ordering::SeqCst);
                        match this.election.refresh(&this.key, this.instance_id(), revision, lease).await {
                            Ok(RefreshOutcome::Refreshed { revision: next }) => {
                                this.revision.store(next, Ordering::SeqCst);
                            }
                            Ok(RefreshOutcome::Lost) => {
                                warn!(group = %this.group, "lost leader lease; re-electing");
                                this.sticky_status.store(Arc::new(StickyActiveStatus::Electing));
                                this.inner.set_sticky(this.group.clone(), StickyActiveStatus::Electing);
                                this.inner.observability.ops_bus().publish(OpsEvent::LeaderLost {
                                    service: this.config().service_name.to_string(),
                                    group: this.group.clone(),
                                    instance_id: this.instance_id().to_string(),
                                });
                                if this.attempt_acquire().await.is_ok() && this.is_active() {
                                    continue;
                                }
                                break;
                            }
                            Err(err) => {
                                warn!(error = %err, "lease refresh call failed; retrying next tick");
                            }
                        }
                    }
                }
            }
        })
    }

    /// Watches the election key; on `VACANT` attempts acquisition, on
    /// success promotes to `ACTIVE` (spec §4.7 step 4).
    fn spawn_observer(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut shutdown = this.shutdown.subscribe();

        tokio::spawn(async move {
            let mut watch = match this.election.observe(&this.key).await {
                Ok(watch) => watch,
                Err(err) => {
                    warn!(error = %err, "failed to open election observer; standby without live failover detection");
                    return;
                }
            };
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    event = watch.next() => {
                        let Some(event) = event else { break };
                        let state = crate::election::leader_state_from_watch(event.op, &event.entry.value);
                        match state {
                            Ok(LeaderState::Vacant) => {
                                if this.attempt_acquire().await.is_ok() && this.is_active() {
                                    break;
                                }
                            }
                            Ok(LeaderState::HeldBy(_)) => {}
                            Err(err) => warn!(error = %err, "malformed election watch payload"),
                        }
                    }
                }
            }
            watch.close().await;
        })
    }

    async fn stop_lease_refresh(&self) {
        if let Some(handle) = self.lease_task.lock().await.take() {
            handle.abort();
        }
    }

    async fn stop_observer(&self) {
        if let Some(handle) = self.observer_task.lock().await.take() {
            handle.abort();
        }
    }

    /// STOPPING → drain subscriptions → cancel heartbeat/election tasks →
    /// release the lease if held → best-effort deregister →
    /// `transport.close()` → STOPPED.
    pub async fn stop(&self) -> Result<()> {
        self.inner.set_state(RuntimeState::Stopping).await;
        let _ = self.shutdown.send(true);
        self.inner.join_heartbeat().await;
        self.stop_lease_refresh().await;
        self.stop_observer().await;
        self.inner.drain_subscriptions().await;

        if self.is_active() {
            self.election.release(&self.key, self.instance_id()).await?;
        }

        self.inner.deregister_self().await?;
        self.inner.transport.close().await?;
        self.inner.set_state(RuntimeState::Stopped).await;
        info!(
            service = %self.config().service_name,
            instance = %self.instance_id(),
            "single-active runtime stopped"
        );
        Ok(())
    }
}

struct ExclusiveRpcHandler {
    runtime: Arc<SingleActiveRuntime>,
    inner: Arc<dyn RpcHandler>,
}

#[async_trait]
impl RpcHandler for ExclusiveRpcHandler {
    async fn handle(
        &self,
        params: std::collections::BTreeMap<String, serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, (ErrorCode, String)> {
        let status = self.runtime.sticky_active_status();
        if status != StickyActiveStatus::Active {
            let code = match status {
                StickyActiveStatus::Electing => ErrorCode::Electing,
                _ => ErrorCode::NotActive,
            };
            return Err((
                code,
                format!("instance {} is {:?}", self.runtime.instance_id(), status),
            ));
        }
        self.inner.handle(params).await
    }
}

