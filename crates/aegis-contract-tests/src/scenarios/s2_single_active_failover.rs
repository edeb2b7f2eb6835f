//! S2 — single-active failover. `critical-1`/`critical-2` share group
//! `default`; `critical-1` wins the election, `critical-2` stands by;
//! once `critical-1` goes away, `critical-2` takes over and its
//! exclusive RPCs start succeeding.
//!
//! The mock election store has no lease TTL expiry, so "killing"
//! `critical-1` is modeled as `SingleActiveRuntime::stop`, which releases
//! the lease immediately rather than waiting it out — that still drives
//! the same watch-triggered failover path `critical-2`'s observer reacts
//! to.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use aegis_core::client::RpcClient;
use aegis_core::discovery::{BasicDiscovery, Discovery, SelectionStrategy};
use aegis_core::election::{ElectionRepository, KvElectionRepository};
use aegis_core::error::ErrorCode;
use aegis_core::ids::{InstanceId, ServiceName};
use aegis_core::model::instance::ServiceInstance;
use aegis_core::model::StickyActiveStatus;
use aegis_core::observability::ObservabilityFacade;
use aegis_core::ports::transport::Transport;
use aegis_core::registry::Registry;
use aegis_core::retry::RetryPolicy;
use aegis_core::router::{HandlerRegistry, RpcHandler};
use aegis_core::runtime::{RuntimeConfig, SingleActiveRuntime};
use aegis_core::test_stubs::{MockKvStore, MockTransport, StaticObservabilityFacade};

use crate::support::{service, version};

struct OkHandler;

#[async_trait]
impl RpcHandler for OkHandler {
    async fn handle(&self, _params: BTreeMap<String, Value>) -> Result<Value, (ErrorCode, String)> {
        Ok(Value::Bool(true))
    }
}

/// Wraps a `Discovery` to count `invalidate` calls, the only observable
/// signal that the client saw a `NOT_ACTIVE` response (spec §4.8) — used
/// below to check the "at most 1 `NOT_ACTIVE` before success" claim this
/// scenario makes about the default-shaped `RetryPolicy`.
struct CountingDiscovery {
    inner: Arc<dyn Discovery>,
    invalidations: AtomicU32,
}

#[async_trait]
impl Discovery for CountingDiscovery {
    async fn discover_instances(&self, service_name: &ServiceName, only_healthy: bool) -> aegis_core::error::Result<Vec<ServiceInstance>> {
        self.inner.discover_instances(service_name, only_healthy).await
    }

    async fn select_instance(
        &self,
        service_name: &ServiceName,
        strategy: SelectionStrategy,
        preferred: Option<&InstanceId>,
    ) -> aegis_core::error::Result<Option<ServiceInstance>> {
        self.inner.select_instance(service_name, strategy, preferred).await
    }

    async fn invalidate(&self, service_name: &ServiceName) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate(service_name).await;
    }
}

fn config(instance_id: &str) -> RuntimeConfig {
    RuntimeConfig::builder(service("critical"), version())
        .transport_servers(vec!["nats://127.0.0.1:4222".to_string()])
        .instance_id(InstanceId::parse(instance_id).unwrap())
        .leader_ttl(std::time::Duration::from_millis(200))
        .registry_ttl(std::time::Duration::from_secs(5))
        .heartbeat_interval(std::time::Duration::from_millis(50))
        .build()
        .expect("literal test config satisfies every builder invariant")
}

pub async fn run() -> Result<(), String> {
    let registry_kv = Arc::new(MockKvStore::new()) as Arc<dyn aegis_core::ports::kv::KvStore>;
    let election_kv = Arc::new(MockKvStore::new()) as Arc<dyn aegis_core::ports::kv::KvStore>;
    let election = Arc::new(KvElectionRepository::new(Arc::clone(&election_kv))) as Arc<dyn ElectionRepository>;
    let observability = Arc::new(StaticObservabilityFacade::default()) as Arc<dyn ObservabilityFacade>;

    let transport1 = Arc::new(MockTransport::new()) as Arc<dyn Transport>;
    let runtime1 = Arc::new(SingleActiveRuntime::new(
        config("critical-1"),
        transport1,
        Arc::new(Registry::new(Arc::clone(&registry_kv))),
        Arc::new(HandlerRegistry::new()),
        Arc::clone(&observability),
        Arc::clone(&election),
    ));
    runtime1.start().await.map_err(|e| e.to_string())?;

    let transport2 = Arc::new(MockTransport::new()) as Arc<dyn Transport>;
    let handlers2 = Arc::new(HandlerRegistry::new());
    let runtime2 = Arc::new(SingleActiveRuntime::new(
        config("critical-2"),
        Arc::clone(&transport2),
        Arc::new(Registry::new(Arc::clone(&registry_kv))),
        Arc::clone(&handlers2),
        Arc::clone(&observability),
        Arc::clone(&election),
    ));
    handlers2.register_rpc("promote", runtime2.exclusive_rpc(Arc::new(OkHandler)));
    runtime2.start().await.map_err(|e| e.to_string())?;

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    if runtime1.sticky_active_status() != StickyActiveStatus::Active {
        return Err("expected critical-1 to win the initial election".to_string());
    }
    if runtime2.sticky_active_status() != StickyActiveStatus::Standby {
        return Err("expected critical-2 to stand by behind critical-1".to_string());
    }

    let standby_gate = runtime2.exclusive_rpc(Arc::new(OkHandler));
    match standby_gate.handle(BTreeMap::new()).await {
        Err((ErrorCode::NotActive, _)) => {}
        other => return Err(format!("expected critical-2's exclusive RPC to reject with NOT_ACTIVE while standing by, got {other:?}")),
    }

    runtime1.stop().await.map_err(|e| e.to_string())?;

    // Drive the post-failover call through the real client path (spec
    // §4.8) instead of the exclusive gate directly: Discovery confirms a
    // healthy `critical` instance exists, `RpcClient` sends over
    // `transport2`, and a `NOT_ACTIVE` response (critical-2 still
    // electing) invalidates the cache entry before the next retry. No
    // upfront sleep — the race between "call lands" and "critical-2
    // finishes promoting" is exactly what this is meant to exercise.
    let discovery = Arc::new(CountingDiscovery {
        inner: Arc::new(BasicDiscovery::new(
            Arc::new(Registry::new(Arc::clone(&registry_kv))),
            Duration::from_secs(5),
        )),
        invalidations: AtomicU32::new(0),
    });
    let retry = RetryPolicy::builder()
        .max_attempts(20)
        .initial_delay(Duration::from_millis(20))
        .max_delay(Duration::from_millis(100))
        .build();
    let client = RpcClient::new(Arc::clone(&transport2), Arc::clone(&discovery) as Arc<dyn Discovery>, retry);

    let result = client
        .call(&service("critical"), "promote", BTreeMap::new(), Duration::from_secs(2))
        .await;
    if result.is_err() {
        return Err(format!(
            "expected the client to converge onto critical-2 once it took over leadership, got {result:?}"
        ));
    }
    let not_active_count = discovery.invalidations.load(Ordering::SeqCst);
    if not_active_count > 3 {
        return Err(format!(
            "expected the client to see only a handful of NOT_ACTIVE responses before success, saw {not_active_count}"
        ));
    }

    if runtime2.sticky_active_status() != StickyActiveStatus::Active {
        return Err("expected critical-2 to take over leadership after critical-1 went away".to_string());
    }

    runtime2.stop().await.map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failover_promotes_the_standby_after_the_leader_disappears() {
        run().await.unwrap();
    }
}
