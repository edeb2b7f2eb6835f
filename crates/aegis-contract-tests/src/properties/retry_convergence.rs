//! Property 5 ("retry convergence under transient NOT_ACTIVE"): given a
//! `RetryPolicy` with `max_attempts >= k` and a failure that clears after
//! `k - 1` attempts, a call driven through `aegis_core::client::RpcClient`
//! eventually succeeds, and the discovery cache entry for the target
//! service gets invalidated along the way (spec §4.8).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;

use aegis_core::client::RpcClient;
use aegis_core::codec;
use aegis_core::discovery::{BasicDiscovery, CachedDiscovery, Discovery};
use aegis_core::error::ErrorCode;
use aegis_core::ids::{InstanceId, SemVer, ServiceName};
use aegis_core::model::instance::{ServiceInstance, ServiceStatus};
use aegis_core::model::{RpcRequest, RpcResponse};
use aegis_core::ports::transport::{HandlerOutcome, MessageHandler, Transport};
use aegis_core::registry::Registry;
use aegis_core::retry::RetryPolicy;
use aegis_core::test_stubs::{MockKvStore, MockTransport};

/// Rejects with `NOT_ACTIVE` for the first `fail_count` deliveries, then
/// replies success — the exclusive-RPC gate's own behavior during a
/// failover window (spec §4.6), without a real election involved.
struct FlakyExclusiveHandler {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl MessageHandler for FlakyExclusiveHandler {
    async fn handle(&self, _subject: &str, payload: Vec<u8>) -> HandlerOutcome {
        let request: RpcRequest = codec::decode(&payload).expect("literal request decodes");
        let response = if self.remaining_failures.fetch_sub(1, Ordering::SeqCst) > 0 {
            RpcResponse::err(&request, ErrorCode::NotActive, "leader not yet promoted")
        } else {
            RpcResponse::ok(&request, Value::Bool(true))
        };
        HandlerOutcome::Reply(codec::encode(&response).expect("literal response encodes"))
    }
}

fn instance() -> ServiceInstance {
    ServiceInstance {
        service_name: ServiceName::parse("critical").unwrap(),
        instance_id: InstanceId::parse("critical-a1b2c3d4").unwrap(),
        version: SemVer::parse("1.0.0").unwrap(),
        status: ServiceStatus::Active,
        sticky_active_group: None,
        sticky_active_status: None,
        last_heartbeat: SystemTime::now(),
        metadata: Default::default(),
    }
}

pub async fn run() -> Result<(), String> {
    let service_name = ServiceName::parse("critical").unwrap();

    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let fails_on_first_attempt: u32 = 2; // attempts 0 and 1 see NOT_ACTIVE, attempt 2 succeeds
    transport
        .subscribe(
            "rpc.critical.promote",
            None,
            Arc::new(FlakyExclusiveHandler {
                remaining_failures: AtomicU32::new(fails_on_first_attempt),
            }),
        )
        .await
        .map_err(|e| e.to_string())?;

    let registry_kv = Arc::new(MockKvStore::new());
    let registry = Arc::new(Registry::new(registry_kv));
    registry.register(&instance()).await.map_err(|e| e.to_string())?;
    let basic = Arc::new(BasicDiscovery::new(registry, Duration::from_secs(30)));
    let cached = Arc::new(CachedDiscovery::new(basic, Duration::from_secs(30), 16));
    let discovery = Arc::clone(&cached) as Arc<dyn Discovery>;

    // Prime the cache so invalidation (rather than a first-ever fetch) is
    // what the NOT_ACTIVE path exercises.
    discovery
        .select_instance(&service_name, aegis_core::discovery::SelectionStrategy::RoundRobin, None)
        .await
        .map_err(|e| e.to_string())?;

    let policy = RetryPolicy::builder()
        .max_attempts(5)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build();
    let client = RpcClient::new(Arc::clone(&transport), discovery, policy);

    let result = client
        .call(&service_name, "promote", BTreeMap::new(), Duration::from_secs(1))
        .await;

    match result {
        Ok(Value::Bool(true)) => {}
        Ok(other) => return Err(format!("expected the call to resolve to `true`, got {other:?}")),
        Err(err) => return Err(format!("retry loop gave up: {err}")),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retry_converges_once_failover_completes() {
        run().await.unwrap();
    }

    #[tokio::test]
    async fn retry_gives_up_when_max_attempts_is_too_low() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        transport.connect(&[]).await.unwrap();
        transport
            .subscribe(
                "rpc.critical.promote",
                None,
                Arc::new(FlakyExclusiveHandler {
                    remaining_failures: AtomicU32::new(u32::MAX),
                }),
            )
            .await
            .unwrap();

        let registry_kv = Arc::new(MockKvStore::new());
        let registry = Arc::new(Registry::new(registry_kv));
        registry.register(&instance()).await.unwrap();
        let basic = Arc::new(BasicDiscovery::new(registry, Duration::from_secs(30)));
        let discovery = basic as Arc<dyn Discovery>;

        let policy = RetryPolicy::builder().max_attempts(2).build();
        let client = RpcClient::new(transport, discovery, policy);

        let err = client
            .call(
                &ServiceName::parse("critical").unwrap(),
                "promote",
                BTreeMap::new(),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.as_error_code(), Some(ErrorCode::NotActive));
    }
}
