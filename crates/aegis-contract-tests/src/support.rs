//! Shared harness builders: every property/scenario wires its own
//! `MockTransport`/`MockKvStore`/`Registry` trio rather than sharing
//! global state, so tests can run concurrently without cross-talk.

use std::sync::Arc;
use std::time::SystemTime;

use aegis_core::ids::{InstanceId, SemVer, ServiceName};
use aegis_core::model::{ServiceInstance, ServiceStatus};
use aegis_core::ports::transport::Transport;
use aegis_core::registry::Registry;
use aegis_core::test_stubs::{MockTransport, StaticObservabilityFacade};

pub fn service(name: &str) -> ServiceName {
    ServiceName::parse(name).expect("test service names are valid DNS tokens")
}

pub fn version() -> SemVer {
    SemVer::parse("1.0.0").expect("literal semver")
}

/// A connected `MockTransport` plus a `Registry` layered on its
/// `service_registry` bucket — the pair almost every property needs.
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub registry: Arc<Registry>,
    pub observability: Arc<StaticObservabilityFacade>,
}

pub async fn harness() -> Harness {
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.expect("mock transport connect is infallible");
    let kv = transport
        .kv_bucket("service_registry")
        .await
        .expect("mock transport hands out kv buckets on demand");
    let registry = Arc::new(Registry::new(kv));
    let observability = Arc::new(StaticObservabilityFacade::default());
    Harness {
        transport,
        registry,
        observability,
    }
}

pub fn instance_record(service_name: &ServiceName, instance_id: &str, last_heartbeat: SystemTime) -> ServiceInstance {
    ServiceInstance {
        service_name: service_name.clone(),
        instance_id: InstanceId::parse(instance_id).expect("literal instance ids are non-empty"),
        version: version(),
        status: ServiceStatus::Active,
        sticky_active_group: None,
        sticky_active_status: None,
        last_heartbeat,
        metadata: Default::default(),
    }
}
