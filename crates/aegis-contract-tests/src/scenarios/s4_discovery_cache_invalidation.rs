//! S4 — discovery cache invalidation by watch. `Watched` discovery warms
//! a 60s-TTL cache with `svc`'s one instance; once that instance is
//! deregistered, the watch fires before the TTL would have expired the
//! cache and the next lookup sees the empty set immediately.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aegis_core::discovery::{BasicDiscovery, CachedDiscovery, Discovery, WatchedDiscovery};
use aegis_core::ids::InstanceId;
use aegis_core::ports::kv::KvStore;
use aegis_core::ports::transport::Transport;
use aegis_core::registry::Registry;
use aegis_core::test_stubs::MockTransport;

use crate::support::{instance_record, service};

pub async fn run() -> Result<(), String> {
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let kv = transport.kv_bucket("service_registry").await.map_err(|e| e.to_string())?;
    let registry = Arc::new(Registry::new(Arc::clone(&kv)));

    let svc = service("svc");
    registry
        .register(&instance_record(&svc, "svc-0000beef", SystemTime::now()))
        .await
        .map_err(|e| e.to_string())?;

    let basic = Arc::new(BasicDiscovery::new(Arc::clone(&registry), Duration::from_secs(30))) as Arc<dyn Discovery>;
    let cached = Arc::new(CachedDiscovery::new(basic, Duration::from_secs(60), 1000));
    let watched = Arc::new(WatchedDiscovery::new(Arc::clone(&cached)));

    let first = watched.discover_instances(&svc, true).await.map_err(|e| e.to_string())?;
    if first.len() != 1 {
        return Err(format!("expected the cache to warm with 1 instance, got {}", first.len()));
    }

    let mut watch = kv.watch("service-instances.").await.map_err(|e| e.to_string())?;
    let watched_for_task = Arc::clone(&watched);
    let watcher = tokio::spawn(async move {
        while let Some(event) = watch.next().await {
            if let Some(service_name) = WatchedDiscovery::service_name_from_key(&event.entry.key) {
                watched_for_task.on_watch_event(&service_name, event.op).await;
                break;
            }
        }
        watch.close().await;
    });

    registry
        .deregister(&svc, &InstanceId::parse("svc-0000beef").unwrap())
        .await
        .map_err(|e| e.to_string())?;

    tokio::time::timeout(Duration::from_millis(500), watcher)
        .await
        .map_err(|_| "watch-driven invalidation did not arrive within 500ms".to_string())?
        .map_err(|e| e.to_string())?;

    let after = watched.discover_instances(&svc, true).await.map_err(|e| e.to_string())?;
    if !after.is_empty() {
        return Err(format!("expected the watch to invalidate the still-warm cache, got {} entries", after.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deregistration_invalidates_the_warm_cache_via_watch() {
        run().await.unwrap();
    }
}
