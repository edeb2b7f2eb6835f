//! Service discovery (spec §4.4): `Basic` (no cache), `Cached` (TTL +
//! LRU), `Watched` (cache + KV-watch invalidation). Each wraps the next,
//! so `Watched::new(Cached::new(Basic::new(registry), ...))` composes the
//! full stack exactly as spec §4.4's "Implementations (composable)" table
//! describes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::ids::{InstanceId, ServiceName};
use crate::model::instance::ServiceInstance;
use crate::ports::kv::WatchOp;
use crate::registry::{stale_threshold, Registry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
    RoundRobin,
    Random,
    Sticky,
}

/// Port consumed by client-side messaging code (spec §4.4).
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    async fn discover_instances(
        &self,
        service_name: &ServiceName,
        only_healthy: bool,
    ) -> Result<Vec<ServiceInstance>>;

    async fn select_instance(
        &self,
        service_name: &ServiceName,
        strategy: SelectionStrategy,
        preferred: Option<&InstanceId>,
    ) -> Result<Option<ServiceInstance>>;

    /// Drop any cached entry for `service_name`. A no-op for
    /// implementations that do not cache. Called by the client-side
    /// retry policy after a `NOT_ACTIVE` response (spec §4.8).
    async fn invalidate(&self, service_name: &ServiceName);
}

fn select_from(
    instances: &[ServiceInstance],
    strategy: SelectionStrategy,
    preferred: Option<&InstanceId>,
    round_robin_cursor: &AtomicUsize,
) -> Option<ServiceInstance> {
    if instances.is_empty() {
        return None;
    }
    match strategy {
        SelectionStrategy::RoundRobin => {
            let index = round_robin_cursor.fetch_add(1, Ordering::Relaxed) % instances.len();
            Some(instances[index].clone())
        }
        SelectionStrategy::Random => {
            let nanos = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as usize;
            Some(instances[nanos % instances.len()].clone())
        }
        SelectionStrategy::Sticky => {
            if let Some(preferred) = preferred {
                if let Some(found) = instances.iter().find(|i| &i.instance_id == preferred) {
                    return Some(found.clone());
                }
            }
            Some(instances[0].clone())
        }
    }
}

/// No cache: every call hits the registry directly (spec §4.4 "Basic").
pub struct BasicDiscovery {
    registry: Arc<Registry>,
    registry_ttl: Duration,
    round_robin: DashMap<ServiceName, AtomicUsize>,
}

impl BasicDiscovery {
    pub fn new(registry: Arc<Registry>, registry_ttl: Duration) -> Self {
        Self {
            registry,
            registry_ttl,
            round_robin: DashMap::new(),
        }
    }
}

#[async_trait]
impl Discovery for BasicDiscovery {
    async fn discover_instances(
        &self,
        service_name: &ServiceName,
        only_healthy: bool,
    ) -> Result<Vec<ServiceInstance>> {
        if only_healthy {
            self.registry
                .list_healthy_instances(service_name, self.registry_ttl)
                .await
        } else {
            self.registry.list_instances(service_name).await
        }
    }

    async fn select_instance(
        &self,
        service_name: &ServiceName,
        strategy: SelectionStrategy,
        preferred: Option<&InstanceId>,
    ) -> Result<Option<ServiceInstance>> {
        let instances = self.discover_instances(service_name, true).await?;
        let entry = self
            .round_robin
            .entry(service_name.clone())
            .or_insert_with(|| AtomicUsize::new(0));
        Ok(select_from(&instances, strategy, preferred, &*entry))
    }

    async fn invalidate(&self, _service_name: &ServiceName) {}
}

struct CacheEntry {
    instances: Vec<ServiceInstance>,
    cached_at: Instant,
    last_touched: Instant,
}

/// Wraps another `Discovery`, adding a per-service TTL cache with
/// stale-while-error fallback and LRU eviction beyond `max_entries`
/// (spec §4.4 "Cached(ttl, max_entries)").
pub struct CachedDiscovery {
    inner: Arc<dyn Discovery>,
    ttl: Duration,
    max_entries: usize,
    cache: Mutex<HashMap<ServiceName, CacheEntry>>,
    round_robin: DashMap<ServiceName, AtomicUsize>,
}

impl CachedDiscovery {
    pub fn new(inner: Arc<dyn Discovery>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries,
            cache: Mutex::new(HashMap::new()),
            round_robin: DashMap::new(),
        }
    }

    async fn resolve(&self, service_name: &ServiceName) -> Result<Vec<ServiceInstance>> {
        let now = Instant::now();
        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get_mut(service_name) {
                if now.duration_since(entry.cached_at) < self.ttl {
                    entry.last_touched = now;
                    return Ok(entry.instances.clone());
                }
            }
        }

        match self.inner.discover_instances(service_name, true).await {
            Ok(instances) => {
                self.store(service_name, instances.clone(), now).await;
                Ok(instances)
            }
            Err(err) => {
                let mut cache = self.cache.lock().await;
                if let Some(entry) = cache.get_mut(service_name) {
                    warn!(error = %err, %service_name, "discovery delegate failed; serving stale cache entry");
                    entry.last_touched = now;
                    return Ok(entry.instances.clone());
                }
                Err(err)
            }
        }
    }

    async fn store(&self, service_name: &ServiceName, instances: Vec<ServiceInstance>, now: Instant) {
        let mut cache = self.cache.lock().await;
        if cache.len() >= self.max_entries && !cache.contains_key(service_name) {
            if let Some(lru_key) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.last_touched)
                .map(|(key, _)| key.clone())
            {
                cache.remove(&lru_key);
            }
        }
        cache.insert(
            service_name.clone(),
            CacheEntry {
                instances,
                cached_at: now,
                last_touched: now,
            },
        );
        // Instance set shape changed: reset rotation (spec §4.4).
        self.round_robin.remove(service_name);
    }
}

#[async_trait]
impl Discovery for CachedDiscovery {
    async fn discover_instances(
        &self,
        service_name: &ServiceName,
        only_healthy: bool,
    ) -> Result<Vec<ServiceInstance>> {
        if !only_healthy {
            return self.inner.discover_instances(service_name, false).await;
        }
        self.resolve(service_name).await
    }

    async fn select_instance(
        &self,
        service_name: &ServiceName,
        strategy: SelectionStrategy,
        preferred: Option<&InstanceId>,
    ) -> Result<Option<ServiceInstance>> {
        let instances = self.resolve(service_name).await?;
        let entry = self
            .round_robin
            .entry(service_name.clone())
            .or_insert_with(|| AtomicUsize::new(0));
        Ok(select_from(&instances, strategy, preferred, &*entry))
    }

    async fn invalidate(&self, service_name: &ServiceName) {
        debug!(%service_name, "invalidating discovery cache entry");
        self.cache.lock().await.remove(service_name);
        self.round_robin.remove(service_name);
        self.inner.invalidate(service_name).await;
    }
}

/// Wraps `Cached`, opening a KV watch on `service-instances.>` and
/// invalidating the affected service's entry on every event (spec §4.4
/// "Watched", S4). During watch disconnect the TTL cache stays
/// authoritative; this type never blocks a call on watch health.
pub struct WatchedDiscovery {
    cached: Arc<CachedDiscovery>,
}

impl WatchedDiscovery {
    /// `watch_events` is a stream of `(service_name, op)` pairs decoded
    /// from the raw KV watch by the caller (typically the runtime, which
    /// owns the `KvStore` handle and the reconnect/backoff loop); this
    /// type only needs to know which service a given key belongs to.
    pub fn new(cached: Arc<CachedDiscovery>) -> Self {
        Self { cached }
    }

    pub async fn on_watch_event(&self, service_name: &ServiceName, _op: WatchOp) {
        self.cached.invalidate(service_name).await;
    }

    /// Derive the affected `ServiceName` from a registry watch key
    /// (`service-instances.{service}.{instance_id}`), or `None` if the
    /// key doesn't match the expected layout.
    pub fn service_name_from_key(key: &str) -> Option<ServiceName> {
        let rest = key.strip_prefix("service-instances.")?;
        let (service, _instance) = rest.split_once('.')?;
        ServiceName::parse(service).ok()
    }
}

#[async_trait]
impl Discovery for WatchedDiscovery {
    async fn discover_instances(
        &self,
        service_name: &ServiceName,
        only_healthy: bool,
    ) -> Result<Vec<ServiceInstance>> {
        self.cached
            .discover_instances(service_name, only_healthy)
            .await
    }

    async fn select_instance(
        &self,
        service_name: &ServiceName,
        strategy: SelectionStrategy,
        preferred: Option<&InstanceId>,
    ) -> Result<Option<ServiceInstance>> {
        self.cached
            .select_instance(service_name, strategy, preferred)
            .await
    }

    async fn invalidate(&self, service_name: &ServiceName) {
        self.cached.invalidate(service_name).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_from_registry_key_round_trips() {
        let key = "service-instances.orders.orders-a1b2c3d4";
        let name = WatchedDiscovery::service_name_from_key(key).unwrap();
        assert_eq!(name.as_str(), "orders");
    }
}
