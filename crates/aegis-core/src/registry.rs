//! Service registry layered on [`KvStore`] (spec §4.2). Thin by design:
//! the registry does no caching and no background work of its own — that
//! is the runtime's job (heartbeat task) and discovery's job (cache
//! layer). It only knows how to read and write `ServiceInstance` records
//! and how to decide which of them are stale.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{instrument, warn};

use crate::error::{CoreError, Result};
use crate::ids::{InstanceId, ServiceName};
use crate::model::instance::{election_key as build_election_key, registry_key, ServiceInstance};
use crate::ports::kv::{CasOptions, KvStore};

/// `buffer = max(ttl / 6, 5s)` (spec §4.2).
pub fn stale_threshold(registry_ttl: Duration) -> Duration {
    let buffer = (registry_ttl / 6).max(Duration::from_secs(5));
    registry_ttl + buffer
}

/// Registry port: register/heartbeat/deregister/list against a KV bucket
/// dedicated to service instances (`kv_bucket_registry`, default
/// `service_registry`).
pub struct Registry {
    kv: Arc<dyn KvStore>,
}

impl Registry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Writes the instance record. The bucket itself is configured with
    /// stream-level `max_age = ttl_seconds` retention by the transport
    /// adapter when the bucket is created; this call never assumes
    /// per-key TTL (spec §4.2, §9 open question).
    #[instrument(skip(self, instance), fields(service = %instance.service_name, instance_id = %instance.instance_id))]
    pub async fn register(&self, instance: &ServiceInstance) -> Result<u64> {
        let key = instance.registry_key();
        let value = serde_json::to_vec(instance)
            .map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))?;
        self.kv
            .put(&key, value, CasOptions::create_if_absent())
            .await
            .map_err(|e| match e.code() {
                // A concurrent register for the same instance_id (spec
                // property S6) is a conflict the caller must act on, not a
                // fatal registry failure — keep the code distinct.
                "CAS_CONFLICT" => e,
                _ => CoreError::registration_failed(e.to_string()),
            })
    }

    /// Re-writes the record with a refreshed `last_heartbeat`. Overwrites
    /// unconditionally: heartbeat is a liveness signal, not a CAS-guarded
    /// mutation (spec property 6, "idempotent heartbeat").
    #[instrument(skip(self, instance), fields(service = %instance.service_name, instance_id = %instance.instance_id))]
    pub async fn update_heartbeat(&self, instance: &ServiceInstance) -> Result<u64> {
        let key = instance.registry_key();
        let value = serde_json::to_vec(instance)
            .map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))?;
        self.kv.put(&key, value, CasOptions::none()).await
    }

    #[instrument(skip(self))]
    pub async fn deregister(&self, service_name: &ServiceName, instance_id: &InstanceId) -> Result<()> {
        let key = registry_key(service_name, instance_id);
        match self.kv.delete(&key).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, %service_name, %instance_id, "deregister failed; best-effort, not fatal");
                Ok(())
            }
        }
    }

    /// Lists every instance of `service_name`. Does **not** filter stale
    /// entries — see [`Registry::list_healthy_instances`] — callers that
    /// want the raw record set (e.g. admin tooling) get it here.
    pub async fn list_instances(&self, service_name: &ServiceName) -> Result<Vec<ServiceInstance>> {
        let prefix = format!("service-instances.{service_name}.");
        let entries = self.kv.list(&prefix).await?;
        entries
            .into_iter()
            .map(|entry| {
                serde_json::from_slice(&entry.value)
                    .map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))
            })
            .collect()
    }

    /// Lists instances with stale entries removed (spec §4.2: "caller
    /// must filter stale entries"). `registry_ttl` is the same value
    /// passed to `register`.
    pub async fn list_healthy_instances(
        &self,
        service_name: &ServiceName,
        registry_ttl: Duration,
    ) -> Result<Vec<ServiceInstance>> {
        let threshold = stale_threshold(registry_ttl);
        let now = SystemTime::now();
        let all = self.list_instances(service_name).await?;
        Ok(all
            .into_iter()
            .filter(|instance| !instance.is_stale(threshold, now))
            .collect())
    }
}

pub fn election_key(service_name: &ServiceName, group: &str) -> String {
    build_election_key(service_name, group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_threshold_applies_minimum_five_second_buffer() {
        assert_eq!(
            stale_threshold(Duration::from_secs(30)),
            Duration::from_secs(35)
        );
        // ttl/6 for a tiny ttl would be under 5s; the floor kicks in.
        assert_eq!(
            stale_threshold(Duration::from_secs(6)),
            Duration::from_secs(11)
        );
    }
}
