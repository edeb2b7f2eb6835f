use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{InstanceId, SemVer, ServiceName};

/// Operational status of a `ServiceInstance`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    Standby,
    Unhealthy,
    Shutdown,
}

/// Election status for single-active services. A distinct enum from
/// [`ServiceStatus`] per spec §3: "the first three additionally form the
/// `sticky_active_status`".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StickyActiveStatus {
    Active,
    Standby,
    Electing,
}

/// The per-instance record owned by the instance that created it and made
/// visible globally through the registry KV (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: ServiceName,
    pub instance_id: InstanceId,
    pub version: SemVer,
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_active_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_active_status: Option<StickyActiveStatus>,
    #[serde(with = "crate::rfc3339")]
    pub last_heartbeat: SystemTime,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ServiceInstance {
    /// The registry KV key this instance is stored under (spec §4.1/§6.1):
    /// `service-instances.{service}.{instance_id}`.
    pub fn registry_key(&self) -> String {
        registry_key(&self.service_name, &self.instance_id)
    }

    /// Whether `last_heartbeat` is older than `stale_threshold`, i.e. this
    /// instance must be treated as absent by discovery regardless of what
    /// the stored record says (spec §3 invariant, §4.4).
    pub fn is_stale(&self, stale_threshold: Duration, now: SystemTime) -> bool {
        match now.duration_since(self.last_heartbeat) {
            Ok(age) => age > stale_threshold,
            Err(_) => false, // heartbeat is in the future: clock skew, not staleness
        }
    }

    pub fn touch_heartbeat(&mut self, now: SystemTime) {
        self.last_heartbeat = now;
    }
}

/// Build the registry KV key for a `(service, instance)` pair without
/// requiring a full `ServiceInstance` in hand (used by `deregister`).
pub fn registry_key(service_name: &ServiceName, instance_id: &InstanceId) -> String {
    format!("service-instances.{service_name}.{instance_id}")
}

/// Build the election KV key for a `(service, group)` pair (spec §4.1/§6.1):
/// `elections.{service}.{group}`.
pub fn election_key(service_name: &ServiceName, group: &str) -> String {
    format!("elections.{service_name}.{group}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(service: &str, instance: &str) -> ServiceInstance {
        ServiceInstance {
            service_name: ServiceName::parse(service).unwrap(),
            instance_id: InstanceId::parse(instance).unwrap(),
            version: SemVer::parse("1.0.0").unwrap(),
            status: ServiceStatus::Active,
            sticky_active_group: None,
            sticky_active_status: None,
            last_heartbeat: SystemTime::now(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn staleness_uses_threshold_not_registry_ttl_directly() {
        let mut instance = sample("orders", "orders-aaaaaaaa");
        instance.last_heartbeat = SystemTime::now() - Duration::from_secs(60);
        assert!(instance.is_stale(Duration::from_secs(35), SystemTime::now()));
        assert!(!instance.is_stale(Duration::from_secs(120), SystemTime::now()));
    }

    #[test]
    fn registry_key_matches_normative_layout() {
        let instance = sample("orders", "orders-a1b2c3d4");
        assert_eq!(
            instance.registry_key(),
            "service-instances.orders.orders-a1b2c3d4"
        );
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let instance = sample("orders", "orders-a1b2c3d4");
        let json = serde_json::to_string(&instance).unwrap();
        let back: ServiceInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back.service_name, instance.service_name);
        assert_eq!(back.instance_id, instance.instance_id);
    }
}
