//! `RuntimeConfig` (spec §6.5). A validated value object: construction
//! via [`RuntimeConfigBuilder::build`] is the only way to get one, and it
//! enforces the one cross-field invariant spec §6.5 calls out
//! (`heartbeat_interval < registry_ttl`) rather than leaving it to be
//! checked ad hoc wherever the config is read.

use std::time::Duration;

use crate::error::CoreError;
use crate::ids::{InstanceId, SemVer, ServiceName};
use crate::retry::RetryPolicy;

mod toml_config;
pub use toml_config::RuntimeConfigToml;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub service_name: ServiceName,
    pub instance_id: Option<InstanceId>,
    pub version: SemVer,
    pub registry_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub enable_registration: bool,
    pub transport_servers: Vec<String>,
    pub kv_bucket_registry: String,
    pub kv_bucket_elections: String,
    pub discovery_cache_ttl: Duration,
    pub discovery_cache_max_entries: usize,
    pub discovery_watch_enabled: bool,
    pub leader_ttl: Duration,
    pub group_id: String,
    pub retry_policy: RetryPolicy,
    pub shutdown_grace: Duration,
}

pub struct RuntimeConfigBuilder {
    service_name: ServiceName,
    instance_id: Option<InstanceId>,
    version: SemVer,
    registry_ttl: Duration,
    heartbeat_interval: Duration,
    enable_registration: bool,
    transport_servers: Vec<String>,
    kv_bucket_registry: String,
    kv_bucket_elections: String,
    discovery_cache_ttl: Duration,
    discovery_cache_max_entries: usize,
    discovery_watch_enabled: bool,
    leader_ttl: Duration,
    group_id: String,
    retry_policy: RetryPolicy,
    shutdown_grace: Duration,
}

impl RuntimeConfig {
    pub fn builder(service_name: ServiceName, version: SemVer) -> RuntimeConfigBuilder {
        RuntimeConfigBuilder {
            service_name,
            instance_id: None,
            version,
            registry_ttl: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            enable_registration: true,
            transport_servers: Vec::new(),
            kv_bucket_registry: "service_registry".to_string(),
            kv_bucket_elections: "sticky_active".to_string(),
            discovery_cache_ttl: Duration::from_secs(10),
            discovery_cache_max_entries: 1000,
            discovery_watch_enabled: true,
            leader_ttl: Duration::from_secs(4),
            group_id: "default".to_string(),
            retry_policy: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
            .clone()
            .unwrap_or_else(|| InstanceId::generate(&self.service_name))
    }

    /// Parses `text` as TOML (spec §B: "loadable from TOML via the
    /// `toml` crate") and validates it exactly as [`RuntimeConfigBuilder::build`]
    /// does — a config file is just another way of calling the builder.
    pub fn from_toml_str(text: &str) -> Result<RuntimeConfig, CoreError> {
        let file: RuntimeConfigToml =
            toml::from_str(text).map_err(|err| CoreError::new("INVALID_REQUEST", format!("invalid runtime config TOML: {err}")))?;
        file.into_builder()?.build()
    }
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = value;
            self
        }
    };
}

impl RuntimeConfigBuilder {
    pub fn instance_id(mut self, value: InstanceId) -> Self {
        self.instance_id = Some(value);
        self
    }

    setter!(registry_ttl: Duration);
    setter!(heartbeat_interval: Duration);
    setter!(enable_registration: bool);
    setter!(transport_servers: Vec<String>);
    setter!(kv_bucket_registry: String);
    setter!(kv_bucket_elections: String);
    setter!(discovery_cache_ttl: Duration);
    setter!(discovery_cache_max_entries: usize);
    setter!(discovery_watch_enabled: bool);
    setter!(leader_ttl: Duration);
    setter!(group_id: String);
    setter!(retry_policy: RetryPolicy);
    setter!(shutdown_grace: Duration);

    /// Validates the one cross-field invariant spec §6.5 mandates
    /// (`heartbeat_interval_seconds ... must be < registry_ttl`) plus the
    /// baseline non-empty/positive checks every field implies.
    pub fn build(self) -> Result<RuntimeConfig, CoreError> {
        if self.transport_servers.is_empty() {
            return Err(CoreError::new(
                "INVALID_REQUEST",
                "transport_servers must contain at least one endpoint",
            ));
        }
        if self.heartbeat_interval >= self.registry_ttl {
            return Err(CoreError::new(
                "INVALID_REQUEST",
                format!(
                    "heartbeat_interval ({:?}) must be < registry_ttl ({:?})",
                    self.heartbeat_interval, self.registry_ttl
                ),
            ));
        }
        if self.registry_ttl.is_zero() || self.leader_ttl.is_zero() {
            return Err(CoreError::new(
                "INVALID_REQUEST",
                "registry_ttl and leader_ttl must be positive",
            ));
        }

        Ok(RuntimeConfig {
            service_name: self.service_name,
            instance_id: self.instance_id,
            version: self.version,
            registry_ttl: self.registry_ttl,
            heartbeat_interval: self.heartbeat_interval,
            enable_registration: self.enable_registration,
            transport_servers: self.transport_servers,
            kv_bucket_registry: self.kv_bucket_registry,
            kv_bucket_elections: self.kv_bucket_elections,
            discovery_cache_ttl: self.discovery_cache_ttl,
            discovery_cache_max_entries: self.discovery_cache_max_entries,
            discovery_watch_enabled: self.discovery_watch_enabled,
            leader_ttl: self.leader_ttl,
            group_id: self.group_id,
            retry_policy: self.retry_policy,
            shutdown_grace: self.shutdown_grace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> ServiceName {
        ServiceName::parse("orders").unwrap()
    }

    #[test]
    fn rejects_heartbeat_interval_not_under_registry_ttl() {
        let err = RuntimeConfig::builder(name(), SemVer::parse("1.0.0").unwrap())
            .transport_servers(vec!["nats://localhost:4222".to_string()])
            .registry_ttl(Duration::from_secs(10))
            .heartbeat_interval(Duration::from_secs(10))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn accepts_recommended_third_ratio() {
        let config = RuntimeConfig::builder(name(), SemVer::parse("1.0.0").unwrap())
            .transport_servers(vec!["nats://localhost:4222".to_string()])
            .registry_ttl(Duration::from_secs(30))
            .heartbeat_interval(Duration::from_secs(10))
            .build()
            .unwrap();
        assert_eq!(config.registry_ttl, Duration::from_secs(30));
    }
}
