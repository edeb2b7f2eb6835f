//! TOML-loadable mirror of [`super::RuntimeConfigBuilder`]'s settable
//! fields (spec §B). Every field but `service_name`/`version` is optional
//! so a config file only needs to override what differs from the
//! builder's own defaults; durations are plain seconds since TOML has no
//! native duration type.

use std::time::Duration;

use serde::Deserialize;

use crate::error::CoreError;
use crate::ids::{InstanceId, SemVer, ServiceName};

use super::{RuntimeConfig, RuntimeConfigBuilder};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfigToml {
    pub service_name: String,
    pub version: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub registry_ttl_secs: Option<u64>,
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
    #[serde(default)]
    pub enable_registration: Option<bool>,
    #[serde(default)]
    pub transport_servers: Option<Vec<String>>,
    #[serde(default)]
    pub kv_bucket_registry: Option<String>,
    #[serde(default)]
    pub kv_bucket_elections: Option<String>,
    #[serde(default)]
    pub discovery_cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub discovery_cache_max_entries: Option<usize>,
    #[serde(default)]
    pub discovery_watch_enabled: Option<bool>,
    #[serde(default)]
    pub leader_ttl_secs: Option<u64>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub shutdown_grace_secs: Option<u64>,
}

impl RuntimeConfigToml {
    pub(super) fn into_builder(self) -> Result<RuntimeConfigBuilder, CoreError> {
        let service_name = ServiceName::parse(&self.service_name)?;
        let version = SemVer::parse(&self.version)?;
        let mut builder = RuntimeConfig::builder(service_name, version);

        if let Some(instance_id) = self.instance_id {
            builder = builder.instance_id(InstanceId::parse(&instance_id)?);
        }
        if let Some(v) = self.registry_ttl_secs {
            builder = builder.registry_ttl(Duration::from_secs(v));
        }
        if let Some(v) = self.heartbeat_interval_secs {
            builder = builder.heartbeat_interval(Duration::from_secs(v));
        }
        if let Some(v) = self.enable_registration {
            builder = builder.enable_registration(v);
        }
        if let Some(v) = self.transport_servers {
            builder = builder.transport_servers(v);
        }
        if let Some(v) = self.kv_bucket_registry {
            builder = builder.kv_bucket_registry(v);
        }
        if let Some(v) = self.kv_bucket_elections {
            builder = builder.kv_bucket_elections(v);
        }
        if let Some(v) = self.discovery_cache_ttl_secs {
            builder = builder.discovery_cache_ttl(Duration::from_secs(v));
        }
        if let Some(v) = self.discovery_cache_max_entries {
            builder = builder.discovery_cache_max_entries(v);
        }
        if let Some(v) = self.discovery_watch_enabled {
            builder = builder.discovery_watch_enabled(v);
        }
        if let Some(v) = self.leader_ttl_secs {
            builder = builder.leader_ttl(Duration::from_secs(v));
        }
        if let Some(v) = self.group_id {
            builder = builder.group_id(v);
        }
        if let Some(v) = self.shutdown_grace_secs {
            builder = builder.shutdown_grace(Duration::from_secs(v));
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_fills_in_builder_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            service_name = "orders"
            version = "1.0.0"
            transport_servers = ["nats://localhost:4222"]
            "#,
        )
        .unwrap();
        assert_eq!(config.service_name.as_str(), "orders");
        assert_eq!(config.registry_ttl, Duration::from_secs(30));
    }

    #[test]
    fn overrides_apply_and_still_get_validated() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            service_name = "orders"
            version = "1.0.0"
            transport_servers = ["nats://localhost:4222"]
            registry_ttl_secs = 60
            heartbeat_interval_secs = 20
            leader_ttl_secs = 8
            group_id = "west"
            "#,
        )
        .unwrap();
        assert_eq!(config.registry_ttl, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.group_id, "west");
    }

    #[test]
    fn invariant_violation_is_rejected_just_like_the_builder() {
        let err = RuntimeConfig::from_toml_str(
            r#"
            service_name = "orders"
            version = "1.0.0"
            transport_servers = ["nats://localhost:4222"]
            registry_ttl_secs = 5
            heartbeat_interval_secs = 10
            "#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = RuntimeConfig::from_toml_str("not valid toml =").unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
