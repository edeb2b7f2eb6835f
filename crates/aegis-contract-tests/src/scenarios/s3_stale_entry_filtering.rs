//! S3 — stale entry filtering. `registry_ttl=30s` puts the stale
//! threshold at 35s (`registry_ttl + max(registry_ttl / 6, 5s)`); a
//! record last heartbeat 60s ago is invisible to
//! `discover_instances(only_healthy=true)` but still present with
//! `only_healthy=false`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aegis_core::discovery::{BasicDiscovery, Discovery};
use aegis_core::ports::transport::Transport;
use aegis_core::registry::Registry;
use aegis_core::test_stubs::MockTransport;

use crate::support::{instance_record, service};

pub async fn run() -> Result<(), String> {
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let kv = transport.kv_bucket("service_registry").await.map_err(|e| e.to_string())?;
    let registry = Arc::new(Registry::new(kv));

    let svc = service("stale-checker");
    let sixty_seconds_ago = SystemTime::now() - Duration::from_secs(60);
    registry
        .register(&instance_record(&svc, "stale-checker-0000dead", sixty_seconds_ago))
        .await
        .map_err(|e| e.to_string())?;

    let discovery = BasicDiscovery::new(Arc::clone(&registry), Duration::from_secs(30));

    let healthy = discovery.discover_instances(&svc, true).await.map_err(|e| e.to_string())?;
    if !healthy.is_empty() {
        return Err(format!("expected a 60s-stale instance to be filtered out, got {} entries", healthy.len()));
    }

    let all = discovery.discover_instances(&svc, false).await.map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err(format!("expected the stale instance to still be listed unfiltered, got {} entries", all.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_instances_are_hidden_from_healthy_discovery_but_not_from_raw_listing() {
        run().await.unwrap();
    }
}
