//! Properties 1 ("heartbeat visibility") and 2 ("stale filtering"): a
//! live instance stays discoverable through `only_healthy=true` while it
//! keeps heartbeating, and drops out once its last heartbeat ages past
//! the registry's stale threshold.

use std::time::{Duration, SystemTime};

use aegis_core::registry::stale_threshold;

use crate::support::{harness, instance_record, service};

pub async fn run_heartbeat_visibility() -> Result<(), String> {
    let harness = harness().await;
    let svc = service("liveness");
    let registry_ttl = Duration::from_secs(30);
    let id = "liveness-00000001";

    harness
        .registry
        .register(&instance_record(&svc, id, SystemTime::now()))
        .await
        .map_err(|e| e.to_string())?;

    for _ in 0..3 {
        let healthy = harness
            .registry
            .list_healthy_instances(&svc, registry_ttl)
            .await
            .map_err(|e| e.to_string())?;
        if healthy.len() != 1 {
            return Err(format!("expected the heartbeating instance visible, got {} entries", healthy.len()));
        }
        harness
            .registry
            .update_heartbeat(&instance_record(&svc, id, SystemTime::now()))
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

pub async fn run_stale_filtering() -> Result<(), String> {
    let harness = harness().await;
    let svc = service("crashed");
    let registry_ttl = Duration::from_secs(30);
    let threshold = stale_threshold(registry_ttl);
    let ancient = SystemTime::now() - threshold - Duration::from_secs(10);

    harness
        .registry
        .register(&instance_record(&svc, "crashed-00000001", ancient))
        .await
        .map_err(|e| e.to_string())?;

    let healthy = harness
        .registry
        .list_healthy_instances(&svc, registry_ttl)
        .await
        .map_err(|e| e.to_string())?;
    if !healthy.is_empty() {
        return Err("a stale instance must not appear in the healthy set".to_string());
    }

    let all = harness.registry.list_instances(&svc).await.map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err("unfiltered listing must still surface the stale record".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_visibility_holds() {
        run_heartbeat_visibility().await.unwrap();
    }

    #[tokio::test]
    async fn stale_filtering_holds() {
        run_stale_filtering().await.unwrap();
    }
}
