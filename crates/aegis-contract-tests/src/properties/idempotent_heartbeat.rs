//! Property 6 ("idempotent heartbeat"): calling `update_heartbeat`
//! concurrently with itself leaves the registry in a consistent state —
//! one record, one revision per write, no torn or duplicated entries.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aegis_core::ports::kv::KvStore;
use aegis_core::ports::transport::Transport;

use crate::support::{harness, instance_record, service};

const CONCURRENT_WRITERS: usize = 8;

pub async fn run() -> Result<(), String> {
    let harness = harness().await;
    let svc = service("heartbeats");
    let id = "heartbeats-00000001";
    let initial = instance_record(&svc, id, SystemTime::now());
    harness.registry.register(&initial).await.map_err(|e| e.to_string())?;

    let writes = (0..CONCURRENT_WRITERS).map(|i| {
        let registry = Arc::clone(&harness.registry);
        let svc = svc.clone();
        async move {
            let record = instance_record(&svc, "heartbeats-00000001", SystemTime::now() + Duration::from_millis(i as u64));
            registry.update_heartbeat(&record).await
        }
    });

    for result in futures::future::join_all(writes).await {
        result.map_err(|e| e.to_string())?;
    }

    let kv = harness
        .transport
        .kv_bucket("service_registry")
        .await
        .map_err(|e| e.to_string())?;
    let entry = kv
        .get(&initial.registry_key())
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "record disappeared after concurrent heartbeats".to_string())?;

    let expected_revision = CONCURRENT_WRITERS as u64 + 1; // +1 for the initial register
    if entry.revision != expected_revision {
        return Err(format!(
            "expected revision {expected_revision} after {CONCURRENT_WRITERS} concurrent heartbeats, got {}",
            entry.revision
        ));
    }

    let all = harness.registry.list_instances(&svc).await.map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err(format!("concurrent heartbeats must not fork the record; found {} entries", all.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_heartbeats_stay_consistent() {
        run().await.unwrap();
    }
}
