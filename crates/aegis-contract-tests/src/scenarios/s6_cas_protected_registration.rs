//! S6 — CAS-protected registration. Two processes race to register the
//! same `instance_id`; exactly one wins, the other gets `CAS_CONFLICT`
//! back (rather than silently overwriting) and must pick a new id.

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::join_all;

use aegis_core::ports::transport::Transport;
use aegis_core::registry::Registry;
use aegis_core::test_stubs::MockTransport;

use crate::support::{instance_record, service};

pub async fn run() -> Result<(), String> {
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let kv = transport.kv_bucket("service_registry").await.map_err(|e| e.to_string())?;
    let registry = Arc::new(Registry::new(kv));

    let svc = service("billing");
    let record = Arc::new(instance_record(&svc, "billing-cafef00d", SystemTime::now()));

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let record = Arc::clone(&record);
            tokio::spawn(async move { registry.register(&record).await })
        })
        .collect();

    let results = join_all(attempts).await;
    let mut successes = 0;
    let mut conflicts = 0;
    for result in results {
        match result.map_err(|e| e.to_string())? {
            Ok(()) => successes += 1,
            Err(err) if err.code() == "CAS_CONFLICT" => conflicts += 1,
            Err(err) => return Err(format!("unexpected registration error: {err}")),
        }
    }

    if successes != 1 || conflicts != 1 {
        return Err(format!(
            "expected exactly one winner and one CAS_CONFLICT loser, got {successes} successes and {conflicts} conflicts"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_registration_with_the_same_instance_id_has_exactly_one_winner() {
        run().await.unwrap();
    }
}
