//! Property 4 ("at-most-one leader"): across any set of instances racing
//! `try_acquire` on the same election key, at most one sees `Acquired`.

use std::sync::Arc;
use std::time::Duration;

use aegis_core::election::{AcquireOutcome, ElectionRepository, KvElectionRepository};
use aegis_core::ids::InstanceId;
use aegis_core::test_stubs::MockKvStore;

pub async fn run() -> Result<(), String> {
    let kv = Arc::new(MockKvStore::new());
    let election = Arc::new(KvElectionRepository::new(kv));
    let key = "elections.orders.default";
    let lease = Duration::from_secs(4);

    let contenders: Vec<InstanceId> = (0..5)
        .map(|i| InstanceId::parse(format!("orders-contender-{i}")).unwrap())
        .collect();

    let attempts = futures::future::join_all(contenders.iter().map(|id| {
        let election = Arc::clone(&election);
        let id = id.clone();
        async move { election.try_acquire(key, &id, lease).await }
    }))
    .await;

    let acquired = attempts
        .into_iter()
        .filter(|outcome| matches!(outcome, Ok(AcquireOutcome::Acquired { .. })))
        .count();

    if acquired != 1 {
        return Err(format!("expected exactly one contender to acquire the lease, got {acquired}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn at_most_one_leader_holds() {
        run().await.unwrap();
    }
}
