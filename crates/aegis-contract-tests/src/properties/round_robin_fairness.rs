//! Property 8 ("round-robin fairness"): over N calls against M healthy
//! instances under `SelectionStrategy::RoundRobin`, each instance
//! receives `N/M ± 1` calls, for every `(N, M)` pair `proptest` throws at
//! it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aegis_core::discovery::{BasicDiscovery, Discovery, SelectionStrategy};
use aegis_core::ids::InstanceId;
use aegis_core::ports::transport::Transport;
use aegis_core::registry::Registry;
use aegis_core::test_stubs::MockTransport;

use crate::support::{instance_record, service};

pub async fn run_for(instances: usize, calls: usize) -> Result<(), String> {
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let kv = transport.kv_bucket("service_registry").await.map_err(|e| e.to_string())?;
    let registry = Arc::new(Registry::new(kv));
    let svc = service("fairness");

    for i in 0..instances {
        let id = format!("fairness-{i:08x}");
        registry
            .register(&instance_record(&svc, &id, SystemTime::now()))
            .await
            .map_err(|e| e.to_string())?;
    }

    let discovery = BasicDiscovery::new(Arc::clone(&registry), Duration::from_secs(30));
    let mut tally: BTreeMap<InstanceId, usize> = BTreeMap::new();
    for _ in 0..calls {
        let picked = discovery
            .select_instance(&svc, SelectionStrategy::RoundRobin, None)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("expected a healthy instance to be selected")?;
        *tally.entry(picked.instance_id).or_insert(0) += 1;
    }

    if tally.len() != instances {
        return Err(format!("expected all {instances} instances to receive at least one call, only {} did", tally.len()));
    }

    let target = calls / instances;
    for (instance_id, count) in &tally {
        let low = target.saturating_sub(1);
        let high = target + 1;
        if *count < low || *count > high {
            return Err(format!(
                "instance {instance_id} received {count} calls, outside the fair band [{low}, {high}] for {calls}/{instances}"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn six_calls_over_three_instances_split_evenly() {
        run_for(3, 6).await.unwrap();
    }

    proptest::proptest! {
        #[test]
        fn fairness_holds_over_arbitrary_shapes(instances in 1usize..6, rounds in 1usize..20) {
            let calls = instances * rounds;
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(run_for(instances, calls))
                .unwrap();
        }
    }
}
