//! Property 7 ("subject conformance"): every subject/key builder in the
//! workspace produces strings matching the normative layout — `rpc.*`,
//! `events.*`, `commands.*`, `commands.*.progress.*` for messaging, and
//! `service-instances.*`/`elections.*` for the registry/election KV keys.

use aegis_core::ids::{InstanceId, ServiceName};
use aegis_core::registry::election_key;
use aegis_transport_nats::subjects;

pub fn run() -> Result<(), String> {
    let cases = [
        (subjects::rpc("orders", "get"), "rpc.orders.get"),
        (subjects::event("orders", "created"), "events.orders.created"),
        (subjects::command("orders", "rebalance"), "commands.orders.rebalance"),
        (
            subjects::command_progress("orders", "rebalance", "m1"),
            "commands.orders.rebalance.progress.m1",
        ),
        (
            subjects::command_result("orders", "rebalance", "m1"),
            "commands.orders.rebalance.result.m1",
        ),
    ];
    for (actual, expected) in cases {
        if actual != expected {
            return Err(format!("subject builder diverged from the normative layout: {actual:?} != {expected:?}"));
        }
    }

    let service = ServiceName::parse("orders").unwrap();
    let instance = InstanceId::parse("orders-a1b2c3d4").unwrap();
    let built_registry_key = format!("service-instances.{service}.{instance}");
    if built_registry_key != "service-instances.orders.orders-a1b2c3d4" {
        return Err(format!("registry key layout diverged: {built_registry_key:?}"));
    }

    let built_election_key = election_key(&service, "default");
    if built_election_key != "elections.orders.default" {
        return Err(format!("election key layout diverged: {built_election_key:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_and_keys_conform_to_the_normative_layout() {
        run().unwrap();
    }
}
