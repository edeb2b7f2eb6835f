//! Spec §8 universal properties, one file per concern.

pub mod idempotent_heartbeat;
pub mod leader_exclusivity;
pub mod liveness;
pub mod retry_convergence;
pub mod round_robin_fairness;
pub mod rpc_roundtrip;
pub mod subject_conformance;
