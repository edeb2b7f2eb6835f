//! Core contracts for AegisTrader services: the wire and domain model,
//! the hexagonal ports adapters implement (`Transport`, `KvStore`), the
//! registry/election/discovery algorithms built on those ports, and the
//! runtime that drives a service's lifecycle end to end.
//!
//! Concrete NATS transport/KV adapters live in `aegis-transport-nats`;
//! `tracing`-backed observability lives in `aegis-otel`. This crate only
//! depends on the ports it defines, never on a specific backend.

pub mod client;
pub mod codec;
pub mod discovery;
pub mod election;
pub mod error;
pub mod ids;
pub mod model;
pub mod observability;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod rfc3339;
pub mod router;
pub mod runtime;

#[cfg(any(test, feature = "test-stubs"))]
pub mod test_stubs;

pub use error::{CoreError, ErrorCategory, ErrorCode, Result};
