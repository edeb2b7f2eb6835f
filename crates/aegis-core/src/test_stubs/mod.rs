//! In-memory reference adapters for every port, plus no-op observability
//! stubs. Used by `aegis-contract-tests` and by unit tests elsewhere in
//! the workspace that need a `Transport`/`KvStore` without a live NATS
//! connection. Grounded on the teacher's `spark_core::test_stubs`
//! collection of `Noop*` observability stand-ins, extended here to also
//! cover the transport/KV ports this crate adds.

mod kv;
mod observability;
mod transport;

pub use kv::MockKvStore;
pub use observability::{NoopLogger, NoopMetricsProvider, NoopOpsEventBus, StaticObservabilityFacade};
pub use transport::MockTransport;
