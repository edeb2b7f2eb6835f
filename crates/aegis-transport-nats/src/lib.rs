//! NATS (core + JetStream) adapter implementing `aegis_core`'s `Transport`
//! and `KvStore` ports: [`NatsTransport`] is the connection-pooled
//! `Transport`, [`kv::NatsKvStore`] the JetStream-backed `KvStore` it
//! hands out per bucket. `subjects` centralizes the wire subject names
//! both lean on.

mod error;
pub mod kv;
pub mod subjects;
mod transport;

pub use kv::NatsKvStore;
pub use transport::NatsTransport;
