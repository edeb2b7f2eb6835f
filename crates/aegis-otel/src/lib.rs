//! Reference observability adapter for `aegis-core`'s ports: a
//! `tracing`-backed [`Logger`](aegis_core::observability::Logger), an
//! in-memory [`MetricsProvider`](aegis_core::observability::MetricsProvider),
//! and a broadcast-channel [`OpsEventBus`](aegis_core::observability::OpsEventBus),
//! composed behind `aegis_core`'s own `DefaultObservabilityFacade`.

pub mod events;
pub mod facade;
pub mod logging;
pub mod metrics;

pub use events::ChannelOpsEventBus;
pub use facade::{default_facade, install_tracing_subscriber, Error};
pub use logging::TracingLogger;
pub use metrics::InMemoryMetricsProvider;
