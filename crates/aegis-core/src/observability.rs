//! Observability ports (spec C9: "in-memory counters/gauges/summaries;
//! structured logger port"). Object-safe, `Arc<dyn Trait>`-friendly, and
//! aggregated behind a single [`ObservabilityFacade`] — the same shape as
//! the teacher's `observability::{Logger, MetricsProvider}` traits and
//! `ObservabilityFacade`/`DefaultObservabilityFacade` pair, generalized
//! from `no_std + alloc` to `std`.

use std::sync::Arc;

/// Correlates a log line or metric sample with the originating call
/// (spec §7: "All errors carry `trace_id` for cross-service
/// correlation").
#[derive(Clone, Debug)]
pub struct LogContext {
    pub service: String,
    pub instance_id: String,
    pub trace_id: Option<String>,
}

/// Object-safe structured logger (spec §7: "Logged events include at
/// minimum: timestamp, level, service, instance, trace_id, error_code,
/// message" — `timestamp`/`level` are added by the implementation, the
/// rest flow through this trait's parameters).
pub trait Logger: Send + Sync + 'static {
    fn info(&self, message: &str, ctx: &LogContext);
    fn warn(&self, message: &str, ctx: &LogContext);
    fn error(&self, message: &str, error_code: Option<&str>, ctx: &LogContext);
}

pub trait Counter: Send + Sync {
    fn add(&self, value: u64, labels: &[(&'static str, &'static str)]);
}

pub trait Gauge: Send + Sync {
    fn set(&self, value: f64, labels: &[(&'static str, &'static str)]);
    fn increment(&self, value: f64, labels: &[(&'static str, &'static str)]);
    fn decrement(&self, value: f64, labels: &[(&'static str, &'static str)]);
}

pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, labels: &[(&'static str, &'static str)]);
}

/// Unifies counters/gauges/histograms behind one provider (spec C9).
pub trait MetricsProvider: Send + Sync + 'static {
    fn counter(&self, name: &'static str) -> Box<dyn Counter>;
    fn gauge(&self, name: &'static str) -> Box<dyn Gauge>;
    fn histogram(&self, name: &'static str) -> Box<dyn Histogram>;
}

/// An operational event worth surfacing outside the structured log
/// stream (leader changes, heartbeat failures) — consumed by whatever
/// monitoring surface the host wires up.
#[derive(Clone, Debug)]
pub enum OpsEvent {
    InstanceRegistered { service: String, instance_id: String },
    InstanceDeregistered { service: String, instance_id: String },
    HeartbeatFailed { service: String, instance_id: String, consecutive_failures: u32 },
    HeartbeatRestored { service: String, instance_id: String },
    LeaderAcquired { service: String, group: String, instance_id: String },
    LeaderLost { service: String, group: String, instance_id: String },
}

pub trait OpsEventBus: Send + Sync + 'static {
    fn publish(&self, event: OpsEvent);
}

/// Single injection point for every observability capability (spec C9 +
/// teacher's `observability::facade::ObservabilityFacade`): avoids
/// threading three separate `Arc`s through every runtime constructor.
pub trait ObservabilityFacade: Send + Sync + 'static {
    fn logger(&self) -> Arc<dyn Logger>;
    fn metrics(&self) -> Arc<dyn MetricsProvider>;
    fn ops_bus(&self) -> Arc<dyn OpsEventBus>;
}

/// Reference facade that just forwards to the three handles it was
/// built from, mirroring `DefaultObservabilityFacade` in the teacher's
/// otel adapter. A real deployment swaps this for `aegis-otel`'s
/// `tracing`-backed implementation.
#[derive(Clone)]
pub struct DefaultObservabilityFacade {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsProvider>,
    ops_bus: Arc<dyn OpsEventBus>,
}

impl DefaultObservabilityFacade {
    pub fn new(
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn MetricsProvider>,
        ops_bus: Arc<dyn OpsEventBus>,
    ) -> Self {
        Self {
            logger,
            metrics,
            ops_bus,
        }
    }
}

impl ObservabilityFacade for DefaultObservabilityFacade {
    fn logger(&self) -> Arc<dyn Logger> {
        Arc::clone(&self.logger)
    }

    fn metrics(&self) -> Arc<dyn MetricsProvider> {
        Arc::clone(&self.metrics)
    }

    fn ops_bus(&self) -> Arc<dyn OpsEventBus> {
        Arc::clone(&self.ops_bus)
    }
}
