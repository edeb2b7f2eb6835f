//! No-op [`Logger`]/[`MetricsProvider`]/[`OpsEventBus`] implementations,
//! and a `StaticObservabilityFacade` that just forwards to whatever
//! handles it was built from. Mirrors the teacher's
//! `spark_core::test_stubs::observability` collection, generalized to
//! this crate's facade shape.

use std::sync::Arc;

use crate::observability::{
    Counter, Gauge, Histogram, LogContext, Logger, MetricsProvider, ObservabilityFacade, OpsEvent,
    OpsEventBus,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: &str, _ctx: &LogContext) {}
    fn warn(&self, _message: &str, _ctx: &LogContext) {}
    fn error(&self, _message: &str, _error_code: Option<&str>, _ctx: &LogContext) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCounter;

impl Counter for NoopCounter {
    fn add(&self, _value: u64, _labels: &[(&'static str, &'static str)]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGauge;

impl Gauge for NoopGauge {
    fn set(&self, _value: f64, _labels: &[(&'static str, &'static str)]) {}
    fn increment(&self, _value: f64, _labels: &[(&'static str, &'static str)]) {}
    fn decrement(&self, _value: f64, _labels: &[(&'static str, &'static str)]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistogram;

impl Histogram for NoopHistogram {
    fn record(&self, _value: f64, _labels: &[(&'static str, &'static str)]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsProvider;

impl MetricsProvider for NoopMetricsProvider {
    fn counter(&self, _name: &'static str) -> Box<dyn Counter> {
        Box::new(NoopCounter)
    }

    fn gauge(&self, _name: &'static str) -> Box<dyn Gauge> {
        Box::new(NoopGauge)
    }

    fn histogram(&self, _name: &'static str) -> Box<dyn Histogram> {
        Box::new(NoopHistogram)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOpsEventBus;

impl OpsEventBus for NoopOpsEventBus {
    fn publish(&self, _event: OpsEvent) {}
}

/// Assembles a facade from whatever handles are passed in, defaulting
/// every unspecified one to its `Noop` stub.
#[derive(Clone)]
pub struct StaticObservabilityFacade {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsProvider>,
    ops_bus: Arc<dyn OpsEventBus>,
}

impl Default for StaticObservabilityFacade {
    fn default() -> Self {
        Self {
            logger: Arc::new(NoopLogger),
            metrics: Arc::new(NoopMetricsProvider),
            ops_bus: Arc::new(NoopOpsEventBus),
        }
    }
}

impl StaticObservabilityFacade {
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

impl ObservabilityFacade for StaticObservabilityFacade {
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
