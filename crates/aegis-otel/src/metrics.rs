//! In-memory [`MetricsProvider`] (spec C9: "in-memory counters/gauges/
//! summaries"). No exporter, no aggregation window — just atomics behind
//! a name-keyed map, enough to assert on in tests and to eyeball during
//! development. A deployment that needs a real metrics backend swaps
//! this facade member for its own `MetricsProvider`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use aegis_core::observability::{Counter, Gauge, Histogram, MetricsProvider};

#[derive(Default)]
struct HistogramState {
    count: u64,
    sum: f64,
    samples: Vec<f64>,
}

const MAX_RETAINED_SAMPLES: usize = 1024;

#[derive(Default)]
pub struct InMemoryMetricsProvider {
    counters: DashMap<&'static str, Arc<AtomicU64>>,
    gauges: DashMap<&'static str, Arc<AtomicU64>>,
    histograms: DashMap<&'static str, Arc<Mutex<HistogramState>>>,
}

impl InMemoryMetricsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a previously-created counter, or 0 if it was
    /// never touched.
    pub fn counter_value(&self, name: &'static str) -> u64 {
        self.counters.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Current value of a previously-created gauge, or 0.0 if it was
    /// never touched.
    pub fn gauge_value(&self, name: &'static str) -> f64 {
        self.gauges.get(name).map(|g| f64::from_bits(g.load(Ordering::Relaxed))).unwrap_or(0.0)
    }

    /// `(count, sum)` of a previously-created histogram, or `(0, 0.0)`.
    pub fn histogram_summary(&self, name: &'static str) -> (u64, f64) {
        self.histograms
            .get(name)
            .map(|h| {
                let state = h.lock().expect("histogram mutex poisoned");
                (state.count, state.sum)
            })
            .unwrap_or((0, 0.0))
    }
}

impl MetricsProvider for InMemoryMetricsProvider {
    fn counter(&self, name: &'static str) -> Box<dyn Counter> {
        let cell = Arc::clone(self.counters.entry(name).or_insert_with(|| Arc::new(AtomicU64::new(0))).value());
        Box::new(CounterHandle(cell))
    }

    fn gauge(&self, name: &'static str) -> Box<dyn Gauge> {
        let cell = Arc::clone(self.gauges.entry(name).or_insert_with(|| Arc::new(AtomicU64::new(0))).value());
        Box::new(GaugeHandle(cell))
    }

    fn histogram(&self, name: &'static str) -> Box<dyn Histogram> {
        let cell = Arc::clone(
            self.histograms
                .entry(name)
                .or_insert_with(|| Arc::new(Mutex::new(HistogramState::default())))
                .value(),
        );
        Box::new(HistogramHandle(cell))
    }
}

struct CounterHandle(Arc<AtomicU64>);

impl Counter for CounterHandle {
    fn add(&self, value: u64, _labels: &[(&'static str, &'static str)]) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }
}

struct GaugeHandle(Arc<AtomicU64>);

impl Gauge for GaugeHandle {
    fn set(&self, value: f64, _labels: &[(&'static str, &'static str)]) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn increment(&self, value: f64, _labels: &[(&'static str, &'static str)]) {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| Some((f64::from_bits(bits) + value).to_bits()))
            .ok();
    }

    fn decrement(&self, value: f64, _labels: &[(&'static str, &'static str)]) {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| Some((f64::from_bits(bits) - value).to_bits()))
            .ok();
    }
}

struct HistogramHandle(Arc<Mutex<HistogramState>>);

impl Histogram for HistogramHandle {
    fn record(&self, value: f64, _labels: &[(&'static str, &'static str)]) {
        let mut state = self.0.lock().expect("histogram mutex poisoned");
        state.count += 1;
        state.sum += value;
        if state.samples.len() < MAX_RETAINED_SAMPLES {
            state.samples.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_handles() {
        let provider = InMemoryMetricsProvider::new();
        provider.counter("requests_total").add(1, &[]);
        provider.counter("requests_total").add(2, &[]);
        assert_eq!(provider.counter_value("requests_total"), 3);
    }

    #[test]
    fn gauge_tracks_latest_increment_and_decrement() {
        let provider = InMemoryMetricsProvider::new();
        let gauge = provider.gauge("inflight");
        gauge.set(5.0, &[]);
        gauge.increment(2.0, &[]);
        gauge.decrement(1.0, &[]);
        assert_eq!(provider.gauge_value("inflight"), 6.0);
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let provider = InMemoryMetricsProvider::new();
        let histogram = provider.histogram("latency_ms");
        histogram.record(10.0, &[]);
        histogram.record(20.0, &[]);
        assert_eq!(provider.histogram_summary("latency_ms"), (2, 30.0));
    }
}
