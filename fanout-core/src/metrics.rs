use std::sync::OnceLock;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::observer::{MapObserver, MapSummary};
use crate::{Error, Result};

const OUTCOME_LABEL: &str = "outcome";
const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_FAILURE: &str = "failure";

// Define the metrics
const OPERATIONS_LAUNCHED_TOTAL: &str = "fanout_operations_launched";
const OPERATIONS_SETTLED_TOTAL: &str = "fanout_operations_settled";
const OPERATIONS_IN_FLIGHT: &str = "fanout_operations_in_flight";
const MAP_BATCH_SIZE: &str = "fanout_map_batch_size";
const MAP_PEAK_IN_FLIGHT: &str = "fanout_map_peak_in_flight";
const MAP_DURATION: &str = "fanout_map_duration_seconds";

type Labels = Vec<(String, String)>;

#[derive(Default)]
pub struct GlobalRegistry {
    pub registry: parking_lot::Mutex<Registry>,
}

impl GlobalRegistry {
    fn new() -> Self {
        GlobalRegistry {
            registry: parking_lot::Mutex::new(Registry::default()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL_REGISTRY.get_or_init(GlobalRegistry::new)
}

/// Metrics describing the mapping calls of the process.
pub struct MapperMetrics {
    pub launched_total: Counter,
    pub settled_total: Family<Labels, Counter>,
    pub in_flight: Gauge,
    pub batch_size: Histogram,
    pub peak_in_flight: Histogram,
    pub duration: Histogram,
}

impl MapperMetrics {
    fn new() -> Self {
        let metrics = Self {
            launched_total: Counter::default(),
            settled_total: Family::<Labels, Counter>::default(),
            in_flight: Gauge::default(),
            batch_size: Histogram::new(exponential_buckets(1.0, 2.0, 16)),
            peak_in_flight: Histogram::new(exponential_buckets(1.0, 2.0, 12)),
            duration: Histogram::new(exponential_buckets(0.001, 2.0, 20)),
        };

        let mut registry = global_registry().registry.lock();
        registry.register(
            OPERATIONS_LAUNCHED_TOTAL,
            "A Counter to keep track of the total number of launched operations",
            metrics.launched_total.clone(),
        );
        registry.register(
            OPERATIONS_SETTLED_TOTAL,
            "A Counter to keep track of the total number of settled operations by outcome",
            metrics.settled_total.clone(),
        );
        registry.register(
            OPERATIONS_IN_FLIGHT,
            "A Gauge to keep track of the number of operations currently in flight",
            metrics.in_flight.clone(),
        );
        registry.register(
            MAP_BATCH_SIZE,
            "A Histogram to keep track of the number of items per mapping call",
            metrics.batch_size.clone(),
        );
        registry.register(
            MAP_PEAK_IN_FLIGHT,
            "A Histogram to keep track of the peak number of in-flight operations per mapping call",
            metrics.peak_in_flight.clone(),
        );
        registry.register(
            MAP_DURATION,
            "A Histogram to keep track of the duration of mapping calls",
            metrics.duration.clone(),
        );

        metrics
    }
}

static MAPPER_METRICS: OnceLock<MapperMetrics> = OnceLock::new();

pub fn mapper_metrics() -> &'static MapperMetrics {
    MAPPER_METRICS.get_or_init(MapperMetrics::new)
}

fn outcome_labels(succeeded: bool) -> Labels {
    let outcome = if succeeded {
        OUTCOME_SUCCESS
    } else {
        OUTCOME_FAILURE
    };
    vec![(OUTCOME_LABEL.to_string(), outcome.to_string())]
}

/// Returns a snapshot of the global registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    // make sure the mapper metrics are registered before the first call
    mapper_metrics();
    let registry = global_registry().registry.lock();
    let mut buffer = String::new();
    encode(&mut buffer, &registry)
        .map_err(|e| Error::Metrics(format!("encoding metrics: {e}")))?;
    Ok(buffer)
}

/// Observer recording the mapper events into [MapperMetrics].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObserver;

impl MapObserver for MetricsObserver {
    fn on_launch(&self, _index: usize, _in_flight: usize) {
        let metrics = mapper_metrics();
        metrics.launched_total.inc();
        metrics.in_flight.inc();
    }

    fn on_settle(&self, _index: usize, succeeded: bool, _in_flight: usize) {
        let metrics = mapper_metrics();
        metrics.in_flight.dec();
        metrics
            .settled_total
            .get_or_create(&outcome_labels(succeeded))
            .inc();
    }

    fn on_complete(&self, summary: &MapSummary) {
        let metrics = mapper_metrics();
        metrics.batch_size.observe(summary.total as f64);
        metrics.peak_in_flight.observe(summary.peak_in_flight as f64);
        metrics.duration.observe(summary.elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_metrics_observer_records_events() {
        let observer = MetricsObserver;
        let launched_before = mapper_metrics().launched_total.get();
        let failed_before = mapper_metrics()
            .settled_total
            .get_or_create(&outcome_labels(false))
            .get();

        observer.on_launch(0, 1);
        observer.on_launch(1, 2);
        observer.on_settle(1, false, 1);
        observer.on_settle(0, true, 0);
        observer.on_complete(&MapSummary {
            total: 2,
            succeeded: 1,
            failed: 1,
            peak_in_flight: 2,
            elapsed: Duration::from_millis(5),
        });

        assert!(mapper_metrics().launched_total.get() >= launched_before + 2);
        assert!(
            mapper_metrics()
                .settled_total
                .get_or_create(&outcome_labels(false))
                .get()
                >= failed_before + 1
        );

        let encoded = encode_metrics().unwrap();
        assert!(encoded.contains(OPERATIONS_LAUNCHED_TOTAL));
        assert!(encoded.contains("outcome=\"failure\""));
        assert!(encoded.contains(MAP_BATCH_SIZE));
    }
}
