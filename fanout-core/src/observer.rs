//! Hooks the mapper calls as operations are launched and settle. Logging and metrics are plugged
//! in here by the caller instead of being hard-wired into the mapper.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Outcome counts of one mapping call, reported once all operations have settled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Largest number of operations that were in flight at the same time.
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

/// Receives the lifecycle events of a mapping call. All methods default to doing nothing.
///
/// `in_flight` is the size of the in-flight set right after the event was applied.
pub trait MapObserver: Send + Sync {
    fn on_launch(&self, _index: usize, _in_flight: usize) {}

    fn on_settle(&self, _index: usize, _succeeded: bool, _in_flight: usize) {}

    fn on_complete(&self, _summary: &MapSummary) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MapObserver for NoopObserver {}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    name: Option<Arc<str>>,
}

impl TracingObserver {
    /// Creates an observer whose events carry the given name, useful when several mapping calls
    /// run side by side.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("map")
    }
}

impl MapObserver for TracingObserver {
    fn on_launch(&self, index: usize, in_flight: usize) {
        debug!(name = self.name(), index, in_flight, "Launched operation");
    }

    fn on_settle(&self, index: usize, succeeded: bool, in_flight: usize) {
        if succeeded {
            debug!(name = self.name(), index, in_flight, "Operation succeeded");
        } else {
            warn!(name = self.name(), index, in_flight, "Operation failed");
        }
    }

    fn on_complete(&self, summary: &MapSummary) {
        info!(
            name = self.name(),
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            peak_in_flight = summary.peak_in_flight,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Map completed"
        );
    }
}

impl<O: MapObserver + ?Sized> MapObserver for &O {
    fn on_launch(&self, index: usize, in_flight: usize) {
        (**self).on_launch(index, in_flight)
    }

    fn on_settle(&self, index: usize, succeeded: bool, in_flight: usize) {
        (**self).on_settle(index, succeeded, in_flight)
    }

    fn on_complete(&self, summary: &MapSummary) {
        (**self).on_complete(summary)
    }
}

impl<O: MapObserver + ?Sized> MapObserver for Arc<O> {
    fn on_launch(&self, index: usize, in_flight: usize) {
        (**self).on_launch(index, in_flight)
    }

    fn on_settle(&self, index: usize, succeeded: bool, in_flight: usize) {
        (**self).on_settle(index, succeeded, in_flight)
    }

    fn on_complete(&self, summary: &MapSummary) {
        (**self).on_complete(summary)
    }
}

/// Fans every event out to both observers, first to `A` then to `B`.
impl<A: MapObserver, B: MapObserver> MapObserver for (A, B) {
    fn on_launch(&self, index: usize, in_flight: usize) {
        self.0.on_launch(index, in_flight);
        self.1.on_launch(index, in_flight);
    }

    fn on_settle(&self, index: usize, succeeded: bool, in_flight: usize) {
        self.0.on_settle(index, succeeded, in_flight);
        self.1.on_settle(index, succeeded, in_flight);
    }

    fn on_complete(&self, summary: &MapSummary) {
        self.0.on_complete(summary);
        self.1.on_complete(summary);
    }
}
