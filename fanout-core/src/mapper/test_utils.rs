use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::observer::{MapObserver, MapSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Start(usize),
    End(usize),
}

/// Watches operations from the inside: how many are running at once, how many finished, and in
/// which order they started and ended.
#[derive(Clone, Default)]
pub(crate) struct Spy {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Spy {
    /// Runs `future` as the operation of item `index`, recording when it starts and ends.
    pub(crate) async fn track<F: Future>(&self, index: usize, future: F) -> F::Output {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events.lock().push(Event::Start(index));

        let output = future.await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(Event::End(index));
        output
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn started(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Event::Start(_)))
            .count()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

/// Doubles `n` after `delay`, failing for the values listed in `fail_on`.
pub(crate) async fn double_after(
    n: u64,
    delay: Duration,
    fail_on: &[u64],
) -> Result<u64, String> {
    tokio::time::sleep(delay).await;
    if fail_on.contains(&n) {
        return Err(format!("cannot double {n}"));
    }
    Ok(n * 2)
}

/// Observer remembering every event it receives.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub launches: Mutex<Vec<(usize, usize)>>,
    pub settles: Mutex<Vec<(usize, bool, usize)>>,
    pub summary: Mutex<Option<MapSummary>>,
}

impl MapObserver for RecordingObserver {
    fn on_launch(&self, index: usize, in_flight: usize) {
        self.launches.lock().push((index, in_flight));
    }

    fn on_settle(&self, index: usize, succeeded: bool, in_flight: usize) {
        self.settles.lock().push((index, succeeded, in_flight));
    }

    fn on_complete(&self, summary: &MapSummary) {
        *self.summary.lock() = Some(summary.clone());
    }
}
