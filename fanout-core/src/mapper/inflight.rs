use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::StreamExt;
use futures::ready;
use futures::stream::FuturesUnordered;
use pin_project::pin_project;

use crate::error::{AggregateFailure, ItemFailure, MapError};
use crate::observer::MapSummary;

/// Future of one operation tagged with the index of its item, so that the outcome can be put
/// back in place regardless of the order in which operations settle.
#[pin_project]
pub(crate) struct Tagged<F> {
    index: usize,
    #[pin]
    future: F,
}

impl<F> Tagged<F> {
    pub(crate) fn new(index: usize, future: F) -> Self {
        Self { index, future }
    }
}

impl<F: Future> Future for Tagged<F> {
    type Output = (usize, F::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.future.poll(cx));
        Poll::Ready((*this.index, output))
    }
}

/// The set of launched operations that have not settled yet, driven cooperatively from the
/// task that owns it.
pub(crate) struct InFlight<F> {
    pending: FuturesUnordered<Tagged<F>>,
    peak: usize,
}

impl<F: Future> InFlight<F> {
    pub(crate) fn new() -> Self {
        Self {
            pending: FuturesUnordered::new(),
            peak: 0,
        }
    }

    pub(crate) fn launch(&mut self, index: usize, future: F) {
        self.pending.push(Tagged::new(index, future));
        self.peak = self.peak.max(self.pending.len());
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    /// Waits for whichever operation settles first and removes it from the set. Returns `None`
    /// once the set is empty.
    pub(crate) async fn next_settled(&mut self) -> Option<(usize, F::Output)> {
        self.pending.next().await
    }
}

/// One result slot per input item, filled as operations settle.
pub(crate) struct Slots<R, E> {
    slots: Vec<Option<Result<R, E>>>,
    succeeded: usize,
    failed: usize,
}

impl<R, E> Slots<R, E> {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(total).collect(),
            succeeded: 0,
            failed: 0,
        }
    }

    pub(crate) fn fill(&mut self, index: usize, outcome: Result<R, E>) {
        if outcome.is_ok() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    /// Counts an operation that settled without an outcome to store, e.g. a panicked task.
    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub(crate) fn summary(
        &self,
        peak_in_flight: usize,
        elapsed: std::time::Duration,
    ) -> MapSummary {
        MapSummary {
            total: self.slots.len(),
            succeeded: self.succeeded,
            failed: self.failed,
            peak_in_flight,
            elapsed,
        }
    }

    /// Outcomes in input order.
    pub(crate) fn into_outcomes(self) -> Vec<Result<R, E>> {
        let total = self.slots.len();
        let outcomes: Vec<_> = self.slots.into_iter().flatten().collect();
        debug_assert_eq!(outcomes.len(), total, "every item settles exactly once");
        outcomes
    }
}

/// Turns the outcomes of a call into its ordered results, or the aggregate failure if any
/// operation failed.
pub(crate) fn collect_all<R, E>(outcomes: Vec<Result<R, E>>) -> Result<Vec<R>, MapError<E>> {
    let total = outcomes.len();
    let mut values = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => values.push(value),
            Err(source) => failures.push(ItemFailure { index, source }),
        }
    }

    match AggregateFailure::new(failures, total) {
        Some(aggregate) => Err(MapError::Aggregate(aggregate)),
        None => Ok(values),
    }
}
