//! Bounded-concurrency mapping: applies an asynchronous [Operation] to every item of a sequence
//! while never having more than a configured number of operations in flight, and returns the
//! outcomes in input order.
//!
//! Scheduling works the same way in both execution modes:
//! - items are walked in input order and every operation is launched right away,
//! - once the in-flight set has reached the limit, the walk is suspended until the first
//!   in-flight operation settles (whichever that is),
//! - after the last launch every remaining operation is awaited.
//!
//! Operations are never cancelled because a sibling failed. A failing call reports the failure
//! of the lowest input index as its cause, after every launched operation has settled.

use tokio::time::Instant;
use tracing::debug;

use crate::config::{ConcurrencyLimit, ExecutionMode, MapperConfig};
use crate::error::MapError;
use crate::observer::{MapObserver, NoopObserver, TracingObserver};
use crate::operation::Operation;

mod inflight;
pub mod spawned;

#[cfg(test)]
pub(crate) mod test_utils;

use inflight::{InFlight, Slots, collect_all};

/// Maps every item with `operation`, keeping at most `limit` operations in flight, and returns
/// the results in input order. Fails if any operation failed, once all of them have settled.
///
/// Operations are polled from the calling task, so neither the items nor the futures need to be
/// `Send`.
pub async fn map_with_limit<T, Op>(
    items: impl IntoIterator<Item = T>,
    limit: usize,
    operation: Op,
) -> Result<Vec<Op::Item>, MapError<Op::Error>>
where
    Op: Operation<T>,
{
    let outcomes = map_settled(items, limit, operation).await?;
    collect_all(outcomes)
}

/// Same scheduling as [map_with_limit], but returns the outcome of every operation instead of
/// failing on the first error.
pub async fn map_settled<T, Op>(
    items: impl IntoIterator<Item = T>,
    limit: usize,
    operation: Op,
) -> Result<Vec<Result<Op::Item, Op::Error>>, MapError<Op::Error>>
where
    Op: Operation<T>,
{
    let limit = ConcurrencyLimit::new(limit).map_err(|_| MapError::InvalidLimit(limit))?;
    Ok(drive(items, limit, operation, &NoopObserver).await)
}

/// Runs the operations cooperatively inside the calling task.
pub(crate) async fn drive<T, Op, O>(
    items: impl IntoIterator<Item = T>,
    limit: ConcurrencyLimit,
    mut operation: Op,
    observer: &O,
) -> Vec<Result<Op::Item, Op::Error>>
where
    Op: Operation<T>,
    O: MapObserver + ?Sized,
{
    let started = Instant::now();
    let items: Vec<T> = items.into_iter().collect();
    let mut slots = Slots::new(items.len());
    let mut in_flight = InFlight::new();

    for (index, item) in items.into_iter().enumerate() {
        in_flight.launch(index, operation.run(item));
        observer.on_launch(index, in_flight.len());

        // the limit is checked after launching, so the peak is exactly `limit`
        if in_flight.len() >= limit.get()
            && let Some((settled, outcome)) = in_flight.next_settled().await
        {
            observer.on_settle(settled, outcome.is_ok(), in_flight.len());
            slots.fill(settled, outcome);
        }
    }

    while let Some((settled, outcome)) = in_flight.next_settled().await {
        observer.on_settle(settled, outcome.is_ok(), in_flight.len());
        slots.fill(settled, outcome);
    }

    let summary = slots.summary(in_flight.peak(), started.elapsed());
    observer.on_complete(&summary);
    slots.into_outcomes()
}

/// A configured mapper: concurrency limit, execution mode and the observer notified of every
/// launch and settle.
#[derive(Debug, Clone)]
pub struct BoundedMapper<O = TracingObserver> {
    limit: ConcurrencyLimit,
    mode: ExecutionMode,
    observer: O,
}

impl BoundedMapper<TracingObserver> {
    /// Creates a mapper from the given configuration, logging through `tracing`.
    pub fn new(config: &MapperConfig) -> crate::Result<Self> {
        Ok(Self {
            limit: config.limit()?,
            mode: config.mode,
            observer: TracingObserver::default(),
        })
    }
}

impl<O: MapObserver> BoundedMapper<O> {
    pub fn with_limit(limit: ConcurrencyLimit, mode: ExecutionMode, observer: O) -> Self {
        Self {
            limit,
            mode,
            observer,
        }
    }

    /// Replaces the observer of this mapper.
    pub fn with_observer<N: MapObserver>(self, observer: N) -> BoundedMapper<N> {
        BoundedMapper {
            limit: self.limit,
            mode: self.mode,
            observer,
        }
    }

    pub fn limit(&self) -> ConcurrencyLimit {
        self.limit
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Maps every item and returns the results in input order, or the aggregate failure.
    ///
    /// The futures must be `Send + 'static` since the configured mode may spawn them; use
    /// [BoundedMapper::map_in_task] for operations borrowing local data.
    pub async fn map<T, Op>(
        &self,
        items: impl IntoIterator<Item = T>,
        operation: Op,
    ) -> Result<Vec<Op::Item>, MapError<Op::Error>>
    where
        Op: Operation<T>,
        Op::Future: Send + 'static,
        Op::Item: Send + 'static,
        Op::Error: Send + 'static,
    {
        let outcomes = self.map_settled(items, operation).await?;
        collect_all(outcomes)
    }

    /// Maps every item and returns every outcome in input order.
    ///
    /// Same bounds as [BoundedMapper::map], see [BoundedMapper::map_settled_in_task].
    pub async fn map_settled<T, Op>(
        &self,
        items: impl IntoIterator<Item = T>,
        operation: Op,
    ) -> Result<Vec<Result<Op::Item, Op::Error>>, MapError<Op::Error>>
    where
        Op: Operation<T>,
        Op::Future: Send + 'static,
        Op::Item: Send + 'static,
        Op::Error: Send + 'static,
    {
        debug!(limit = %self.limit, mode = %self.mode, "Starting map");
        match self.mode {
            ExecutionMode::InTask => Ok(drive(items, self.limit, operation, &self.observer).await),
            ExecutionMode::Spawned => {
                spawned::drive(items, self.limit, operation, &self.observer).await
            }
        }
    }

    /// Like [BoundedMapper::map], but always polls the operations from the calling task whatever
    /// the configured mode, so the futures may borrow local data and need not be `Send`.
    pub async fn map_in_task<T, Op>(
        &self,
        items: impl IntoIterator<Item = T>,
        operation: Op,
    ) -> Result<Vec<Op::Item>, MapError<Op::Error>>
    where
        Op: Operation<T>,
    {
        collect_all(self.map_settled_in_task(items, operation).await)
    }

    /// Like [BoundedMapper::map_settled], always in the calling task.
    pub async fn map_settled_in_task<T, Op>(
        &self,
        items: impl IntoIterator<Item = T>,
        operation: Op,
    ) -> Vec<Result<Op::Item, Op::Error>>
    where
        Op: Operation<T>,
    {
        debug!(limit = %self.limit, "Starting map in task");
        drive(items, self.limit, operation, &self.observer).await
    }
}
