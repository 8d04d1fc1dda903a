//! Multi-threaded flavour of the mapper: every operation runs as its own tokio task on a
//! [JoinSet]. Outcomes come back through the join handles tagged with their index, so the result
//! slots are only ever touched by the loop driving the set.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::error;

use crate::config::ConcurrencyLimit;
use crate::error::MapError;
use crate::observer::{MapObserver, NoopObserver};
use crate::operation::Operation;

use super::inflight::{Slots, collect_all};

type Outcome<Op, T> = Result<<Op as Operation<T>>::Item, <Op as Operation<T>>::Error>;

/// Spawned counterpart of [super::map_with_limit]. A panicking operation fails the call with
/// [MapError::Task], once all the other operations have settled.
pub async fn map_with_limit<T, Op>(
    items: impl IntoIterator<Item = T>,
    limit: usize,
    operation: Op,
) -> Result<Vec<Op::Item>, MapError<Op::Error>>
where
    Op: Operation<T>,
    Op::Future: Send + 'static,
    Op::Item: Send + 'static,
    Op::Error: Send + 'static,
{
    let outcomes = map_settled(items, limit, operation).await?;
    collect_all(outcomes)
}

/// Spawned counterpart of [super::map_settled].
pub async fn map_settled<T, Op>(
    items: impl IntoIterator<Item = T>,
    limit: usize,
    operation: Op,
) -> Result<Vec<Outcome<Op, T>>, MapError<Op::Error>>
where
    Op: Operation<T>,
    Op::Future: Send + 'static,
    Op::Item: Send + 'static,
    Op::Error: Send + 'static,
{
    let limit = ConcurrencyLimit::new(limit).map_err(|_| MapError::InvalidLimit(limit))?;
    drive(items, limit, operation, &NoopObserver).await
}

pub(crate) async fn drive<T, Op, O>(
    items: impl IntoIterator<Item = T>,
    limit: ConcurrencyLimit,
    mut operation: Op,
    observer: &O,
) -> Result<Vec<Outcome<Op, T>>, MapError<Op::Error>>
where
    Op: Operation<T>,
    Op::Future: Send + 'static,
    Op::Item: Send + 'static,
    Op::Error: Send + 'static,
    O: MapObserver + ?Sized,
{
    let started = Instant::now();
    let items: Vec<T> = items.into_iter().collect();
    let mut state = Settler {
        slots: Slots::new(items.len()),
        tasks: HashMap::new(),
        panics: vec![],
    };
    let mut tasks = JoinSet::new();
    let mut peak = 0;

    for (index, item) in items.into_iter().enumerate() {
        let future = AssertUnwindSafe(operation.run(item)).catch_unwind();
        let handle = tasks.spawn(async move { (index, future.await) });
        state.tasks.insert(handle.id(), index);
        peak = peak.max(tasks.len());
        observer.on_launch(index, tasks.len());

        if tasks.len() >= limit.get()
            && let Some(joined) = tasks.join_next().await
        {
            state.settle(joined, tasks.len(), observer);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        state.settle(joined, tasks.len(), observer);
    }

    let summary = state.slots.summary(peak, started.elapsed());
    observer.on_complete(&summary);

    if !state.panics.is_empty() {
        return Err(MapError::Task(state.panics.join("; ")));
    }
    Ok(state.slots.into_outcomes())
}

type Joined<R, E> =
    Result<(usize, Result<Result<R, E>, Box<dyn Any + Send>>), tokio::task::JoinError>;

struct Settler<R, E> {
    slots: Slots<R, E>,
    /// Item index of every spawned task, to attribute tasks that fail to join.
    tasks: HashMap<Id, usize>,
    panics: Vec<String>,
}

impl<R, E> Settler<R, E> {
    fn settle<O>(&mut self, joined: Joined<R, E>, in_flight: usize, observer: &O)
    where
        O: MapObserver + ?Sized,
    {
        match joined {
            Ok((index, Ok(outcome))) => {
                observer.on_settle(index, outcome.is_ok(), in_flight);
                self.slots.fill(index, outcome);
            }
            Ok((index, Err(payload))) => {
                let reason = panic_message(payload.as_ref());
                error!(index, reason, "Operation panicked");
                observer.on_settle(index, false, in_flight);
                self.slots.record_failure();
                self.panics
                    .push(format!("operation for item {index} panicked: {reason}"));
            }
            Err(e) => {
                let index = self.tasks.get(&e.id()).copied();
                error!(?e, ?index, "Operation task failed to join");
                if let Some(index) = index {
                    observer.on_settle(index, false, in_flight);
                }
                self.slots.record_failure();
                self.panics.push(format!("operation task failed: {e}"));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::super::test_utils::{RecordingObserver, Spy, double_after};
    use super::*;
    use crate::config::{ExecutionMode, MapperConfig};
    use crate::mapper::BoundedMapper;

    const DELAY: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_doubles_with_limit_two() {
        let spy = Spy::default();
        let op_spy = spy.clone();

        let results = map_with_limit(1..=5u64, 2, move |n: u64| {
            let spy = op_spy.clone();
            async move { spy.track(n as usize, double_after(n, DELAY, &[])).await }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![2, 4, 6, 8, 10]);
        assert_eq!(spy.peak(), 2);
        assert_eq!(spy.completed(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_limit_on_worker_threads() {
        let spy = Spy::default();
        let op_spy = spy.clone();

        let results = map_with_limit(0..40u64, 3, move |n: u64| {
            let spy = op_spy.clone();
            let delay = Duration::from_millis(1 + n % 5);
            async move { spy.track(n as usize, double_after(n, delay, &[])).await }
        })
        .await
        .unwrap();

        assert_eq!(results, (0..40u64).map(|n| n * 2).collect::<Vec<_>>());
        assert!(spy.peak() <= 3);
        assert_eq!(spy.completed(), 40);
    }

    #[tokio::test]
    async fn test_empty_input_and_zero_limit() {
        let results = map_with_limit(Vec::<u64>::new(), 2, |n: u64| async move {
            Ok::<_, String>(n)
        })
        .await
        .unwrap();
        assert!(results.is_empty());

        let err = map_with_limit(vec![1u64], 0, |n: u64| async move { Ok::<_, String>(n) })
            .await
            .unwrap_err();
        assert_eq!(err, MapError::InvalidLimit(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_lets_others_finish() {
        let spy = Spy::default();
        let op_spy = spy.clone();

        let err = map_with_limit(1..=6u64, 2, move |n: u64| {
            let spy = op_spy.clone();
            async move { spy.track(n as usize, double_after(n, DELAY, &[4, 2])).await }
        })
        .await
        .unwrap_err();

        assert_eq!(spy.completed(), 6);
        let aggregate = err.aggregate().unwrap();
        assert_eq!(aggregate.failed(), 2);
        assert_eq!(aggregate.first().index, 1);
        assert_eq!(aggregate.first().source, "cannot double 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_reported_after_siblings_settle() {
        let spy = Spy::default();
        let op_spy = spy.clone();
        let observer = RecordingObserver::default();

        let err = drive(
            0..4u64,
            ConcurrencyLimit::new(2).unwrap(),
            move |n: u64| {
                let spy = op_spy.clone();
                async move {
                    spy.track(n as usize, async move {
                        tokio::time::sleep(DELAY).await;
                        if n == 1 {
                            panic!("operation blew up");
                        }
                        Ok::<_, String>(n)
                    })
                    .await
                }
            },
            &observer,
        )
        .await
        .unwrap_err();

        // the panicked operation counts as a failure of the call
        let summary = observer.summary.lock().clone().unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded + summary.failed, summary.total);
        assert_eq!(observer.settles.lock().len(), 4);
        let settles = observer.settles.lock().clone();
        assert!(settles.iter().any(|(index, ok, _)| *index == 1 && !*ok));

        // the panicking operation never reaches its end, the other three do
        assert_eq!(spy.completed(), 3);
        match err {
            MapError::Task(msg) => {
                assert!(msg.contains("item 1"));
                assert!(msg.contains("operation blew up"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_mapper_spawned_mode() {
        let observer = Arc::new(RecordingObserver::default());
        let mapper = BoundedMapper::new(&MapperConfig {
            concurrency: 3,
            mode: ExecutionMode::Spawned,
        })
        .unwrap()
        .with_observer(Arc::clone(&observer));

        let outcomes = mapper
            .map_settled(1..=7u64, |n: u64| double_after(n, DELAY, &[7]))
            .await
            .unwrap();

        assert_eq!(
            outcomes,
            vec![
                Ok(2),
                Ok(4),
                Ok(6),
                Ok(8),
                Ok(10),
                Ok(12),
                Err("cannot double 7".to_string())
            ]
        );

        let summary = observer.summary.lock().clone().unwrap();
        assert_eq!(summary.total, 7);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.peak_in_flight, 3);
        assert!(
            observer
                .launches
                .lock()
                .iter()
                .all(|(_, in_flight)| *in_flight <= 3)
        );
    }
}
