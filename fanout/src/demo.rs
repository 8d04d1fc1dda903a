use std::error::Error;
use std::time::Duration;

use fanout_core::metrics::{MetricsObserver, encode_metrics};
use fanout_core::observer::TracingObserver;
use fanout_core::{BoundedMapper, Callback, MapperConfig, from_callback};
use thiserror::Error;
use tracing::{debug, info};

use crate::cmdline::DemoArgs;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum DemoError {
    #[error("refusing to double {0}")]
    Refused(u64),
}

async fn double_later(n: u64, delay: Duration, fail_on: Option<u64>) -> Result<u64, DemoError> {
    tokio::time::sleep(delay).await;
    if fail_on == Some(n) {
        return Err(DemoError::Refused(n));
    }
    Ok(n * 2)
}

/// Callback-style flavour of [double_later]: arms a timer and reports through `done`.
fn double_with_callback(
    n: u64,
    delay: Duration,
    fail_on: Option<u64>,
    done: Callback<u64, DemoError>,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if fail_on == Some(n) {
            done.fail(DemoError::Refused(n));
        } else {
            done.done(n * 2);
        }
    });
}

/// Doubles `1..=items`, at most `cfg.concurrency` at a time, and returns the doubled values.
pub(crate) async fn run(cfg: &MapperConfig, args: DemoArgs) -> Result<Vec<u64>, Box<dyn Error>> {
    let mapper = BoundedMapper::new(cfg)?
        .with_observer((TracingObserver::named("demo"), MetricsObserver));

    let items: Vec<u64> = (1..=args.items).collect();
    let fail_on = match args.fail_at {
        Some(index) => Some(items.get(index).copied().ok_or_else(|| {
            format!(
                "--fail-at {index} is out of range for {} items",
                items.len()
            )
        })?),
        None => None,
    };
    let delay = args.delay;
    info!(
        items = items.len(),
        limit = %mapper.limit(),
        mode = %mapper.mode(),
        callback = args.callback,
        "Running demo"
    );

    let results = if args.callback {
        mapper
            .map(
                items,
                from_callback(move |n: u64, done: Callback<u64, DemoError>| {
                    double_with_callback(n, delay, fail_on, done)
                }),
            )
            .await?
    } else {
        mapper
            .map(items, move |n: u64| double_later(n, delay, fail_on))
            .await?
    };

    info!(?results, "Demo finished");
    debug!(metrics = %encode_metrics()?, "Mapper metrics");
    Ok(results)
}
