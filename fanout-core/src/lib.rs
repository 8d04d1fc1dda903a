//! Maps asynchronous operations over a sequence of items while capping how many of them are in
//! flight at the same time.
//!
//! ```no_run
//! # async fn demo() -> Result<(), fanout_core::MapError<std::io::Error>> {
//! let doubled = fanout_core::map_with_limit(1..=5u64, 2, |n: u64| async move {
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!     Ok::<_, std::io::Error>(n * 2)
//! })
//! .await?;
//! assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
//! # Ok(())
//! # }
//! ```

pub use self::error::{AggregateFailure, CallbackError, Error, ItemFailure, MapError, Result};

/// Errors of the mapper and of the operations it runs.
mod error;

/// Mapper configuration and the validated concurrency limit.
pub mod config;

/// The operation applied to every item and its adapters.
pub mod operation;

/// Lifecycle hooks for logging and metrics.
pub mod observer;

/// Prometheus metrics fed by [metrics::MetricsObserver].
pub mod metrics;

/// Bounded-concurrency mapping, in-task and spawned.
pub mod mapper;

pub use crate::config::{ConcurrencyLimit, ExecutionMode, MapperConfig};
pub use crate::mapper::{BoundedMapper, map_settled, map_with_limit};
pub use crate::operation::{Callback, Operation, from_callback, indexed};
