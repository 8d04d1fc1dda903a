use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the mapper itself, independent of the caller's operation.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Task Error - {0}")]
    Task(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

/// A single operation that settled with an error, tagged with the index of the item it was
/// invoked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure<E> {
    pub index: usize,
    pub source: E,
}

impl<E: fmt::Display> fmt::Display for ItemFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {} failed: {}", self.index, self.source)
    }
}

impl<E> std::error::Error for ItemFailure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Failure of a whole mapping call. Holds every item failure ordered by input index; the one
/// with the lowest index is reported as the cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateFailure<E> {
    cause: ItemFailure<E>,
    others: Vec<ItemFailure<E>>,
    total: usize,
}

impl<E> AggregateFailure<E> {
    /// Builds the aggregate from the collected failures. Returns `None` if nothing failed.
    pub(crate) fn new(mut failures: Vec<ItemFailure<E>>, total: usize) -> Option<Self> {
        failures.sort_by_key(|f| f.index);
        let mut failures = failures.into_iter();
        let cause = failures.next()?;
        Some(Self {
            cause,
            others: failures.collect(),
            total,
        })
    }

    /// The failure reported as the cause of the aggregate (lowest input index).
    pub fn first(&self) -> &ItemFailure<E> {
        &self.cause
    }

    /// All failures ordered by input index.
    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure<E>> {
        std::iter::once(&self.cause).chain(self.others.iter())
    }

    /// Number of failed items.
    pub fn failed(&self) -> usize {
        self.others.len() + 1
    }

    /// Number of items that were mapped in the call.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Consumes the aggregate and returns the reported cause.
    pub fn into_first(self) -> ItemFailure<E> {
        self.cause
    }
}

impl<E: fmt::Display> fmt::Display for AggregateFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} operations failed, first {}",
            self.failed(),
            self.total,
            self.cause
        )
    }
}

impl<E> std::error::Error for AggregateFailure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Error returned by the mapping calls. `E` is the error type of the caller's operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError<E> {
    #[error("Config Error - concurrency limit must be at least 1, got {0}")]
    InvalidLimit(usize),

    #[error("Map Error - {0}")]
    Aggregate(AggregateFailure<E>),

    #[error("Task Error - {0}")]
    Task(String),
}

impl<E> MapError<E> {
    /// Returns the aggregate failure if the call failed because of the operations.
    pub fn aggregate(&self) -> Option<&AggregateFailure<E>> {
        match self {
            MapError::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }
}

/// Error of an operation bridged from a completion callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError<E> {
    #[error("Callback Error - {0}")]
    Failed(E),

    #[error("Callback Error - completion handle dropped without a result")]
    Dropped,
}
