use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use config::{Config, Environment};
use serde::Deserialize;
use tracing::info;

use crate::{Error, Result};

const ENV_PREFIX: &str = "FANOUT";
const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on the number of mapping operations in flight at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConcurrencyLimit(NonZeroUsize);

impl ConcurrencyLimit {
    /// A limit of one, i.e. strictly sequential execution.
    pub const SEQUENTIAL: Self = Self(NonZeroUsize::MIN);

    pub fn new(limit: usize) -> Result<Self> {
        NonZeroUsize::new(limit).map(Self).ok_or_else(|| {
            Error::Config(format!(
                "concurrency limit must be at least 1, got {limit}"
            ))
        })
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self(NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl From<NonZeroUsize> for ConcurrencyLimit {
    fn from(limit: NonZeroUsize) -> Self {
        Self(limit)
    }
}

impl TryFrom<usize> for ConcurrencyLimit {
    type Error = Error;

    fn try_from(limit: usize) -> Result<Self> {
        Self::new(limit)
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the mapping operations run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Operations are polled cooperatively inside the caller's task.
    #[default]
    InTask,
    /// Every operation is spawned as its own tokio task.
    Spawned,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::InTask => write!(f, "in-task"),
            ExecutionMode::Spawned => write!(f, "spawned"),
        }
    }
}

/// Configuration of a [crate::mapper::BoundedMapper].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapperConfig {
    pub concurrency: usize,
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            concurrency: DEFAULT_CONCURRENCY,
            mode: ExecutionMode::default(),
        }
    }
}

impl MapperConfig {
    /// Loads the configuration from the process environment (`FANOUT_CONCURRENCY`,
    /// `FANOUT_MODE`), falling back to the defaults for anything unset.
    pub fn load() -> Result<Self> {
        Self::build(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn build(env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .set_default("concurrency", DEFAULT_CONCURRENCY as i64)?
            .set_default("mode", ExecutionMode::default().to_string())?
            .add_source(env.prefix_separator("_"))
            .build()
            .map_err(|e| Error::Config(format!("generating mapper configuration: {e}")))?;

        let cfg = settings
            .try_deserialize::<Self>()
            .map_err(|e| Error::Config(format!("parsing mapper configuration: {e}")))?;
        cfg.limit()?;

        info!(concurrency = cfg.concurrency, mode = %cfg.mode, "Loaded mapper configuration");
        Ok(cfg)
    }

    /// The validated concurrency limit.
    pub fn limit(&self) -> Result<ConcurrencyLimit> {
        ConcurrencyLimit::new(self.concurrency)
    }
}

impl TryFrom<HashMap<String, String>> for MapperConfig {
    type Error = Error;

    fn try_from(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }
}
