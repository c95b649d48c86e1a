//! Parallel engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError, require_positive};

/// Environment variable overriding [`ParallelConfig::concurrency`].
pub const CONCURRENCY_ENV: &str = "PULLSTREAM_CONCURRENCY";

const DEFAULT_CONCURRENCY_FALLBACK: usize = 4;
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Bounds for one parallel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum number of in-flight computations (or active sub-streams).
    pub concurrency: usize,
    /// Buffer between fan-in producers and the consumer.
    pub channel_capacity: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(DEFAULT_CONCURRENCY_FALLBACK),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the concurrency taken from `PULLSTREAM_CONCURRENCY` when set.
    pub fn from_env() -> Result<Self> {
        let config = Self::default();
        match std::env::var(CONCURRENCY_ENV) {
            Ok(raw) => {
                let concurrency = raw.trim().parse::<usize>().map_err(|e| {
                    StreamError::invalid_argument(format!(
                        "{CONCURRENCY_ENV} must be a positive integer, got {raw:?}: {e}"
                    ))
                })?;
                config.with_concurrency(concurrency).validate()
            }
            Err(_) => Ok(config),
        }
    }

    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Reject zero bounds.
    pub fn validate(self) -> Result<Self> {
        require_positive("concurrency", self.concurrency)?;
        require_positive("channel capacity", self.channel_capacity)?;
        Ok(self)
    }
}
