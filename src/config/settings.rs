//! Tunable settings grouped by concern
//!
//! # Main Types
//!
//! - [`BackpressurePolicy`] - What a stage does with values its consumer has not asked for
//! - [`OverflowStrategy`] - What a bounded buffer does when full
//! - [`SchedulerSettings`] - Worker pool sizing and channel prefetch
//! - [`LoggingSettings`] - Default tracing filter and optional log file

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum number of pool worker threads
pub const DEFAULT_POOL_MAX_THREADS: usize = 64;

/// Default idle time before a pool worker retires, in milliseconds
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 60_000;

/// Default number of values in flight across a scheduler boundary
pub const DEFAULT_PREFETCH: usize = 256;

/// Default number of values a backpressure stage drains before yielding
pub const DEFAULT_DRAIN_BATCH: usize = 256;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

// ==================== Backpressure ====================

/// Behavior of a full bounded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Terminate with `BufferOverflow`
    #[default]
    Error,
    /// Discard the incoming value, keep what is queued
    #[serde(alias = "drop_newest")]
    DropLatest,
    /// Evict the oldest queued value to admit the incoming one
    DropOldest,
}

/// Policy applied while the downstream has no outstanding demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Queue everything. Memory grows without bound if the consumer lags.
    #[default]
    Unbounded,
    /// Discard values produced while there is no demand
    Drop,
    /// Queue up to `capacity` values, then apply `overflow`
    Buffer {
        capacity: usize,
        #[serde(default)]
        overflow: OverflowStrategy,
    },
}

impl BackpressurePolicy {
    pub fn buffer(capacity: usize, overflow: OverflowStrategy) -> Self {
        BackpressurePolicy::Buffer { capacity, overflow }
    }

    /// Maximum queued values, `None` when unbounded or dropping.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            BackpressurePolicy::Buffer { capacity, .. } => Some(*capacity),
            _ => None,
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressurePolicy::Unbounded => write!(f, "unbounded"),
            BackpressurePolicy::Drop => write!(f, "drop"),
            BackpressurePolicy::Buffer { capacity, overflow } => {
                write!(f, "buffer({}, {:?})", capacity, overflow)
            }
        }
    }
}

// ==================== Scheduler ====================

/// Worker pool and boundary settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Thread name prefix for pool workers
    pub pool_name: String,

    /// Upper bound on concurrently running pool workers
    pub pool_max_threads: usize,

    /// Idle time before a worker thread exits
    pub keep_alive_ms: u64,

    /// Values requested ahead across a `run_on` boundary
    pub prefetch: usize,

    /// Values a backpressure stage drains per poll while its consumer is idle
    pub drain_batch: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            pool_name: "rivulet-worker".to_string(),
            pool_max_threads: DEFAULT_POOL_MAX_THREADS,
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
            prefetch: DEFAULT_PREFETCH,
            drain_batch: DEFAULT_DRAIN_BATCH,
        }
    }
}

impl SchedulerSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

// ==================== Logging ====================

/// Logging settings used by the demo binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
        }
    }
}
