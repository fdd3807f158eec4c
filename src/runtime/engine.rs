//! Engine: builds schedulers from an [`EngineConfig`].

use crate::config::{BackpressurePolicy, EngineConfig};
use crate::error::Result;
use crate::runtime::clock::{Clock, SystemClock};
use crate::runtime::scheduler::{Scheduler, WorkerPool};
use std::sync::Arc;

/// Owns the shared worker pool and clock, and hands out schedulers.
///
/// There is no global engine; pass schedulers explicitly to `subscribe` and
/// `run_on`.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    pool: Arc<WorkerPool>,
}

impl Engine {
    /// Create an engine on wall-clock time.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create an engine on a caller-supplied clock, usually a `VirtualClock`.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::from_settings(&config.scheduler);
        tracing::info!(
            "Engine ready: pool '{}' (max {} threads), prefetch {}",
            config.scheduler.pool_name,
            config.scheduler.pool_max_threads,
            config.scheduler.prefetch
        );
        Ok(Self {
            config,
            clock,
            pool,
        })
    }

    fn tuned(&self, scheduler: Scheduler) -> Scheduler {
        scheduler.with_tuning(
            self.config.scheduler.prefetch,
            self.config.scheduler.drain_batch,
        )
    }

    /// Scheduler running drivers on the calling thread.
    pub fn inline(&self) -> Scheduler {
        self.tuned(Scheduler::inline(Arc::clone(&self.clock)))
    }

    /// Scheduler running drivers on the shared worker pool.
    pub fn pool(&self) -> Scheduler {
        self.tuned(Scheduler::pool(
            Arc::clone(&self.pool),
            Arc::clone(&self.clock),
        ))
    }

    /// Scheduler starting one thread named `name` per subscription.
    pub fn dedicated(&self, name: impl Into<String>) -> Scheduler {
        self.tuned(Scheduler::dedicated(name, Arc::clone(&self.clock)))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configured default backpressure policy.
    pub fn backpressure(&self) -> BackpressurePolicy {
        self.config.backpressure
    }

    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RivuletError;
    use crate::runtime::clock::VirtualClock;
    use std::time::Duration;

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.scheduler.prefetch = 0;
        assert!(matches!(Engine::new(config), Err(RivuletError::Config(_))));
    }

    #[test]
    fn test_schedulers_share_clock_and_tuning() {
        let mut config = EngineConfig::default();
        config.scheduler.prefetch = 8;
        config.scheduler.drain_batch = 16;
        let clock = VirtualClock::new();
        let engine = Engine::with_clock(config, clock.clone()).unwrap();

        clock.advance(Duration::from_secs(2));
        let pool = engine.pool();
        assert_eq!(pool.now(), Duration::from_secs(2));
        assert_eq!(pool.prefetch(), 8);
        assert_eq!(pool.drain_batch(), 16);
        assert_eq!(pool.name(), "rivulet-worker");
        assert!(engine.inline().is_inline());
        assert_eq!(engine.dedicated("io").name(), "io");
    }
}
