//! Test data builders for creating test objects

use rivulet::config::{BackpressurePolicy, EngineConfig};

/// Builder for creating test EngineConfigs
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn pool(mut self, name: &str, max_threads: usize) -> Self {
        self.config.scheduler.pool_name = name.to_string();
        self.config.scheduler.pool_max_threads = max_threads;
        self
    }

    pub fn keep_alive_ms(mut self, millis: u64) -> Self {
        self.config.scheduler.keep_alive_ms = millis;
        self
    }

    pub fn prefetch(mut self, prefetch: usize) -> Self {
        self.config.scheduler.prefetch = prefetch;
        self
    }

    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure = policy;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
