//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use rivulet::runtime::{Scheduler, SystemClock};
use rivulet::stream::{Flux, StreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for waiting on another thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Scheduler that starts one named thread per subscription
pub fn dedicated(name: &str) -> Scheduler {
    Scheduler::dedicated(name, Arc::new(SystemClock::new()))
}

/// `1..=count`, failing with `UpstreamFailure` on emission `fail_at` (1-based)
pub fn failing_on(count: i64, fail_at: i64) -> Flux<i64> {
    Flux::generate(move |i| {
        let value = i as i64 + 1;
        if value == fail_at {
            Err(StreamError::upstream(format!("emission {} failed", value)))
        } else if value > count {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    })
}

/// Wrap `flux` so every subscription increments `counter` first
pub fn counting_subscriptions<T: Send + 'static>(
    flux: Flux<T>,
    counter: Arc<AtomicUsize>,
) -> Flux<T> {
    Flux::defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        flux.clone()
    })
}
