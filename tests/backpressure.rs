//! Backpressure policies against a fast ticker and a slow consumer
//!
//! Every scenario runs on a virtual clock. Most take one value at 1 ms, then
//! stop requesting while ten more ticks arrive. The rest keep unbounded demand
//! but put a stage that holds values for a while behind the policy.

mod common;

use common::builders::EngineConfigBuilder;
use rivulet::config::{BackpressurePolicy, OverflowStrategy};
use rivulet::runtime::{Engine, VirtualClock};
use rivulet::stream::{Flux, StreamError};
use rivulet::testing::StepVerifier;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Take tick 0, then let ticks 1..=10 arrive without demand.
fn stalled_ticker(policy: BackpressurePolicy) -> StepVerifier<u64> {
    let mut verifier = StepVerifier::new(&Flux::interval(ms(1)).on_backpressure(policy));
    verifier.request(1).advance(ms(1));
    verifier.assert_values(&[0]);
    verifier.advance(ms(10));
    verifier
}

#[test]
fn test_unbounded_keeps_every_tick() {
    let mut verifier = stalled_ticker(BackpressurePolicy::Unbounded);
    verifier.request(11).drive();
    verifier.assert_values(&(0..=10).collect::<Vec<u64>>());
    verifier.advance(ms(1));
    assert_eq!(verifier.values().last(), Some(&11));
}

#[test]
fn test_drop_discards_ticks_without_demand() {
    let mut verifier = stalled_ticker(BackpressurePolicy::Drop);
    verifier.request(1).drive();
    verifier.assert_values(&[0]);
    verifier.advance(ms(1));
    verifier.assert_values(&[0, 11]).assert_no_terminal();
}

#[test]
fn test_buffer_error_fails_on_first_excess_tick() {
    let mut verifier = stalled_ticker(BackpressurePolicy::buffer(3, OverflowStrategy::Error));
    verifier.drive();
    verifier
        .assert_values(&[0])
        .assert_error(&StreamError::BufferOverflow { capacity: 3 });
}

#[test]
fn test_buffer_drop_latest_keeps_earliest_ticks() {
    let mut verifier = stalled_ticker(BackpressurePolicy::buffer(3, OverflowStrategy::DropLatest));
    verifier.request(10).drive();
    verifier.assert_values(&[0, 1, 2, 3]);
    verifier.advance(ms(1));
    verifier.assert_values(&[0, 1, 2, 3, 11]);
}

#[test]
fn test_buffer_drop_oldest_keeps_latest_ticks() {
    let mut verifier = stalled_ticker(BackpressurePolicy::buffer(3, OverflowStrategy::DropOldest));
    verifier.request(10).drive();
    verifier.assert_values(&[0, 8, 9, 10]);
}

#[test]
fn test_buffer_drains_fifo_while_consumer_catches_up() {
    let mut verifier = stalled_ticker(BackpressurePolicy::buffer(50, OverflowStrategy::Error));
    for expected in 1..=10u64 {
        verifier.request(1).drive();
        assert_eq!(verifier.values().last(), Some(&expected));
    }
    verifier.assert_no_terminal();
}

#[test]
fn test_engine_default_policy() {
    let config = EngineConfigBuilder::new()
        .backpressure(BackpressurePolicy::buffer(2, OverflowStrategy::DropOldest))
        .build();
    let engine = Engine::with_clock(config, VirtualClock::new()).unwrap();

    let mut verifier = StepVerifier::new(&Flux::range(1, 6).on_backpressure(engine.backpressure()));
    verifier.drive();
    verifier.request(10).drive();
    verifier.assert_values(&[5, 6]).assert_complete();
}

#[test]
fn test_values_pass_through_while_demand_lasts() {
    let flux = Flux::range(1, 100).on_backpressure_drop();
    assert_eq!(flux.collect_list().unwrap(), (1..=100).collect::<Vec<i64>>());
}

/// Feed `source` into a stage that holds each value for 100 ms, with
/// unbounded demand, observed for one second.
fn slow_stage(source: Flux<u64>, hold: fn(Flux<u64>) -> Flux<u64>) -> StepVerifier<u64> {
    let mut verifier = StepVerifier::new(&hold(source));
    verifier.request(u64::MAX).advance(ms(1000));
    verifier
}

fn timer_per_value(flux: Flux<u64>) -> Flux<u64> {
    flux.concat_map(|v| Flux::timer(Duration::from_millis(100)).map(move |_| v))
}

fn delayed(flux: Flux<u64>) -> Flux<u64> {
    flux.delay_elements(Duration::from_millis(100))
}

#[test]
fn test_drop_before_concat_map_skips_ticks_during_timer() {
    let verifier = slow_stage(Flux::interval(ms(1)).on_backpressure_drop(), timer_per_value);
    verifier
        .assert_values(&[0, 100, 200, 300, 400, 500, 600, 700, 800])
        .assert_no_terminal();
}

#[test]
fn test_buffer_before_concat_map_overflows() {
    let verifier = slow_stage(Flux::interval(ms(1)).on_backpressure_buffer(2), timer_per_value);
    verifier
        .assert_values(&[])
        .assert_error(&StreamError::BufferOverflow { capacity: 2 });
}

#[test]
fn test_drop_latest_before_concat_map_keeps_early_burst() {
    let flux = Flux::interval(ms(1)).on_backpressure_buffer_with(3, OverflowStrategy::DropLatest);
    let verifier = slow_stage(flux, timer_per_value);
    verifier
        .assert_values(&[0, 1, 2, 3, 100, 200, 300, 400, 500])
        .assert_no_terminal();
}

#[test]
fn test_drop_before_delay_elements_skips_ticks_while_held() {
    let verifier = slow_stage(Flux::interval(ms(1)).on_backpressure_drop(), delayed);
    verifier
        .assert_values(&[0, 100, 200, 300, 400, 500, 600, 700, 800])
        .assert_no_terminal();
}

#[test]
fn test_buffer_before_delay_elements_overflows() {
    let verifier = slow_stage(Flux::interval(ms(1)).on_backpressure_buffer(2), delayed);
    verifier
        .assert_values(&[])
        .assert_error(&StreamError::BufferOverflow { capacity: 2 });
}

#[test]
fn test_drop_latest_before_delay_elements_keeps_early_burst() {
    let flux = Flux::interval(ms(1)).on_backpressure_buffer_with(3, OverflowStrategy::DropLatest);
    let verifier = slow_stage(flux, delayed);
    verifier
        .assert_values(&[0, 1, 2, 3, 100, 200, 300, 400, 500])
        .assert_no_terminal();
}

#[test]
fn test_zip_with_slow_side_drops_fast_ticks() {
    let fast = Flux::interval(ms(1)).on_backpressure_drop();
    let slow = Flux::interval(ms(100));
    let mut verifier = StepVerifier::new(&Flux::zip(fast, slow).map(|(a, b)| a * 1000 + b));
    verifier.request(u64::MAX).advance(ms(300));
    // Fast tick 0 waits for slow tick 0 at 100 ms and ticks 1..=98 are
    // dropped meanwhile. Tick 99 is due at 100 ms and pairs with slow tick 1.
    verifier.assert_values(&[0, 99_001, 199_002]);
}
