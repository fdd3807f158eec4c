//! Flattening, recovery and consumer helpers end to end

mod common;

use common::{counting_subscriptions, failing_on};
use rivulet::runtime::Scheduler;
use rivulet::stream::{Downstream, DownstreamSubscriber, Flux, StreamError, Terminal};
use rivulet::testing::{StepVerifier, TestSubscriber};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ==================== Sources ====================

#[test]
fn test_simple_sources() {
    assert_eq!(Flux::just("only").collect_list().unwrap(), vec!["only"]);
    assert!(Flux::<u8>::empty().collect_list().unwrap().is_empty());
    assert_eq!(
        Flux::<u8>::error(StreamError::upstream("nope")).collect_list(),
        Err(StreamError::upstream("nope"))
    );
    let generated = Flux::generate(|i| Ok((i < 4).then_some(i * 10)))
        .collect_list()
        .unwrap();
    assert_eq!(generated, vec![0, 10, 20, 30]);
}

#[test]
fn test_error_source_fails_without_demand() {
    let mut verifier = StepVerifier::new(&Flux::<u8>::error(StreamError::upstream("early")));
    verifier.drive();
    verifier.assert_error(&StreamError::upstream("early"));
}

#[test]
fn test_sources_restart_per_subscription() {
    let subscribed = Arc::new(AtomicUsize::new(0));
    let flux = counting_subscriptions(Flux::range(0, 3), Arc::clone(&subscribed));
    assert_eq!(flux.collect_list().unwrap(), vec![0, 1, 2]);
    assert_eq!(flux.block_last().unwrap(), Some(2));
    assert_eq!(subscribed.load(Ordering::SeqCst), 2);
}

// ==================== Flattening ====================

#[test]
fn test_concat_map_preserves_order() {
    let values = Flux::range(1, 3)
        .concat_map(|v| Flux::range(v * 10, 2))
        .collect_list()
        .unwrap();
    assert_eq!(values, vec![10, 11, 20, 21, 30, 31]);
}

#[test]
fn test_concat_map_subscribes_inner_lazily() {
    let subscribed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&subscribed);
    let flux = Flux::range(1, 3).concat_map(move |v| {
        counting_subscriptions(Flux::just(v), Arc::clone(&counter))
    });
    let mut verifier = StepVerifier::new(&flux);
    verifier.request(1).drive();
    verifier.assert_values(&[1]);
    assert_eq!(subscribed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_flat_map_merges_inners() {
    let mut values = Flux::range(1, 3)
        .flat_map(|v| Flux::range(v * 10, 2))
        .collect_list()
        .unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![10, 11, 20, 21, 30, 31]);
}

#[test]
fn test_flat_map_with_limits_open_inners() {
    let values = Flux::range(0, 4)
        .flat_map_with(|v| Flux::from_iterable(vec![v; 3]), 1)
        .collect_list()
        .unwrap();
    assert_eq!(values, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
}

#[test]
fn test_inner_error_terminates_flat_map() {
    let result = Flux::range(1, 3)
        .flat_map(|v| {
            if v == 2 {
                Flux::error(StreamError::upstream("inner"))
            } else {
                Flux::just(v)
            }
        })
        .collect_list();
    assert_eq!(result, Err(StreamError::upstream("inner")));
}

// ==================== Recovery ====================

#[test]
fn test_on_error_continue_skips_failed_elements() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let values = Flux::range(1, 6)
        .try_map(|v| {
            if v % 2 == 0 {
                Err(format!("even {}", v))
            } else {
                Ok(v * 100)
            }
        })
        .on_error_continue(move |error: &StreamError, element: Option<&i64>| {
            sink.lock()
                .unwrap()
                .push((error.to_string(), element.copied()));
        })
        .collect_list()
        .unwrap();

    assert_eq!(values, vec![100, 300, 500]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], ("transform failure: even 2".to_string(), Some(2)));
    assert_eq!(seen[2].1, Some(6));
}

#[test]
fn test_on_error_continue_covers_mapper_panics() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    let values = Flux::range(1, 4)
        .map(|v| {
            if v == 3 {
                panic!("three is not allowed");
            }
            v
        })
        .on_error_continue(move |error: &StreamError, _: Option<&i64>| {
            assert_eq!(
                error,
                &StreamError::TransformFailure("three is not allowed".to_string())
            );
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .collect_list()
        .unwrap();
    assert_eq!(values, vec![1, 2, 4]);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[test]
fn test_on_error_continue_does_not_cover_source_failures() {
    let result = failing_on(10, 3)
        .filter(|_| true)
        .on_error_continue(|_: &StreamError, _: Option<&i64>| {})
        .collect_list();
    assert_eq!(result, Err(StreamError::upstream("emission 3 failed")));
}

#[test]
fn test_on_error_resume_switches_stream() {
    let values = failing_on(10, 3)
        .on_error_resume(|_| Flux::range(100, 2))
        .collect_list()
        .unwrap();
    assert_eq!(values, vec![1, 2, 100, 101]);

    let values = failing_on(10, 3)
        .on_error_resume_with(-1)
        .collect_list()
        .unwrap();
    assert_eq!(values, vec![1, 2, -1]);
}

#[test]
fn test_on_error_map_stays_terminal() {
    let result = failing_on(10, 2)
        .on_error_map(|e| e.with_context("loading orders"))
        .collect_list();
    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("loading orders"));
    assert_eq!(err.root(), &StreamError::upstream("emission 2 failed"));
}

#[test]
fn test_on_error_return_without_error_is_transparent() {
    let values = Flux::range(1, 3).on_error_return(0).collect_list().unwrap();
    assert_eq!(values, vec![1, 2, 3]);
}

// ==================== Consumers ====================

#[test]
fn test_subscribe_fn_and_side_effects() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let peeked = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);
    let counter = Arc::clone(&peeked);
    let subscription = Flux::from_iterable(vec!["a", "b", "c"])
        .do_on_next(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .log("letters")
        .subscribe_fn(&Scheduler::immediate(), move |v| sink.lock().unwrap().push(v));

    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(peeked.load(Ordering::SeqCst), 3);
    assert!(subscription.lifecycle().is_terminal());
}

#[derive(Default)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Downstream<Vec<i64>> for Recorder {
    fn submit(&mut self, batch: Vec<i64>) {
        self.log.lock().unwrap().push(format!("{:?}", batch));
    }

    fn complete(&mut self) {
        self.log.lock().unwrap().push("complete".to_string());
    }
}

#[test]
fn test_downstream_subscriber_receives_every_batch() {
    let recorder = Recorder::default();
    let log = Arc::clone(&recorder.log);
    Flux::range(1, 10)
        .buffer(4)
        .subscribe(&Scheduler::immediate(), DownstreamSubscriber::new(recorder, 2));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["[1, 2, 3, 4]", "[5, 6, 7, 8]", "[9, 10]", "complete"]
    );
}

#[test]
fn test_block_last_reports_error() {
    assert_eq!(
        failing_on(10, 4).block_last(),
        Err(StreamError::upstream("emission 4 failed"))
    );
    assert_eq!(failing_on(3, 4).block_last(), Ok(Some(3)));
}

#[test]
fn test_error_terminal_reaches_subscriber_once() {
    let (subscriber, handle) = TestSubscriber::unbounded();
    failing_on(10, 1).subscribe(&Scheduler::immediate(), subscriber);
    assert_eq!(
        handle.terminal(),
        Some(Terminal::Error(StreamError::upstream("emission 1 failed")))
    );
    assert_eq!(handle.signal_calls(), 1);
}
