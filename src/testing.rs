//! Test helpers for code built on rivulet.
//!
//! - [`TestSubscriber`] records every callback and lets another thread wait
//!   for values or the terminal signal through its [`TestHandle`].
//! - [`StepVerifier`] drives one subscription synchronously on a
//!   [`VirtualClock`]: request, step, advance time, then assert.

use crate::config::DEFAULT_DRAIN_BATCH;
use crate::runtime::clock::{Clock, Parker, VirtualClock};
use crate::stream::driver::{DriveOutcome, Driver};
use crate::stream::error::StreamError;
use crate::stream::flux::Flux;
use crate::stream::signal::Terminal;
use crate::stream::subscriber::Subscriber;
use crate::stream::subscription::{Subscription, SubscriptionShared};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on driver steps per [`StepVerifier::drive`] call.
const DRIVE_STEP_BUDGET: usize = 100_000;

#[derive(Debug)]
struct Recording<T> {
    values: Vec<T>,
    terminal: Option<Terminal>,
    subscription: Option<Subscription>,
    subscribe_calls: usize,
    /// `on_next`, `on_complete` and `on_error` calls.
    signal_calls: usize,
}

impl<T> Default for Recording<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            terminal: None,
            subscription: None,
            subscribe_calls: 0,
            signal_calls: 0,
        }
    }
}

type SharedRecording<T> = Arc<(Mutex<Recording<T>>, Condvar)>;

fn lock<T>(state: &SharedRecording<T>) -> MutexGuard<'_, Recording<T>> {
    state.0.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== TestSubscriber ====================

/// Subscriber that records everything it receives.
pub struct TestSubscriber<T> {
    state: SharedRecording<T>,
    initial_demand: u64,
}

impl<T> TestSubscriber<T> {
    /// Requests `initial_demand` on subscribe; zero requests nothing.
    pub fn new(initial_demand: u64) -> (Self, TestHandle<T>) {
        let state: SharedRecording<T> = Arc::new((Mutex::new(Recording::default()), Condvar::new()));
        let handle = TestHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                initial_demand,
            },
            handle,
        )
    }

    pub fn unbounded() -> (Self, TestHandle<T>) {
        Self::new(crate::stream::UNBOUNDED)
    }

    fn record(&self, f: impl FnOnce(&mut Recording<T>)) {
        let mut recording = lock(&self.state);
        recording.signal_calls += 1;
        f(&mut recording);
        self.state.1.notify_all();
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        {
            let mut recording = lock(&self.state);
            recording.subscribe_calls += 1;
            recording.subscription = Some(subscription.clone());
        }
        if self.initial_demand > 0 {
            subscription.request(self.initial_demand);
        }
        self.state.1.notify_all();
    }

    fn on_next(&mut self, value: T) {
        self.record(|r| r.values.push(value));
    }

    fn on_complete(&mut self) {
        self.record(|r| {
            r.terminal.get_or_insert(Terminal::Complete);
        });
    }

    fn on_error(&mut self, error: StreamError) {
        self.record(|r| {
            r.terminal.get_or_insert(Terminal::Error(error));
        });
    }
}

/// Inspects and controls a [`TestSubscriber`] from the test thread.
pub struct TestHandle<T> {
    state: SharedRecording<T>,
}

impl<T> Clone for TestHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> TestHandle<T> {
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        lock(&self.state).values.clone()
    }

    pub fn value_count(&self) -> usize {
        lock(&self.state).values.len()
    }

    pub fn terminal(&self) -> Option<Terminal> {
        lock(&self.state).terminal.clone()
    }

    /// How many times `on_subscribe` ran. Always 0 or 1.
    pub fn subscribe_calls(&self) -> usize {
        lock(&self.state).subscribe_calls
    }

    /// Total signal callbacks received, values and terminals together.
    pub fn signal_calls(&self) -> usize {
        lock(&self.state).signal_calls
    }

    pub fn subscription(&self) -> Option<Subscription> {
        lock(&self.state).subscription.clone()
    }

    /// Request more values. Ignored before `on_subscribe`.
    pub fn request(&self, n: u64) {
        if let Some(subscription) = self.subscription() {
            subscription.request(n);
        }
    }

    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }

    /// Wait for the terminal signal.
    pub fn await_terminal(&self, timeout: Duration) -> Option<Terminal> {
        self.wait_for(timeout, |r| r.terminal.is_some())
            .then(|| self.terminal())
            .flatten()
    }

    /// Wait until at least `count` values arrived. False on timeout.
    pub fn await_values(&self, count: usize, timeout: Duration) -> bool {
        self.wait_for(timeout, |r| r.values.len() >= count)
    }

    /// Wait until `on_subscribe` ran. False on timeout.
    pub fn await_subscribed(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |r| r.subscribe_calls > 0)
    }

    fn wait_for(&self, timeout: Duration, ready: impl Fn(&Recording<T>) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut recording = lock(&self.state);
        while !ready(&recording) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            recording = self
                .state
                .1
                .wait_timeout(recording, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl<T: fmt::Debug> fmt::Debug for TestHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recording = lock(&self.state);
        f.debug_struct("TestHandle")
            .field("values", &recording.values)
            .field("terminal", &recording.terminal)
            .finish()
    }
}

// ==================== StepVerifier ====================

/// Steps one subscription on the calling thread against a virtual clock.
///
/// Nothing is requested up front. A typical test requests, drives, advances
/// the clock and asserts:
///
/// ```
/// use rivulet::stream::Flux;
/// use rivulet::testing::StepVerifier;
/// use std::time::Duration;
///
/// let mut verifier = StepVerifier::new(&Flux::range(1, 3).delay_elements(Duration::from_secs(1)));
/// verifier.request(3).drive();
/// verifier.assert_values(&[]);
/// verifier.advance(Duration::from_secs(3));
/// verifier.assert_values(&[1, 2, 3]).assert_complete();
/// ```
pub struct StepVerifier<T: Send + 'static> {
    driver: Option<Driver<T, TestSubscriber<T>>>,
    handle: TestHandle<T>,
    subscription: Subscription,
    clock: Arc<VirtualClock>,
}

impl<T: Send + 'static> StepVerifier<T> {
    /// Subscribe on a fresh virtual clock starting at zero.
    pub fn new(flux: &Flux<T>) -> Self {
        Self::with_clock(flux, VirtualClock::new())
    }

    /// Subscribe on `clock`, shared with other verifiers or schedulers.
    pub fn with_clock(flux: &Flux<T>, clock: Arc<VirtualClock>) -> Self {
        let (subscriber, handle) = TestSubscriber::new(0);
        let shared = SubscriptionShared::new(Parker::new());
        let subscription = Subscription::new(Arc::clone(&shared));
        let as_clock: Arc<dyn Clock> = clock.clone();
        let driver = Driver::start(flux, subscriber, shared, as_clock, DEFAULT_DRAIN_BATCH);
        Self {
            driver,
            handle,
            subscription,
            clock,
        }
    }

    pub fn request(&mut self, n: u64) -> &mut Self {
        self.subscription.request(n);
        self
    }

    pub fn cancel(&mut self) -> &mut Self {
        self.subscription.cancel();
        self
    }

    /// Step until the subscription finishes or waits for something that
    /// has not happened yet: demand, a later clock time, another thread.
    pub fn drive(&mut self) -> &mut Self {
        self.run_until_idle();
        self
    }

    /// Move virtual time forward by `by`, stopping at every deadline a stage
    /// asked for on the way so each timer fires at its own time.
    pub fn advance(&mut self, by: Duration) -> &mut Self {
        let target = self.clock.now() + by;
        while let Some(deadline) = self.run_until_idle() {
            if deadline > target {
                break;
            }
            self.clock.advance_to(deadline);
        }
        self.clock.advance_to(target);
        self.run_until_idle();
        self
    }

    /// Returns the future clock time the chain is waiting for, if any.
    fn run_until_idle(&mut self) -> Option<Duration> {
        let driver = self.driver.as_mut()?;
        for _ in 0..DRIVE_STEP_BUDGET {
            match driver.step() {
                DriveOutcome::Progressed => {}
                DriveOutcome::Idle(Some(deadline)) if deadline <= self.clock.now() => {}
                DriveOutcome::Idle(deadline) => return deadline,
                DriveOutcome::Finished => return None,
            }
        }
        tracing::warn!("verifier step budget exhausted at {:?}", self.clock.now());
        None
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn handle(&self) -> &TestHandle<T> {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.driver.as_ref().map_or(true, |d| d.is_finished())
    }

    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.handle.values()
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.handle.terminal()
    }

    /// The error the subscription terminated with, if any.
    pub fn error(&self) -> Option<StreamError> {
        match self.terminal() {
            Some(Terminal::Error(e)) => Some(e),
            _ => None,
        }
    }

    pub fn signal_calls(&self) -> usize {
        self.handle.signal_calls()
    }

    // ── Assertions ──

    #[track_caller]
    pub fn assert_values(&self, expected: &[T]) -> &Self
    where
        T: Clone + PartialEq + fmt::Debug,
    {
        assert_eq!(self.values(), expected, "values received so far");
        self
    }

    #[track_caller]
    pub fn assert_complete(&self) -> &Self {
        assert_eq!(self.terminal(), Some(Terminal::Complete));
        self
    }

    #[track_caller]
    pub fn assert_error(&self, expected: &StreamError) -> &Self {
        assert_eq!(self.terminal(), Some(Terminal::Error(expected.clone())));
        self
    }

    /// Neither completed nor errored yet.
    #[track_caller]
    pub fn assert_no_terminal(&self) -> &Self {
        assert_eq!(self.terminal(), None, "unexpected terminal signal");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::clock::SystemClock;
    use crate::runtime::scheduler::Scheduler;

    #[test]
    fn test_subscriber_records_in_order() {
        let (subscriber, handle) = TestSubscriber::unbounded();
        Flux::range(1, 3).subscribe(&Scheduler::immediate(), subscriber);
        assert_eq!(handle.values(), vec![1, 2, 3]);
        assert_eq!(handle.terminal(), Some(Terminal::Complete));
        assert_eq!(handle.subscribe_calls(), 1);
        assert_eq!(handle.signal_calls(), 4);
    }

    #[test]
    fn test_handle_waits_across_threads() {
        let scheduler = Scheduler::dedicated("verifier-wait", Arc::new(SystemClock::new()));
        let (subscriber, handle) = TestSubscriber::new(0);
        Flux::range(0, 10).subscribe(&scheduler, subscriber);
        assert!(handle.await_subscribed(Duration::from_secs(5)));
        assert_eq!(handle.value_count(), 0);
        handle.request(4);
        assert!(handle.await_values(4, Duration::from_secs(5)));
        handle.request(6);
        assert_eq!(
            handle.await_terminal(Duration::from_secs(5)),
            Some(Terminal::Complete)
        );
        assert_eq!(handle.values(), (0..10).collect::<Vec<i64>>());
    }

    #[test]
    fn test_verifier_respects_demand() {
        let mut verifier = StepVerifier::new(&Flux::range(1, 5));
        verifier.drive().assert_values(&[]).assert_no_terminal();
        verifier.request(2).drive().assert_values(&[1, 2]);
        verifier.request(10).drive().assert_values(&[1, 2, 3, 4, 5]);
        verifier.assert_complete();
        assert!(verifier.is_finished());
    }

    #[test]
    fn test_verifier_virtual_time() {
        let flux = Flux::range(1, 3).delay_elements(Duration::from_secs(1));
        let mut verifier = StepVerifier::new(&flux);
        verifier.request(3).drive().assert_values(&[]);
        verifier.advance(Duration::from_secs(1)).assert_values(&[1]);
        verifier.advance(Duration::from_secs(2)).assert_values(&[1, 2, 3]);
        verifier.assert_complete();
    }

    #[test]
    fn test_verifier_error() {
        let mut verifier = StepVerifier::new(&Flux::<i32>::error(StreamError::upstream("down")));
        verifier.drive();
        verifier.assert_error(&StreamError::upstream("down"));
        assert_eq!(verifier.error(), Some(StreamError::upstream("down")));
    }
}
