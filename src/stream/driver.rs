//! Per-subscription driver loop.
//!
//! The driver owns the stage chain and the subscriber. Each step:
//! 1. Stop if the subscription was cancelled.
//! 2. Deliver a pending demand error.
//! 3. With demand, pull one signal; without, pump the chain.
//! 4. Deliver `Next` values and exactly one terminal.
//!
//! When nothing can progress the driver parks through its clock until the
//! earliest deadline a stage asked for, or until it is unparked.

use crate::runtime::clock::Clock;
use crate::stream::error::StreamError;
use crate::stream::flux::Flux;
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{BoxStage, Idle, StageContext, Step};
use crate::stream::subscriber::Subscriber;
use crate::stream::subscription::{Subscription, SubscriptionShared};
use std::sync::Arc;
use std::time::Duration;

/// Result of one driver step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// A value was delivered.
    Progressed,
    /// Nothing to do until the given clock time, or an unpark.
    Idle(Option<Duration>),
    /// The subscription ended.
    Finished,
}

pub(crate) struct Driver<T, S> {
    stage: BoxStage<T>,
    subscriber: S,
    shared: Arc<SubscriptionShared>,
    cx: StageContext,
    clock: Arc<dyn Clock>,
    finished: bool,
}

impl<T, S> Driver<T, S>
where
    T: Send + 'static,
    S: Subscriber<T>,
{
    /// Instantiate the chain and call `on_subscribe`. Returns `None` when the
    /// subscription was cancelled before it started.
    pub(crate) fn start(
        flux: &Flux<T>,
        mut subscriber: S,
        shared: Arc<SubscriptionShared>,
        clock: Arc<dyn Clock>,
        drain_batch: usize,
    ) -> Option<Self> {
        let mut cx = StageContext::new(
            shared.id,
            Arc::clone(&clock),
            Arc::clone(&shared.parker),
            drain_batch,
        );
        if !shared.activate() {
            tracing::debug!("{}: cancelled before start", shared.id);
            return None;
        }
        let stage = flux.instantiate(&mut cx);
        tracing::debug!(
            "{}: subscribed to {}",
            shared.id,
            crate::stream::plan::describe(flux.plan())
        );
        subscriber.on_subscribe(Subscription::new(Arc::clone(&shared)));
        Some(Self {
            stage,
            subscriber,
            shared,
            cx,
            clock,
            finished: false,
        })
    }

    pub(crate) fn subscription(&self) -> Subscription {
        Subscription::new(Arc::clone(&self.shared))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance the subscription by at most one signal.
    pub(crate) fn step(&mut self) -> DriveOutcome {
        if self.finished {
            return DriveOutcome::Finished;
        }
        if self.shared.is_cancelled() {
            return self.stop();
        }
        if let Some(err) = self.shared.take_demand_error() {
            self.stage.cancel();
            return self.deliver(Terminal::Error(err));
        }

        if self.shared.demand.has_demand() {
            match self.stage.pull(&mut self.cx) {
                Step::Ready(Signal::Next(value)) => {
                    if self.shared.is_cancelled() {
                        tracing::trace!("{}: {}", self.shared.id, StreamError::CancellationRace);
                        return self.stop();
                    }
                    self.shared.demand.take_one();
                    self.subscriber.on_next(value);
                    DriveOutcome::Progressed
                }
                Step::Ready(Signal::Complete) => self.deliver(Terminal::Complete),
                Step::Ready(Signal::Error(e)) => self.deliver(Terminal::Error(e)),
                Step::Pending(wake) => DriveOutcome::Idle(wake),
            }
        } else {
            match self.stage.pump(&mut self.cx) {
                Idle::Wait(wake) => DriveOutcome::Idle(wake),
                Idle::Terminated(terminal) => self.deliver(terminal),
            }
        }
    }

    /// Step until the subscription ends, parking while idle.
    pub(crate) fn run(mut self) {
        loop {
            match self.step() {
                DriveOutcome::Progressed => {}
                DriveOutcome::Idle(deadline) => {
                    self.clock.park_until(&self.shared.parker, deadline);
                }
                DriveOutcome::Finished => break,
            }
        }
    }

    fn stop(&mut self) -> DriveOutcome {
        self.stage.cancel();
        self.finished = true;
        tracing::debug!("{}: driver stopped after cancel", self.shared.id);
        DriveOutcome::Finished
    }

    fn deliver(&mut self, terminal: Terminal) -> DriveOutcome {
        self.finished = true;
        if !self.shared.finish(&terminal) {
            tracing::trace!("{}: {}", self.shared.id, StreamError::CancellationRace);
            return DriveOutcome::Finished;
        }
        match terminal {
            Terminal::Complete => {
                tracing::debug!("{}: complete", self.shared.id);
                self.subscriber.on_complete();
            }
            Terminal::Error(e) => {
                tracing::debug!("{}: error: {}", self.shared.id, e);
                self.subscriber.on_error(e);
            }
        }
        DriveOutcome::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::clock::{Parker, VirtualClock};
    use crate::testing::TestSubscriber;

    fn start<T: Send + 'static>(
        flux: &Flux<T>,
        subscriber: TestSubscriber<T>,
    ) -> (Option<Driver<T, TestSubscriber<T>>>, Arc<SubscriptionShared>) {
        let shared = SubscriptionShared::new(Parker::new());
        let driver = Driver::start(flux, subscriber, Arc::clone(&shared), VirtualClock::new(), 8);
        (driver, shared)
    }

    #[test]
    fn test_step_delivers_one_value_per_demand() {
        let (subscriber, handle) = TestSubscriber::new(2);
        let (driver, _) = start(&Flux::range(1, 3), subscriber);
        let mut driver = driver.unwrap();

        assert_eq!(driver.step(), DriveOutcome::Progressed);
        assert_eq!(driver.step(), DriveOutcome::Progressed);
        assert_eq!(driver.step(), DriveOutcome::Idle(None));
        assert_eq!(handle.values(), vec![1, 2]);

        handle.request(5);
        assert_eq!(driver.step(), DriveOutcome::Progressed);
        assert_eq!(driver.step(), DriveOutcome::Finished);
        assert!(driver.is_finished());
        assert_eq!(driver.step(), DriveOutcome::Finished);
        assert_eq!(handle.terminal(), Some(Terminal::Complete));
        assert_eq!(handle.signal_calls(), 4);
    }

    #[test]
    fn test_cancelled_before_start_never_subscribes() {
        let (subscriber, handle) = TestSubscriber::<i64>::unbounded();
        let shared = SubscriptionShared::new(Parker::new());
        Subscription::new(Arc::clone(&shared)).cancel();

        let driver = Driver::start(&Flux::range(0, 3), subscriber, shared, VirtualClock::new(), 8);
        assert!(driver.is_none());
        assert_eq!(handle.subscribe_calls(), 0);
    }

    #[test]
    fn test_idle_reports_stage_deadline() {
        let (subscriber, _handle) = TestSubscriber::new(1);
        let (driver, _) = start(&Flux::timer(Duration::from_secs(3)), subscriber);
        let mut driver = driver.unwrap();
        assert_eq!(
            driver.step(),
            DriveOutcome::Idle(Some(Duration::from_secs(3)))
        );
    }

    #[test]
    fn test_cancel_finishes_without_terminal() {
        let (subscriber, handle) = TestSubscriber::<i64>::unbounded();
        let (driver, _) = start(&Flux::range(0, 100), subscriber);
        let mut driver = driver.unwrap();
        assert_eq!(driver.step(), DriveOutcome::Progressed);

        driver.subscription().cancel();
        assert_eq!(driver.step(), DriveOutcome::Finished);
        assert_eq!(handle.values(), vec![0]);
        assert_eq!(handle.terminal(), None);
    }
}
