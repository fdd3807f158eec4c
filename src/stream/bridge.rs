//! Hand-offs across thread boundaries.
//!
//! `run_on` subscribes the upstream part of a chain on another scheduler and
//! moves its signals through a bounded crossbeam channel. The channel never
//! fills: the producing side only ever has `prefetch` values of demand, and
//! the consuming stage replenishes one slot per value it takes.
//!
//! [`AsyncReceiver`] does the same for tokio consumers.

use crate::runtime::clock::Parker;
use crate::runtime::scheduler::Scheduler;
use crate::stream::error::StreamError;
use crate::stream::flux::Flux;
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{BoxStage, Idle, Stage, StageContext, Step};
use crate::stream::subscriber::Subscriber;
use crate::stream::subscription::Subscription;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::Arc;

const STOPPED_WITHOUT_TERMINAL: &str = "upstream scheduler stopped without a terminal signal";

/// Subscribe `upstream` on `scheduler` and return the stage that receives
/// its signals on the subscribing driver.
pub(crate) fn channel_stage<T: Send + 'static>(
    upstream: &Flux<T>,
    scheduler: &Scheduler,
    prefetch: usize,
    cx: &mut StageContext,
) -> BoxStage<T> {
    let prefetch = prefetch.max(1);
    let (tx, rx) = bounded(prefetch + 1);
    let subscriber = ChannelSubscriber {
        tx,
        wake: Arc::clone(cx.parker()),
        prefetch,
        subscription: None,
    };
    let subscription = upstream.subscribe(scheduler, subscriber);
    tracing::trace!(
        "{}: crossed to '{}' as {}",
        cx.subscription_id(),
        scheduler.name(),
        subscription.id()
    );
    Box::new(ChannelStage {
        rx,
        subscription,
        peeked: None,
    })
}

// ── Producer side ──

struct ChannelSubscriber<T> {
    tx: Sender<Signal<T>>,
    wake: Arc<Parker>,
    prefetch: usize,
    subscription: Option<Subscription>,
}

impl<T: Send + 'static> ChannelSubscriber<T> {
    fn forward(&mut self, signal: Signal<T>) {
        match self.tx.try_send(signal) {
            Ok(()) => self.wake.unpark(),
            Err(TrySendError::Disconnected(_)) => {
                if let Some(subscription) = &self.subscription {
                    subscription.cancel();
                }
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!("hand-off channel full, signal dropped");
            }
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for ChannelSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(self.prefetch as u64);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.forward(Signal::Next(value));
    }

    fn on_complete(&mut self) {
        self.forward(Signal::Complete);
    }

    fn on_error(&mut self, error: StreamError) {
        self.forward(Signal::Error(error));
    }
}

// ── Consumer side ──

struct ChannelStage<T> {
    rx: Receiver<Signal<T>>,
    subscription: Subscription,
    /// Signal received by `pump` and not yet delivered.
    peeked: Option<Signal<T>>,
}

impl<T> ChannelStage<T> {
    fn receive(&mut self) -> Option<Signal<T>> {
        if let Some(signal) = self.peeked.take() {
            return Some(signal);
        }
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Signal::Error(StreamError::upstream(STOPPED_WITHOUT_TERMINAL)))
            }
        }
    }
}

impl<T: Send> Stage<T> for ChannelStage<T> {
    fn pull(&mut self, _cx: &mut StageContext) -> Step<T> {
        match self.receive() {
            Some(Signal::Next(value)) => {
                self.subscription.request(1);
                Step::Ready(Signal::Next(value))
            }
            Some(terminal) => Step::Ready(terminal),
            None => Step::Pending(None),
        }
    }

    fn pump(&mut self, _cx: &mut StageContext) -> Idle {
        match self.receive() {
            Some(Signal::Complete) => Idle::Terminated(Terminal::Complete),
            Some(Signal::Error(e)) => Idle::Terminated(Terminal::Error(e)),
            Some(next) => {
                self.peeked = Some(next);
                Idle::Wait(None)
            }
            None => Idle::Wait(None),
        }
    }

    fn cancel(&mut self) {
        self.subscription.cancel();
    }
}

impl<T> Drop for ChannelStage<T> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

// ── Async consumers ──

/// Receives the values of a subscription from async code.
///
/// Demand is replenished one value at a time as `next` is awaited. Dropping
/// the receiver cancels the subscription.
pub struct AsyncReceiver<T> {
    rx: tokio::sync::mpsc::Receiver<Signal<T>>,
    subscription: Subscription,
    done: bool,
}

impl<T> AsyncReceiver<T> {
    /// The next value, `Some(Err(_))` once on failure, `None` after completion.
    pub async fn next(&mut self) -> Option<Result<T, StreamError>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Signal::Next(value)) => {
                self.subscription.request(1);
                Some(Ok(value))
            }
            Some(Signal::Complete) => {
                self.done = true;
                None
            }
            Some(Signal::Error(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                Some(Err(StreamError::upstream(STOPPED_WITHOUT_TERMINAL)))
            }
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Drop for AsyncReceiver<T> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

struct AsyncSubscriber<T> {
    tx: tokio::sync::mpsc::Sender<Signal<T>>,
    prefetch: usize,
    subscription: Option<Subscription>,
}

impl<T: Send + 'static> AsyncSubscriber<T> {
    fn forward(&mut self, signal: Signal<T>) {
        use tokio::sync::mpsc::error::TrySendError as AsyncTrySendError;
        match self.tx.try_send(signal) {
            Ok(()) => {}
            Err(AsyncTrySendError::Closed(_)) => {
                if let Some(subscription) = &self.subscription {
                    subscription.cancel();
                }
            }
            Err(AsyncTrySendError::Full(_)) => {
                tracing::warn!("async hand-off channel full, signal dropped");
            }
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for AsyncSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(self.prefetch as u64);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.forward(Signal::Next(value));
    }

    fn on_complete(&mut self) {
        self.forward(Signal::Complete);
    }

    fn on_error(&mut self, error: StreamError) {
        self.forward(Signal::Error(error));
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Subscribe on `scheduler` and consume the values from async code.
    ///
    /// At most `capacity` values are in flight. An inline scheduler would
    /// block the caller, so a dedicated thread on the same clock is used
    /// instead.
    pub fn into_async(&self, scheduler: &Scheduler, capacity: usize) -> AsyncReceiver<T> {
        let capacity = capacity.max(1);
        let scheduler = if scheduler.is_inline() {
            Scheduler::dedicated("rivulet-async", Arc::clone(scheduler.clock()))
                .with_tuning(scheduler.prefetch(), scheduler.drain_batch())
        } else {
            scheduler.clone()
        };
        let (tx, rx) = tokio::sync::mpsc::channel(capacity + 1);
        let subscription = self.subscribe(
            &scheduler,
            AsyncSubscriber {
                tx,
                prefetch: capacity,
                subscription: None,
            },
        );
        AsyncReceiver {
            rx,
            subscription,
            done: false,
        }
    }
}
