//! Backpressure controller.
//!
//! Sits between a producer that may run ahead and a consumer that requests
//! slowly. While the consumer has demand values pass straight through (or
//! come out of the queue first). While it has none, [`Stage::pump`] keeps
//! pulling upstream and applies the [`BackpressurePolicy`] to every value.

use crate::config::{BackpressurePolicy, OverflowStrategy};
use crate::stream::error::StreamError;
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{BoxStage, Idle, Stage, StageContext, Step, Upstream};
use std::collections::VecDeque;
use std::time::Duration;

pub struct BackpressureStage<T> {
    upstream: Upstream<T>,
    policy: BackpressurePolicy,
    /// Held values with the time they were emitted upstream.
    queue: VecDeque<(T, Duration)>,
    overflow: Option<StreamError>,
    dropped: u64,
}

impl<T> BackpressureStage<T> {
    pub fn new(upstream: BoxStage<T>, policy: BackpressurePolicy) -> Self {
        let queue = match policy {
            BackpressurePolicy::Buffer { capacity, .. } => VecDeque::with_capacity(capacity),
            _ => VecDeque::new(),
        };
        Self {
            upstream: Upstream::new(upstream),
            policy,
            queue,
            overflow: None,
            dropped: 0,
        }
    }

    /// Number of values waiting for demand.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of values discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn discard(&mut self, cx: &StageContext) {
        self.dropped += 1;
        tracing::trace!(
            "{}: dropped value under {} ({} so far)",
            cx.subscription_id(),
            self.policy,
            self.dropped
        );
    }

    /// Apply the policy to a value produced while the consumer has no demand.
    fn offer(&mut self, value: T, cx: &StageContext) {
        let value = (value, cx.emitted_at());
        match self.policy {
            BackpressurePolicy::Unbounded => self.queue.push_back(value),
            BackpressurePolicy::Drop => self.discard(cx),
            BackpressurePolicy::Buffer { capacity, overflow } => {
                if self.queue.len() < capacity {
                    self.queue.push_back(value);
                    return;
                }
                match overflow {
                    OverflowStrategy::Error => {
                        tracing::debug!(
                            "{}: buffer of {} overflowed",
                            cx.subscription_id(),
                            capacity
                        );
                        self.queue.clear();
                        self.upstream.cancel();
                        self.overflow = Some(StreamError::BufferOverflow { capacity });
                    }
                    OverflowStrategy::DropLatest => self.discard(cx),
                    OverflowStrategy::DropOldest => {
                        self.queue.pop_front();
                        self.discard(cx);
                        self.queue.push_back(value);
                    }
                }
            }
        }
    }
}

impl<T: Send> Stage<T> for BackpressureStage<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        if let Some(e) = self.overflow.take() {
            return Step::Ready(Signal::Error(e));
        }
        if let Some((v, at)) = self.queue.pop_front() {
            cx.mark_emitted(at);
            return Step::Ready(Signal::Next(v));
        }
        self.upstream.pull(cx)
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        for _ in 0..cx.drain_batch() {
            if self.overflow.is_some() || self.upstream.is_done() {
                break;
            }
            match self.upstream.pull(cx) {
                Step::Ready(Signal::Next(v)) => self.offer(v, cx),
                Step::Ready(_) => break,
                Step::Pending(wake) => return Idle::Wait(wake),
            }
        }
        if let Some(e) = self.overflow.take() {
            return Idle::Terminated(Terminal::Error(e));
        }
        match self.upstream.terminal() {
            Some(terminal) if self.queue.is_empty() => Idle::Terminated(terminal.clone()),
            Some(_) => Idle::Wait(None),
            // Yield to the driver between batches.
            None => Idle::Wait(Some(cx.now())),
        }
    }

    fn cancel(&mut self) {
        self.queue.clear();
        self.upstream.cancel();
    }
}

impl<T> Drop for BackpressureStage<T> {
    fn drop(&mut self) {
        if self.dropped > 0 {
            tracing::debug!("{} dropped {} values", self.policy, self.dropped);
        }
    }
}
