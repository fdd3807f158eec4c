//! Consumers of a stream.

use crate::stream::demand::UNBOUNDED;
use crate::stream::error::StreamError;
use crate::stream::subscription::Subscription;

/// Receives the signals of one subscription.
///
/// All callbacks for a subscription happen on its driver thread, one at a
/// time: `on_subscribe` first, then `on_next` at most as often as requested,
/// then at most one of `on_complete` / `on_error`.
pub trait Subscriber<T>: Send + 'static {
    fn on_subscribe(&mut self, subscription: Subscription);
    fn on_next(&mut self, value: T);
    fn on_complete(&mut self);
    fn on_error(&mut self, error: StreamError);
}

impl<T, S> Subscriber<T> for Box<S>
where
    S: Subscriber<T> + ?Sized,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        (**self).on_subscribe(subscription)
    }

    fn on_next(&mut self, value: T) {
        (**self).on_next(value)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }

    fn on_error(&mut self, error: StreamError) {
        (**self).on_error(error)
    }
}

/// Subscriber built from closures. Requests unbounded demand.
pub struct CallbackSubscriber<N, C, E> {
    on_next: N,
    on_complete: C,
    on_error: E,
}

impl<N> CallbackSubscriber<N, fn(), fn(StreamError)> {
    /// Only handle values; errors are logged.
    pub fn values(on_next: N) -> Self {
        Self {
            on_next,
            on_complete: || {},
            on_error: |e: StreamError| tracing::warn!("unhandled stream error: {}", e),
        }
    }
}

impl<N, C, E> CallbackSubscriber<N, C, E> {
    pub fn new(on_next: N, on_complete: C, on_error: E) -> Self {
        Self {
            on_next,
            on_complete,
            on_error,
        }
    }
}

impl<T, N, C, E> Subscriber<T> for CallbackSubscriber<N, C, E>
where
    N: FnMut(T) + Send + 'static,
    C: FnMut() + Send + 'static,
    E: FnMut(StreamError) + Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(UNBOUNDED);
    }

    fn on_next(&mut self, value: T) {
        (self.on_next)(value)
    }

    fn on_complete(&mut self) {
        (self.on_complete)()
    }

    fn on_error(&mut self, error: StreamError) {
        (self.on_error)(error)
    }
}

/// A sink that accepts values in chunks, such as a batch database writer.
pub trait Downstream<T>: Send + 'static {
    fn submit(&mut self, value: T);

    fn complete(&mut self) {}

    fn error(&mut self, error: StreamError) {
        tracing::warn!("downstream received error: {}", error);
    }
}

/// Requests `chunk` values at a time and asks for the next chunk only once
/// the previous one has been submitted to the [`Downstream`].
pub struct DownstreamSubscriber<D> {
    downstream: D,
    chunk: u64,
    received: u64,
    subscription: Option<Subscription>,
}

impl<D> DownstreamSubscriber<D> {
    pub fn new(downstream: D, chunk: u64) -> Self {
        Self {
            downstream,
            chunk: chunk.max(1),
            received: 0,
            subscription: None,
        }
    }
}

impl<T, D> Subscriber<T> for DownstreamSubscriber<D>
where
    D: Downstream<T>,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(self.chunk);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.downstream.submit(value);
        self.received += 1;
        if self.received == self.chunk {
            self.received = 0;
            if let Some(subscription) = &self.subscription {
                subscription.request(self.chunk);
            }
        }
    }

    fn on_complete(&mut self) {
        self.downstream.complete();
    }

    fn on_error(&mut self, error: StreamError) {
        self.downstream.error(error);
    }
}
