//! Element-wise stages: map, try_map, filter, do_on_next and log.

use crate::stream::error::StreamError;
use crate::stream::signal::Signal;
use crate::stream::stage::{BoxStage, Idle, Stage, StageContext, Step, Upstream};
use crate::stream::stages::{element_failure, guarded, next_value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub struct Map<T, F> {
    upstream: Upstream<T>,
    f: Arc<F>,
}

impl<T, F> Map<T, F> {
    pub fn new(upstream: BoxStage<T>, f: Arc<F>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            f,
        }
    }
}

impl<T, U, F> Stage<U> for Map<T, F>
where
    T: Send + 'static,
    F: Fn(T) -> U + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<U> {
        loop {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            let f = &self.f;
            match guarded(|| f(value)) {
                Ok(mapped) => return Step::Ready(Signal::Next(mapped)),
                Err(e) => {
                    if let Some(step) = element_failure(&mut self.upstream, cx, e, None) {
                        return step;
                    }
                }
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

/// Fallible map. The failing element is offered to `on_error_continue`.
pub struct TryMap<T, F> {
    upstream: Upstream<T>,
    f: Arc<F>,
}

impl<T, F> TryMap<T, F> {
    pub fn new(upstream: BoxStage<T>, f: Arc<F>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            f,
        }
    }
}

impl<T, U, E, F> Stage<U> for TryMap<T, F>
where
    T: Send + 'static,
    E: Into<StreamError>,
    F: Fn(&T) -> Result<U, E> + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<U> {
        loop {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            let f = &self.f;
            let error = match guarded(|| f(&value)) {
                Ok(Ok(mapped)) => return Step::Ready(Signal::Next(mapped)),
                Ok(Err(e)) => e.into(),
                Err(panicked) => panicked,
            };
            let element: &dyn Any = &value;
            if let Some(step) = element_failure(&mut self.upstream, cx, error, Some(element)) {
                return step;
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

pub struct Filter<T, P> {
    upstream: Upstream<T>,
    predicate: Arc<P>,
}

impl<T, P> Filter<T, P> {
    pub fn new(upstream: BoxStage<T>, predicate: Arc<P>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            predicate,
        }
    }
}

impl<T, P> Stage<T> for Filter<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        loop {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            let predicate = &self.predicate;
            match guarded(|| predicate(&value)) {
                Ok(true) => return Step::Ready(Signal::Next(value)),
                Ok(false) => {}
                Err(e) => {
                    let element: &dyn Any = &value;
                    if let Some(step) = element_failure(&mut self.upstream, cx, e, Some(element))
                    {
                        return step;
                    }
                }
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

/// Side-effect hook run for every value before it is forwarded.
pub struct DoOnNext<T, F> {
    upstream: Upstream<T>,
    f: Arc<F>,
}

impl<T, F> DoOnNext<T, F> {
    pub fn new(upstream: BoxStage<T>, f: Arc<F>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            f,
        }
    }
}

impl<T, F> Stage<T> for DoOnNext<T, F>
where
    T: Send + 'static,
    F: Fn(&T) + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        loop {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            let f = &self.f;
            match guarded(|| f(&value)) {
                Ok(()) => return Step::Ready(Signal::Next(value)),
                Err(e) => {
                    let element: &dyn Any = &value;
                    if let Some(step) = element_failure(&mut self.upstream, cx, e, Some(element))
                    {
                        return step;
                    }
                }
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

/// Emits a tracing event for every signal passing through.
pub struct Log<T> {
    upstream: Upstream<T>,
    category: Arc<str>,
}

impl<T> Log<T> {
    pub fn new(upstream: BoxStage<T>, category: Arc<str>, cx: &StageContext) -> Self {
        tracing::info!(category = %category, "{}: onSubscribe", cx.subscription_id());
        Self {
            upstream: Upstream::new(upstream),
            category,
        }
    }

    fn record(&self, signal: &Signal<T>)
    where
        T: fmt::Debug,
    {
        match signal {
            Signal::Next(v) => tracing::info!(category = %self.category, "onNext({:?})", v),
            Signal::Complete => tracing::info!(category = %self.category, "onComplete()"),
            Signal::Error(e) => tracing::info!(category = %self.category, "onError({})", e),
        }
    }
}

impl<T> Stage<T> for Log<T>
where
    T: Send + fmt::Debug,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        let step = self.upstream.pull(cx);
        if let Step::Ready(signal) = &step {
            self.record(signal);
        }
        step
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        let idle = self.upstream.pump(cx);
        if let Idle::Terminated(terminal) = &idle {
            self.record(&Signal::from(terminal.clone()));
        }
        idle
    }

    fn cancel(&mut self) {
        if !self.upstream.is_done() {
            tracing::info!(category = %self.category, "cancel()");
        }
        self.upstream.cancel();
    }
}
