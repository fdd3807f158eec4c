//! Flattening stages: map each value to an inner `Flux` and splice the inner
//! streams into one.

use crate::stream::error::StreamError;
use crate::stream::flux::Flux;
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{earliest, BoxStage, Idle, Stage, StageContext, Step, Upstream};
use crate::stream::stages::{element_failure, guarded, next_value, pump_while_held};
use std::sync::Arc;
use std::time::Duration;

/// Default number of inner streams `flat_map` keeps open at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 256;

/// Subscribes to one inner stream at a time, in upstream order.
///
/// Upstream is pumped while the active inner is pending, so a backpressure
/// stage above sees the values produced meanwhile.
pub struct ConcatMap<T, U, F> {
    upstream: Upstream<T>,
    mapper: Arc<F>,
    active: Option<Upstream<U>>,
}

impl<T, U, F> ConcatMap<T, U, F> {
    pub fn new(upstream: BoxStage<T>, mapper: Arc<F>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            mapper,
            active: None,
        }
    }
}

impl<T, U, F> Stage<U> for ConcatMap<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flux<U> + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<U> {
        loop {
            if let Some(inner) = &mut self.active {
                match inner.pull(cx) {
                    Step::Ready(Signal::Next(v)) => return Step::Ready(Signal::Next(v)),
                    Step::Ready(Signal::Complete) => self.active = None,
                    Step::Ready(Signal::Error(e)) => {
                        self.active = None;
                        self.upstream.cancel();
                        return Step::Ready(Signal::Error(e));
                    }
                    Step::Pending(wake) => {
                        return match pump_while_held(&mut self.upstream, cx, wake) {
                            Ok(wake) => Step::Pending(wake),
                            Err(e) => {
                                inner.cancel();
                                self.active = None;
                                Step::Ready(Signal::Error(e))
                            }
                        };
                    }
                }
                continue;
            }

            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            let mapper = &self.mapper;
            match guarded(|| mapper(value)) {
                Ok(flux) => self.active = Some(Upstream::new(flux.instantiate(cx))),
                Err(e) => {
                    if let Some(step) = element_failure(&mut self.upstream, cx, e, None) {
                        return step;
                    }
                }
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        if let Some(inner) = &mut self.active {
            match inner.pump(cx) {
                Idle::Terminated(Terminal::Complete) => self.active = None,
                Idle::Terminated(Terminal::Error(e)) => {
                    self.active = None;
                    self.upstream.cancel();
                    return Idle::Terminated(Terminal::Error(e));
                }
                Idle::Wait(wake) => {
                    return match pump_while_held(&mut self.upstream, cx, wake) {
                        Ok(wake) => Idle::Wait(wake),
                        Err(e) => {
                            inner.cancel();
                            self.active = None;
                            Idle::Terminated(Terminal::Error(e))
                        }
                    };
                }
            }
        }
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        if let Some(inner) = &mut self.active {
            inner.cancel();
        }
        self.active = None;
        self.upstream.cancel();
    }
}

/// Subscribes to inner streams as soon as upstream produces them, up to
/// `max_concurrency`, and interleaves their values round-robin.
pub struct FlatMap<T, U, F> {
    upstream: Upstream<T>,
    mapper: Arc<F>,
    inners: Vec<Upstream<U>>,
    cursor: usize,
    max_concurrency: usize,
}

impl<T, U, F> FlatMap<T, U, F> {
    pub fn new(upstream: BoxStage<T>, mapper: Arc<F>, max_concurrency: usize) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            mapper,
            inners: Vec::new(),
            cursor: 0,
            max_concurrency: max_concurrency.max(1),
        }
    }

    fn cancel_inners(&mut self) {
        for inner in &mut self.inners {
            inner.cancel();
        }
        self.inners.clear();
    }

    fn fail(&mut self, error: StreamError) -> Step<U> {
        self.cancel_inners();
        self.upstream.cancel();
        Step::Ready(Signal::Error(error))
    }
}

impl<T, U, F> FlatMap<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flux<U> + Send + Sync,
{
    /// Open inner streams while upstream has values ready. Returns the
    /// upstream wake time, or an error step.
    fn admit(&mut self, cx: &mut StageContext) -> Result<Option<Duration>, Step<U>> {
        while self.inners.len() < self.max_concurrency && !self.upstream.is_done() {
            match self.upstream.pull(cx) {
                Step::Ready(Signal::Next(value)) => {
                    let mapper = &self.mapper;
                    match guarded(|| mapper(value)) {
                        Ok(flux) => self.inners.push(Upstream::new(flux.instantiate(cx))),
                        Err(e) => {
                            if let Some(step) = element_failure(&mut self.upstream, cx, e, None) {
                                self.cancel_inners();
                                return Err(step);
                            }
                        }
                    }
                }
                Step::Ready(Signal::Complete) => break,
                Step::Ready(Signal::Error(e)) => return Err(self.fail(e)),
                Step::Pending(wake) => return Ok(wake),
            }
        }
        Ok(None)
    }
}

impl<T, U, F> Stage<U> for FlatMap<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flux<U> + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<U> {
        loop {
            let mut wake = match self.admit(cx) {
                Ok(wake) => wake,
                Err(step) => return step,
            };

            let mut removed = false;
            let mut polled = 0;
            while polled < self.inners.len() {
                let idx = (self.cursor + polled) % self.inners.len();
                match self.inners[idx].pull(cx) {
                    Step::Ready(Signal::Next(v)) => {
                        self.cursor = idx + 1;
                        return Step::Ready(Signal::Next(v));
                    }
                    Step::Ready(Signal::Complete) => {
                        self.inners.remove(idx);
                        removed = true;
                    }
                    Step::Ready(Signal::Error(e)) => return self.fail(e),
                    Step::Pending(inner_wake) => {
                        wake = earliest(wake, inner_wake);
                        polled += 1;
                    }
                }
            }

            if self.inners.is_empty() && self.upstream.is_done() {
                return Step::Ready(Signal::Complete);
            }
            if !removed {
                // At the concurrency limit upstream is only pumped.
                if self.inners.len() >= self.max_concurrency {
                    match pump_while_held(&mut self.upstream, cx, wake) {
                        Ok(upstream_wake) => wake = upstream_wake,
                        Err(e) => return self.fail(e),
                    }
                }
                return Step::Pending(wake);
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        let mut wake = None;
        let mut idx = 0;
        while idx < self.inners.len() {
            match self.inners[idx].pump(cx) {
                Idle::Terminated(Terminal::Complete) => {
                    self.inners.remove(idx);
                }
                Idle::Terminated(Terminal::Error(e)) => {
                    self.cancel_inners();
                    self.upstream.cancel();
                    return Idle::Terminated(Terminal::Error(e));
                }
                Idle::Wait(inner_wake) => {
                    wake = earliest(wake, inner_wake);
                    idx += 1;
                }
            }
        }
        match self.upstream.pump(cx) {
            Idle::Terminated(Terminal::Complete) if self.inners.is_empty() => {
                Idle::Terminated(Terminal::Complete)
            }
            Idle::Terminated(Terminal::Complete) => Idle::Wait(wake),
            Idle::Terminated(Terminal::Error(e)) => {
                self.cancel_inners();
                Idle::Terminated(Terminal::Error(e))
            }
            Idle::Wait(upstream_wake) => Idle::Wait(earliest(wake, upstream_wake)),
        }
    }

    fn cancel(&mut self) {
        self.cancel_inners();
        self.upstream.cancel();
    }
}
