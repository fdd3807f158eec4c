//! Error recovery stages.
//!
//! Recovery is local: each stage only sees errors from its own upstream.

use crate::stream::error::StreamError;
use crate::stream::flux::Flux;
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{BoxStage, ContinueHandler, Idle, Stage, StageContext, Step, Upstream};
use crate::stream::stages::guarded;
use std::sync::Arc;

/// Installs a handler for element-level failures raised upstream. The
/// failing element is skipped and the stream continues. Source failures are
/// still terminal.
pub struct OnErrorContinue<T> {
    upstream: Upstream<T>,
    handler: ContinueHandler,
}

impl<T> OnErrorContinue<T> {
    pub fn new(upstream: BoxStage<T>, handler: ContinueHandler) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            handler,
        }
    }
}

impl<T: Send> Stage<T> for OnErrorContinue<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        let upstream = &mut self.upstream;
        cx.with_continue_handler(&self.handler, |cx| upstream.pull(cx))
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        let upstream = &mut self.upstream;
        cx.with_continue_handler(&self.handler, |cx| upstream.pump(cx))
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

enum ReturnState<T> {
    Running,
    /// Upstream failed while there was no demand; the fallback waits.
    Fallback(T),
    Done,
}

/// Replaces an error with one fallback value followed by `Complete`.
pub struct OnErrorReturn<T> {
    upstream: Upstream<T>,
    fallback: Option<T>,
    state: ReturnState<T>,
}

impl<T> OnErrorReturn<T> {
    pub fn new(upstream: BoxStage<T>, fallback: T) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            fallback: Some(fallback),
            state: ReturnState::Running,
        }
    }
}

impl<T: Send> Stage<T> for OnErrorReturn<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        match std::mem::replace(&mut self.state, ReturnState::Done) {
            ReturnState::Fallback(v) => return Step::Ready(Signal::Next(v)),
            ReturnState::Done => return Step::Ready(Signal::Complete),
            ReturnState::Running => self.state = ReturnState::Running,
        }
        match self.upstream.pull(cx) {
            Step::Ready(Signal::Error(e)) => {
                tracing::debug!("{}: replacing error with fallback: {}", cx.subscription_id(), e);
                self.state = ReturnState::Done;
                match self.fallback.take() {
                    Some(v) => Step::Ready(Signal::Next(v)),
                    None => Step::Ready(Signal::Complete),
                }
            }
            other => other,
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        match &self.state {
            ReturnState::Fallback(_) => return Idle::Wait(None),
            ReturnState::Done => return Idle::Terminated(Terminal::Complete),
            ReturnState::Running => {}
        }
        match self.upstream.pump(cx) {
            Idle::Terminated(Terminal::Error(e)) => {
                tracing::debug!("{}: replacing error with fallback: {}", cx.subscription_id(), e);
                match self.fallback.take() {
                    Some(v) => {
                        self.state = ReturnState::Fallback(v);
                        Idle::Wait(None)
                    }
                    None => {
                        self.state = ReturnState::Done;
                        Idle::Terminated(Terminal::Complete)
                    }
                }
            }
            other => other,
        }
    }

    fn cancel(&mut self) {
        self.state = ReturnState::Done;
        self.upstream.cancel();
    }
}

/// Switches to a fallback stream built from the error.
pub struct OnErrorResume<T, F> {
    upstream: Upstream<T>,
    resume: Arc<F>,
    fallback: Option<Upstream<T>>,
}

impl<T, F> OnErrorResume<T, F> {
    pub fn new(upstream: BoxStage<T>, resume: Arc<F>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            resume,
            fallback: None,
        }
    }
}

impl<T, F> OnErrorResume<T, F>
where
    T: Send + 'static,
    F: Fn(StreamError) -> Flux<T> + Send + Sync,
{
    /// Build the fallback chain, or the error to deliver if that fails.
    fn switch(&mut self, error: StreamError, cx: &mut StageContext) -> Option<StreamError> {
        tracing::debug!("{}: resuming after error: {}", cx.subscription_id(), error);
        let resume = &self.resume;
        match guarded(|| resume(error)) {
            Ok(flux) => {
                self.fallback = Some(Upstream::new(flux.instantiate(cx)));
                None
            }
            Err(e) => Some(e),
        }
    }
}

impl<T, F> Stage<T> for OnErrorResume<T, F>
where
    T: Send + 'static,
    F: Fn(StreamError) -> Flux<T> + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        if let Some(fallback) = &mut self.fallback {
            return fallback.pull(cx);
        }
        match self.upstream.pull(cx) {
            Step::Ready(Signal::Error(e)) => match self.switch(e, cx) {
                None => self.pull(cx),
                Some(e) => Step::Ready(Signal::Error(e)),
            },
            other => other,
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        if let Some(fallback) = &mut self.fallback {
            return fallback.pump(cx);
        }
        match self.upstream.pump(cx) {
            Idle::Terminated(Terminal::Error(e)) => match self.switch(e, cx) {
                None => self.pump(cx),
                Some(e) => Idle::Terminated(Terminal::Error(e)),
            },
            other => other,
        }
    }

    fn cancel(&mut self) {
        if let Some(fallback) = &mut self.fallback {
            fallback.cancel();
        }
        self.upstream.cancel();
    }
}

/// Replaces the error value. Still terminal.
pub struct OnErrorMap<T, F> {
    upstream: Upstream<T>,
    map: Arc<F>,
}

impl<T, F> OnErrorMap<T, F> {
    pub fn new(upstream: BoxStage<T>, map: Arc<F>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            map,
        }
    }

    fn convert(&self, error: StreamError) -> StreamError
    where
        F: Fn(StreamError) -> StreamError,
    {
        let map = &self.map;
        guarded(|| map(error)).unwrap_or_else(|panicked| panicked)
    }
}

impl<T, F> Stage<T> for OnErrorMap<T, F>
where
    T: Send,
    F: Fn(StreamError) -> StreamError + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        match self.upstream.pull(cx) {
            Step::Ready(Signal::Error(e)) => Step::Ready(Signal::Error(self.convert(e))),
            other => other,
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        match self.upstream.pump(cx) {
            Idle::Terminated(Terminal::Error(e)) => {
                Idle::Terminated(Terminal::Error(self.convert(e)))
            }
            other => other,
        }
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}
