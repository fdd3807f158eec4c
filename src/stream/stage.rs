//! The pull protocol every operator implements.
//!
//! A driver owns one chain of boxed [`Stage`]s per subscription. While the
//! consumer has demand it calls [`Stage::pull`] on the last stage, which pulls
//! from its upstream and so on back to the source. While there is no demand it
//! calls [`Stage::pump`] instead so stages that must keep consuming (the
//! backpressure controller) can drain their upstream.
//!
//! Stages never block or sleep. A stage that cannot produce yet returns
//! [`Step::Pending`] with the clock time it next wants to be polled, or `None`
//! when only an external notification (new demand, a channel hand-off) can
//! make progress.

use crate::runtime::clock::{Clock, Parker};
use crate::stream::error::StreamError;
use crate::stream::id::SubscriptionId;
use crate::stream::signal::{Signal, Terminal};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of pulling one stage.
#[derive(Debug, PartialEq)]
pub enum Step<T> {
    Ready(Signal<T>),
    /// Nothing available. Poll again at the given clock time, or after a notify.
    Pending(Option<Duration>),
}

/// Outcome of pumping a stage while its consumer has no demand.
#[derive(Debug, Clone, PartialEq)]
pub enum Idle {
    Wait(Option<Duration>),
    /// The stage terminated without needing demand.
    Terminated(Terminal),
}

/// A pull-based operator instance. One instance belongs to one subscription.
pub trait Stage<T>: Send {
    /// Produce the next signal if one is available. Called only while the
    /// consumer has outstanding demand.
    fn pull(&mut self, cx: &mut StageContext) -> Step<T>;

    /// Make progress without producing a `Next`.
    fn pump(&mut self, _cx: &mut StageContext) -> Idle {
        Idle::Wait(None)
    }

    /// Release upstream resources. Nothing is pulled afterwards.
    fn cancel(&mut self) {}
}

pub type BoxStage<T> = Box<dyn Stage<T>>;

/// Callback invoked for an element-level failure instead of terminating.
pub type ContinueHandler = Arc<dyn Fn(&StreamError, Option<&dyn Any>) + Send + Sync>;

/// Per-subscription environment handed to every stage call.
pub struct StageContext {
    id: SubscriptionId,
    clock: Arc<dyn Clock>,
    parker: Arc<Parker>,
    drain_batch: usize,
    continue_handler: Option<ContinueHandler>,
    emitted_at: Option<Duration>,
}

impl StageContext {
    pub fn new(
        id: SubscriptionId,
        clock: Arc<dyn Clock>,
        parker: Arc<Parker>,
        drain_batch: usize,
    ) -> Self {
        Self {
            id,
            clock,
            parker,
            drain_batch: drain_batch.max(1),
            continue_handler: None,
            emitted_at: None,
        }
    }

    #[inline]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Parker of the driver owning this chain. Unpark it to get re-polled.
    pub fn parker(&self) -> &Arc<Parker> {
        &self.parker
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.id
    }

    pub fn drain_batch(&self) -> usize {
        self.drain_batch
    }

    /// Stamp the value being returned with the clock time it was produced at.
    ///
    /// Sources that catch up on overdue ticks, and stages that hold values,
    /// emit later than the value was due. Time-based operators downstream
    /// read the stamp through [`StageContext::emitted_at`].
    pub fn mark_emitted(&mut self, at: Duration) {
        self.emitted_at = Some(at);
    }

    /// Emission time of the value just pulled from upstream, or the current
    /// time when no stage stamped it.
    pub fn emitted_at(&self) -> Duration {
        self.emitted_at.unwrap_or_else(|| self.now())
    }

    pub(crate) fn clear_emitted(&mut self) {
        self.emitted_at = None;
    }

    /// Report an element-level failure.
    ///
    /// Returns true when a downstream `on_error_continue` consumed it; the
    /// caller then skips the element. Otherwise the caller terminates with
    /// the error.
    pub fn try_continue(&self, error: &StreamError, element: Option<&dyn Any>) -> bool {
        match &self.continue_handler {
            Some(handler) => {
                handler(error, element);
                true
            }
            None => false,
        }
    }

    /// Run `f` with `handler` installed, restoring the previous one afterwards.
    pub fn with_continue_handler<R>(
        &mut self,
        handler: &ContinueHandler,
        f: impl FnOnce(&mut StageContext) -> R,
    ) -> R {
        let previous = self.continue_handler.replace(Arc::clone(handler));
        let result = f(self);
        self.continue_handler = previous;
        result
    }

    /// Run `f` with element-level recovery disabled.
    pub fn without_continue_handler<R>(&mut self, f: impl FnOnce(&mut StageContext) -> R) -> R {
        let previous = self.continue_handler.take();
        let result = f(self);
        self.continue_handler = previous;
        result
    }
}

/// Earliest of two optional wake times.
pub fn earliest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Upstream wrapper that remembers the terminal so a finished stage is never
/// polled again.
pub struct Upstream<T> {
    stage: BoxStage<T>,
    terminal: Option<Terminal>,
}

impl<T> Upstream<T> {
    pub fn new(stage: BoxStage<T>) -> Self {
        Self {
            stage,
            terminal: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        if let Some(terminal) = &self.terminal {
            return Step::Ready(terminal.clone().into());
        }
        cx.clear_emitted();
        let step = self.stage.pull(cx);
        match &step {
            Step::Ready(Signal::Complete) => self.terminal = Some(Terminal::Complete),
            Step::Ready(Signal::Error(e)) => self.terminal = Some(Terminal::Error(e.clone())),
            _ => {}
        }
        step
    }

    pub fn pump(&mut self, cx: &mut StageContext) -> Idle {
        if let Some(terminal) = &self.terminal {
            return Idle::Terminated(terminal.clone());
        }
        let idle = self.stage.pump(cx);
        if let Idle::Terminated(terminal) = &idle {
            self.terminal = Some(terminal.clone());
        }
        idle
    }

    /// Cancel upstream unless it already terminated.
    pub fn cancel(&mut self) {
        if self.terminal.is_none() {
            self.stage.cancel();
            self.terminal = Some(Terminal::Complete);
        }
    }
}
