//! Pairwise combination of two streams.

use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{earliest, BoxStage, Idle, Stage, StageContext, Step, Upstream};
use crate::stream::error::StreamError;
use crate::stream::stages::{guarded, pump_while_held};
use std::sync::Arc;
use std::time::Duration;

/// Pairs values by index. Completes as soon as either side completes; an
/// unpaired value from the other side is discarded.
///
/// A side whose value waits for its partner is pumped, never pulled, so an
/// `on_backpressure_*` stage on the faster side keeps applying its policy.
pub struct Zip<A, B, F> {
    left: Upstream<A>,
    right: Upstream<B>,
    held_left: Option<A>,
    held_right: Option<B>,
    combiner: Arc<F>,
}

impl<A, B, F> Zip<A, B, F> {
    pub fn new(left: BoxStage<A>, right: BoxStage<B>, combiner: Arc<F>) -> Self {
        Self {
            left: Upstream::new(left),
            right: Upstream::new(right),
            held_left: None,
            held_right: None,
            combiner,
        }
    }

    fn cancel_both(&mut self) {
        self.held_left = None;
        self.held_right = None;
        self.left.cancel();
        self.right.cancel();
    }

    /// Pump every side that already holds a value.
    fn pump_held(&mut self, cx: &mut StageContext) -> Result<Option<Duration>, StreamError> {
        let mut wake = None;
        if self.held_left.is_some() {
            wake = pump_while_held(&mut self.left, cx, wake)?;
        }
        if self.held_right.is_some() {
            wake = pump_while_held(&mut self.right, cx, wake)?;
        }
        Ok(wake)
    }
}

/// Pull one side into its slot. `Err` carries the terminal step to return.
fn fill<T, O>(
    side: &mut Upstream<T>,
    slot: &mut Option<T>,
    cx: &mut StageContext,
) -> Result<Option<Duration>, Step<O>> {
    if slot.is_some() {
        return Ok(None);
    }
    match side.pull(cx) {
        Step::Ready(Signal::Next(v)) => {
            *slot = Some(v);
            Ok(None)
        }
        Step::Ready(Signal::Complete) => Err(Step::Ready(Signal::Complete)),
        Step::Ready(Signal::Error(e)) => Err(Step::Ready(Signal::Error(e))),
        Step::Pending(wake) => Ok(wake),
    }
}

impl<A, B, O, F> Stage<O> for Zip<A, B, F>
where
    A: Send,
    B: Send,
    F: Fn(A, B) -> O + Send + Sync,
{
    fn pull(&mut self, cx: &mut StageContext) -> Step<O> {
        let left_wake = match fill(&mut self.left, &mut self.held_left, cx) {
            Ok(wake) => wake,
            Err(step) => {
                self.cancel_both();
                return step;
            }
        };
        let right_wake = match fill(&mut self.right, &mut self.held_right, cx) {
            Ok(wake) => wake,
            Err(step) => {
                self.cancel_both();
                return step;
            }
        };
        match (self.held_left.take(), self.held_right.take()) {
            (Some(a), Some(b)) => {
                let combiner = &self.combiner;
                match guarded(|| combiner(a, b)) {
                    Ok(out) => Step::Ready(Signal::Next(out)),
                    Err(e) => {
                        self.cancel_both();
                        Step::Ready(Signal::Error(e))
                    }
                }
            }
            (a, b) => {
                self.held_left = a;
                self.held_right = b;
                match self.pump_held(cx) {
                    Ok(held_wake) => {
                        Step::Pending(earliest(held_wake, earliest(left_wake, right_wake)))
                    }
                    Err(e) => {
                        self.cancel_both();
                        Step::Ready(Signal::Error(e))
                    }
                }
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        let mut wake = None;
        if self.held_left.is_none() {
            match self.left.pump(cx) {
                Idle::Terminated(terminal) => {
                    self.cancel_both();
                    return Idle::Terminated(terminal);
                }
                Idle::Wait(w) => wake = earliest(wake, w),
            }
        }
        if self.held_right.is_none() {
            match self.right.pump(cx) {
                Idle::Terminated(terminal) => {
                    self.cancel_both();
                    return Idle::Terminated(terminal);
                }
                Idle::Wait(w) => wake = earliest(wake, w),
            }
        }
        match self.pump_held(cx) {
            Ok(held_wake) => Idle::Wait(earliest(wake, held_wake)),
            Err(e) => {
                self.cancel_both();
                Idle::Terminated(Terminal::Error(e))
            }
        }
    }

    fn cancel(&mut self) {
        self.cancel_both();
    }
}
