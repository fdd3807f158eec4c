//! Operator stages.
//!
//! Each stage wraps its upstream in an [`Upstream`] and implements
//! [`Stage`]. `Flux` builds them through its operator methods; they are
//! public so custom operators can reuse them.

pub mod backpressure;
pub mod combine;
pub mod delay;
pub mod flatten;
pub mod map;
pub mod recover;
pub mod skip;
pub mod source;
pub mod window;

pub use backpressure::BackpressureStage;
pub use combine::Zip;
pub use delay::DelayElements;
pub use flatten::{ConcatMap, FlatMap, DEFAULT_MAX_CONCURRENCY};
pub use map::{DoOnNext, Filter, Log, Map, TryMap};
pub use recover::{OnErrorContinue, OnErrorMap, OnErrorResume, OnErrorReturn};
pub use skip::{Skip, SkipFor, SkipUntil, SkipWhile, Take};
pub use source::{Generator, SourceStage, Ticker};
pub use window::{BufferCount, BufferTimespan};

use crate::stream::error::{panic_message, StreamError};
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{earliest, Idle, StageContext, Step, Upstream};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Split a step into its value, or the step to forward unchanged.
#[inline]
pub(crate) fn next_value<T, U>(step: Step<T>) -> Result<T, Step<U>> {
    match step {
        Step::Ready(Signal::Next(v)) => Ok(v),
        Step::Ready(Signal::Complete) => Err(Step::Ready(Signal::Complete)),
        Step::Ready(Signal::Error(e)) => Err(Step::Ready(Signal::Error(e))),
        Step::Pending(wake) => Err(Step::Pending(wake)),
    }
}

/// Run a user callback, turning a panic into `TransformFailure`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, StreamError> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| StreamError::TransformFailure(panic_message(payload.as_ref())))
}

/// Handle an element-level failure.
///
/// Returns `None` when `on_error_continue` consumed it and the element should
/// be skipped. Otherwise upstream is cancelled and the error step returned.
pub(crate) fn element_failure<T, U>(
    upstream: &mut Upstream<T>,
    cx: &mut StageContext,
    error: StreamError,
    element: Option<&dyn Any>,
) -> Option<Step<U>> {
    if cx.try_continue(&error, element) {
        tracing::trace!("{}: element failure continued: {}", cx.subscription_id(), error);
        return None;
    }
    upstream.cancel();
    Some(Step::Ready(Signal::Error(error)))
}

/// Pump `upstream` while the calling stage holds a value it cannot pass on.
///
/// Keeps a backpressure controller further up draining while the holding
/// stage waits on a timer or an inner source. Returns the earliest of `wake`
/// and the upstream's own wake time, or the upstream error, which the caller
/// must deliver in place of whatever it is holding.
pub(crate) fn pump_while_held<T>(
    upstream: &mut Upstream<T>,
    cx: &mut StageContext,
    wake: Option<Duration>,
) -> Result<Option<Duration>, StreamError> {
    match upstream.pump(cx) {
        Idle::Wait(upstream_wake) => Ok(earliest(wake, upstream_wake)),
        Idle::Terminated(Terminal::Complete) => Ok(wake),
        Idle::Terminated(Terminal::Error(e)) => Err(e),
    }
}
