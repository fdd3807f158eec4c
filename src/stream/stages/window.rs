//! Windowing stages: collect values into lists by count or by time.

use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{earliest, BoxStage, Idle, Stage, StageContext, Step, Upstream};
use std::mem;
use std::time::Duration;

/// Emits lists of `size` values; a trailing partial list is flushed before
/// `Complete`. Buffered values are discarded on error.
pub struct BufferCount<T> {
    upstream: Upstream<T>,
    size: usize,
    buf: Vec<T>,
}

impl<T> BufferCount<T> {
    pub fn new(upstream: BoxStage<T>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            upstream: Upstream::new(upstream),
            size,
            buf: Vec::with_capacity(size),
        }
    }
}

impl<T: Send> Stage<Vec<T>> for BufferCount<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<Vec<T>> {
        loop {
            match self.upstream.pull(cx) {
                Step::Ready(Signal::Next(v)) => {
                    self.buf.push(v);
                    if self.buf.len() >= self.size {
                        let full = mem::replace(&mut self.buf, Vec::with_capacity(self.size));
                        return Step::Ready(Signal::Next(full));
                    }
                }
                Step::Ready(Signal::Complete) => {
                    if self.buf.is_empty() {
                        return Step::Ready(Signal::Complete);
                    }
                    return Step::Ready(Signal::Next(mem::take(&mut self.buf)));
                }
                Step::Ready(Signal::Error(e)) => {
                    self.buf.clear();
                    return Step::Ready(Signal::Error(e));
                }
                Step::Pending(wake) => return Step::Pending(wake),
            }
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        match self.upstream.pump(cx) {
            Idle::Terminated(Terminal::Complete) if !self.buf.is_empty() => Idle::Wait(None),
            other => other,
        }
    }

    fn cancel(&mut self) {
        self.buf.clear();
        self.upstream.cancel();
    }
}

/// First multiple of `period` after `deadline` that lies beyond `now`.
fn next_deadline(deadline: Duration, now: Duration, period: Duration) -> Duration {
    let period_ns = period.as_nanos().max(1);
    let behind = now.saturating_sub(deadline).as_nanos();
    let periods = behind / period_ns + 1;
    let step = u64::try_from(periods * period_ns).unwrap_or(u64::MAX);
    deadline.saturating_add(Duration::from_nanos(step))
}

/// Emits the values collected during each `window`, possibly an empty list.
///
/// Windows that elapse while the consumer has no demand are merged into the
/// next flush. A non-empty remainder is flushed before `Complete`.
pub struct BufferTimespan<T> {
    upstream: Upstream<T>,
    window: Duration,
    next_flush: Duration,
    buf: Vec<T>,
}

impl<T> BufferTimespan<T> {
    pub fn new(upstream: BoxStage<T>, window: Duration, cx: &StageContext) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            window,
            next_flush: cx.now() + window,
            buf: Vec::new(),
        }
    }

    fn finish(&mut self) -> Step<Vec<T>> {
        if !self.buf.is_empty() {
            return Step::Ready(Signal::Next(mem::take(&mut self.buf)));
        }
        match self.upstream.terminal() {
            Some(Terminal::Error(e)) => Step::Ready(Signal::Error(e.clone())),
            _ => Step::Ready(Signal::Complete),
        }
    }

    /// Close the current window. `carry` opens the next one.
    fn flush(&mut self, cx: &mut StageContext, carry: Option<T>) -> Vec<T> {
        let closed_at = self.next_flush;
        self.next_flush = next_deadline(self.next_flush, cx.now(), self.window);
        cx.mark_emitted(closed_at);
        let window = mem::take(&mut self.buf);
        self.buf.extend(carry);
        window
    }
}

impl<T: Send> Stage<Vec<T>> for BufferTimespan<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<Vec<T>> {
        let mut budget = cx.drain_batch();
        loop {
            if self.upstream.is_done() {
                return self.finish();
            }
            // Collect whatever upstream has ready before deciding to flush.
            let wake = match self.upstream.pull(cx) {
                Step::Ready(Signal::Next(v)) => {
                    // Windows are half-open: a value emitted on the boundary
                    // starts the next window.
                    if cx.emitted_at() >= self.next_flush {
                        return Step::Ready(Signal::Next(self.flush(cx, Some(v))));
                    }
                    self.buf.push(v);
                    budget -= 1;
                    if budget > 0 {
                        continue;
                    }
                    Some(cx.now())
                }
                Step::Ready(Signal::Complete) => continue,
                Step::Ready(Signal::Error(e)) => {
                    self.buf.clear();
                    return Step::Ready(Signal::Error(e));
                }
                Step::Pending(wake) => wake,
            };
            if cx.now() >= self.next_flush {
                return Step::Ready(Signal::Next(self.flush(cx, None)));
            }
            return Step::Pending(earliest(wake, Some(self.next_flush)));
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        for _ in 0..cx.drain_batch() {
            if self.upstream.is_done() {
                break;
            }
            match self.upstream.pull(cx) {
                Step::Ready(Signal::Next(v)) => self.buf.push(v),
                Step::Ready(_) => break,
                Step::Pending(wake) => return Idle::Wait(wake),
            }
        }
        match self.upstream.terminal() {
            Some(Terminal::Error(e)) => {
                self.buf.clear();
                Idle::Terminated(Terminal::Error(e.clone()))
            }
            Some(Terminal::Complete) if self.buf.is_empty() => {
                Idle::Terminated(Terminal::Complete)
            }
            Some(Terminal::Complete) => Idle::Wait(None),
            None => Idle::Wait(Some(cx.now())),
        }
    }

    fn cancel(&mut self) {
        self.buf.clear();
        self.upstream.cancel();
    }
}
