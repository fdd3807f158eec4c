//! Stages that drop a prefix of the stream, or cut it short.

use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{BoxStage, Idle, Stage, StageContext, Step, Upstream};
use crate::stream::stages::{element_failure, guarded, next_value};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Drops the first `n` values.
pub struct Skip<T> {
    upstream: Upstream<T>,
    remaining: u64,
}

impl<T> Skip<T> {
    pub fn new(upstream: BoxStage<T>, n: u64) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            remaining: n,
        }
    }
}

impl<T: Send> Stage<T> for Skip<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        loop {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            if self.remaining == 0 {
                return Step::Ready(Signal::Next(value));
            }
            self.remaining -= 1;
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

/// Drops values while the predicate holds; forwards everything from the
/// first value that fails it.
pub struct SkipWhile<T, P> {
    upstream: Upstream<T>,
    predicate: Arc<P>,
    open: bool,
}

impl<T, P> SkipWhile<T, P> {
    pub fn new(upstream: BoxStage<T>, predicate: Arc<P>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            predicate,
            open: false,
        }
    }
}

impl<T, P> Stage<T> for SkipWhile<T, P>
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
            if self.open {
                return Step::Ready(Signal::Next(value));
            }
            let predicate = &self.predicate;
            match guarded(|| predicate(&value)) {
                Ok(true) => {}
                Ok(false) => {
                    self.open = true;
                    return Step::Ready(Signal::Next(value));
                }
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

/// Drops values until the predicate first holds. The matching value is
/// forwarded.
pub struct SkipUntil<T, P> {
    upstream: Upstream<T>,
    predicate: Arc<P>,
    open: bool,
}

impl<T, P> SkipUntil<T, P> {
    pub fn new(upstream: BoxStage<T>, predicate: Arc<P>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            predicate,
            open: false,
        }
    }
}

impl<T, P> Stage<T> for SkipUntil<T, P>
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
            if self.open {
                return Step::Ready(Signal::Next(value));
            }
            let predicate = &self.predicate;
            match guarded(|| predicate(&value)) {
                Ok(false) => {}
                Ok(true) => {
                    self.open = true;
                    return Step::Ready(Signal::Next(value));
                }
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

/// Drops every value observed before `started + duration`.
pub struct SkipFor<T> {
    upstream: Upstream<T>,
    until: Duration,
}

impl<T> SkipFor<T> {
    /// The window starts when the stage is instantiated, i.e. at subscribe time.
    pub fn new(upstream: BoxStage<T>, duration: Duration, cx: &StageContext) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            until: cx.now() + duration,
        }
    }
}

impl<T: Send> Stage<T> for SkipFor<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        loop {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            if cx.emitted_at() >= self.until {
                return Step::Ready(Signal::Next(value));
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

/// Forwards the first `n` values, then completes and cancels upstream.
pub struct Take<T> {
    upstream: Upstream<T>,
    remaining: u64,
}

impl<T> Take<T> {
    pub fn new(upstream: BoxStage<T>, n: u64) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            remaining: n,
        }
    }
}

impl<T: Send> Stage<T> for Take<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        if self.remaining == 0 {
            self.upstream.cancel();
            return Step::Ready(Signal::Complete);
        }
        let step = self.upstream.pull(cx);
        if let Step::Ready(Signal::Next(_)) = step {
            self.remaining -= 1;
        }
        step
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        if self.remaining == 0 {
            self.upstream.cancel();
            return Idle::Terminated(Terminal::Complete);
        }
        self.upstream.pump(cx)
    }

    fn cancel(&mut self) {
        self.upstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::stage::test_support::{context, drain};
    use crate::stream::stages::SourceStage;

    fn range(n: i32) -> BoxStage<i32> {
        Box::new(SourceStage::finite(1..=n))
    }

    #[test]
    fn test_skip() {
        let (mut cx, _clock) = context();
        let (values, _) = drain(&mut Skip::new(range(5), 2), &mut cx);
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_skip_more_than_available() {
        let (mut cx, _clock) = context();
        let (values, last) = drain(&mut Skip::new(range(3), 10), &mut cx);
        assert!(values.is_empty());
        assert_eq!(last, Step::Ready(Signal::Complete));
    }

    #[test]
    fn test_skip_while_stays_open() {
        let (mut cx, _clock) = context();
        let source: BoxStage<i32> = Box::new(SourceStage::finite(vec![1, 2, 5, 1, 2].into_iter()));
        let mut stage = SkipWhile::new(source, Arc::new(|v: &i32| *v < 3));
        let (values, _) = drain(&mut stage, &mut cx);
        assert_eq!(values, vec![5, 1, 2]);
    }

    #[test]
    fn test_skip_until_is_inclusive() {
        let (mut cx, _clock) = context();
        let mut stage = SkipUntil::new(range(20), Arc::new(|v: &i32| v % 5 == 0));
        let (values, _) = drain(&mut stage, &mut cx);
        assert_eq!(values, (5..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_skip_for_uses_subscribe_time() {
        let (mut cx, clock) = context();
        clock.advance(Duration::from_secs(10));
        let ticker: crate::stream::stages::Ticker<u64> = Arc::new(|i: u64| i);
        let source: BoxStage<u64> = Box::new(SourceStage::periodic(
            &cx,
            ticker,
            Duration::from_secs(1),
            Duration::from_secs(1),
        ));
        let mut stage = SkipFor::new(source, Duration::from_secs(3), &cx);

        for _ in 0..2 {
            clock.advance(Duration::from_secs(1));
            assert!(matches!(stage.pull(&mut cx), Step::Pending(Some(_))));
        }
        clock.advance(Duration::from_secs(1));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(2)));
    }

    #[test]
    fn test_skip_for_judges_overdue_ticks_by_due_time() {
        let (mut cx, clock) = context();
        let ticker: crate::stream::stages::Ticker<u64> = Arc::new(|i: u64| i);
        let source: BoxStage<u64> = Box::new(SourceStage::periodic(
            &cx,
            ticker,
            Duration::from_millis(100),
            Duration::from_millis(100),
        ));
        let mut stage = SkipFor::new(source, Duration::from_millis(350), &cx);

        // First pull long after the window closed: ticks due inside it are
        // still skipped.
        clock.advance(Duration::from_secs(1));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(3)));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(4)));
    }

    #[test]
    fn test_take_completes_and_cancels() {
        let (mut cx, _clock) = context();
        let mut stage = Take::new(range(100), 3);
        let (values, last) = drain(&mut stage, &mut cx);
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(last, Step::Ready(Signal::Complete));

        let mut stage = Take::new(range(100), 1);
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(1)));
        assert_eq!(stage.pump(&mut cx), Idle::Terminated(Terminal::Complete));
    }
}
