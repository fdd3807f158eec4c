//! Time-shifting stage.

use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{BoxStage, Idle, Stage, StageContext, Step, Upstream};
use crate::stream::stages::{next_value, pump_while_held};
use std::time::Duration;

/// Re-emits each value `delay` after it was received from upstream.
///
/// Holds at most one value, so upstream is only pulled once the held value
/// has been delivered and order is preserved. While a value is held upstream
/// is pumped, so an `on_backpressure_*` stage above keeps applying its policy
/// to everything produced in the meantime. An upstream error discards the
/// held value.
pub struct DelayElements<T> {
    upstream: Upstream<T>,
    delay: Duration,
    held: Option<(T, Duration)>,
}

impl<T> DelayElements<T> {
    pub fn new(upstream: BoxStage<T>, delay: Duration) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            delay,
            held: None,
        }
    }
}

impl<T: Send> Stage<T> for DelayElements<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        if self.held.is_none() {
            let value = match next_value(self.upstream.pull(cx)) {
                Ok(v) => v,
                Err(step) => return step,
            };
            self.held = Some((value, cx.now() + self.delay));
        }
        match self.held.take() {
            Some((value, due)) if cx.now() >= due => {
                cx.mark_emitted(due);
                Step::Ready(Signal::Next(value))
            }
            Some((value, due)) => match pump_while_held(&mut self.upstream, cx, Some(due)) {
                Ok(wake) => {
                    self.held = Some((value, due));
                    Step::Pending(wake)
                }
                Err(e) => Step::Ready(Signal::Error(e)),
            },
            None => Step::Pending(None),
        }
    }

    fn pump(&mut self, cx: &mut StageContext) -> Idle {
        if self.held.is_none() {
            return self.upstream.pump(cx);
        }
        match pump_while_held(&mut self.upstream, cx, None) {
            Ok(wake) => Idle::Wait(wake),
            Err(e) => {
                self.held = None;
                Idle::Terminated(Terminal::Error(e))
            }
        }
    }

    fn cancel(&mut self) {
        self.held = None;
        self.upstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::stage::test_support::context;
    use crate::stream::stages::SourceStage;

    #[test]
    fn test_each_value_waits_its_delay() {
        let (mut cx, clock) = context();
        let source: BoxStage<i32> = Box::new(SourceStage::finite(vec![1, 2].into_iter()));
        let mut stage = DelayElements::new(source, Duration::from_millis(100));

        assert_eq!(
            stage.pull(&mut cx),
            Step::Pending(Some(Duration::from_millis(100)))
        );
        clock.advance(Duration::from_millis(99));
        assert!(matches!(stage.pull(&mut cx), Step::Pending(_)));
        clock.advance(Duration::from_millis(1));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(1)));

        assert_eq!(
            stage.pull(&mut cx),
            Step::Pending(Some(Duration::from_millis(200)))
        );
        clock.advance(Duration::from_millis(100));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(2)));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Complete));
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let (mut cx, _clock) = context();
        let source: BoxStage<i32> = Box::new(SourceStage::finite(vec![7].into_iter()));
        let mut stage = DelayElements::new(source, Duration::ZERO);
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(7)));
    }

    #[test]
    fn test_held_value_keeps_upstream_draining() {
        use crate::config::BackpressurePolicy;
        use crate::stream::stages::BackpressureStage;

        let (mut cx, clock) = context();
        let source: BoxStage<i32> = Box::new(SourceStage::finite(1..=5));
        let dropping: BoxStage<i32> =
            Box::new(BackpressureStage::new(source, BackpressurePolicy::Drop));
        let mut stage = DelayElements::new(dropping, Duration::from_millis(100));

        // 1 is held; 2..=5 arrive while it waits and are dropped.
        assert_eq!(
            stage.pull(&mut cx),
            Step::Pending(Some(Duration::from_millis(100)))
        );
        clock.advance(Duration::from_millis(100));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Next(1)));
        assert_eq!(stage.pull(&mut cx), Step::Ready(Signal::Complete));
    }

    #[test]
    fn test_upstream_error_while_holding() {
        use crate::config::{BackpressurePolicy, OverflowStrategy};
        use crate::stream::error::StreamError;
        use crate::stream::stages::BackpressureStage;

        let (mut cx, _clock) = context();
        let source: BoxStage<i32> = Box::new(SourceStage::finite(1..=5));
        let buffered: BoxStage<i32> = Box::new(BackpressureStage::new(
            source,
            BackpressurePolicy::buffer(2, OverflowStrategy::Error),
        ));
        let mut stage = DelayElements::new(buffered, Duration::from_millis(100));

        assert_eq!(
            stage.pull(&mut cx),
            Step::Ready(Signal::Error(StreamError::BufferOverflow { capacity: 2 }))
        );
    }
}
