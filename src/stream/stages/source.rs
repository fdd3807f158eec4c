//! Source stages: the head of every chain.
//!
//! A source is rebuilt for every subscription, so two subscribers never
//! share a cursor.

use crate::stream::error::StreamError;
use crate::stream::signal::{Signal, Terminal};
use crate::stream::stage::{Idle, Stage, StageContext, Step};
use std::iter::Peekable;
use std::sync::Arc;
use std::time::Duration;

/// Index-based generator. `Ok(None)` completes the stream.
pub type Generator<T> = Arc<dyn Fn(u64) -> Result<Option<T>, StreamError> + Send + Sync>;

/// Tick function of a periodic source.
pub type Ticker<T> = Arc<dyn Fn(u64) -> T + Send + Sync>;

type BoxIter<T> = Box<dyn Iterator<Item = T> + Send>;

pub enum SourceStage<T> {
    /// Values of an iterator, then `Complete`.
    Finite(Peekable<BoxIter<T>>),
    /// `generator(0)`, `generator(1)`, ... until it returns `None` or fails.
    Generated { generator: Generator<T>, index: u64 },
    /// One value every `period`, starting at `next_due`. Never completes.
    Periodic {
        ticker: Ticker<T>,
        period: Duration,
        next_due: Duration,
        index: u64,
    },
    /// At most one value.
    Single(Option<T>),
    Failed(StreamError),
    Done,
}

impl<T: Send + 'static> SourceStage<T> {
    pub fn finite<I>(iter: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        let boxed: BoxIter<T> = Box::new(iter);
        SourceStage::Finite(boxed.peekable())
    }

    pub fn generated(generator: Generator<T>) -> Self {
        SourceStage::Generated {
            generator,
            index: 0,
        }
    }

    /// First tick at `cx.now() + initial_delay`.
    pub fn periodic(
        cx: &StageContext,
        ticker: Ticker<T>,
        initial_delay: Duration,
        period: Duration,
    ) -> Self {
        SourceStage::Periodic {
            ticker,
            period,
            next_due: cx.now() + initial_delay,
            index: 0,
        }
    }
}

impl<T: Send> Stage<T> for SourceStage<T> {
    fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        let step = match self {
            SourceStage::Finite(iter) => match iter.next() {
                Some(v) => return Step::Ready(Signal::Next(v)),
                None => Step::Ready(Signal::Complete),
            },
            SourceStage::Generated { generator, index } => match generator(*index) {
                Ok(Some(v)) => {
                    *index += 1;
                    return Step::Ready(Signal::Next(v));
                }
                Ok(None) => Step::Ready(Signal::Complete),
                Err(e) => Step::Ready(Signal::Error(e)),
            },
            SourceStage::Periodic {
                ticker,
                period,
                next_due,
                index,
            } => {
                let now = cx.now();
                if now < *next_due {
                    return Step::Pending(Some(*next_due));
                }
                let value = ticker(*index);
                cx.mark_emitted(*next_due);
                *index += 1;
                *next_due += *period;
                return Step::Ready(Signal::Next(value));
            }
            SourceStage::Single(value) => match value.take() {
                Some(v) => return Step::Ready(Signal::Next(v)),
                None => Step::Ready(Signal::Complete),
            },
            SourceStage::Failed(e) => Step::Ready(Signal::Error(e.clone())),
            SourceStage::Done => Step::Ready(Signal::Complete),
        };
        *self = SourceStage::Done;
        step
    }

    fn pump(&mut self, _cx: &mut StageContext) -> Idle {
        if let SourceStage::Finite(iter) = self {
            if iter.peek().is_some() {
                return Idle::Wait(None);
            }
            *self = SourceStage::Done;
            return Idle::Terminated(Terminal::Complete);
        }
        match self {
            SourceStage::Single(None) | SourceStage::Done => {
                *self = SourceStage::Done;
                Idle::Terminated(Terminal::Complete)
            }
            SourceStage::Failed(e) => Idle::Terminated(Terminal::Error(e.clone())),
            _ => Idle::Wait(None),
        }
    }

    fn cancel(&mut self) {
        *self = SourceStage::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::stage::test_support::{context, drain};

    #[test]
    fn test_finite_source() {
        let (mut cx, _clock) = context();
        let mut source = SourceStage::finite(1..=3);
        let (values, last) = drain(&mut source, &mut cx);
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(last, Step::Ready(Signal::Complete));
    }

    #[test]
    fn test_empty_source_terminates_without_demand() {
        let (mut cx, _clock) = context();
        let mut source = SourceStage::finite(std::iter::empty::<i32>());
        assert_eq!(source.pump(&mut cx), Idle::Terminated(Terminal::Complete));

        let mut single = SourceStage::<i32>::Single(None);
        assert_eq!(single.pump(&mut cx), Idle::Terminated(Terminal::Complete));

        let mut nonempty = SourceStage::finite(0..1);
        assert_eq!(nonempty.pump(&mut cx), Idle::Wait(None));
    }

    #[test]
    fn test_generated_source_fails_on_fifth() {
        let (mut cx, _clock) = context();
        let generator: Generator<u64> = Arc::new(|i: u64| {
            if i == 4 {
                Err(StreamError::upstream("fifth emission"))
            } else {
                Ok(Some(i + 1))
            }
        });
        let mut source = SourceStage::generated(generator);
        let (values, last) = drain(&mut source, &mut cx);
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(
            last,
            Step::Ready(Signal::Error(StreamError::upstream("fifth emission")))
        );
        assert_eq!(source.pull(&mut cx), Step::Ready(Signal::Complete));
    }

    #[test]
    fn test_periodic_source_waits_and_catches_up() {
        let (mut cx, clock) = context();
        let ticker: Ticker<u64> = Arc::new(|i: u64| i);
        let mut source =
            SourceStage::periodic(&cx, ticker, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(source.pull(&mut cx), Step::Pending(Some(Duration::from_secs(1))));

        clock.advance(Duration::from_millis(2500));
        assert_eq!(source.pull(&mut cx), Step::Ready(Signal::Next(0)));
        assert_eq!(cx.emitted_at(), Duration::from_secs(1));
        assert_eq!(source.pull(&mut cx), Step::Ready(Signal::Next(1)));
        assert_eq!(cx.emitted_at(), Duration::from_secs(2));
        assert_eq!(source.pull(&mut cx), Step::Pending(Some(Duration::from_secs(3))));
    }
}
