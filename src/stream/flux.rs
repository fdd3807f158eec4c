//! `Flux`: a lazily instantiated, restartable stream description.
//!
//! Chaining an operator wraps the stage factory once and appends a
//! [`StageDescriptor`] to the plan. Nothing runs until `subscribe`, which
//! builds a fresh stage chain for that subscription only.

use crate::config::{BackpressurePolicy, OverflowStrategy};
use crate::runtime::clock::Parker;
use crate::runtime::scheduler::Scheduler;
use crate::stream::bridge;
use crate::stream::driver::Driver;
use crate::stream::error::StreamError;
use crate::stream::plan::{StageDescriptor, StageKind};
use crate::stream::stage::{BoxStage, ContinueHandler, StageContext};
use crate::stream::stages::{
    BackpressureStage, BufferCount, BufferTimespan, ConcatMap, DelayElements, DoOnNext, Filter,
    FlatMap, Generator, Log, Map, OnErrorContinue, OnErrorMap, OnErrorResume, OnErrorReturn,
    Skip, SkipFor, SkipUntil, SkipWhile, SourceStage, Take, Ticker, TryMap, Zip,
    DEFAULT_MAX_CONCURRENCY,
};
use crate::stream::subscriber::{CallbackSubscriber, Subscriber};
use crate::stream::subscription::{Subscription, SubscriptionShared};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Builds the stage chain of one subscription.
pub type StageFactory<T> = Arc<dyn Fn(&mut StageContext) -> BoxStage<T> + Send + Sync>;

/// A stream of `T` values.
///
/// Cloning is cheap and every subscription is independent.
pub struct Flux<T> {
    factory: StageFactory<T>,
    plan: Vec<StageDescriptor>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            plan: self.plan.clone(),
        }
    }
}

impl<T> fmt::Debug for Flux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flux").field("plan", &self.plan).finish()
    }
}

impl<T: Send + 'static> Flux<T> {
    // ── Sources ──

    /// Source from a raw stage factory. Building block for custom sources.
    pub fn from_factory<F>(descriptor: StageDescriptor, factory: F) -> Self
    where
        F: Fn(&mut StageContext) -> BoxStage<T> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            plan: vec![descriptor],
        }
    }

    /// Emits the items of `iterable`, which is cloned per subscription.
    pub fn from_iterable<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_factory(StageDescriptor::new(StageKind::FromIterable), move |_| {
            Box::new(SourceStage::finite(iterable.clone().into_iter()))
        })
    }

    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_factory(StageDescriptor::new(StageKind::Just), move |_| {
            Box::new(SourceStage::Single(Some(value.clone())))
        })
    }

    /// One value, or an empty stream for `None`.
    pub fn just_or_empty(value: Option<T>) -> Self
    where
        T: Clone + Sync,
    {
        match value {
            Some(value) => Self::just(value),
            None => Self::empty(),
        }
    }

    /// Completes immediately, without demand.
    pub fn empty() -> Self {
        Self::from_factory(StageDescriptor::new(StageKind::Empty), |_| {
            Box::new(SourceStage::<T>::Single(None))
        })
    }

    /// Fails immediately, without demand.
    pub fn error(error: StreamError) -> Self {
        let detail = error.to_string();
        Self::from_factory(
            StageDescriptor::new(StageKind::Error).with_detail(detail),
            move |_| Box::new(SourceStage::<T>::Failed(error.clone())),
        )
    }

    /// Calls `generator(0)`, `generator(1)`, ... per requested value until it
    /// returns `Ok(None)` (complete) or an error (terminal).
    pub fn generate<F>(generator: F) -> Self
    where
        F: Fn(u64) -> Result<Option<T>, StreamError> + Send + Sync + 'static,
    {
        let generator: Generator<T> = Arc::new(generator);
        Self::from_factory(StageDescriptor::new(StageKind::Generate), move |_| {
            Box::new(SourceStage::generated(Arc::clone(&generator)))
        })
    }

    /// One value every `period`, built from the tick index. Never completes.
    pub fn infinite<F>(period: Duration, tick: F) -> Self
    where
        F: Fn(u64) -> T + Send + Sync + 'static,
    {
        let ticker: Ticker<T> = Arc::new(tick);
        Self::from_factory(
            StageDescriptor::new(StageKind::Interval).with_detail(format!("{:?}", period)),
            move |cx| {
                Box::new(SourceStage::periodic(
                    cx,
                    Arc::clone(&ticker),
                    period,
                    period,
                ))
            },
        )
    }

    /// Builds the actual stream at subscribe time.
    pub fn defer<F>(supplier: F) -> Self
    where
        F: Fn() -> Flux<T> + Send + Sync + 'static,
    {
        Self::from_factory(StageDescriptor::new(StageKind::Defer), move |cx| {
            supplier().instantiate(cx)
        })
    }

    /// Subscribes to each source in turn, only after the previous completed.
    pub fn concat<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Flux<T>>,
    {
        let sources: Vec<Flux<T>> = sources.into_iter().collect();
        let descriptor = StageDescriptor::new(StageKind::Concat)
            .with_detail(format!("{} sources", sources.len()))
            .with_inputs(sources.iter().map(|s| s.plan.clone()).collect());
        let identity = Arc::new(|inner: Flux<T>| inner);
        Self::from_factory(descriptor, move |_| {
            let upstream = Box::new(SourceStage::finite(sources.clone().into_iter()));
            Box::new(ConcatMap::new(upstream, Arc::clone(&identity)))
        })
    }

    /// Subscribes to all sources at once and interleaves their values.
    pub fn merge<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Flux<T>>,
    {
        let sources: Vec<Flux<T>> = sources.into_iter().collect();
        let concurrency = sources.len().max(DEFAULT_MAX_CONCURRENCY);
        let descriptor = StageDescriptor::new(StageKind::Merge)
            .with_detail(format!("{} sources", sources.len()))
            .with_inputs(sources.iter().map(|s| s.plan.clone()).collect());
        let identity = Arc::new(|inner: Flux<T>| inner);
        Self::from_factory(descriptor, move |_| {
            let upstream = Box::new(SourceStage::finite(sources.clone().into_iter()));
            Box::new(FlatMap::new(upstream, Arc::clone(&identity), concurrency))
        })
    }

    // ── Plumbing ──

    /// The plan recorded so far, source first.
    pub fn plan(&self) -> &[StageDescriptor] {
        &self.plan
    }

    /// Build the stage chain for one subscription.
    pub fn instantiate(&self, cx: &mut StageContext) -> BoxStage<T> {
        (self.factory)(cx)
    }

    fn then<U, F>(self, descriptor: StageDescriptor, make: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(BoxStage<T>, &mut StageContext) -> BoxStage<U> + Send + Sync + 'static,
    {
        let upstream = self.factory;
        let mut plan = self.plan;
        plan.push(descriptor);
        Flux {
            factory: Arc::new(move |cx: &mut StageContext| {
                let stage = upstream(cx);
                make(stage, cx)
            }),
            plan,
        }
    }

    // ── Transform ──

    /// Transform each value. A panic in `f` terminates with `TransformFailure`.
    pub fn map<U, F>(self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then(StageDescriptor::new(StageKind::Map), move |up, _| {
            Box::new(Map::new(up, Arc::clone(&f)))
        })
    }

    /// Fallible transform. Errors become `TransformFailure` unless they
    /// already are a `StreamError`.
    pub fn try_map<U, E, F>(self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        E: Into<StreamError> + 'static,
        F: Fn(&T) -> Result<U, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then(StageDescriptor::new(StageKind::TryMap), move |up, _| {
            Box::new(TryMap::new(up, Arc::clone(&f)))
        })
    }

    /// Map each value to an inner stream and emit the inner streams one
    /// after another.
    pub fn concat_map<U, F>(self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then(StageDescriptor::new(StageKind::ConcatMap), move |up, _| {
            Box::new(ConcatMap::new(up, Arc::clone(&f)))
        })
    }

    /// Map each value to an inner stream and merge the inner streams.
    pub fn flat_map<U, F>(self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        self.flat_map_with(f, DEFAULT_MAX_CONCURRENCY)
    }

    pub fn flat_map_with<U, F>(self, f: F, max_concurrency: usize) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then(
            StageDescriptor::new(StageKind::FlatMap).with_detail(max_concurrency.to_string()),
            move |up, _| Box::new(FlatMap::new(up, Arc::clone(&f), max_concurrency)),
        )
    }

    // ── Filter ──

    pub fn filter<P>(self, predicate: P) -> Flux<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.then(StageDescriptor::new(StageKind::Filter), move |up, _| {
            Box::new(Filter::new(up, Arc::clone(&predicate)))
        })
    }

    pub fn skip(self, n: u64) -> Flux<T> {
        self.then(
            StageDescriptor::new(StageKind::Skip).with_detail(n.to_string()),
            move |up, _| Box::new(Skip::new(up, n)),
        )
    }

    pub fn skip_while<P>(self, predicate: P) -> Flux<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.then(StageDescriptor::new(StageKind::SkipWhile), move |up, _| {
            Box::new(SkipWhile::new(up, Arc::clone(&predicate)))
        })
    }

    /// Drop values until `predicate` first holds, then forward everything,
    /// including that value.
    pub fn skip_until<P>(self, predicate: P) -> Flux<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.then(StageDescriptor::new(StageKind::SkipUntil), move |up, _| {
            Box::new(SkipUntil::new(up, Arc::clone(&predicate)))
        })
    }

    /// Drop values observed during the first `duration` after subscribing.
    pub fn skip_for(self, duration: Duration) -> Flux<T> {
        self.then(
            StageDescriptor::new(StageKind::SkipFor).with_detail(format!("{:?}", duration)),
            move |up, cx| Box::new(SkipFor::new(up, duration, cx)),
        )
    }

    pub fn take(self, n: u64) -> Flux<T> {
        self.then(
            StageDescriptor::new(StageKind::Take).with_detail(n.to_string()),
            move |up, _| Box::new(Take::new(up, n)),
        )
    }

    // ── Time & windows ──

    pub fn delay_elements(self, delay: Duration) -> Flux<T> {
        self.then(
            StageDescriptor::new(StageKind::DelayElements).with_detail(format!("{:?}", delay)),
            move |up, _| Box::new(DelayElements::new(up, delay)),
        )
    }

    /// Lists of `size` values. A `size` of zero is treated as one.
    pub fn buffer(self, size: usize) -> Flux<Vec<T>> {
        self.then(
            StageDescriptor::new(StageKind::Buffer).with_detail(size.to_string()),
            move |up, _| Box::new(BufferCount::new(up, size)),
        )
    }

    /// The values of each `window`, emitted at the end of the window.
    pub fn buffer_timespan(self, window: Duration) -> Flux<Vec<T>> {
        self.then(
            StageDescriptor::new(StageKind::BufferTimespan).with_detail(format!("{:?}", window)),
            move |up, cx| Box::new(BufferTimespan::new(up, window, cx)),
        )
    }

    // ── Backpressure ──

    pub fn on_backpressure(self, policy: BackpressurePolicy) -> Flux<T> {
        self.then(
            StageDescriptor::new(StageKind::OnBackpressure).with_detail(policy.to_string()),
            move |up, _| Box::new(BackpressureStage::new(up, policy)),
        )
    }

    pub fn on_backpressure_drop(self) -> Flux<T> {
        self.on_backpressure(BackpressurePolicy::Drop)
    }

    /// Bounded buffer that fails with `BufferOverflow` when full.
    pub fn on_backpressure_buffer(self, capacity: usize) -> Flux<T> {
        self.on_backpressure(BackpressurePolicy::buffer(capacity, OverflowStrategy::Error))
    }

    pub fn on_backpressure_buffer_with(
        self,
        capacity: usize,
        overflow: OverflowStrategy,
    ) -> Flux<T> {
        self.on_backpressure(BackpressurePolicy::buffer(capacity, overflow))
    }

    // ── Combine ──

    pub fn concat_with(self, other: Flux<T>) -> Flux<T> {
        Flux::concat([self, other])
    }

    pub fn merge_with(self, other: Flux<T>) -> Flux<T> {
        Flux::merge([self, other])
    }

    /// Pair values by index through `combiner`.
    pub fn zip_with<U, O, F>(self, other: Flux<U>, combiner: F) -> Flux<O>
    where
        U: Send + 'static,
        O: Send + 'static,
        F: Fn(T, U) -> O + Send + Sync + 'static,
    {
        let combiner = Arc::new(combiner);
        let descriptor = StageDescriptor::new(StageKind::Zip)
            .with_inputs(vec![self.plan.clone(), other.plan.clone()]);
        let left = self.factory;
        let right = other.factory;
        Flux::from_factory(descriptor, move |cx| {
            let l = left(cx);
            let r = right(cx);
            Box::new(Zip::new(l, r, Arc::clone(&combiner)))
        })
    }

    // ── Recover ──

    /// Skip elements whose processing failed upstream, reporting each
    /// failure and the element (when still available) to `handler`.
    pub fn on_error_continue<V, F>(self, handler: F) -> Flux<T>
    where
        V: 'static,
        F: Fn(&StreamError, Option<&V>) + Send + Sync + 'static,
    {
        let handler: ContinueHandler =
            Arc::new(move |error: &StreamError, element: Option<&dyn Any>| {
                handler(error, element.and_then(|e| e.downcast_ref::<V>()))
            });
        self.then(StageDescriptor::new(StageKind::OnErrorContinue), move |up, _| {
            Box::new(OnErrorContinue::new(up, Arc::clone(&handler)))
        })
    }

    /// Replace an error with `fallback`, then complete.
    pub fn on_error_return(self, fallback: T) -> Flux<T>
    where
        T: Clone + Sync,
    {
        self.then(StageDescriptor::new(StageKind::OnErrorReturn), move |up, _| {
            Box::new(OnErrorReturn::new(up, fallback.clone()))
        })
    }

    /// Continue with the stream `resume` builds from the error.
    pub fn on_error_resume<F>(self, resume: F) -> Flux<T>
    where
        F: Fn(StreamError) -> Flux<T> + Send + Sync + 'static,
    {
        let resume = Arc::new(resume);
        self.then(StageDescriptor::new(StageKind::OnErrorResume), move |up, _| {
            Box::new(OnErrorResume::new(up, Arc::clone(&resume)))
        })
    }

    /// Continue with a single fallback value.
    pub fn on_error_resume_with(self, fallback: T) -> Flux<T>
    where
        T: Clone + Sync,
    {
        self.on_error_resume(move |_| Flux::just(fallback.clone()))
    }

    pub fn on_error_map<F>(self, map: F) -> Flux<T>
    where
        F: Fn(StreamError) -> StreamError + Send + Sync + 'static,
    {
        let map = Arc::new(map);
        self.then(StageDescriptor::new(StageKind::OnErrorMap), move |up, _| {
            Box::new(OnErrorMap::new(up, Arc::clone(&map)))
        })
    }

    // ── Observe ──

    /// Emit a tracing event for every signal, tagged with `category`.
    pub fn log(self, category: impl Into<String>) -> Flux<T>
    where
        T: fmt::Debug,
    {
        let category: Arc<str> = Arc::from(category.into());
        self.then(
            StageDescriptor::new(StageKind::Log).with_detail(category.to_string()),
            move |up, cx| Box::new(Log::new(up, Arc::clone(&category), cx)),
        )
    }

    pub fn do_on_next<F>(self, f: F) -> Flux<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then(StageDescriptor::new(StageKind::DoOnNext), move |up, _| {
            Box::new(DoOnNext::new(up, Arc::clone(&f)))
        })
    }

    // ── Boundary ──

    /// Run everything upstream of this point on `scheduler`, handing values
    /// over through a bounded channel. Identity on an inline scheduler.
    pub fn run_on(self, scheduler: &Scheduler) -> Flux<T> {
        let prefetch = scheduler.prefetch();
        self.run_on_with(scheduler, prefetch)
    }

    pub fn run_on_with(self, scheduler: &Scheduler, prefetch: usize) -> Flux<T> {
        if scheduler.is_inline() {
            return self;
        }
        let descriptor = StageDescriptor::new(StageKind::RunOn)
            .with_detail(format!("{}, prefetch {}", scheduler.name(), prefetch));
        let mut plan = self.plan.clone();
        plan.push(descriptor);
        let upstream = self;
        let scheduler = scheduler.clone();
        Flux {
            factory: Arc::new(move |cx: &mut StageContext| {
                bridge::channel_stage(&upstream, &scheduler, prefetch, cx)
            }),
            plan,
        }
    }

    // ── Subscribe ──

    /// Start a subscription driven on `scheduler`.
    ///
    /// On an inline scheduler this returns after the subscription ended.
    pub fn subscribe<S>(&self, scheduler: &Scheduler, subscriber: S) -> Subscription
    where
        S: Subscriber<T>,
    {
        let shared = SubscriptionShared::new(Parker::new());
        let subscription = Subscription::new(Arc::clone(&shared));
        let flux = self.clone();
        let clock = Arc::clone(scheduler.clock());
        let drain_batch = scheduler.drain_batch();
        scheduler.spawn(Box::new(move || {
            if let Some(driver) = Driver::start(&flux, subscriber, shared, clock, drain_batch) {
                driver.run();
            }
        }));
        subscription
    }

    /// Subscribe with unbounded demand, handling only values.
    pub fn subscribe_fn<F>(&self, scheduler: &Scheduler, on_next: F) -> Subscription
    where
        F: FnMut(T) + Send + 'static,
    {
        self.subscribe(scheduler, CallbackSubscriber::values(on_next))
    }

    /// Run to completion on the calling thread and return the last value.
    pub fn block_last(&self) -> Result<Option<T>, StreamError> {
        self.block_last_on(&Scheduler::immediate())
    }

    pub fn block_last_on(&self, scheduler: &Scheduler) -> Result<Option<T>, StreamError> {
        let last = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&last);
        self.block_on(scheduler, move |v| {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(v);
        })?;
        let value = last.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(value)
    }

    /// Run to completion on the calling thread and collect every value.
    pub fn collect_list(&self) -> Result<Vec<T>, StreamError> {
        self.collect_list_on(&Scheduler::immediate())
    }

    pub fn collect_list_on(&self, scheduler: &Scheduler) -> Result<Vec<T>, StreamError> {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        self.block_on(scheduler, move |v| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(v);
        })?;
        let collected = std::mem::take(&mut *values.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(collected)
    }

    /// Subscribe with unbounded demand and wait for the terminal.
    fn block_on<F>(&self, scheduler: &Scheduler, on_next: F) -> Result<(), StreamError>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let complete_tx = tx.clone();
        self.subscribe(
            scheduler,
            CallbackSubscriber::new(
                on_next,
                move || {
                    let _ = complete_tx.send(Ok(()));
                },
                move |e: StreamError| {
                    let _ = tx.send(Err(e));
                },
            ),
        );
        rx.recv().unwrap_or_else(|_| {
            Err(StreamError::upstream(
                "subscription ended without a terminal signal",
            ))
        })
    }
}

impl Flux<i64> {
    /// `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: u64) -> Self {
        let end = start.saturating_add(i64::try_from(count).unwrap_or(i64::MAX));
        Self::from_factory(
            StageDescriptor::new(StageKind::Range).with_detail(format!("{}, {}", start, count)),
            move |_| Box::new(SourceStage::finite(start..end)),
        )
    }
}

impl Flux<u64> {
    /// Tick indices `0, 1, 2, ...`, the first after one `period`.
    pub fn interval(period: Duration) -> Self {
        Self::interval_with_delay(period, period)
    }

    pub fn interval_with_delay(initial_delay: Duration, period: Duration) -> Self {
        let ticker: Ticker<u64> = Arc::new(|i| i);
        Self::from_factory(
            StageDescriptor::new(StageKind::Interval)
                .with_detail(format!("{:?} after {:?}", period, initial_delay)),
            move |cx| {
                Box::new(SourceStage::periodic(
                    cx,
                    Arc::clone(&ticker),
                    initial_delay,
                    period,
                ))
            },
        )
    }

    /// Emits `0` once after `delay`, then completes.
    pub fn timer(delay: Duration) -> Self {
        Self::interval_with_delay(delay, delay).take(1)
    }
}

impl<A, B> Flux<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    /// Pair the values of `left` and `right` by index.
    pub fn zip(left: Flux<A>, right: Flux<B>) -> Self {
        left.zip_with(right, |a, b| (a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::plan::Capability;

    #[test]
    fn test_plan_records_operators() {
        let flux = Flux::range(1, 20)
            .map(|v| v * 2)
            .skip_until(|v| v % 5 == 0)
            .buffer(3);
        let kinds: Vec<StageKind> = flux.plan().iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Range,
                StageKind::Map,
                StageKind::SkipUntil,
                StageKind::Buffer
            ]
        );
        assert_eq!(flux.plan()[3].capability, Capability::Window);
    }

    #[test]
    fn test_collect_list() {
        let values = Flux::range(1, 5).map(|v| v * v).collect_list().unwrap();
        assert_eq!(values, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn test_block_last() {
        assert_eq!(Flux::range(1, 5).block_last().unwrap(), Some(5));
        assert_eq!(Flux::<i64>::empty().block_last().unwrap(), None);
        assert_eq!(
            Flux::<i64>::error(StreamError::upstream("x")).block_last(),
            Err(StreamError::upstream("x"))
        );
    }

    #[test]
    fn test_flux_is_restartable() {
        let flux = Flux::from_iterable(vec!["a", "b"]);
        assert_eq!(flux.collect_list().unwrap(), vec!["a", "b"]);
        assert_eq!(flux.collect_list().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_just_or_empty() {
        assert_eq!(Flux::just_or_empty(Some(3)).collect_list().unwrap(), vec![3]);
        assert!(Flux::<i32>::just_or_empty(None)
            .collect_list()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_defer_builds_per_subscription() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let flux = Flux::defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Flux::just(1)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        flux.collect_list().unwrap();
        flux.collect_list().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zip_and_concat_plans_record_inputs() {
        let zipped = Flux::zip(Flux::range(0, 3), Flux::just("x"));
        assert_eq!(zipped.plan()[0].inputs.len(), 2);
        let concat = Flux::concat(vec![Flux::just(1), Flux::just(2), Flux::just(3)]);
        assert_eq!(concat.plan()[0].detail.as_deref(), Some("3 sources"));
    }

    #[test]
    fn test_range_saturates() {
        let values = Flux::range(i64::MAX - 2, 10).collect_list().unwrap();
        assert_eq!(values, vec![i64::MAX - 2, i64::MAX - 1]);
    }
}
