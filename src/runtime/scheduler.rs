//! Schedulers decide which thread runs a subscription's driver loop.
//!
//! - [`Scheduler::inline`] runs on the calling thread; `subscribe` returns
//!   once the subscription has ended.
//! - [`Scheduler::pool`] hands the driver to an elastic [`WorkerPool`].
//! - [`Scheduler::dedicated`] spawns one named thread per subscription.
//!
//! Every scheduler carries the [`Clock`] its stages read time from.

use crate::config::{SchedulerSettings, DEFAULT_DRAIN_BATCH, DEFAULT_PREFETCH};
use crate::error::{Result, RivuletError};
use crate::runtime::clock::{Clock, SystemClock};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Unit of work run by a scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct PoolState {
    threads: usize,
    /// Idle workers not yet promised to a queued job.
    idle: usize,
    spawned_total: u64,
    overflow_total: u64,
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the pool whose job this thread is running, 0 for none.
    static CURRENT_POOL: Cell<u64> = const { Cell::new(0) };
}

/// How `execute` places a job.
enum Placement {
    Idle,
    Worker(u64),
    Overflow(u64),
    Queued,
}

/// Elastic thread pool.
///
/// Driver loops block while they wait for demand, so a fixed-size pool could
/// starve. Workers are spawned whenever no idle worker is available, up to
/// `max_threads`, and exit after `keep_alive` without work.
///
/// A saturated pool queues jobs submitted from outside. A job submitted by
/// one of the pool's own jobs (the upstream half of a `run_on` boundary) gets
/// a one-shot overflow thread instead, since the submitting worker may block
/// until that job produces.
pub struct WorkerPool {
    id: u64,
    name: String,
    max_threads: usize,
    keep_alive: Duration,
    job_tx: Sender<Job>,
    job_rx: Receiver<Job>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_threads: usize, keep_alive: Duration) -> Arc<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            max_threads: max_threads.max(1),
            keep_alive,
            job_tx,
            job_rx,
            state: Mutex::new(PoolState::default()),
        })
    }

    pub fn from_settings(settings: &SchedulerSettings) -> Arc<Self> {
        Self::new(
            settings.pool_name.clone(),
            settings.pool_max_threads,
            settings.keep_alive(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live worker threads, overflow threads excluded.
    pub fn threads(&self) -> usize {
        self.lock_state().threads
    }

    /// Number of overflow threads started so far.
    pub fn overflow_spawned(&self) -> u64 {
        self.lock_state().overflow_total
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_own_thread(&self) -> bool {
        CURRENT_POOL.with(|current| current.get() == self.id)
    }

    /// Queue `job`, starting a new worker when none is free.
    pub fn execute(self: &Arc<Self>, job: Job) -> Result<()> {
        let placement = {
            let mut state = self.lock_state();
            if state.idle > 0 {
                state.idle -= 1;
                Placement::Idle
            } else if state.threads < self.max_threads {
                state.threads += 1;
                state.spawned_total += 1;
                Placement::Worker(state.spawned_total)
            } else if self.on_own_thread() {
                state.overflow_total += 1;
                Placement::Overflow(state.overflow_total)
            } else {
                tracing::warn!(
                    "Pool '{}' saturated at {} threads, job queued",
                    self.name,
                    self.max_threads
                );
                Placement::Queued
            }
        };

        let index = match placement {
            Placement::Overflow(index) => return self.spawn_overflow(index, job),
            Placement::Worker(index) => Some(index),
            Placement::Idle | Placement::Queued => None,
        };
        if self.job_tx.send(job).is_err() {
            return Err(RivuletError::Scheduler(format!(
                "pool '{}' job queue closed",
                self.name
            )));
        }

        if let Some(index) = index {
            let pool = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || pool.worker_loop());
            if let Err(e) = spawned {
                let threads = {
                    let mut state = self.lock_state();
                    state.threads -= 1;
                    state.threads
                };
                if threads == 0 {
                    // Nobody would ever pick the job up.
                    if let Ok(job) = self.job_rx.try_recv() {
                        run_job(&self.name, job);
                    }
                }
                return Err(RivuletError::Scheduler(format!(
                    "failed to spawn worker for pool '{}': {}",
                    self.name, e
                )));
            }
            tracing::debug!("Pool '{}' started worker {}", self.name, index);
        }
        Ok(())
    }

    /// Run `job` on a thread of its own that exits when the job returns.
    fn spawn_overflow(self: &Arc<Self>, index: u64, job: Job) -> Result<()> {
        tracing::debug!(
            "Pool '{}' saturated at {} threads, starting overflow thread {}",
            self.name,
            self.max_threads,
            index
        );
        let slot = Arc::new(Mutex::new(Some(job)));
        let worker_slot = Arc::clone(&slot);
        let (id, name) = (self.id, self.name.clone());
        let spawned = thread::Builder::new()
            .name(format!("{}-overflow-{}", self.name, index))
            .spawn(move || {
                CURRENT_POOL.with(|current| current.set(id));
                let job = worker_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(job) = job {
                    run_job(&name, job);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(
                "Failed to spawn overflow thread for pool '{}', job queued: {}",
                self.name,
                e
            );
            let job = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(job) = job {
                if self.job_tx.send(job).is_err() {
                    return Err(RivuletError::Scheduler(format!(
                        "pool '{}' job queue closed",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn worker_loop(self: Arc<Self>) {
        CURRENT_POOL.with(|current| current.set(self.id));
        loop {
            match self.job_rx.recv_timeout(self.keep_alive) {
                Ok(job) => {
                    run_job(&self.name, job);
                    self.lock_state().idle += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let mut state = self.lock_state();
                    if state.idle > 0 && self.job_rx.is_empty() {
                        state.idle -= 1;
                        state.threads -= 1;
                        tracing::debug!("Pool '{}' worker retired", self.name);
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let mut state = self.lock_state();
                    state.threads -= 1;
                    return;
                }
            }
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &state.threads)
            .field("idle", &state.idle)
            .field("max_threads", &self.max_threads)
            .finish()
    }
}

fn run_job(pool: &str, job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::warn!("Job on pool '{}' panicked", pool);
    }
}

#[derive(Clone)]
enum SchedulerKind {
    Inline,
    Pool(Arc<WorkerPool>),
    Dedicated(String),
}

/// Where driver loops run, and which clock they read.
#[derive(Clone)]
pub struct Scheduler {
    kind: SchedulerKind,
    clock: Arc<dyn Clock>,
    prefetch: usize,
    drain_batch: usize,
}

impl Scheduler {
    fn with_kind(kind: SchedulerKind, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            clock,
            prefetch: DEFAULT_PREFETCH,
            drain_batch: DEFAULT_DRAIN_BATCH,
        }
    }

    /// Run on the calling thread.
    pub fn inline(clock: Arc<dyn Clock>) -> Self {
        Self::with_kind(SchedulerKind::Inline, clock)
    }

    /// Inline scheduler on wall-clock time.
    pub fn immediate() -> Self {
        Self::inline(Arc::new(SystemClock::new()))
    }

    pub fn pool(pool: Arc<WorkerPool>, clock: Arc<dyn Clock>) -> Self {
        Self::with_kind(SchedulerKind::Pool(pool), clock)
    }

    /// One new thread named `name` per subscription.
    pub fn dedicated(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_kind(SchedulerKind::Dedicated(name.into()), clock)
    }

    pub(crate) fn with_tuning(mut self, prefetch: usize, drain_batch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self.drain_batch = drain_batch.max(1);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.kind, SchedulerKind::Inline)
    }

    /// Values requested ahead across a `run_on` boundary.
    pub fn prefetch(&self) -> usize {
        self.prefetch
    }

    pub fn drain_batch(&self) -> usize {
        self.drain_batch
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            SchedulerKind::Inline => "inline",
            SchedulerKind::Pool(pool) => pool.name(),
            SchedulerKind::Dedicated(name) => name,
        }
    }

    /// Run `job` according to this scheduler.
    ///
    /// Inline jobs run like a plain call, so a panicking subscriber unwinds
    /// into the caller. When a thread cannot be started the job runs on the
    /// calling thread instead, so it is never lost.
    pub fn spawn(&self, job: Job) {
        match &self.kind {
            SchedulerKind::Inline => job(),
            SchedulerKind::Pool(pool) => {
                if let Err(e) = pool.execute(job) {
                    tracing::warn!("{}", e);
                }
            }
            SchedulerKind::Dedicated(name) => {
                let slot = Arc::new(Mutex::new(Some(job)));
                let worker_slot = Arc::clone(&slot);
                let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                    let job = worker_slot
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    if let Some(job) = job {
                        job();
                    }
                });
                if let Err(e) = spawned {
                    tracing::warn!(
                        "Failed to spawn dedicated thread '{}', running inline: {}",
                        name,
                        e
                    );
                    let job = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(job) = job {
                        run_job(name, job);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name())
            .field("clock", &self.clock)
            .field("prefetch", &self.prefetch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn test_inline_runs_on_calling_thread() {
        let scheduler = Scheduler::immediate();
        let caller = thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        let seen_job = Arc::clone(&seen);
        scheduler.spawn(Box::new(move || {
            *seen_job.lock().unwrap() = Some(thread::current().id());
        }));
        assert_eq!(*seen.lock().unwrap(), Some(caller));
        assert!(scheduler.is_inline());
    }

    #[test]
    fn test_pool_grows_for_blocking_jobs() {
        let pool = WorkerPool::new("test-pool", 4, Duration::from_secs(5));
        let scheduler = Scheduler::pool(pool.clone(), Arc::new(SystemClock::new()));
        let barrier = Arc::new(Barrier::new(4));
        let done = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..3 {
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&done);
            let tx = tx.clone();
            scheduler.spawn(Box::new(move || {
                barrier.wait();
                done.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }));
        }
        barrier.wait();
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(pool.threads(), 3);
    }

    #[test]
    fn test_pool_survives_panicking_job() {
        let pool = WorkerPool::new("panic-pool", 1, Duration::from_secs(5));
        pool.execute(Box::new(|| panic!("job failed"))).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || {
            let _ = tx.send(42);
        }))
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_saturated_pool_runs_nested_job_on_overflow_thread() {
        let pool = WorkerPool::new("nested-pool", 1, Duration::from_secs(5));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let outer_pool = Arc::clone(&pool);
        pool.execute(Box::new(move || {
            let (inner_tx, inner_rx) = crossbeam_channel::bounded(1);
            outer_pool
                .execute(Box::new(move || {
                    let _ = inner_tx.send(thread::current().name().map(str::to_string));
                }))
                .unwrap();
            // The only worker blocks here until the nested job has run.
            let _ = tx.send(inner_rx.recv_timeout(Duration::from_secs(5)).ok().flatten());
        }))
        .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some("nested-pool-overflow-1".to_string())
        );
        assert_eq!(pool.threads(), 1);
        assert_eq!(pool.overflow_spawned(), 1);
    }

    #[test]
    fn test_saturated_pool_queues_outside_jobs() {
        let pool = WorkerPool::new("queued-pool", 1, Duration::from_secs(5));
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..3 {
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                let _ = tx.send(i);
            }))
            .unwrap();
        }
        let mut seen: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(pool.overflow_spawned(), 0);
    }

    #[test]
    fn test_idle_worker_retires() {
        let pool = WorkerPool::new("short-pool", 2, Duration::from_millis(20));
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || {
            let _ = tx.send(());
        }))
        .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for _ in 0..100 {
            if pool.threads() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.threads(), 0);
    }

    #[test]
    fn test_dedicated_uses_named_thread() {
        let scheduler = Scheduler::dedicated("rivulet-test", Arc::new(SystemClock::new()));
        let (tx, rx) = crossbeam_channel::bounded(1);
        scheduler.spawn(Box::new(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        }));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some("rivulet-test".to_string())
        );
    }
}
