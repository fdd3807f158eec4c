//! Time sources and thread parking.
//!
//! Stages never sleep. They report the clock time at which they next need to
//! be polled and the driver parks through its [`Clock`] until that deadline,
//! or until someone calls [`Parker::unpark`] (new demand, cancellation, a
//! channel hand-off). With a [`VirtualClock`] the deadline is reached only
//! when a test advances time.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Wake-up token for one driver thread.
///
/// An `unpark` that arrives before `park` is remembered, so a notification
/// is never lost between checking for work and going to sleep.
#[derive(Debug, Default)]
pub struct Parker {
    notified: Mutex<bool>,
    cvar: Condvar,
}

impl Parker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until unparked.
    pub fn park(&self) {
        let guard = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guard = self
            .cvar
            .wait_while(guard, |notified| !*notified)
            .unwrap_or_else(PoisonError::into_inner);
        *guard = false;
    }

    /// Block until unparked or `timeout` elapsed.
    pub fn park_timeout(&self, timeout: Duration) {
        let guard = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut guard, _) = self
            .cvar
            .wait_timeout_while(guard, timeout, |notified| !*notified)
            .unwrap_or_else(PoisonError::into_inner);
        *guard = false;
    }

    pub fn unpark(&self) {
        let mut guard = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = true;
        self.cvar.notify_all();
    }
}

/// Source of "now" for time-based stages, plus the way to wait for a deadline.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Park until `deadline` (clock time) or an unpark, whichever comes first.
    /// `None` waits for an unpark only.
    fn park_until(&self, parker: &Arc<Parker>, deadline: Option<Duration>);
}

/// Wall-clock time measured from the moment the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn park_until(&self, parker: &Arc<Parker>, deadline: Option<Duration>) {
        match deadline {
            None => parker.park(),
            Some(deadline) => {
                let now = self.now();
                if deadline > now {
                    parker.park_timeout(deadline - now);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct VirtualState {
    now: Duration,
    parked: Vec<Weak<Parker>>,
}

/// Manually advanced clock for deterministic tests.
///
/// Drivers waiting on a deadline stay parked until [`VirtualClock::advance`]
/// moves time forward; every registered parker is then woken so it can
/// re-check its deadline.
#[derive(Debug, Default)]
pub struct VirtualClock {
    state: Mutex<VirtualState>,
}

impl VirtualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance(&self, by: Duration) {
        let parked = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.now += by;
            state.parked.retain(|p| p.strong_count() > 0);
            state.parked.clone()
        };
        tracing::trace!("virtual clock advanced by {:?}", by);
        for parker in parked.iter().filter_map(Weak::upgrade) {
            parker.unpark();
        }
    }

    /// Advance to an absolute time. Moving backwards is ignored.
    pub fn advance_to(&self, to: Duration) {
        let now = self.now();
        if to > now {
            self.advance(to - now);
        }
    }

    fn register(&self, parker: &Arc<Parker>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let weak = Arc::downgrade(parker);
        if !state.parked.iter().any(|p| p.ptr_eq(&weak)) {
            state.parked.push(weak);
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .now
    }

    fn park_until(&self, parker: &Arc<Parker>, deadline: Option<Duration>) {
        self.register(parker);
        if let Some(deadline) = deadline {
            if deadline <= self.now() {
                return;
            }
        }
        parker.park();
    }
}
