//! Subscription handle shared between a consumer and its driver.

use crate::runtime::clock::Parker;
use crate::stream::demand::Demand;
use crate::stream::error::StreamError;
use crate::stream::id::SubscriptionId;
use crate::stream::signal::Terminal;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Lifecycle of one subscription. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Unsubscribed = 0,
    Active = 1,
    Completed = 2,
    Errored = 3,
    Cancelled = 4,
}

impl Lifecycle {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Lifecycle::Unsubscribed,
            1 => Lifecycle::Active,
            2 => Lifecycle::Completed,
            3 => Lifecycle::Errored,
            _ => Lifecycle::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Lifecycle::Completed | Lifecycle::Errored | Lifecycle::Cancelled
        )
    }
}

/// State shared by every clone of a [`Subscription`] and its driver.
pub(crate) struct SubscriptionShared {
    pub(crate) id: SubscriptionId,
    pub(crate) demand: Demand,
    cancelled: AtomicBool,
    lifecycle: AtomicU8,
    demand_error: Mutex<Option<StreamError>>,
    pub(crate) parker: Arc<Parker>,
}

impl SubscriptionShared {
    pub(crate) fn new(parker: Arc<Parker>) -> Arc<Self> {
        Arc::new(Self {
            id: SubscriptionId::next(),
            demand: Demand::new(),
            cancelled: AtomicBool::new(false),
            lifecycle: AtomicU8::new(Lifecycle::Unsubscribed as u8),
            demand_error: Mutex::new(None),
            parker,
        })
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub(crate) fn activate(&self) -> bool {
        self.transition(Lifecycle::Unsubscribed, Lifecycle::Active)
    }

    /// Move Active to the state matching `terminal`. Fails if already terminal.
    pub(crate) fn finish(&self, terminal: &Terminal) -> bool {
        let to = match terminal {
            Terminal::Complete => Lifecycle::Completed,
            Terminal::Error(_) => Lifecycle::Errored,
        };
        self.transition(Lifecycle::Active, to)
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.lifecycle
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn take_demand_error(&self) -> Option<StreamError> {
        self.demand_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Handle through which a consumer requests values and cancels.
///
/// Cloning is cheap; every clone controls the same subscription.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<SubscriptionShared>,
}

impl Subscription {
    pub(crate) fn new(shared: Arc<SubscriptionShared>) -> Self {
        Self { shared }
    }

    /// Signal demand for `n` more values.
    ///
    /// An overflowing request terminates the subscription with
    /// `Error(InvalidDemand)`.
    pub fn request(&self, n: u64) {
        if n == 0 || self.shared.is_cancelled() {
            return;
        }
        if let Err(err) = self.shared.demand.request(n) {
            tracing::debug!("{}: rejected request({}): {}", self.shared.id, n, err);
            let mut slot = self
                .shared
                .demand_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.get_or_insert(err);
        }
        self.shared.parker.unpark();
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&self) {
        if !self.shared.cancelled.swap(true, Ordering::AcqRel) {
            if self.shared.transition(Lifecycle::Active, Lifecycle::Cancelled)
                || self
                    .shared
                    .transition(Lifecycle::Unsubscribed, Lifecycle::Cancelled)
            {
                tracing::debug!("{}: cancelled", self.shared.id);
            }
            self.shared.parker.unpark();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    /// Currently outstanding demand.
    pub fn outstanding(&self) -> u64 {
        self.shared.demand.current()
    }

    pub(crate) fn shared(&self) -> &Arc<SubscriptionShared> {
        &self.shared
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("lifecycle", &self.lifecycle())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
