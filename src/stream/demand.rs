//! Outstanding demand counter.
//!
//! `request(n)` adds to the counter from any thread; the driver takes one
//! unit per delivered `Next`. `u64::MAX` is sticky and means unbounded.

use crate::stream::error::StreamError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

#[derive(Debug, Default)]
pub struct Demand {
    outstanding: AtomicU64,
}

impl Demand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to the outstanding demand.
    ///
    /// `request(0)` is a no-op and `request(UNBOUNDED)` switches to unbounded.
    /// A sum that overflows `u64` is rejected with `InvalidDemand` and leaves
    /// the counter unchanged.
    pub fn request(&self, n: u64) -> Result<u64, StreamError> {
        if n == 0 {
            return Ok(self.current());
        }
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            let next = if current == UNBOUNDED || n == UNBOUNDED {
                UNBOUNDED
            } else {
                match current.checked_add(n) {
                    Some(sum) if sum != UNBOUNDED => sum,
                    _ => {
                        return Err(StreamError::InvalidDemand {
                            requested: n,
                            outstanding: current,
                        })
                    }
                }
            };
            match self.outstanding.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Consume one unit of demand. Returns false when none is outstanding.
    pub fn take_one(&self) -> bool {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            if current == UNBOUNDED {
                return true;
            }
            match self.outstanding.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }

    #[inline]
    pub fn has_demand(&self) -> bool {
        self.current() > 0
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.current() == UNBOUNDED
    }
}
