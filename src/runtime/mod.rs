//! Threads and time.
//!
//! Drivers run on a [`Scheduler`] and wait on a [`Parker`] through a
//! [`Clock`]; the [`Engine`] builds schedulers from configuration.

pub mod clock;
pub mod engine;
pub mod scheduler;

pub use clock::{Clock, Parker, SystemClock, VirtualClock};
pub use engine::Engine;
pub use scheduler::{Job, Scheduler, WorkerPool};
