//! # Rivulet: pull-based reactive streams
//!
//! A small reactive-streams runtime. Streams are described with [`Flux`],
//! consumed through a [`Subscriber`] that requests values explicitly, and
//! driven by per-subscription driver loops on a [`Scheduler`].
//!
//! ## Architecture
//!
//! - **Stream**: `Flux` builders, the stage chain they instantiate, the driver
//!   loop and the subscription handle with its atomic demand counter
//! - **Runtime**: clocks (system and virtual), schedulers and the [`Engine`]
//!   that builds them from an [`EngineConfig`]
//! - **Communication**: bounded crossbeam channels at `run_on` boundaries, a
//!   tokio channel for async consumers
//! - **Testing**: [`testing::TestSubscriber`] and [`testing::StepVerifier`]
//!
//! ## Configuration
//!
//! Engine settings are read from `rivulet.toml` in the platform config
//! directory under `dev.hxyulin.rivulet`, or from an explicit path.
//!
//! ## Example
//!
//! ```
//! use rivulet::stream::Flux;
//!
//! let values = Flux::range(1, 20)
//!     .skip_until(|v| v % 5 == 0)
//!     .buffer(4)
//!     .collect_list()
//!     .unwrap();
//! assert_eq!(values[0], vec![5, 6, 7, 8]);
//! assert_eq!(values.len(), 4);
//! ```

pub mod config;
pub mod error;
pub mod runtime;
pub mod stream;
pub mod testing;

// Re-export commonly used types
pub use config::{BackpressurePolicy, EngineConfig, OverflowStrategy};
pub use error::{Result, ResultExt, RivuletError};
pub use runtime::{Clock, Engine, Scheduler, SystemClock, VirtualClock};
pub use stream::{Flux, Signal, StreamError, Subscriber, Subscription};
