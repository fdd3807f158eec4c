//! Pull-based reactive streams.
//!
//! A [`Flux`] describes a stream: a source plus a chain of operators. Every
//! `subscribe` instantiates a fresh chain of [`Stage`]s and hands it to a
//! driver running on a [`Scheduler`](crate::runtime::Scheduler). The driver
//! pulls one value per unit of demand the [`Subscriber`] requested through
//! its [`Subscription`], and delivers exactly one terminal signal unless the
//! subscription is cancelled first.

pub mod bridge;
pub mod demand;
pub mod driver;
pub mod error;
pub mod flux;
pub mod id;
pub mod plan;
pub mod signal;
pub mod stage;
pub mod stages;
pub mod subscriber;
pub mod subscription;

pub use bridge::AsyncReceiver;
pub use demand::UNBOUNDED;
pub use driver::DriveOutcome;
pub use error::{StreamError, StreamResult};
pub use flux::Flux;
pub use id::SubscriptionId;
pub use plan::{Capability, StageDescriptor, StageKind};
pub use signal::{Signal, Terminal};
pub use stage::{BoxStage, Idle, Stage, StageContext, Step};
pub use subscriber::{CallbackSubscriber, Downstream, DownstreamSubscriber, Subscriber};
pub use subscription::{Lifecycle, Subscription};
