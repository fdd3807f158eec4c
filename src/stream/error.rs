//! Errors carried by `Error` signals.

use thiserror::Error;

/// Errors that terminate a subscription.
///
/// Cloneable so recovery stages and test recorders can keep copies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// `request(n)` overflowed the outstanding demand.
    #[error("invalid demand: request({requested}) overflows outstanding demand {outstanding}")]
    InvalidDemand { requested: u64, outstanding: u64 },

    /// A bounded buffer with the error overflow strategy was exceeded.
    #[error("buffer overflow: capacity {capacity} exceeded")]
    BufferOverflow { capacity: usize },

    /// The source's generation function failed.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// A user-supplied operator function failed.
    #[error("transform failure: {0}")]
    TransformFailure(String),

    /// A signal was produced after cancellation. Only ever logged.
    #[error("signal observed after cancellation")]
    CancellationRace,

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    pub fn upstream(message: impl Into<String>) -> Self {
        StreamError::UpstreamFailure(message.into())
    }

    pub fn transform(message: impl Into<String>) -> Self {
        StreamError::TransformFailure(message.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StreamError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &StreamError {
        match self {
            StreamError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<String> for StreamError {
    fn from(message: String) -> Self {
        StreamError::TransformFailure(message)
    }
}

impl From<&str> for StreamError {
    fn from(message: &str) -> Self {
        StreamError::TransformFailure(message.to_string())
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Render a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operator panicked".to_string()
    }
}
