//! Error handling for the rivulet crate
//!
//! `StreamError` (in [`crate::stream::error`]) travels inside `Error` signals.
//! `RivuletError` covers everything around the streams: configuration files,
//! scheduler threads and serialization of pipeline plans.

use crate::stream::StreamError;
use thiserror::Error;

/// Main error type for rivulet operations outside of a running stream
#[derive(Error, Debug)]
pub enum RivuletError {
    /// Errors raised by a stream and surfaced through a blocking call
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to scheduler threads
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RivuletError>,
    },
}

impl RivuletError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RivuletError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for RivuletError {
    fn from(err: serde_json::Error) -> Self {
        RivuletError::Serialization(err.to_string())
    }
}

/// Result type alias for rivulet operations
pub type Result<T> = std::result::Result<T, RivuletError>;

/// Attach context to any error that converts into [`RivuletError`]
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], building the message only on error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<RivuletError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RivuletError::with_context(e.into(), context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RivuletError::with_context(e.into(), f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RivuletError::Config("prefetch must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: prefetch must be positive"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = RivuletError::Scheduler("spawn failed".to_string());
        let with_ctx = err.with_context("Failed to start worker");
        assert!(with_ctx.to_string().contains("Failed to start worker"));
        assert!(with_ctx.to_string().contains("spawn failed"));
    }

    #[test]
    fn test_stream_error_context() {
        let result: std::result::Result<(), StreamError> =
            Err(StreamError::BufferOverflow { capacity: 2 });
        let err = result.context("draining ticks").unwrap_err();
        assert!(err.to_string().starts_with("draining ticks"));
        assert!(err.to_string().contains("capacity 2"));
    }

    #[test]
    fn test_io_error_context_keeps_source() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result
            .with_context(|| "Failed to read engine.toml".to_string())
            .unwrap_err();
        match err {
            RivuletError::WithContext { context, source } => {
                assert_eq!(context, "Failed to read engine.toml");
                assert!(matches!(*source, RivuletError::Io(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
