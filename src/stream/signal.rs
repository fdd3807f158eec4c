//! Signals exchanged between producer and consumer.

use crate::stream::error::StreamError;

/// One event of a stream: zero or more `Next`, then at most one terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(StreamError),
}

/// The terminal subset of [`Signal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Complete,
    Error(StreamError),
}

impl<T> Signal<T> {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    /// Split into the value or the terminal.
    pub fn into_parts(self) -> Result<T, Terminal> {
        match self {
            Signal::Next(v) => Ok(v),
            Signal::Complete => Err(Terminal::Complete),
            Signal::Error(e) => Err(Terminal::Error(e)),
        }
    }

    /// Map the carried value, leaving terminals untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U> {
        match self {
            Signal::Next(v) => Signal::Next(f(v)),
            Signal::Complete => Signal::Complete,
            Signal::Error(e) => Signal::Error(e),
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Next(_) => "onNext",
            Signal::Complete => "onComplete",
            Signal::Error(_) => "onError",
        }
    }
}

impl<T> From<Terminal> for Signal<T> {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Complete => Signal::Complete,
            Terminal::Error(e) => Signal::Error(e),
        }
    }
}

impl Terminal {
    pub fn is_error(&self) -> bool {
        matches!(self, Terminal::Error(_))
    }
}
