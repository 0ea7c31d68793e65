//! Error types for the transducer runtime.
//!
//! Errors fall into two groups. [`RunError`] is what a caller of
//! [`Runtime::run`](crate::Runtime::run) gets back when the loop ends
//! abnormally. [`SendError`] is reported at the call site of a send and
//! never travels through the run result.

use thiserror::Error;

/// Why a run of the execution loop ended without a normal result.
#[derive(Debug, Error)]
pub enum RunError {
    /// The initial state was already terminal. Nothing was processed.
    #[error("initial state is already terminal")]
    PrematureTerminalState,

    /// The output subject rejected a value. All tasks were cancelled.
    #[error("output subject rejected a value: {0}")]
    Sink(#[source] anyhow::Error),

    /// The run was cancelled through its proxy or host before a terminal
    /// state was reached.
    #[error("transducer was cancelled before reaching a terminal state")]
    Cancelled,

    /// The proxy already served a run. A proxy drives exactly one run.
    #[error("proxy inbox was already consumed by an earlier run")]
    ProxyConsumed,
}

impl RunError {
    /// Whether this error came from the output subject.
    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Sink(_))
    }

    /// Whether this error is the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure to enqueue an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The bounded event buffer is full.
    #[error("event buffer is full")]
    BufferOverflow,

    /// The loop owning the channel has exited.
    #[error("transducer has terminated")]
    Terminated,
}

/// Invalid runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("buffer_capacity must be greater than zero")]
    ZeroCapacity,

    #[error("label must not be empty")]
    EmptyLabel,
}
