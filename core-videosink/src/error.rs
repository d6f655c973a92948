//! # Sink Error Types
//!
//! Error taxonomy for the video render-sink core.
//!
//! Synchronous operations return these directly. Failures raised inside the
//! dispatch worker have no synchronous caller and are surfaced as
//! [`SinkEvent::Error`](crate::events::SinkEvent::Error) instead.

use thiserror::Error;

/// Errors that can occur during sink operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// No media type has been set yet; the operation requires one.
    #[error("media type not set")]
    NotInitialized,

    /// The operation is not valid in the sink's current state.
    #[error("operation not valid in the current state")]
    InvalidRequest,

    /// The sink has been permanently shut down.
    #[error("sink has been shut down")]
    ShutDown,

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The pending-item queue reached its configured bound.
    #[error("sample queue is full ({0} items)")]
    QueueFull(usize),

    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Malformed or missing input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The media type is not acceptable for this stream.
    #[error("unsupported media type: {0}")]
    InvalidMediaType(String),

    /// No stream with the requested identifier exists.
    #[error("invalid stream identifier: {0}")]
    InvalidStream(u32),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No presentation clock has been set on the media sink.
    #[error("no presentation clock")]
    NoClock,

    /// The downstream sample consumer reported a failure.
    #[error("sample consumer failed: {0}")]
    Consumer(String),

    /// Internal error (should not occur in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SinkError {
    /// Returns `true` if the error leaves the sink permanently unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::ShutDown)
    }

    /// Returns `true` if the error was a state-machine rejection (the sink
    /// state is unchanged and the operation may be retried later).
    pub fn is_state_rejection(&self) -> bool {
        matches!(self, SinkError::NotInitialized | SinkError::InvalidRequest)
    }
}

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
