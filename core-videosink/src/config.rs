//! # Sink Configuration
//!
//! Configuration for the media sink and its stream.

use serde::{Deserialize, Serialize};

/// Media sink configuration.
///
/// Controls the pending-queue bound, the stream identifier, and the dispatch
/// worker's thread name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Maximum number of pending items (samples, markers, format changes)
    /// the stream will hold before rejecting new ones with
    /// [`SinkError::QueueFull`](crate::error::SinkError::QueueFull).
    ///
    /// Default: 64.
    #[serde(default = "default_max_queue_items")]
    pub max_queue_items: usize,

    /// Identifier assigned to the single stream sink.
    ///
    /// Default: 0.
    #[serde(default = "default_stream_id")]
    pub stream_id: u32,

    /// Name given to the dispatch worker thread (useful in debuggers and
    /// thread dumps).
    ///
    /// Default: `"videosink-dispatch"`.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_queue_items: default_max_queue_items(),
            stream_id: default_stream_id(),
            worker_name: default_worker_name(),
        }
    }
}

impl SinkConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_items == 0 {
            return Err("max_queue_items must be > 0".to_string());
        }
        if self.worker_name.is_empty() {
            return Err("worker_name must not be empty".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_max_queue_items() -> usize {
    64
}

fn default_stream_id() -> u32 {
    0
}

fn default_worker_name() -> String {
    "videosink-dispatch".to_string()
}
