//! # Pending-Item Queue
//!
//! Ordered, thread-safe FIFO holding the heterogeneous items a stream sink
//! has accepted but not yet dispatched: samples, markers, and in-band format
//! changes. Arrival order is preserved across all three kinds — a marker is
//! never reordered relative to the samples enqueued before or after it.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{Result, SinkError};
use crate::format::VideoFormat;
use crate::sample::{Marker, Sample};

/// One entry in the pending queue, tagged by kind.
#[derive(Debug, Clone)]
pub enum QueueItem {
    /// A media sample awaiting delivery.
    Sample(Sample),
    /// An in-band control event awaiting completion.
    Marker(Marker),
    /// A media type to apply at this position in the sequence.
    FormatChange(VideoFormat),
}

/// Bounded FIFO of [`QueueItem`]s, owned by a single stream sink.
///
/// Cleared on flush and on shutdown. The bound exists so a stalled consumer
/// turns into a visible [`SinkError::QueueFull`] at the producer instead of
/// unbounded memory growth.
pub struct SampleQueue {
    items: Mutex<VecDeque<QueueItem>>,
    max_items: usize,
}

impl SampleQueue {
    /// Create an empty queue holding at most `max_items` entries.
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            max_items,
        }
    }

    /// Append an item, failing with [`SinkError::QueueFull`] at the bound.
    pub fn push_back(&self, item: QueueItem) -> Result<()> {
        let mut items = self.items.lock();
        if items.len() >= self.max_items {
            return Err(SinkError::QueueFull(self.max_items));
        }
        items.push_back(item);
        Ok(())
    }

    /// Remove and return the front item, or `None` when empty.
    pub fn pop_front(&self) -> Option<QueueItem> {
        self.items.lock().pop_front()
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop every pending item.
    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
