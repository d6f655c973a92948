//! # Sink Event Channel
//!
//! Events the sink emits back toward the producer: lifecycle notifications,
//! back-pressure requests, marker completions, and asynchronous errors.
//!
//! The pull side can block indefinitely, so the sink never pulls while
//! holding its state lock — emission is a non-blocking unbounded send and is
//! safe under the lock, consumption happens on the producer's side only.

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Result, SinkError};

/// An event emitted by the sink toward the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The sink transitioned to started (after `start` or `restart`).
    Started,
    /// The sink transitioned to stopped. Always emitted for a stop, even if
    /// dropping the pending queue failed internally.
    Stopped,
    /// The sink transitioned to paused.
    Paused,
    /// The sink is ready for (and wants) another sample.
    RequestSample,
    /// A placed marker completed; carries the marker's context payload.
    MarkerCompleted(Option<Bytes>),
    /// A failure occurred inside the dispatch worker.
    Error(SinkError),
}

/// Receiving half of the event channel, handed to the producer.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<SinkEvent>,
}

impl EventReceiver {
    /// Await the next event. Returns `None` once the sink has shut down and
    /// all pending events have been consumed.
    pub async fn recv(&mut self) -> Option<SinkEvent> {
        self.rx.recv().await
    }

    /// Block the current thread until the next event. Must not be called
    /// from an async context.
    pub fn blocking_recv(&mut self) -> Option<SinkEvent> {
        self.rx.blocking_recv()
    }

    /// Non-blocking poll for an already-queued event.
    pub fn try_recv(&mut self) -> Option<SinkEvent> {
        self.rx.try_recv().ok()
    }
}

/// Sending half plus subscription bookkeeping, owned by the stream sink.
///
/// `shutdown` drops the sender so a blocked receiver wakes up with `None`;
/// emission after shutdown fails with [`SinkError::ShutDown`].
pub struct EventQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<SinkEvent>>>,
    rx: Mutex<Option<EventReceiver>>,
}

impl EventQueue {
    /// Create the channel pair.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(EventReceiver { rx })),
        }
    }

    /// Take the receiving half. Yields `Some` exactly once.
    pub fn take_receiver(&self) -> Option<EventReceiver> {
        self.rx.lock().take()
    }

    /// Emit an event. Never blocks.
    pub fn emit(&self, event: SinkEvent) -> Result<()> {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => {
                // A dropped receiver is not an error for the sink; the
                // producer simply stopped listening.
                let _ = tx.send(event);
                Ok(())
            }
            None => Err(SinkError::ShutDown),
        }
    }

    /// Tear down the channel. Idempotent.
    pub fn shutdown(&self) {
        self.tx.lock().take();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_and_receive_in_order() {
        let queue = EventQueue::new();
        let mut rx = queue.take_receiver().unwrap();

        queue.emit(SinkEvent::Started).unwrap();
        queue.emit(SinkEvent::RequestSample).unwrap();

        assert_eq!(rx.try_recv(), Some(SinkEvent::Started));
        assert_eq!(rx.try_recv(), Some(SinkEvent::RequestSample));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn receiver_taken_once() {
        let queue = EventQueue::new();
        assert!(queue.take_receiver().is_some());
        assert!(queue.take_receiver().is_none());
    }

    #[test]
    fn emit_after_shutdown_fails() {
        let queue = EventQueue::new();
        queue.shutdown();
        queue.shutdown(); // idempotent
        assert_eq!(queue.emit(SinkEvent::Started), Err(SinkError::ShutDown));
    }

    #[tokio::test]
    async fn shutdown_wakes_pending_recv() {
        let queue = EventQueue::new();
        let mut rx = queue.take_receiver().unwrap();
        queue.emit(SinkEvent::Stopped).unwrap();
        queue.shutdown();

        // Buffered event is still delivered, then the channel closes.
        assert_eq!(rx.recv().await, Some(SinkEvent::Stopped));
        assert_eq!(rx.recv().await, None);
    }
}
