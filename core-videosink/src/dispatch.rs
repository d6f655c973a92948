//! # Serial Dispatch Worker
//!
//! A serial work queue: operations posted from any thread run on one
//! dedicated worker thread, strictly one at a time, in post order. This is
//! what decouples the producer's synchronous `submit_sample`/`place_marker`
//! calls from actual delivery and event emission.

use parking_lot::Mutex;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, SinkError};

/// Tag carried by one posted work item; names the operation the worker
/// performs when the item runs. Consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOperation {
    /// Apply a media type (including in-band format changes).
    SetMediaType,
    /// Begin streaming from a given start position.
    Start,
    /// Resume streaming from paused without resetting the start time.
    Restart,
    /// Suspend dispatch while keeping the queue intact.
    Pause,
    /// Halt streaming and drop pending samples.
    Stop,
    /// Dispatch queued samples after a submission.
    ProcessSample,
    /// Dispatch queued items after a marker placement.
    PlaceMarker,
}

impl StreamOperation {
    /// Column index into the state/operation validity matrix.
    pub(crate) fn index(self) -> usize {
        match self {
            StreamOperation::SetMediaType => 0,
            StreamOperation::Start => 1,
            StreamOperation::Restart => 2,
            StreamOperation::Pause => 3,
            StreamOperation::Stop => 4,
            StreamOperation::ProcessSample => 5,
            StreamOperation::PlaceMarker => 6,
        }
    }
}

/// Serial FIFO worker over an unbounded mailbox.
///
/// One `std::thread` consumes posted operations with a blocking receive and
/// runs the handler for each; the single consumer thread is what guarantees
/// the one-at-a-time, in-order contract. `shutdown` closes the mailbox; the
/// thread drains what was already posted and exits.
pub struct SerialDispatcher {
    tx: Mutex<Option<mpsc::UnboundedSender<StreamOperation>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialDispatcher {
    /// Spawn the worker thread. `handler` runs on that thread for every
    /// posted operation.
    pub fn spawn<F>(name: &str, mut handler: F) -> Result<Self>
    where
        F: FnMut(StreamOperation) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamOperation>();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    handler(op);
                }
                debug!("dispatch worker exiting");
            })
            .map_err(|e| SinkError::Internal(format!("failed to spawn worker: {e}")))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Post one work item. Returns immediately; the operation runs later on
    /// the worker thread.
    pub fn post(&self, op: StreamOperation) -> Result<()> {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => tx
                .send(op)
                .map_err(|_| SinkError::ShutDown),
            None => Err(SinkError::ShutDown),
        }
    }

    /// Close the mailbox. Already-posted items still run; the worker thread
    /// then exits. Idempotent. Does not join the worker: an in-flight item
    /// may need locks the shutting-down caller currently holds.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        // Detach; the thread terminates once the mailbox drains.
        drop(self.handle.lock().take());
    }
}
