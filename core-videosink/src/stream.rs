//! # Stream Sink
//!
//! The core state machine bridging a push-based producer into the sink's
//! queue-and-async-dispatch model.
//!
//! ## Model
//!
//! The producer calls in synchronously (`submit_sample`, `place_marker`,
//! transitions); each call validates against the state/operation matrix,
//! mutates state and the pending queue under one lock, posts a work item to
//! the serial dispatch worker, and returns. The worker later drains the
//! queue, delivers samples to the parent sink's consumer, and emits events
//! back to the producer through the event channel.
//!
//! ## Locking
//!
//! One `parking_lot::Mutex` guards all stream state. It is held across
//! validation, queue mutation, and work-item posting, but never across the
//! blocking event pull (consumer side) or the end-of-stream hop to the
//! parent — both run lock-free.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::SinkConfig;
use crate::dispatch::{SerialDispatcher, StreamOperation};
use crate::error::{Result, SinkError};
use crate::events::{EventQueue, EventReceiver, SinkEvent};
use crate::format::VideoFormat;
use crate::queue::{QueueItem, SampleQueue};
use crate::sample::{Marker, MarkerKind, Sample};
use crate::sink::MediaSinkInner;

/// Stream sink lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No media type set yet; only `set_media_type` is accepted.
    TypeNotSet,
    /// Media type set, streaming not started.
    Ready,
    /// Accepting and dispatching samples.
    Started,
    /// Accepting samples and markers but not dispatching.
    Paused,
    /// Halted; restartable only via a fresh `start`.
    Stopped,
}

impl SinkState {
    fn index(self) -> usize {
        match self {
            SinkState::TypeNotSet => 0,
            SinkState::Ready => 1,
            SinkState::Started => 2,
            SinkState::Paused => 3,
            SinkState::Stopped => 4,
        }
    }
}

/// Where streaming starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Start at the given presentation time.
    At(Duration),
    /// Derive the start time from the first sample received after the start.
    Current,
}

// Static matrix of operations vs states. If an entry is true, the operation
// is valid from that state.
const VALID_STATE_MATRIX: [[bool; 7]; 5] = [
    // States:     Operations:
    //             SetType Start  Restart Pause  Stop   Sample Marker
    /* TypeNotSet */ [true, false, false, false, false, false, false],
    /* Ready */      [true, true,  false, true,  true,  false, true],
    /* Started */    [true, true,  false, true,  true,  true,  true],
    /* Paused */     [true, true,  true,  true,  true,  true,  true],
    /* Stopped */    [true, true,  false, false, true,  false, true],
];

/// Outcome of one drain walk over the pending queue.
struct DrainOutcome {
    /// `true` if the queue was emptied; `false` if the walk stopped early
    /// and a follow-up dispatch is needed.
    fully_drained: bool,
    /// An end-of-segment marker was processed; the caller must report
    /// end-of-stream to the parent after releasing the stream lock.
    end_of_segment: bool,
}

struct Shared {
    state: SinkState,
    is_shutdown: bool,
    current_format: Option<VideoFormat>,
    start_time: Duration,
    start_time_from_sample: bool,
    waiting_for_first_sample: bool,
    first_sample: Option<Sample>,
    parent: Weak<MediaSinkInner>,
    dispatcher: Option<SerialDispatcher>,
}

pub(crate) struct StreamInner {
    id: u32,
    shared: Mutex<Shared>,
    queue: SampleQueue,
    events: EventQueue,
}

/// The stream sink exposed to the producer.
///
/// Cheap to clone; all clones share one underlying stream.
#[derive(Clone)]
pub struct StreamSink {
    inner: Arc<StreamInner>,
}

impl StreamSink {
    pub(crate) fn new(config: &SinkConfig) -> Result<Self> {
        let inner = Arc::new(StreamInner {
            id: config.stream_id,
            shared: Mutex::new(Shared {
                state: SinkState::TypeNotSet,
                is_shutdown: false,
                current_format: None,
                start_time: Duration::ZERO,
                start_time_from_sample: false,
                waiting_for_first_sample: false,
                first_sample: None,
                parent: Weak::new(),
                dispatcher: None,
            }),
            queue: SampleQueue::new(config.max_queue_items),
            events: EventQueue::new(),
        });

        let weak = Arc::downgrade(&inner);
        let dispatcher = SerialDispatcher::spawn(&config.worker_name, move |op| {
            if let Some(inner) = weak.upgrade() {
                inner.on_dispatch_work_item(op);
            }
        })?;
        inner.shared.lock().dispatcher = Some(dispatcher);

        Ok(Self { inner })
    }

    pub(crate) fn set_parent(&self, parent: Weak<MediaSinkInner>) {
        self.inner.shared.lock().parent = parent;
    }

    /// The immutable stream identifier.
    pub fn identifier(&self) -> Result<u32> {
        let shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        Ok(self.inner.id)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SinkState {
        self.inner.shared.lock().state
    }

    /// Take the event receiver. Yields `Some` exactly once.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.inner.events.take_receiver()
    }

    /// The current media type, or [`SinkError::NotInitialized`] if none has
    /// been set.
    pub fn current_format(&self) -> Result<VideoFormat> {
        let shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        shared.current_format.clone().ok_or(SinkError::NotInitialized)
    }

    /// Check whether `format` would be accepted as the stream's type right
    /// now. Once a type is set, the pixel format may not change.
    pub fn is_format_supported(&self, format: &VideoFormat) -> Result<()> {
        let shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        check_format(&shared, format)
    }

    /// The recorded session start time.
    pub fn start_time(&self) -> Result<Duration> {
        let shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        Ok(shared.start_time)
    }

    /// The priming sample captured right after a start, if any.
    ///
    /// The first sample received after `start` is retained here as the
    /// reference frame instead of travelling through the queue.
    pub fn first_sample(&self) -> Option<Sample> {
        self.inner.shared.lock().first_sample.clone()
    }

    /// Number of items pending dispatch.
    pub fn pending_items(&self) -> usize {
        self.inner.queue.len()
    }

    /// Set or replace the stream's media type.
    ///
    /// Before streaming starts this applies immediately (promoting
    /// `TypeNotSet` to `Ready`). Once streaming has started the new type is
    /// queued as an in-band format change so it applies in order relative to
    /// the samples around it.
    pub fn set_media_type(&self, format: VideoFormat) -> Result<()> {
        trace!(stream = self.inner.id, ?format, "set_media_type");
        if format.width == 0 || format.height == 0 {
            return Err(SinkError::InvalidMediaType(
                "zero frame dimensions".to_string(),
            ));
        }

        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::SetMediaType)?;

        match shared.state {
            SinkState::TypeNotSet => {
                shared.current_format = Some(format);
                shared.state = SinkState::Ready;
            }
            SinkState::Ready => {
                check_format(&shared, &format)?;
                shared.current_format = Some(format);
            }
            SinkState::Started | SinkState::Paused | SinkState::Stopped => {
                // Mid-stream: the change travels through the queue and is
                // applied by the drain at its position in the sequence.
                check_format(&shared, &format)?;
                self.inner.queue.push_back(QueueItem::FormatChange(format))?;
                if shared.state != SinkState::Paused {
                    post(&shared, StreamOperation::SetMediaType)?;
                }
            }
        }
        Ok(())
    }

    /// Begin streaming. Requires a media type; records the start position
    /// and treats the next received sample as the priming reference frame.
    pub fn start(&self, position: StartPosition) -> Result<()> {
        debug!(stream = self.inner.id, ?position, "start");
        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::Start)?;

        match position {
            StartPosition::At(t) => {
                shared.start_time = t;
                shared.start_time_from_sample = false;
            }
            StartPosition::Current => {
                shared.start_time_from_sample = true;
            }
        }
        shared.state = SinkState::Started;
        shared.waiting_for_first_sample = true;
        post(&shared, StreamOperation::Start)
    }

    /// Halt streaming. Pending samples are dropped asynchronously; pending
    /// markers still complete. `SinkEvent::Stopped` always follows.
    pub fn stop(&self) -> Result<()> {
        debug!(stream = self.inner.id, "stop");
        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::Stop)?;

        shared.state = SinkState::Stopped;
        post(&shared, StreamOperation::Stop)
    }

    /// Resume from `Paused` without resetting the start time.
    pub fn restart(&self) -> Result<()> {
        debug!(stream = self.inner.id, "restart");
        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::Restart)?;

        shared.state = SinkState::Started;
        post(&shared, StreamOperation::Restart)
    }

    /// Suspend dispatch. Samples and markers are still accepted and queue up
    /// until `restart`.
    pub fn pause(&self) -> Result<()> {
        debug!(stream = self.inner.id, "pause");
        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::Pause)?;

        shared.state = SinkState::Paused;
        post(&shared, StreamOperation::Pause)
    }

    /// Accept one sample from the producer. Non-blocking: the sample is
    /// enqueued (or captured as the priming frame) and delivered later by
    /// the dispatch worker.
    pub fn submit_sample(&self, sample: Sample) -> Result<()> {
        trace!(
            stream = self.inner.id,
            len = sample.len(),
            ts = ?sample.timestamp,
            "submit_sample"
        );
        if sample.is_empty() {
            return Err(SinkError::InvalidArgument("empty sample payload".to_string()));
        }

        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::ProcessSample)?;

        if shared.waiting_for_first_sample {
            // The first frame after a start primes the stream: it is kept as
            // the reference frame and the producer is asked for more right
            // away, with no dispatch round-trip.
            if shared.start_time_from_sample {
                shared.start_time = sample.timestamp;
                shared.start_time_from_sample = false;
            }
            shared.first_sample = Some(sample);
            shared.waiting_for_first_sample = false;
            self.inner.events.emit(SinkEvent::RequestSample)
        } else {
            self.inner.queue.push_back(QueueItem::Sample(sample))?;
            if shared.state != SinkState::Paused {
                post(&shared, StreamOperation::ProcessSample)?;
            }
            Ok(())
        }
    }

    /// Place an in-band marker. Its completion event is emitted once every
    /// item queued before it has been processed — or during a flush/stop,
    /// where markers still complete even though samples are dropped.
    pub fn place_marker(&self, marker: Marker) -> Result<()> {
        trace!(stream = self.inner.id, kind = ?marker.kind(), "place_marker");
        let shared = self.inner.shared.lock();
        check_shutdown(&shared)?;
        validate_operation(&shared, StreamOperation::PlaceMarker)?;

        self.inner.queue.push_back(QueueItem::Marker(marker))?;
        if shared.state != SinkState::Paused {
            post(&shared, StreamOperation::PlaceMarker)?;
        }
        Ok(())
    }

    /// Drop all pending samples and format changes. Pending markers still
    /// complete so the producer is never left waiting on one.
    pub fn flush(&self) -> Result<()> {
        debug!(stream = self.inner.id, "flush");
        let mut shared = self.inner.shared.lock();
        check_shutdown(&shared)?;

        let outcome = self.inner.process_queue(&mut shared, true)?;
        let parent = shared.parent.clone();
        drop(shared);

        if outcome.end_of_segment {
            report_end_of_stream(&parent);
        }
        Ok(())
    }

    /// Permanently tear the stream down. Idempotent; after this every other
    /// operation fails with [`SinkError::ShutDown`].
    pub fn shutdown(&self) {
        debug!(stream = self.inner.id, "shutdown");
        let mut shared = self.inner.shared.lock();
        if shared.is_shutdown {
            return;
        }
        self.inner.events.shutdown();
        if let Some(dispatcher) = shared.dispatcher.take() {
            dispatcher.shutdown();
        }
        self.inner.queue.clear();
        shared.parent = Weak::new();
        shared.current_format = None;
        shared.first_sample = None;
        shared.is_shutdown = true;
    }
}

impl StreamInner {
    /// Runs on the dispatch worker thread, one work item at a time.
    fn on_dispatch_work_item(self: &Arc<Self>, op: StreamOperation) {
        trace!(stream = self.id, ?op, "dispatch work item");
        let mut shared = self.shared.lock();
        if shared.is_shutdown {
            return;
        }

        let mut end_of_segment = false;
        let result = self.run_work_item(&mut shared, op, &mut end_of_segment);
        let parent = shared.parent.clone();
        drop(shared);

        if let Err(e) = result {
            // No synchronous caller to report to; surface it on the event
            // channel instead.
            warn!(stream = self.id, error = %e, "dispatch work item failed");
            let _ = self.events.emit(SinkEvent::Error(e));
        }
        if end_of_segment {
            // The stream lock is released before hopping into the parent's
            // lock domain.
            report_end_of_stream(&parent);
        }
    }

    fn run_work_item(
        self: &Arc<Self>,
        shared: &mut Shared,
        op: StreamOperation,
        end_of_segment: &mut bool,
    ) -> Result<()> {
        match op {
            StreamOperation::Start | StreamOperation::Restart => {
                self.events.emit(SinkEvent::Started)?;
                // A pause may have landed between the post and this item
                // running; queued items then wait for the restart.
                if shared.state == SinkState::Paused {
                    return Ok(());
                }
                // There may be items queued from earlier (e.g. while paused).
                let outcome = self.process_queue(shared, false)?;
                *end_of_segment = outcome.end_of_segment;
                if outcome.fully_drained {
                    self.events.emit(SinkEvent::RequestSample)?;
                }
                Ok(())
            }
            StreamOperation::Stop => {
                // Stopping must always look successful to the producer: the
                // stopped event fires even if the drop walk failed.
                match self.process_queue(shared, true) {
                    Ok(outcome) => *end_of_segment = outcome.end_of_segment,
                    Err(e) => debug!(stream = self.id, error = %e, "drop walk failed during stop"),
                }
                self.events.emit(SinkEvent::Stopped)
            }
            StreamOperation::Pause => self.events.emit(SinkEvent::Paused),
            StreamOperation::ProcessSample
            | StreamOperation::PlaceMarker
            | StreamOperation::SetMediaType => {
                if shared.state == SinkState::Paused {
                    return Ok(());
                }
                let outcome = self.process_queue(shared, false)?;
                *end_of_segment = outcome.end_of_segment;
                // Back-pressure only answers sample deliveries; markers and
                // format changes do not consume the producer's sample budget.
                if outcome.fully_drained && op == StreamOperation::ProcessSample {
                    self.events.emit(SinkEvent::RequestSample)?;
                }
                Ok(())
            }
        }
    }

    /// Walk the pending queue front to back.
    ///
    /// Non-flush mode delivers samples and applies format changes; flush
    /// mode drops both. Markers complete in either mode. A sample delivery
    /// failure stops the walk early (the remaining items wait for the next
    /// dispatch); it is not a hard error.
    fn process_queue(&self, shared: &mut Shared, flush: bool) -> Result<DrainOutcome> {
        let mut fully_drained = false;
        let mut end_of_segment = false;

        loop {
            let Some(item) = self.queue.pop_front() else {
                fully_drained = true;
                break;
            };
            match item {
                QueueItem::Sample(sample) => {
                    if !flush {
                        if let Err(e) = self.deliver_sample(shared, &sample) {
                            debug!(stream = self.id, error = %e, "sample delivery failed");
                            break;
                        }
                    }
                }
                QueueItem::Marker(marker) => {
                    // Markers always complete, flushed or not.
                    self.events
                        .emit(SinkEvent::MarkerCompleted(marker.context().cloned()))?;
                    if marker.kind() == MarkerKind::EndOfSegment {
                        end_of_segment = true;
                    }
                }
                QueueItem::FormatChange(format) => {
                    if !flush {
                        // Applied here so it takes effect before the samples
                        // queued after it are delivered.
                        shared.current_format = Some(format);
                    }
                }
            }
        }

        Ok(DrainOutcome {
            fully_drained,
            end_of_segment,
        })
    }

    fn deliver_sample(&self, shared: &Shared, sample: &Sample) -> Result<()> {
        match shared.parent.upgrade() {
            Some(parent) => parent.deliver_sample(&sample.data, sample.timestamp),
            // Parent already gone; nothing downstream to deliver to.
            None => Ok(()),
        }
    }
}

fn check_shutdown(shared: &Shared) -> Result<()> {
    if shared.is_shutdown {
        Err(SinkError::ShutDown)
    } else {
        Ok(())
    }
}

fn validate_operation(shared: &Shared, op: StreamOperation) -> Result<()> {
    if VALID_STATE_MATRIX[shared.state.index()][op.index()] {
        Ok(())
    } else if shared.state == SinkState::TypeNotSet {
        Err(SinkError::NotInitialized)
    } else {
        Err(SinkError::InvalidRequest)
    }
}

fn check_format(shared: &Shared, format: &VideoFormat) -> Result<()> {
    if let Some(current) = &shared.current_format {
        if !current.is_compatible_with(format) {
            return Err(SinkError::InvalidMediaType(format!(
                "pixel format {:?} does not match the stream's {:?}",
                format.pixel_format, current.pixel_format
            )));
        }
    }
    Ok(())
}

fn post(shared: &Shared, op: StreamOperation) -> Result<()> {
    match shared.dispatcher.as_ref() {
        Some(dispatcher) => dispatcher.post(op),
        None => Err(SinkError::ShutDown),
    }
}

fn report_end_of_stream(parent: &Weak<MediaSinkInner>) {
    if let Some(parent) = parent.upgrade() {
        parent.report_end_of_stream();
    }
}
