//! # External Collaborator Traits
//!
//! Seams between the sink core and its host:
//!
//! - [`SampleConsumer`]: the downstream recipient of delivered frames (a
//!   recorder, encoder, or renderer surface).
//! - [`PresentationClock`] / [`ClockStateSink`]: the external time source
//!   that drives start/stop, and the notification surface the media sink
//!   implements to receive its transitions.
//!
//! All traits are `Send + Sync`: the consumer is invoked from the dispatch
//! worker thread, and clock notifications may arrive on a third thread.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Downstream recipient of delivered samples.
///
/// Called from the dispatch worker, one sample at a time, in presentation
/// order. A returned error stops the current drain walk early; it is not
/// fatal to the sink, and delivery resumes on the next dispatch.
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
pub trait SampleConsumer: Send + Sync {
    /// Receive one frame and its presentation timestamp.
    fn on_sample_available(&self, data: &Bytes, presentation_time: Duration) -> Result<()>;
}

/// Notification surface for presentation clock transitions.
///
/// A media sink implements this; the clock (or the host driving it) calls in
/// when its state changes. Implementations may reject transitions they do
/// not support.
pub trait ClockStateSink: Send + Sync {
    /// The clock started; `offset` is the presentation time at the start.
    fn on_clock_start(&self, offset: Duration) -> Result<()>;

    /// The clock stopped.
    fn on_clock_stop(&self) -> Result<()>;

    /// The clock paused.
    fn on_clock_pause(&self) -> Result<()>;

    /// The clock resumed from a pause.
    fn on_clock_restart(&self) -> Result<()>;

    /// The clock rate changed.
    fn on_clock_set_rate(&self, rate: f32) -> Result<()>;
}

/// An external presentation clock a media sink can subscribe to.
///
/// The sink registers itself on [`MediaSink::set_presentation_clock`]
/// (and unregisters from the previously set clock), after which the clock
/// delivers its state transitions through the sink's [`ClockStateSink`]
/// implementation.
///
/// [`MediaSink::set_presentation_clock`]: crate::sink::MediaSink::set_presentation_clock
pub trait PresentationClock: Send + Sync {
    /// Subscribe a state sink to this clock's transitions.
    fn add_state_sink(&self, sink: Arc<dyn ClockStateSink>);

    /// Remove a previously subscribed state sink.
    fn remove_state_sink(&self, sink: &Arc<dyn ClockStateSink>);
}
