//! # Core Video Sink
//!
//! A render-style video sink that bridges a push-based sample producer into
//! a queue-and-async-dispatch pipeline.
//!
//! The producer calls into [`StreamSink`] synchronously; every accepted item
//! (sample, marker, or format change) travels through one strict-FIFO
//! pending queue and is processed by a serial dispatch worker, which
//! delivers samples to the registered [`SampleConsumer`] and emits
//! [`SinkEvent`]s back to the producer. [`MediaSink`] is the single-stream
//! container: it owns the stream, forwards presentation-clock transitions,
//! and aggregates end-of-stream reports.
//!
//! ## Example
//!
//! ```no_run
//! use core_videosink::{
//!     MediaSink, Sample, SinkConfig, StartPosition, VideoFormat,
//! };
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! # fn main() -> core_videosink::Result<()> {
//! let sink = MediaSink::with_format(SinkConfig::default(), VideoFormat::hd_720p30())?;
//! let mut events = sink.stream().take_events().unwrap();
//!
//! sink.stream().start(StartPosition::At(Duration::ZERO))?;
//! sink.stream().submit_sample(Sample::new(Bytes::from_static(&[0; 16]), Duration::ZERO))?;
//!
//! while let Some(event) = events.blocking_recv() {
//!     println!("sink event: {event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod format;
pub mod queue;
pub mod sample;
pub mod sink;
pub mod stream;
pub mod traits;

pub use config::SinkConfig;
pub use error::{Result, SinkError};
pub use events::{EventReceiver, SinkEvent};
pub use format::{PixelFormat, VideoFormat};
pub use queue::QueueItem;
pub use sample::{Marker, MarkerKind, Sample};
pub use sink::{MediaSink, SinkCharacteristics};
pub use stream::{SinkState, StartPosition, StreamSink};
pub use traits::{ClockStateSink, PresentationClock, SampleConsumer};

#[cfg(any(test, feature = "test-support"))]
pub use traits::MockSampleConsumer;
