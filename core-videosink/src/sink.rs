//! # Media Sink
//!
//! The single-stream container around [`StreamSink`]: it owns the fixed
//! stream, hands samples to the registered [`SampleConsumer`], forwards
//! presentation-clock state changes into the stream, and aggregates
//! end-of-stream reports from the stream's end-of-segment markers.
//!
//! The sink's own lock is never taken while the stream's dispatch worker
//! holds the stream lock: deliveries read the consumer slot through its own
//! `RwLock`, and end-of-stream reports arrive only after the stream lock has
//! been released.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::SinkConfig;
use crate::error::{Result, SinkError};
use crate::format::VideoFormat;
use crate::stream::{StartPosition, StreamSink};
use crate::traits::{ClockStateSink, PresentationClock, SampleConsumer};

/// The sink exposes exactly one fixed stream.
const STREAM_COUNT: u32 = 1;

/// Static capability flags reported by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkCharacteristics {
    /// The sink consumes samples as fast as they arrive; it does not pace
    /// presentation against the clock.
    pub rateless: bool,
    /// Streams cannot be added or removed.
    pub fixed_streams: bool,
}

struct MediaShared {
    is_shutdown: bool,
    clock: Option<Arc<dyn PresentationClock>>,
    start_time: Duration,
    streams_ended: u32,
}

pub(crate) struct MediaSinkInner {
    shared: Mutex<MediaShared>,
    // Separate from the state lock so sample delivery (stream lock held)
    // never touches the sink's lock domain.
    consumer: RwLock<Option<Arc<dyn SampleConsumer>>>,
    stream: StreamSink,
}

/// The top-level sink handed to the producer.
///
/// Cheap to clone; all clones share one underlying sink.
#[derive(Clone)]
pub struct MediaSink {
    inner: Arc<MediaSinkInner>,
}

impl MediaSink {
    /// Create a sink with no media type set; the stream starts in
    /// `TypeNotSet` and accepts only `set_media_type`.
    pub fn new(config: SinkConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SinkError::InvalidArgument(e.to_string()))?;

        let stream = StreamSink::new(&config)?;
        let inner = Arc::new(MediaSinkInner {
            shared: Mutex::new(MediaShared {
                is_shutdown: false,
                clock: None,
                start_time: Duration::ZERO,
                streams_ended: 0,
            }),
            consumer: RwLock::new(None),
            stream,
        });
        inner.stream.set_parent(Arc::downgrade(&inner));

        debug!(stream = config.stream_id, "media sink created");
        Ok(Self { inner })
    }

    /// Create a sink and set the stream's media type in one step.
    pub fn with_format(config: SinkConfig, format: VideoFormat) -> Result<Self> {
        let sink = Self::new(config)?;
        sink.inner.stream.set_media_type(format)?;
        Ok(sink)
    }

    /// Static capability flags.
    pub fn characteristics(&self) -> Result<SinkCharacteristics> {
        self.check_shutdown()?;
        Ok(SinkCharacteristics {
            rateless: true,
            fixed_streams: true,
        })
    }

    /// Number of streams. Always one.
    pub fn stream_count(&self) -> Result<u32> {
        self.check_shutdown()?;
        Ok(STREAM_COUNT)
    }

    /// The fixed stream.
    pub fn stream(&self) -> &StreamSink {
        &self.inner.stream
    }

    /// Look up the stream by position.
    pub fn stream_by_index(&self, index: u32) -> Result<&StreamSink> {
        self.check_shutdown()?;
        if index >= STREAM_COUNT {
            return Err(SinkError::InvalidStream(index));
        }
        Ok(&self.inner.stream)
    }

    /// Look up the stream by its identifier.
    pub fn stream_by_id(&self, id: u32) -> Result<&StreamSink> {
        self.check_shutdown()?;
        let stream_id = self.inner.stream.identifier()?;
        if id != stream_id {
            return Err(SinkError::InvalidStream(id));
        }
        Ok(&self.inner.stream)
    }

    /// The stream set is fixed; adding streams is not supported.
    pub fn add_stream(&self, _id: u32, _format: VideoFormat) -> Result<()> {
        self.check_shutdown()?;
        Err(SinkError::InvalidRequest)
    }

    /// The stream set is fixed; removing streams is not supported.
    pub fn remove_stream(&self, _id: u32) -> Result<()> {
        self.check_shutdown()?;
        Err(SinkError::InvalidRequest)
    }

    /// Register (or replace) the downstream consumer that receives delivered
    /// samples.
    pub fn set_sample_consumer(&self, consumer: Option<Arc<dyn SampleConsumer>>) {
        *self.inner.consumer.write() = consumer;
    }

    /// Attach to (or detach from) a presentation clock. The sink registers
    /// itself as the clock's state sink and forwards start/stop transitions
    /// into the stream.
    pub fn set_presentation_clock(
        &self,
        clock: Option<Arc<dyn PresentationClock>>,
    ) -> Result<()> {
        let previous = {
            let mut shared = self.inner.shared.lock();
            if shared.is_shutdown {
                return Err(SinkError::ShutDown);
            }
            let previous = shared.clock.take();
            shared.clock = clock.clone();
            previous
        };

        // Registration happens outside the sink lock; the clock may call
        // back into us synchronously.
        let state_sink: Arc<dyn ClockStateSink> = self.inner.clone();
        if let Some(previous) = previous {
            previous.remove_state_sink(&state_sink);
        }
        if let Some(clock) = clock {
            clock.add_state_sink(state_sink);
        }
        Ok(())
    }

    /// The attached presentation clock, or [`SinkError::NoClock`].
    pub fn presentation_clock(&self) -> Result<Arc<dyn PresentationClock>> {
        let shared = self.inner.shared.lock();
        if shared.is_shutdown {
            return Err(SinkError::ShutDown);
        }
        shared.clock.clone().ok_or(SinkError::NoClock)
    }

    /// The presentation time recorded at the last clock start.
    pub fn session_start_time(&self) -> Result<Duration> {
        let shared = self.inner.shared.lock();
        if shared.is_shutdown {
            return Err(SinkError::ShutDown);
        }
        Ok(shared.start_time)
    }

    /// Returns `true` once every stream has reported end-of-stream.
    pub fn is_complete(&self) -> bool {
        self.inner.shared.lock().streams_ended >= STREAM_COUNT
    }

    /// Permanently tear the sink and its stream down. Idempotent.
    pub fn shutdown(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.is_shutdown {
            return;
        }
        debug!("media sink shutdown");
        shared.is_shutdown = true;
        shared.clock = None;
        drop(shared);

        self.inner.stream.shutdown();
        *self.inner.consumer.write() = None;
    }

    fn check_shutdown(&self) -> Result<()> {
        if self.inner.shared.lock().is_shutdown {
            Err(SinkError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl MediaSinkInner {
    /// Hand one sample to the registered consumer. Called from the stream's
    /// dispatch worker with the stream lock held; only the consumer slot's
    /// own lock is touched here.
    pub(crate) fn deliver_sample(&self, data: &Bytes, presentation_time: Duration) -> Result<()> {
        let consumer = self.consumer.read().clone();
        match consumer {
            Some(consumer) => consumer.on_sample_available(data, presentation_time),
            // No consumer registered; the sample is consumed silently.
            None => Ok(()),
        }
    }

    /// One stream finished its segment. Called after the stream lock has
    /// been released.
    pub(crate) fn report_end_of_stream(&self) {
        let mut shared = self.shared.lock();
        if shared.is_shutdown {
            return;
        }
        shared.streams_ended += 1;
        if shared.streams_ended >= STREAM_COUNT {
            info!("all streams reported end-of-stream");
        }
    }
}

impl ClockStateSink for MediaSinkInner {
    fn on_clock_start(&self, offset: Duration) -> Result<()> {
        debug!(?offset, "clock start");
        let mut shared = self.shared.lock();
        if shared.is_shutdown {
            return Err(SinkError::ShutDown);
        }
        shared.start_time = offset;
        drop(shared);

        self.stream.start(StartPosition::At(offset))
    }

    fn on_clock_stop(&self) -> Result<()> {
        debug!("clock stop");
        if self.shared.lock().is_shutdown {
            return Err(SinkError::ShutDown);
        }
        self.stream.stop()
    }

    fn on_clock_pause(&self) -> Result<()> {
        // A rateless sink does not pace against the clock; pausing the clock
        // is meaningless here and pausing the stream stays under the
        // producer's control.
        warn!("clock pause rejected");
        Err(SinkError::InvalidRequest)
    }

    fn on_clock_restart(&self) -> Result<()> {
        warn!("clock restart rejected");
        Err(SinkError::InvalidRequest)
    }

    fn on_clock_set_rate(&self, rate: f32) -> Result<()> {
        // Rateless: any rate is acceptable and ignored.
        debug!(rate, "clock rate change ignored");
        Ok(())
    }
}
