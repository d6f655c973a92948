//! End-to-end pipeline tests: producer-side calls in, consumer deliveries
//! and event-channel traffic out, across the dispatch worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use core_videosink::{
    ClockStateSink, EventReceiver, Marker, MarkerKind, MediaSink, PresentationClock, Result,
    Sample, SampleConsumer, SinkConfig, SinkError, SinkEvent, SinkState, StartPosition,
    VideoFormat,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Records every delivery; optionally fails the next one.
#[derive(Default)]
struct RecordingConsumer {
    calls: Mutex<Vec<(Vec<u8>, Duration)>>,
    fail_next: AtomicBool,
}

impl RecordingConsumer {
    fn calls(&self) -> Vec<(Vec<u8>, Duration)> {
        self.calls.lock().clone()
    }
}

impl SampleConsumer for RecordingConsumer {
    fn on_sample_available(&self, data: &Bytes, presentation_time: Duration) -> Result<()> {
        self.calls.lock().push((data.to_vec(), presentation_time));
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SinkError::Consumer("injected failure".to_string()));
        }
        Ok(())
    }
}

/// Minimal clock: remembers its subscribers and forwards transitions.
#[derive(Default)]
struct FakeClock {
    sinks: Mutex<Vec<Arc<dyn ClockStateSink>>>,
}

impl FakeClock {
    fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    fn start(&self, offset: Duration) -> Result<()> {
        for sink in self.sinks.lock().iter() {
            sink.on_clock_start(offset)?;
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        for sink in self.sinks.lock().iter() {
            sink.on_clock_stop()?;
        }
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        for sink in self.sinks.lock().iter() {
            sink.on_clock_pause()?;
        }
        Ok(())
    }
}

impl PresentationClock for FakeClock {
    fn add_state_sink(&self, sink: Arc<dyn ClockStateSink>) {
        self.sinks.lock().push(sink);
    }

    fn remove_state_sink(&self, sink: &Arc<dyn ClockStateSink>) {
        self.sinks.lock().retain(|s| !Arc::ptr_eq(s, sink));
    }
}

fn sample(n: u8) -> Sample {
    Sample::new(
        Bytes::copy_from_slice(&[n]),
        Duration::from_millis(n as u64),
    )
}

/// Route sink tracing through the test harness; `RUST_LOG` controls the
/// filter when a test needs log inspection.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn new_pipeline() -> (MediaSink, Arc<RecordingConsumer>, EventReceiver) {
    init_tracing();
    let sink = MediaSink::with_format(SinkConfig::default(), VideoFormat::hd_720p30())
        .expect("sink creation");
    let consumer = Arc::new(RecordingConsumer::default());
    sink.set_sample_consumer(Some(consumer.clone()));
    let events = sink.stream().take_events().expect("event receiver");
    (sink, consumer, events)
}

async fn next_event(events: &mut EventReceiver) -> SinkEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a sink event")
        .expect("event channel closed unexpectedly")
}

async fn expect_event(events: &mut EventReceiver, expected: SinkEvent) {
    let event = next_event(events).await;
    assert_eq!(event, expected);
}

#[tokio::test]
async fn started_stream_primes_then_delivers() {
    let (sink, consumer, mut events) = new_pipeline();
    let stream = sink.stream();

    stream.start(StartPosition::At(Duration::ZERO)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;

    // First sample is captured as the reference frame, never delivered.
    stream.submit_sample(sample(1)).unwrap();
    expect_event(&mut events, SinkEvent::RequestSample).await;
    assert_eq!(stream.first_sample(), Some(sample(1)));
    assert!(consumer.calls().is_empty());

    // Second sample travels through the queue to the consumer.
    stream.submit_sample(sample(2)).unwrap();
    expect_event(&mut events, SinkEvent::RequestSample).await;
    assert_eq!(consumer.calls(), vec![(vec![2], Duration::from_millis(2))]);

    stream.stop().unwrap();
    expect_event(&mut events, SinkEvent::Stopped).await;
    assert_eq!(stream.state(), SinkState::Stopped);

    sink.shutdown();
}

#[tokio::test]
async fn paused_items_drain_in_order_on_restart() {
    let (sink, consumer, mut events) = new_pipeline();
    let stream = sink.stream();

    stream.start(StartPosition::At(Duration::ZERO)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;
    stream.submit_sample(sample(1)).unwrap(); // priming frame
    expect_event(&mut events, SinkEvent::RequestSample).await;

    stream.pause().unwrap();
    expect_event(&mut events, SinkEvent::Paused).await;

    // Buffer two samples around a marker while paused.
    stream.submit_sample(sample(2)).unwrap();
    stream
        .place_marker(Marker::new(
            MarkerKind::Custom(9),
            None,
            Some(Bytes::from_static(b"between")),
        ))
        .unwrap();
    stream.submit_sample(sample(3)).unwrap();
    assert_eq!(stream.pending_items(), 3);
    assert!(consumer.calls().is_empty());

    stream.restart().unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(
        &mut events,
        SinkEvent::MarkerCompleted(Some(Bytes::from_static(b"between"))),
    )
    .await;
    expect_event(&mut events, SinkEvent::RequestSample).await;

    // Strict submission order: sample 2, then the marker, then sample 3.
    assert_eq!(
        consumer.calls(),
        vec![
            (vec![2], Duration::from_millis(2)),
            (vec![3], Duration::from_millis(3)),
        ]
    );
    assert_eq!(stream.pending_items(), 0);

    sink.shutdown();
}

#[tokio::test]
async fn stop_drops_samples_but_completes_markers() {
    let (sink, consumer, mut events) = new_pipeline();
    let stream = sink.stream();

    stream.start(StartPosition::At(Duration::ZERO)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;
    stream.submit_sample(sample(1)).unwrap(); // priming frame
    expect_event(&mut events, SinkEvent::RequestSample).await;

    stream.pause().unwrap();
    expect_event(&mut events, SinkEvent::Paused).await;

    stream.submit_sample(sample(2)).unwrap();
    stream
        .place_marker(Marker::new(
            MarkerKind::Custom(1),
            None,
            Some(Bytes::from_static(b"pending")),
        ))
        .unwrap();

    stream.stop().unwrap();
    // The marker completes before the stop confirmation; the buffered
    // sample is dropped without delivery.
    expect_event(
        &mut events,
        SinkEvent::MarkerCompleted(Some(Bytes::from_static(b"pending"))),
    )
    .await;
    expect_event(&mut events, SinkEvent::Stopped).await;
    assert!(consumer.calls().is_empty());
    assert_eq!(stream.pending_items(), 0);

    sink.shutdown();
}

#[tokio::test]
async fn end_of_segment_marker_completes_the_sink() {
    let (sink, _consumer, mut events) = new_pipeline();
    let stream = sink.stream();

    stream.start(StartPosition::At(Duration::ZERO)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;
    assert!(!sink.is_complete());

    stream
        .place_marker(Marker::new(MarkerKind::EndOfSegment, None, None))
        .unwrap();
    expect_event(&mut events, SinkEvent::MarkerCompleted(None)).await;

    // End-of-stream is reported to the sink after the stream lock is
    // released, so give it a moment.
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !sink.is_complete() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "sink never reported completion"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    sink.shutdown();
}

#[tokio::test]
async fn delivery_failure_defers_the_request_for_more() {
    let (sink, consumer, mut events) = new_pipeline();
    let stream = sink.stream();

    stream.start(StartPosition::At(Duration::ZERO)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;
    stream.submit_sample(sample(1)).unwrap(); // priming frame
    expect_event(&mut events, SinkEvent::RequestSample).await;

    // The failed delivery must not produce a sample request.
    consumer.fail_next.store(true, Ordering::SeqCst);
    stream.submit_sample(sample(2)).unwrap();

    // The next successful delivery produces exactly one.
    stream.submit_sample(sample(3)).unwrap();
    expect_event(&mut events, SinkEvent::RequestSample).await;

    assert_eq!(
        consumer.calls(),
        vec![
            (vec![2], Duration::from_millis(2)),
            (vec![3], Duration::from_millis(3)),
        ]
    );
    // Nothing further queued behind that single request.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(events.try_recv(), None);

    sink.shutdown();
}

#[tokio::test]
async fn clock_transitions_drive_the_stream() {
    let (sink, _consumer, mut events) = new_pipeline();
    let clock = Arc::new(FakeClock::default());

    sink.set_presentation_clock(Some(clock.clone())).unwrap();
    assert_eq!(clock.sink_count(), 1);
    assert!(sink.presentation_clock().is_ok());

    clock.start(Duration::from_millis(250)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;
    assert_eq!(sink.stream().state(), SinkState::Started);
    assert_eq!(sink.session_start_time().unwrap(), Duration::from_millis(250));
    assert_eq!(
        sink.stream().start_time().unwrap(),
        Duration::from_millis(250)
    );

    // A rateless sink rejects clock pauses and resumes.
    assert_eq!(clock.pause(), Err(SinkError::InvalidRequest));
    assert_eq!(sink.stream().state(), SinkState::Started);

    clock.stop().unwrap();
    expect_event(&mut events, SinkEvent::Stopped).await;
    assert_eq!(sink.stream().state(), SinkState::Stopped);

    // Detaching unsubscribes from the clock.
    sink.set_presentation_clock(None).unwrap();
    assert_eq!(clock.sink_count(), 0);
    assert!(matches!(sink.presentation_clock(), Err(SinkError::NoClock)));

    sink.shutdown();
}

#[tokio::test]
async fn mid_stream_format_change_applies_in_sequence() {
    let (sink, _consumer, mut events) = new_pipeline();
    let stream = sink.stream();

    stream.start(StartPosition::At(Duration::ZERO)).unwrap();
    expect_event(&mut events, SinkEvent::Started).await;
    expect_event(&mut events, SinkEvent::RequestSample).await;

    let resized = VideoFormat::new(core_videosink::PixelFormat::Nv12, 640, 360, (30, 1));
    stream.set_media_type(resized.clone()).unwrap();

    // A marker placed after the change; its completion proves the change
    // was drained first.
    stream
        .place_marker(Marker::new(MarkerKind::Custom(0), None, None))
        .unwrap();
    expect_event(&mut events, SinkEvent::MarkerCompleted(None)).await;
    assert_eq!(stream.current_format().unwrap(), resized);

    sink.shutdown();
}

#[tokio::test]
async fn shutdown_closes_the_event_channel() {
    let (sink, _consumer, mut events) = new_pipeline();

    sink.stream()
        .start(StartPosition::At(Duration::ZERO))
        .unwrap();
    expect_event(&mut events, SinkEvent::Started).await;

    sink.shutdown();

    // Remaining buffered events drain, then the channel closes.
    let closed = tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(_event) = events.recv().await {}
    })
    .await;
    assert!(closed.is_ok(), "event channel never closed");

    // Every producer-side entry point now fails fast.
    assert_eq!(sink.stream().submit_sample(sample(1)), Err(SinkError::ShutDown));
    assert_eq!(sink.stream_count(), Err(SinkError::ShutDown));
    sink.shutdown(); // idempotent
}
