//! # Sample and Marker Value Objects
//!
//! A [`Sample`] is one unit of media payload with a presentation timestamp.
//! A [`Marker`] is an in-band control event interleaved with samples; it
//! carries two opaque payloads (a marker value and a caller context) and is
//! never reordered relative to the samples enqueued around it.

use bytes::Bytes;
use std::time::Duration;

/// One unit of media payload with its presentation timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Raw frame bytes.
    pub data: Bytes,
    /// Presentation timestamp relative to the session start.
    pub timestamp: Duration,
}

impl Sample {
    /// Create a new sample.
    pub fn new(data: Bytes, timestamp: Duration) -> Self {
        Self { data, timestamp }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the sample carries no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Kind of an in-band marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// The producer finished a segment; the sink reports end-of-stream to its
    /// parent when this marker is processed.
    EndOfSegment,
    /// Application-defined marker, identified by an opaque tag.
    Custom(u32),
}

/// An immutable in-band control event.
///
/// Markers always complete: their completion event is emitted whether the
/// queue is drained normally or flushed, so a producer waiting on a placed
/// marker is never stranded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    kind: MarkerKind,
    value: Option<Bytes>,
    context: Option<Bytes>,
}

impl Marker {
    /// Create a marker with optional value and context payloads.
    pub fn new(kind: MarkerKind, value: Option<Bytes>, context: Option<Bytes>) -> Self {
        Self {
            kind,
            value,
            context,
        }
    }

    /// The marker kind.
    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    /// The opaque marker value payload.
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// The opaque caller context payload, returned with the completion event.
    pub fn context(&self) -> Option<&Bytes> {
        self.context.as_ref()
    }
}
