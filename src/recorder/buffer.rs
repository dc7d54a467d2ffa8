//! Chunk buffering
//!
//! The encoder pushes container chunks into a [`BufferedSink`]; the session
//! seals the sink when the encoder halts and concatenates the buffer into
//! the final artifact.

use super::session::RecordingEvent;
use crate::capture::traits::ChunkSink;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Ordered, append-only sequence of encoder chunks for one session
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Bytes>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn push(&mut self, chunk: Bytes) {
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Concatenate every chunk in delivery order
    pub fn assemble(self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks.into_iter().next().unwrap_or_default();
        }

        let mut out = BytesMut::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }
}

struct SinkInner {
    buffer: ChunkBuffer,
    announced: bool,
    sealed: bool,
}

/// Session-side [`ChunkSink`] that buffers chunks and emits notifications.
///
/// All bookkeeping and event sends happen under one lock, so per-chunk
/// notifications are ordered after `Started` and before `Stopped`.
#[derive(Clone)]
pub struct BufferedSink {
    inner: Arc<Mutex<SinkInner>>,
    events: broadcast::Sender<RecordingEvent>,
}

impl BufferedSink {
    pub(crate) fn new(events: broadcast::Sender<RecordingEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkInner {
                buffer: ChunkBuffer::default(),
                announced: false,
                sealed: false,
            })),
            events,
        }
    }

    fn append(&self, chunk: Bytes) -> bool {
        let mut inner = self.inner.lock();

        if inner.sealed {
            tracing::warn!("Dropping {} byte chunk delivered after stop", chunk.len());
            return false;
        }
        if chunk.is_empty() {
            return true;
        }

        let sequence = inner.buffer.len();
        let size = chunk.len();
        inner.buffer.push(chunk);
        tracing::debug!("Chunk #{} buffered ({} bytes)", sequence, size);

        if inner.announced {
            let _ = self.events.send(RecordingEvent::DataAvailable { sequence, size });
        }
        true
    }

    /// Emit `Started`, then replay notifications for chunks that arrived
    /// while the encoder was still starting up
    pub(crate) fn announce_started(&self) {
        let mut inner = self.inner.lock();
        if inner.announced {
            return;
        }
        inner.announced = true;

        let _ = self.events.send(RecordingEvent::Started);
        for (sequence, chunk) in inner.buffer.chunks.iter().enumerate() {
            let _ = self.events.send(RecordingEvent::DataAvailable {
                sequence,
                size: chunk.len(),
            });
        }
    }

    /// Stop accepting chunks and take the buffer
    pub(crate) fn seal(&self) -> ChunkBuffer {
        let mut inner = self.inner.lock();
        inner.sealed = true;
        std::mem::take(&mut inner.buffer)
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    pub fn buffered_bytes(&self) -> usize {
        self.inner.lock().buffer.total_bytes()
    }
}

impl ChunkSink for BufferedSink {
    /// Returns `false` if the sink is already sealed and the chunk was dropped
    fn deliver(&self, chunk: Bytes) -> bool {
        self.append(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<RecordingEvent>) -> Vec<RecordingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_assemble_preserves_order() {
        let mut buffer = ChunkBuffer::default();
        buffer.push(Bytes::from_static(b"ab"));
        buffer.push(Bytes::from_static(b"cde"));
        buffer.push(Bytes::from_static(b"f"));
        assert_eq!(buffer.total_bytes(), 6);
        assert_eq!(&buffer.assemble()[..], b"abcdef");
    }

    #[test]
    fn test_empty_buffer_assembles_to_nothing() {
        assert!(ChunkBuffer::default().assemble().is_empty());
    }

    #[test]
    fn test_early_chunks_replayed_after_started() {
        let (tx, mut rx) = broadcast::channel(16);
        let sink = BufferedSink::new(tx);

        sink.deliver(vec![1u8; 4].into());
        assert!(drain(&mut rx).is_empty());

        sink.announce_started();
        sink.deliver(vec![2u8; 2].into());

        let events = drain(&mut rx);
        assert!(matches!(events[0], RecordingEvent::Started));
        assert!(matches!(
            events[1],
            RecordingEvent::DataAvailable { sequence: 0, size: 4 }
        ));
        assert!(matches!(
            events[2],
            RecordingEvent::DataAvailable { sequence: 1, size: 2 }
        ));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_sealed_sink_rejects_chunks() {
        let (tx, _rx) = broadcast::channel(16);
        let sink = BufferedSink::new(tx);
        sink.deliver(Bytes::from_static(b"x"));

        let buffer = sink.seal();
        assert_eq!(buffer.len(), 1);
        assert!(!sink.deliver(Bytes::from_static(b"late")));
        assert!(sink.is_sealed());
        assert_eq!(sink.buffered_bytes(), 0);
    }
}
