use bytes::Bytes;

/// Source of outbound message content, consumed chunk by chunk as window slots open up.
///
/// Implementations hand out at most `max_size` bytes per call and return `None` once the
///  message is exhausted. A source that is empty from the start yields `None` on the
///  first call, in which case nothing but the negotiation probe goes on the wire.
pub trait ContentSource: Send {
    fn next_chunk(&mut self, max_size: usize) -> Option<Bytes>;
}

/// Adapter that chunks an in-memory buffer.
pub struct SliceSource {
    remaining: Bytes,
}

impl SliceSource {
    pub fn new(data: impl Into<Bytes>) -> SliceSource {
        SliceSource {
            remaining: data.into(),
        }
    }
}

impl ContentSource for SliceSource {
    fn next_chunk(&mut self, max_size: usize) -> Option<Bytes> {
        if self.remaining.is_empty() {
            return None;
        }
        let len = self.remaining.len().min(max_size);
        Some(self.remaining.split_to(len))
    }
}
