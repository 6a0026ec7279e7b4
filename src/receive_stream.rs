use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::headers::{AckSegment, DataSegment};
use crate::seq::SeqSpace;
use crate::size_policy::SizePolicy;

/// Session parameters fixed by the first segment of a session.
struct Negotiated {
    space: SeqSpace,
    max_accepted_size: u16,
}

/// Receiving half of a session: reassembles a message from segments arriving in any
///  order, with duplicates and stale retransmissions.
///
/// This is pure protocol state with no I/O attached. The caller feeds in decoded
///  segments and asks for the cumulative ack to send back; on session end it takes the
///  reassembled message out.
///
/// Segments are only ever appended to the assembled message in sequence order, so the
///  result is complete and in order no matter how the wire reordered things. Anything
///  stale relative to the cumulative ack is dropped without a trace in the output.
pub struct ReceiveStream {
    negotiated: Option<Negotiated>,

    /// highest sequence number delivered in order so far, `None` before the first one
    last_acked: Option<u8>,

    /// out-of-order segments waiting for their predecessors, kept sorted by cyclic order
    pending: Vec<DataSegment>,

    assembled: BytesMut,
}

impl ReceiveStream {
    pub fn new() -> ReceiveStream {
        ReceiveStream {
            negotiated: None,
            last_acked: None,
            pending: Vec::new(),
            assembled: BytesMut::new(),
        }
    }

    /// Feeds one decoded segment into the session.
    ///
    /// The first segment of a session fixes the window size and negotiates the segment
    ///  size ceiling as the minimum of the sender's proposal and the local policy. The
    ///  probe is just a regular segment with sequence number 0 and no payload, so it
    ///  needs no special handling here.
    pub fn on_segment(&mut self, segment: DataSegment, size_policy: &dyn SizePolicy) {
        let space = match &self.negotiated {
            Some(n) => n.space,
            None => {
                let max_accepted_size = segment.max_msg_size.min(size_policy.max_accepted_size());
                debug!(
                    window_size = segment.window_size,
                    max_accepted_size, "negotiated session parameters"
                );
                let space = SeqSpace::new(segment.window_size);
                self.negotiated = Some(Negotiated {
                    space,
                    max_accepted_size,
                });
                space
            }
        };

        if let Some(last_acked) = self.last_acked {
            if space.is_stale_or_duplicate(segment.sequence_num, last_acked) {
                trace!(
                    seq = segment.sequence_num,
                    last_acked, "discarding stale segment"
                );
                return;
            }
        }
        if self
            .pending
            .iter()
            .any(|p| p.sequence_num == segment.sequence_num)
        {
            trace!(seq = segment.sequence_num, "discarding duplicate segment");
            return;
        }

        let index = self
            .pending
            .iter()
            .position(|p| match self.last_acked {
                Some(pivot) => space.is_before(segment.sequence_num, p.sequence_num, pivot),
                // nothing delivered yet, the sequence space has not wrapped
                None => segment.sequence_num < p.sequence_num,
            })
            .unwrap_or(self.pending.len());
        self.pending.insert(index, segment);

        // deliver the in-order prefix
        loop {
            let expected = match self.last_acked {
                Some(last_acked) => space.next(last_acked),
                None => 0,
            };
            match self.pending.first() {
                Some(front) if front.sequence_num == expected => {
                    let segment = self.pending.remove(0);
                    self.assembled.put_slice(&segment.payload);
                    self.last_acked = Some(expected);
                    trace!(seq = expected, "delivered segment");
                }
                _ => break,
            }
        }
    }

    /// The cumulative ack to send back, or `None` while nothing has been delivered in
    ///  order yet (then there is nothing meaningful to acknowledge, and staying silent
    ///  makes the sender retransmit).
    pub fn ack(&self) -> Option<AckSegment> {
        let negotiated = self.negotiated.as_ref()?;
        let last_acked = self.last_acked?;
        Some(AckSegment {
            max_msg_size: negotiated.max_accepted_size,
            ack_number: last_acked,
        })
    }

    pub fn into_assembled(self) -> Bytes {
        self.assembled.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size_policy::FixedSizePolicy;

    fn segment(seq: u8, payload: &'static [u8]) -> DataSegment {
        DataSegment::new(None, 1024, 4, seq, Bytes::from_static(payload)).unwrap()
    }

    #[test]
    fn test_in_order_delivery() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();

        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);
        assert_eq!(
            stream.ack(),
            Some(AckSegment {
                max_msg_size: 1024,
                ack_number: 0
            })
        );

        stream.on_segment(segment(1, b"hello "), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 1);
        stream.on_segment(segment(2, b"world"), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 2);

        assert_eq!(stream.into_assembled(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);

        stream.on_segment(segment(2, b"bb"), &policy);
        // still waiting for 1
        assert_eq!(stream.ack().unwrap().ack_number, 0);

        stream.on_segment(segment(1, b"aa"), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 2);

        stream.on_segment(segment(3, b"cc"), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 3);

        assert_eq!(stream.into_assembled(), Bytes::from_static(b"aabbcc"));
    }

    #[test]
    fn test_duplicate_pending_segment_ignored() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);

        stream.on_segment(segment(2, b"bb"), &policy);
        stream.on_segment(segment(2, b"bb"), &policy);
        stream.on_segment(segment(1, b"aa"), &policy);

        assert_eq!(stream.ack().unwrap().ack_number, 2);
        assert_eq!(stream.into_assembled(), Bytes::from_static(b"aabb"));
    }

    #[test]
    fn test_stale_retransmission_discarded() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);
        for seq in 1..=6 {
            stream.on_segment(segment(seq, b"x"), &policy);
        }
        assert_eq!(stream.ack().unwrap().ack_number, 6);

        // a full window behind (and ambiguous with a full window ahead): must be dropped
        stream.on_segment(segment(2, b"stale"), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 6);
        assert_eq!(stream.into_assembled(), Bytes::from_static(b"xxxxxx"));
    }

    #[test]
    fn test_no_ack_before_first_delivery() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();
        assert_eq!(stream.ack(), None);

        // segment 1 arrives before the probe: buffered, but 0 is still missing
        stream.on_segment(segment(1, b"aa"), &policy);
        assert_eq!(stream.ack(), None);

        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 1);
        assert_eq!(stream.into_assembled(), Bytes::from_static(b"aa"));
    }

    #[test]
    fn test_size_negotiation_takes_minimum() {
        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &FixedSizePolicy(512));
        assert_eq!(stream.ack().unwrap().max_msg_size, 512);

        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &FixedSizePolicy(4096));
        assert_eq!(stream.ack().unwrap().max_msg_size, 1024);
    }

    #[test]
    fn test_retransmitted_window_is_assembled_exactly_once() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);

        stream.on_segment(segment(1, b"one"), &policy);
        stream.on_segment(segment(2, b"two"), &policy);

        // go-back-n resends the whole window together with the next segment
        stream.on_segment(segment(1, b"one"), &policy);
        stream.on_segment(segment(2, b"two"), &policy);
        stream.on_segment(segment(3, b"three"), &policy);

        assert_eq!(stream.ack().unwrap().ack_number, 3);
        assert_eq!(stream.into_assembled(), Bytes::from_static(b"onetwothree"));
    }

    #[test]
    fn test_size_policy_consulted_exactly_once() {
        let mut policy = crate::size_policy::MockSizePolicy::new();
        policy
            .expect_max_accepted_size()
            .times(1)
            .return_const(512u16);

        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);
        stream.on_segment(segment(1, b"aa"), &policy);
        stream.on_segment(segment(2, b"bb"), &policy);

        assert_eq!(stream.ack().unwrap().max_msg_size, 512);
    }

    #[test]
    fn test_wrapping_sequence_space() {
        let policy = FixedSizePolicy(2048);
        let mut stream = ReceiveStream::new();
        stream.on_segment(DataSegment::probe(4, 1024).unwrap(), &policy);
        for seq in 1..=7 {
            stream.on_segment(segment(seq, b"x"), &policy);
        }
        assert_eq!(stream.ack().unwrap().ack_number, 7);

        // wrap: 1 arrives before 0
        stream.on_segment(segment(1, b"b"), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 7);
        stream.on_segment(segment(0, b"a"), &policy);
        assert_eq!(stream.ack().unwrap().ack_number, 1);

        assert_eq!(stream.into_assembled(), Bytes::from_static(b"xxxxxxxab"));
    }
}
