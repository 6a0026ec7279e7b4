use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::error::ProtocolError;

/// One framed protocol unit from the sending side: the fixed 6-byte data header plus the
///  payload. The handshake probe is the same thing with an empty payload and sequence
///  number 0.
///
/// Immutable once built - the constructor enforces all field invariants, so a value of
///  this type is valid by construction on both the encode and the decode path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    /// length of header + payload in bytes; doubles as the framing length prefix
    pub total_length: u16,
    /// on the probe: the ceiling the sender asks about; on data: echo of the negotiated ceiling
    pub max_msg_size: u16,
    /// declared sliding-window capacity, 1..=128 (transmitted as `value - 1`)
    pub window_size: u8,
    /// position in the cyclic space of `2 * window_size` labels
    pub sequence_num: u8,
    pub payload: Bytes,
}

impl DataSegment {
    pub const HEADER_LEN: usize = 6;
    pub const HEADER_LEN_U16: u16 = Self::HEADER_LEN as u16;
    pub const MAX_WINDOW_SIZE: u8 = 128;

    /// hard ceiling on `total_length`, imposed by the u16 length prefix
    pub const MAX_TOTAL_LENGTH: u16 = u16::MAX;
    pub const MAX_PAYLOAD_LEN: usize = Self::MAX_TOTAL_LENGTH as usize - Self::HEADER_LEN;

    pub fn new(
        total_length: Option<u16>,
        max_msg_size: u16,
        window_size: u8,
        sequence_num: u8,
        payload: Bytes,
    ) -> Result<DataSegment, ProtocolError> {
        if window_size < 1 || window_size > Self::MAX_WINDOW_SIZE {
            return Err(ProtocolError::FieldOutOfRange {
                field: "window_size",
                value: window_size as u32,
                allowed: "1..=128",
            });
        }
        if sequence_num as u16 >= 2 * window_size as u16 {
            return Err(ProtocolError::FieldOutOfRange {
                field: "sequence_num",
                value: sequence_num as u32,
                allowed: "0..2*window_size",
            });
        }

        let expected_total = Self::HEADER_LEN + payload.len();
        if expected_total > Self::MAX_TOTAL_LENGTH as usize {
            return Err(ProtocolError::FieldOutOfRange {
                field: "total_length",
                value: expected_total as u32,
                allowed: "6..=65535",
            });
        }
        let expected_total = expected_total as u16;

        // a caller-supplied total length that disagrees with the payload is corrected
        //  rather than rejected
        let total_length = match total_length {
            None => expected_total,
            Some(t) if t == expected_total => t,
            Some(t) => {
                warn!(
                    "supplied total length {} disagrees with header + payload length {} - correcting",
                    t, expected_total
                );
                expected_total
            }
        };

        if total_length > max_msg_size {
            return Err(ProtocolError::FieldOutOfRange {
                field: "total_length",
                value: total_length as u32,
                allowed: "header_len..=max_msg_size",
            });
        }

        Ok(DataSegment {
            total_length,
            max_msg_size,
            window_size,
            sequence_num,
            payload,
        })
    }

    /// The handshake probe: header only, sequence number 0, `max_msg_size` carrying the
    ///  ceiling the sender wants an answer about.
    pub fn probe(window_size: u8, requested_max_msg_size: u16) -> Result<DataSegment, ProtocolError> {
        Self::new(None, requested_max_msg_size, window_size, 0, Bytes::new())
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u16(self.total_length);
        buf.put_u16(self.max_msg_size);
        buf.put_u8(self.window_size - 1);
        buf.put_u8(self.sequence_num);
        buf.put_slice(&self.payload);
    }

    pub fn deser(buf: &mut impl Buf) -> Result<DataSegment, ProtocolError> {
        let len = buf.remaining();
        let malformed = |_| ProtocolError::MalformedHeader { kind: "data", len };

        let total_length = buf.try_get_u16().map_err(malformed)?;
        let max_msg_size = buf.try_get_u16().map_err(malformed)?;
        let window_size_minus_one = buf.try_get_u8().map_err(malformed)?;
        let sequence_num = buf.try_get_u8().map_err(malformed)?;

        if window_size_minus_one >= Self::MAX_WINDOW_SIZE {
            return Err(ProtocolError::FieldOutOfRange {
                field: "window_size",
                value: window_size_minus_one as u32 + 1,
                allowed: "1..=128",
            });
        }

        let payload = buf.copy_to_bytes(buf.remaining());
        Self::new(
            Some(total_length),
            max_msg_size,
            window_size_minus_one + 1,
            sequence_num,
            payload,
        )
    }
}

/// The receiving side's answer: the ceiling it will accept and the highest sequence number
///  acknowledged so far (cumulative). Fixed 3 bytes on the wire, never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSegment {
    pub max_msg_size: u16,
    pub ack_number: u8,
}

impl AckSegment {
    pub const SERIALIZED_LEN: usize = 3;

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u16(self.max_msg_size);
        buf.put_u8(self.ack_number);
    }

    pub fn deser(buf: &mut impl Buf) -> Result<AckSegment, ProtocolError> {
        let len = buf.remaining();
        let malformed = |_| ProtocolError::MalformedHeader { kind: "ack", len };

        let max_msg_size = buf.try_get_u16().map_err(malformed)?;
        let ack_number = buf.try_get_u8().map_err(malformed)?;
        Ok(AckSegment {
            max_msg_size,
            ack_number,
        })
    }
}
