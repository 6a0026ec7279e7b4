use crate::error::ProtocolError;
use crate::headers::DataSegment;

/// Split one physical read from the transport into the complete wire messages it contains.
///
/// A byte-stream transport may coalesce several writes into one read; this walks the
///  embedded `total_length` prefixes and slices one sub-buffer per segment. The inverse
///  case - one write split across two reads - is *not* handled: the read is assumed to
///  start on a segment boundary, and a prefix pointing past the end of the buffer fails
///  with `TruncatedStream` (see the crate-level known-limitation note).
pub fn split(mut buf: &[u8]) -> Result<Vec<&[u8]>, ProtocolError> {
    let mut frames = Vec::new();

    while !buf.is_empty() {
        if buf.len() < 2 {
            return Err(ProtocolError::TruncatedStream {
                declared: 2,
                remaining: buf.len(),
            });
        }
        let declared = u16::from_be_bytes([buf[0], buf[1]]) as usize;

        // a prefix below the header length cannot delimit a segment and would stall the walk
        if declared < DataSegment::HEADER_LEN {
            return Err(ProtocolError::FieldOutOfRange {
                field: "total_length",
                value: declared as u32,
                allowed: "6..=65535",
            });
        }
        if declared > buf.len() {
            return Err(ProtocolError::TruncatedStream {
                declared,
                remaining: buf.len(),
            });
        }

        frames.push(&buf[..declared]);
        buf = &buf[declared..];
    }

    Ok(frames)
}
