use thiserror::Error;

/// Classification of everything that can go wrong while decoding or framing wire data.
///
/// All variants are local to one physical read: the read is discarded, committed session
///  state is never affected. `HandshakeFailed` is the exception - it terminates the
///  connection attempt because no window synchronization exists yet to recover through.
///
/// Timeouts are deliberately absent: on the sending side they are a normal, recoverable
///  condition driving go-back-N retransmission. So is the stale / duplicate classification
///  of segments and acks, which is silent bookkeeping rather than an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer of {len} bytes is too short for a {kind} header")]
    MalformedHeader { kind: &'static str, len: usize },

    #[error("{field} out of range: got {value}, allowed {allowed}")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        allowed: &'static str,
    },

    #[error("length prefix declares {declared} bytes but only {remaining} remain in the read")]
    TruncatedStream { declared: usize, remaining: usize },

    #[error("session handshake failed")]
    HandshakeFailed(#[source] Box<ProtocolError>),
}
