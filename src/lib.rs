//! A reliable, ordered, segmented message-delivery protocol layered on top of a connected
//!  byte-stream transport. The transport is treated as unreliable at the segment level -
//!  acknowledgements can be lost or delayed, retransmitted segments can arrive duplicated or
//!  out of order - and the protocol recovers ordered, exactly-once message delivery on top
//!  of that.
//!
//! ## Design goals
//!
//! * The abstraction is transferring one *message* (a defined-length chunk of bytes) per
//!   session, split into *segments* no bigger than a negotiated ceiling
//! * Client / server asymmetry: the sending side opens a connection per message, the
//!   receiving side serves many connections concurrently, one independent worker each
//! * Sliding-window ARQ on the sending side: up to `window_size` segments may be in flight
//!   at once, un-acked segments are retransmitted wholesale on timeout (go-back-N, no
//!   selective retransmission)
//! * Cumulative acknowledgements on the receiving side: one ack number confirms the
//!   acknowledged segment and everything before it in the current window; out-of-order
//!   segments are buffered until the gap fills
//! * Sequence numbers live in a cyclic space of `2 * window_size` labels, so ordering and
//!   staleness are decided by modular comparison rather than linear comparison
//! * A two-message handshake preceding data flow negotiates the maximum segment size the
//!   receiver will accept; the handshake probe runs through the same sequencing machinery
//!   as data, not through a separate code path
//!
//! ## Header
//!
//! Data segment header (big endian, fixed 6 bytes), followed directly by the payload:
//!
//! ```ascii
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! |                               |                               |
//! |         total length          |         max msg size          |
//! |---------------+---------------|-------------------------------|
//! |               |               |                               |
//! | window size-1 |  sequence num |                               |
//! |---------------|---------------|                               |
//! |                                                               |
//! |                            PAYLOAD                            |
//! |_______________________________________________________________|
//! ```
//!
//! * `total length` (u16): number of meaningful bytes including the header. This doubles as
//!    the framing length prefix: a single read from the transport may contain several
//!    concatenated segments, which are split apart by walking the length prefixes
//! * `max msg size` (u16): on the handshake probe, the ceiling the client asks about; on
//!    data segments, an echo of the negotiated ceiling
//! * `window size` (u8): the declared sliding-window capacity 1..=128, transmitted as
//!    `value - 1` so it fits 7 bits
//! * `sequence num` (u8): position in the cyclic space of `2 * window_size` labels
//!
//! Ack header (big endian, fixed 3 bytes, no payload):
//!
//! ```ascii
//!  0                   1                   2
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
//! |                               |               |
//! |          max msg size         |    ack num    |
//! |_______________________________|_______________|
//! ```
//!
//! * `max msg size` (u16): the segment-size ceiling the acking side is willing to accept
//! * `ack num` (u8): highest sequence number acknowledged, cumulative
//!
//! ## Handshake
//!
//! The client opens the conversation with a header-only probe segment (sequence number 0,
//!  empty payload) declaring its window size and asking for the receiver's size ceiling.
//! The receiver runs the probe through its regular admission / drain machinery - thereby
//!  establishing 0 as the last acknowledged sequence number - and answers with the first
//!  ack, carrying the ceiling it will honor. Data segments are numbered from 1 onward.
//!
//! ## Known limitation
//!
//! Framing relies on every read from the transport starting on a segment boundary: reads
//!  that coalesce several complete segments are handled, a segment split across two reads
//!  is not reassembled. The receiver abandons such a read without acking, and the sender's
//!  timeout-driven retransmission recovers.

pub mod config;
pub mod content_source;
pub mod delivery_sink;
pub mod end_point;
pub mod error;
pub mod framer;
pub mod headers;
pub mod receive_stream;
pub mod send_stream;
pub mod seq;
pub mod size_policy;
