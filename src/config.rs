use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::headers::DataSegment;

/// Configuration of the sending side of a session.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// The maximum number of segments kept in flight pending an ack. The sequence number
    ///  space is twice this size, so the hard upper bound is 128.
    pub window_size: u8,

    /// How long the sender waits for an ack for the oldest in-flight segment before it
    ///  resends the entire window.
    ///
    /// This should be chosen well above one RTT - a value that is too small causes
    ///  spurious full-window retransmissions.
    pub ack_timeout: Duration,

    /// The segment size (header plus payload) the sender proposes during negotiation.
    ///  The peer may lower it but never raise it.
    pub requested_max_msg_size: u16,
}

impl SenderConfig {
    pub fn new(window_size: u8, ack_timeout: Duration, requested_max_msg_size: u16) -> SenderConfig {
        SenderConfig {
            window_size,
            ack_timeout,
            requested_max_msg_size,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_size < 1 || self.window_size > DataSegment::MAX_WINDOW_SIZE {
            bail!("window size must be in 1..=128, got {}", self.window_size);
        }
        if self.requested_max_msg_size <= DataSegment::HEADER_LEN_U16 {
            bail!(
                "requested max segment size {} leaves no room for payload after the {} byte header",
                self.requested_max_msg_size,
                DataSegment::HEADER_LEN,
            );
        }
        if self.ack_timeout.is_zero() {
            bail!("ack timeout must be non-zero");
        }
        Ok(())
    }
}

/// Configuration of a receiving endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub bind_addr: SocketAddr,

    /// If no new connection arrives for this long and no connection is currently being
    ///  served, the accept loop shuts down.
    pub idle_timeout: Duration,

    /// Capacity of the per-connection read buffer. A single read may hold several
    ///  coalesced segments; they are framed and processed as one batch.
    pub read_buffer_size: usize,
}

impl EndpointConfig {
    pub fn new(bind_addr: SocketAddr) -> EndpointConfig {
        EndpointConfig {
            bind_addr,
            idle_timeout: Duration::from_secs(120),
            read_buffer_size: DataSegment::MAX_TOTAL_LENGTH as usize,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.read_buffer_size < DataSegment::HEADER_LEN {
            bail!("read buffer too small to hold a segment header");
        }
        if self.idle_timeout.is_zero() {
            bail!("idle timeout must be non-zero");
        }
        Ok(())
    }
}
