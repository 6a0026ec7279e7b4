use std::collections::VecDeque;

use anyhow::{bail, Context};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::config::SenderConfig;
use crate::content_source::{ContentSource, SliceSource};
use crate::error::ProtocolError;
use crate::headers::{AckSegment, DataSegment};
use crate::seq::SeqSpace;

/// Sending half of a session: negotiates the segment size ceiling, then pushes message
///  content through a sliding window with go-back-n retransmission.
///
/// The retransmission clock is the send time of the *oldest* unacked segment. When an
///  ack confirms progress the clock restarts; when it expires the entire in-flight
///  window is resent in order. Acks older than the oldest in-flight segment are ignored,
///  they carry no new information.
///
/// Generic over the transport so tests can drive it through an in-memory duplex pipe.
pub struct SendStream<S> {
    stream: S,
    config: SenderConfig,
    space: SeqSpace,

    /// most recently assigned sequence number; data numbering starts at 1, the probe holds 0
    last_assigned: u8,

    /// sent but unacknowledged segments, oldest first
    outstanding: VecDeque<DataSegment>,

    /// send time of the oldest unacked segment, `None` while nothing is in flight
    oldest_sent_at: Option<Instant>,

    /// segment size ceiling returned by the peer, `None` until negotiation completes
    negotiated_ceiling: Option<u16>,

    /// staging buffer for inbound ack bytes; a read may return a partial or several acks
    ack_buf: BytesMut,
}

impl SendStream<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs, config: SenderConfig) -> anyhow::Result<SendStream<TcpStream>> {
        let stream = TcpStream::connect(addr).await?;
        SendStream::new(stream, config)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> SendStream<S> {
    pub fn new(stream: S, config: SenderConfig) -> anyhow::Result<SendStream<S>> {
        config.validate()?;
        let space = SeqSpace::new(config.window_size);
        Ok(SendStream {
            stream,
            config,
            space,
            last_assigned: 0,
            outstanding: VecDeque::new(),
            oldest_sent_at: None,
            negotiated_ceiling: None,
            ack_buf: BytesMut::new(),
        })
    }

    pub async fn send_message(&mut self, message: &[u8]) -> anyhow::Result<()> {
        let mut source = SliceSource::new(message.to_vec());
        self.send(&mut source).await
    }

    /// Sends everything the source yields, returning once the peer has acknowledged the
    ///  final segment.
    pub async fn send(&mut self, source: &mut dyn ContentSource) -> anyhow::Result<()> {
        let ceiling = match self.negotiated_ceiling {
            Some(c) => c,
            None => self.negotiate().await?,
        };
        let max_payload = (ceiling - DataSegment::HEADER_LEN_U16) as usize;

        let mut exhausted = false;
        loop {
            let mut wrote = false;
            while !exhausted && self.outstanding.len() < self.config.window_size as usize {
                match source.next_chunk(max_payload) {
                    Some(chunk) => {
                        let seq = self.space.next(self.last_assigned);
                        self.last_assigned = seq;
                        let segment = DataSegment::new(
                            None,
                            ceiling,
                            self.config.window_size,
                            seq,
                            chunk,
                        )?;
                        self.write_segment(&segment).await?;
                        wrote = true;
                        if self.oldest_sent_at.is_none() {
                            self.oldest_sent_at = Some(Instant::now());
                        }
                        self.outstanding.push_back(segment);
                    }
                    None => exhausted = true,
                }
            }
            if wrote {
                self.stream.flush().await?;
            }
            if exhausted && self.outstanding.is_empty() {
                return Ok(());
            }

            let deadline = match self.oldest_sent_at {
                Some(sent_at) => sent_at + self.config.ack_timeout,
                None => Instant::now() + self.config.ack_timeout,
            };
            match self.await_ack(deadline).await? {
                Some(ack) => self.apply_ack(ack),
                None => self.retransmit_window().await?,
            }
        }
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Two-step negotiation: a probe with sequence number 0 and no payload proposes a
    ///  segment size ceiling, the first ack returns the one the peer settled on. The
    ///  probe is resent on the regular ack timeout until an answer arrives.
    async fn negotiate(&mut self) -> anyhow::Result<u16> {
        let probe = DataSegment::probe(self.config.window_size, self.config.requested_max_msg_size)?;
        self.write_segment(&probe).await?;
        self.stream.flush().await?;

        let ack = loop {
            let deadline = Instant::now() + self.config.ack_timeout;
            match self
                .await_ack(deadline)
                .await
                .context("session negotiation failed")?
            {
                Some(ack) => break ack,
                None => {
                    debug!("no answer to negotiation probe, resending");
                    self.write_segment(&probe).await?;
                    self.stream.flush().await?;
                }
            }
        };

        if ack.max_msg_size <= DataSegment::HEADER_LEN_U16 {
            return Err(ProtocolError::HandshakeFailed(Box::new(
                ProtocolError::FieldOutOfRange {
                    field: "max_msg_size",
                    value: ack.max_msg_size as u32,
                    allowed: "7..=65535",
                },
            ))
            .into());
        }
        debug!(ceiling = ack.max_msg_size, "session negotiated");
        self.negotiated_ceiling = Some(ack.max_msg_size);
        Ok(ack.max_msg_size)
    }

    /// Retires everything up to and including the acked segment. A cumulative ack may
    ///  confirm several segments at once; one that is stale relative to the oldest
    ///  in-flight segment confirms nothing.
    fn apply_ack(&mut self, ack: AckSegment) {
        let mut retired = 0usize;
        loop {
            let Some(front) = self.outstanding.front() else {
                break;
            };
            if front.sequence_num == ack.ack_number {
                self.outstanding.pop_front();
                retired += 1;
                break;
            }
            if self
                .space
                .is_stale_or_duplicate(ack.ack_number, front.sequence_num)
            {
                trace!(ack = ack.ack_number, "ignoring stale ack");
                break;
            }
            self.outstanding.pop_front();
            retired += 1;
        }

        if retired > 0 {
            trace!(ack = ack.ack_number, retired, "ack confirmed progress");
            self.oldest_sent_at = if self.outstanding.is_empty() {
                None
            } else {
                Some(Instant::now())
            };
        }
    }

    async fn retransmit_window(&mut self) -> anyhow::Result<()> {
        warn!(
            in_flight = self.outstanding.len(),
            "ack timeout, resending window"
        );
        let segments: Vec<DataSegment> = self.outstanding.iter().cloned().collect();
        for segment in &segments {
            self.write_segment(segment).await?;
        }
        self.stream.flush().await?;
        self.oldest_sent_at = Some(Instant::now());
        Ok(())
    }

    /// Waits until a full ack is buffered or the deadline passes (`Ok(None)`).
    ///
    /// Partially read acks stay in the staging buffer across calls, so a deadline firing
    ///  mid-ack loses nothing.
    async fn await_ack(&mut self, deadline: Instant) -> anyhow::Result<Option<AckSegment>> {
        loop {
            if self.ack_buf.len() >= AckSegment::SERIALIZED_LEN {
                let mut frame = self.ack_buf.split_to(AckSegment::SERIALIZED_LEN).freeze();
                return Ok(Some(AckSegment::deser(&mut frame)?));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            match timeout_at(deadline, self.stream.read_buf(&mut self.ack_buf)).await {
                Ok(Ok(0)) => bail!("connection closed while waiting for ack"),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(None),
            }
        }
    }

    async fn write_segment(&mut self, segment: &DataSegment) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(segment.total_length as usize);
        segment.ser(&mut buf);
        self.stream.write_all(&buf).await?;
        trace!(
            seq = segment.sequence_num,
            len = segment.total_length,
            "wrote segment"
        );
        Ok(())
    }
}
