use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug_span, info, warn, Instrument};
use uuid::Uuid;

use crate::config::EndpointConfig;
use crate::delivery_sink::DeliverySink;
use crate::framer;
use crate::headers::{AckSegment, DataSegment};
use crate::receive_stream::ReceiveStream;
use crate::size_policy::SizePolicy;

/// Receiving endpoint: accepts connections, runs one reassembly session per connection
///  and hands completed messages to the [DeliverySink].
///
/// The accept loop shuts down once no new connection has arrived for the configured
///  idle timeout while no connection is being served.
pub struct EndPoint {
    listener: TcpListener,
    config: Arc<EndpointConfig>,
    size_policy: Arc<dyn SizePolicy>,
    delivery_sink: Arc<dyn DeliverySink>,
    active_connections: Arc<AtomicUsize>,
}

impl EndPoint {
    pub async fn new(
        config: EndpointConfig,
        size_policy: Arc<dyn SizePolicy>,
        delivery_sink: Arc<dyn DeliverySink>,
    ) -> anyhow::Result<EndPoint> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(EndPoint {
            listener,
            config: Arc::new(config),
            size_policy,
            delivery_sink,
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept_loop(&self) -> anyhow::Result<()> {
        loop {
            match timeout(self.config.idle_timeout, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    self.active_connections.fetch_add(1, Ordering::SeqCst);

                    let config = self.config.clone();
                    let size_policy = self.size_policy.clone();
                    let delivery_sink = self.delivery_sink.clone();
                    let active_connections = self.active_connections.clone();

                    tokio::spawn(
                        async move {
                            if let Err(e) = handle_connection(
                                stream,
                                peer,
                                &config,
                                size_policy.as_ref(),
                                delivery_sink.as_ref(),
                            )
                            .await
                            {
                                warn!("connection failed: {:#}", e);
                            }
                            active_connections.fetch_sub(1, Ordering::SeqCst);
                        }
                        .instrument(debug_span!("connection", %peer)),
                    );
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    if self.active_connections.load(Ordering::SeqCst) == 0 {
                        info!(
                            "no connection for {:?} and none active, shutting down",
                            self.config.idle_timeout
                        );
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Runs one session and delivers the reassembled message (if it carried any payload at
///  all) once the connection is over - whether the peer closed it cleanly or the
///  transport failed mid-session. What was committed before a failure is a valid prefix
///  of the message and still goes to the sink.
async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    peer: SocketAddr,
    config: &EndpointConfig,
    size_policy: &dyn SizePolicy,
    delivery_sink: &dyn DeliverySink,
) -> anyhow::Result<()> {
    let mut session = ReceiveStream::new();
    let result = run_session(&mut stream, &mut session, config, size_policy).await;

    let message = session.into_assembled();
    if !message.is_empty() {
        delivery_sink.on_message(peer, message.to_vec()).await;
    }
    result
}

/// Reads batches until the peer closes the connection, acking each one.
async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    session: &mut ReceiveStream,
    config: &EndpointConfig,
    size_policy: &dyn SizePolicy,
) -> anyhow::Result<()> {
    let mut read_buf = BytesMut::with_capacity(config.read_buffer_size);

    loop {
        read_buf.clear();
        let n = stream.read_buf(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }

        let batch_id = Uuid::new_v4();
        let ack = debug_span!("batch", %batch_id, len = n)
            .in_scope(|| process_batch(session, &read_buf, size_policy));

        if let Some(ack) = ack {
            let mut buf = BytesMut::with_capacity(AckSegment::SERIALIZED_LEN);
            ack.ser(&mut buf);
            stream.write_all(&buf).await?;
        }
    }
}

/// Decodes and applies one read batch, returning the cumulative ack to answer with.
///
/// All frames are decoded before any is applied: a batch with a malformed segment is
///  dropped as a whole and not acknowledged, leaving retransmission to sort it out.
fn process_batch(
    session: &mut ReceiveStream,
    batch: &[u8],
    size_policy: &dyn SizePolicy,
) -> Option<AckSegment> {
    let frames = match framer::split(batch) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("discarding unframeable batch: {}", e);
            return None;
        }
    };

    let mut segments = Vec::with_capacity(frames.len());
    for mut frame in frames {
        match DataSegment::deser(&mut frame) {
            Ok(segment) => segments.push(segment),
            Err(e) => {
                warn!("discarding batch with malformed segment: {}", e);
                return None;
            }
        }
    }

    for segment in segments {
        session.on_segment(segment, size_policy);
    }
    session.ack()
}
