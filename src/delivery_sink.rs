use std::net::SocketAddr;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Callback for fully reassembled messages.
///
/// Invoked once per session, when the peer closes its connection: by then all delivered
///  segments have been concatenated in sequence order. Sessions that carried no payload
///  (a probe and nothing else) are not reported.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeliverySink: Send + Sync + 'static {
    async fn on_message(&self, peer: SocketAddr, message: Vec<u8>);
}
