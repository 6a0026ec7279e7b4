#[cfg(test)]
use mockall::automock;

/// Receiver-side policy for the segment size ceiling.
///
/// Consulted once per session, when the negotiation probe arrives: the effective limit
///  is the minimum of the sender's proposal and this value, and it is echoed back in
///  every ack so the sender sizes all subsequent segments accordingly.
#[cfg_attr(test, automock)]
pub trait SizePolicy: Send + Sync + 'static {
    fn max_accepted_size(&self) -> u16;
}

/// A fixed segment size ceiling.
pub struct FixedSizePolicy(pub u16);

impl SizePolicy for FixedSizePolicy {
    fn max_accepted_size(&self) -> u16 {
        self.0
    }
}
