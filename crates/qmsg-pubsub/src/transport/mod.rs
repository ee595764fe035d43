//! Transport layer (managed pub/sub).
//!
//! `Transport` is the seam to the underlying queue client. Everything above it
//! goes through `RetryingClient`, which applies the retry policy and turns
//! permanent failures into `QmsgError::Client`.

pub mod memory;
pub mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use qmsg_core::error::{TransportError, TransportErrorKind};
use qmsg_core::protocol::Attributes;

pub use memory::MemoryTransport;
pub use retry::{build_backoff, retry, RetryPolicy, RetryingClient};

/// One message as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Undecoded body.
    pub payload: Bytes,
    /// Opaque handle used to acknowledge this delivery.
    pub ack_id: String,
    pub message_id: String,
    pub attributes: Attributes,
}

/// Push-delivery stream of raw messages.
pub type Delivery = mpsc::UnboundedReceiver<RawMessage>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish to a topic, returning the server-assigned message id.
    async fn publish(
        &self,
        destination: &str,
        payload: Bytes,
        attributes: &Attributes,
    ) -> Result<String, TransportError>;

    /// Pull at most one message; `None` when nothing is available right now.
    async fn pull(&self, source: &str) -> Result<Option<RawMessage>, TransportError>;

    /// Acknowledge one delivery. Not idempotent: call once per message.
    async fn acknowledge(&self, source: &str, ack_id: &str) -> Result<(), TransportError>;

    /// Long-lived push delivery for `source`.
    async fn subscribe(&self, source: &str) -> Result<Delivery, TransportError> {
        Err(TransportError::new(
            TransportErrorKind::Unsupported,
            format!("push delivery not supported for {source}"),
        ))
    }
}
