//! Per-message envelope: lazy typed access, acknowledge, dead-letter.
//!
//! Decoding happens at most once. The first call to `model` decodes and
//! caches the outcome (record or error); later calls return the cached
//! outcome without touching the payload again.

use std::sync::Arc;

use qmsg_core::error::{QmsgError, Result, Settlement};
use qmsg_core::protocol::{codec, header, Attributes, Header};
use qmsg_core::record::{DecodedRecord, Record};
use qmsg_core::Registry;

use crate::transport::{RawMessage, RetryingClient};

#[derive(Debug)]
enum DecodeState {
    NotDecoded,
    Decoded(DecodedRecord),
    Failed(QmsgError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Pending,
    /// Copied to the dead-letter topic, primary ack still outstanding.
    DeadLetterCopied,
    Settled(Settlement),
}

#[derive(Debug)]
pub struct Envelope {
    message: Option<RawMessage>,
    client: Arc<RetryingClient>,
    dead_letter_client: Arc<RetryingClient>,
    registry: Arc<Registry>,
    decoded: DecodeState,
    progress: Progress,
}

impl Envelope {
    pub fn new(
        message: Option<RawMessage>,
        client: Arc<RetryingClient>,
        dead_letter_client: Arc<RetryingClient>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            message,
            client,
            dead_letter_client,
            registry,
            decoded: DecodeState::NotDecoded,
            progress: Progress::Pending,
        }
    }

    /// True when the receive call found no message.
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.message_id.as_str())
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        self.message.as_ref().map(|m| &m.attributes)
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.message.as_ref().map(|m| m.payload.as_ref())
    }

    pub fn settlement(&self) -> Option<Settlement> {
        match self.progress {
            Progress::Settled(s) => Some(s),
            _ => None,
        }
    }

    pub fn header(&self) -> Result<Header> {
        let msg = self.message.as_ref().ok_or(QmsgError::NoMessagesReceived)?;
        header::create_header(&msg.attributes)
    }

    /// Decoded record, computed on first access.
    pub fn model(&mut self) -> Result<&DecodedRecord> {
        let msg = self.message.as_ref().ok_or(QmsgError::NoMessagesReceived)?;

        if matches!(self.decoded, DecodeState::NotDecoded) {
            let outcome = header::create_header(&msg.attributes).and_then(|h| {
                codec::decode_payload(Some(&h), &msg.payload, &self.registry)
            });
            self.decoded = match outcome {
                Ok(record) => DecodeState::Decoded(record),
                Err(e) => {
                    tracing::debug!(message_id = %msg.message_id, error = %e, "decode failed");
                    DecodeState::Failed(e)
                }
            };
        }

        match &self.decoded {
            DecodeState::Decoded(record) => Ok(record),
            DecodeState::Failed(e) => Err(e.clone()),
            DecodeState::NotDecoded => Err(QmsgError::decoding("decode did not run")),
        }
    }

    /// Typed view; a tag that maps to another record type is a decoding error.
    pub fn model_as<R: Record>(&mut self) -> Result<&R> {
        let decoded = self.model()?;
        let tag = decoded.tag().to_owned();
        decoded.downcast_ref::<R>().ok_or_else(|| {
            QmsgError::decoding(format!(
                "message of type {tag} is not a {}",
                std::any::type_name::<R>()
            ))
        })
    }

    pub async fn acknowledge(&mut self) -> Result<()> {
        if let Progress::Settled(s) = self.progress {
            return Err(QmsgError::AlreadySettled(s));
        }
        self.ack_primary().await?;
        self.progress = Progress::Settled(Settlement::Acknowledged);
        Ok(())
    }

    /// Copy the raw message to the dead-letter topic, then acknowledge it.
    ///
    /// If the copy fails the message is left unacknowledged so the transport
    /// redelivers it. A copy that succeeded is never published twice.
    pub async fn mark_as_dead_letter(&mut self) -> Result<()> {
        if let Progress::Settled(s) = self.progress {
            return Err(QmsgError::AlreadySettled(s));
        }
        let msg = self.message.as_ref().ok_or(QmsgError::NoMessagesReceived)?;

        if self.progress == Progress::Pending {
            if let Err(e) = self
                .dead_letter_client
                .publish(msg.payload.clone(), &msg.attributes)
                .await
            {
                return Err(QmsgError::messaging(
                    "error while sending a message to the dead letter queue",
                    msg.attributes.clone(),
                    Some(String::from_utf8_lossy(&msg.payload).into_owned()),
                    e,
                ));
            }
            tracing::info!(
                message_id = %msg.message_id,
                topic = self.dead_letter_client.topic(),
                "message copied to dead letter topic"
            );
            self.progress = Progress::DeadLetterCopied;
        }

        self.ack_primary().await?;
        self.progress = Progress::Settled(Settlement::DeadLettered);
        Ok(())
    }

    async fn ack_primary(&self) -> Result<()> {
        let msg = self.message.as_ref().ok_or(QmsgError::NoMessagesReceived)?;
        tracing::debug!(message_id = %msg.message_id, ack_id = %msg.ack_id, "message ack");
        self.client.acknowledge(&msg.ack_id).await.map_err(|e| {
            QmsgError::messaging(
                "error while acknowledging a message",
                msg.attributes.clone(),
                None,
                e,
            )
        })
    }
}
