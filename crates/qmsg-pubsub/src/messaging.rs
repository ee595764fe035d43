//! Messaging facade: the only object application code talks to.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use qmsg_core::error::{QmsgError, Result};
use qmsg_core::protocol::{codec, header, Attributes};
use qmsg_core::protocol::header::IntoUtc;
use qmsg_core::record::{Record, RecordType};
use qmsg_core::Registry;

use crate::config::MessagingConfig;
use crate::envelope::Envelope;
use crate::transport::{RawMessage, RetryPolicy, RetryingClient, Transport};

/// Push-delivery handler. Each delivered message arrives in its own envelope.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Messaging {
    client: Arc<RetryingClient>,
    dead_letter_client: Arc<RetryingClient>,
    registry: Arc<Registry>,
}

impl Messaging {
    pub fn new(
        client: Arc<RetryingClient>,
        dead_letter_client: Arc<RetryingClient>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            client,
            dead_letter_client,
            registry,
        }
    }

    /// Validate `cfg`, build the registry and both clients.
    ///
    /// Every configuration problem is reported here rather than on first use.
    pub fn from_config(
        cfg: &MessagingConfig,
        transport: Arc<dyn Transport>,
        types: impl IntoIterator<Item = RecordType>,
    ) -> Result<Self> {
        cfg.validate()?;
        let registry = Registry::build(types)?;
        let policy = RetryPolicy::from(&cfg.retry);

        let client = RetryingClient::new(
            Arc::clone(&transport),
            cfg.topic_path(),
            cfg.subscription_path(),
            policy,
        );
        let dead_letter_client = RetryingClient::new(
            transport,
            cfg.dead_letter_topic_path(),
            cfg.subscription_path(),
            policy,
        );

        tracing::info!(
            topic = client.topic(),
            subscription = client.subscription(),
            dead_letter_topic = dead_letter_client.topic(),
            types = registry.len(),
            "messaging ready"
        );

        Ok(Self::new(
            Arc::new(client),
            Arc::new(dead_letter_client),
            Arc::new(registry),
        ))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode and publish `record`, returning the transport message id.
    pub async fn send<R: Record>(&self, record: &R) -> Result<String> {
        self.send_at(record, Utc::now()).await
    }

    /// Like `send`, with an explicit header timestamp.
    pub async fn send_at<R: Record>(&self, record: &R, now: impl IntoUtc) -> Result<String> {
        let attributes = header::create_attributes_at(record, &self.registry, now)?;
        let payload = codec::encode(record)?;
        self.publish(payload, attributes).await
    }

    async fn publish(&self, payload: String, attributes: Attributes) -> Result<String> {
        match self
            .client
            .publish(Bytes::from(payload.clone()), &attributes)
            .await
        {
            Ok(message_id) => {
                tracing::debug!(%message_id, tag = ?attributes.get(header::TYPE_KEY), "message sent");
                Ok(message_id)
            }
            Err(e) => Err(QmsgError::messaging(
                "error while sending a message",
                attributes,
                Some(payload),
                e,
            )),
        }
    }

    /// Pull one message. The envelope is empty when none was available.
    pub async fn receive(&self) -> Result<Envelope> {
        let pulled = self.client.pull().await.map_err(|e| {
            QmsgError::messaging("error while receiving a message", Attributes::new(), None, e)
        })?;
        Ok(self.wrap(pulled))
    }

    /// Push delivery: hand every message to `handler` until the stream ends.
    ///
    /// A handler error is logged and the message is left unsettled so the
    /// transport redelivers it.
    pub async fn listen(&self, handler: Arc<dyn EnvelopeHandler>) -> Result<()> {
        let mut delivery = self.client.subscribe().await.map_err(|e| {
            QmsgError::messaging("error while receiving a message", Attributes::new(), None, e)
        })?;

        while let Some(raw) = delivery.recv().await {
            let message_id = raw.message_id.clone();
            if let Err(e) = handler.handle(self.wrap(Some(raw))).await {
                tracing::warn!(%message_id, error = %e, "handler failed, message left for redelivery");
            }
        }
        tracing::debug!(subscription = self.client.subscription(), "delivery stream closed");
        Ok(())
    }

    fn wrap(&self, message: Option<RawMessage>) -> Envelope {
        Envelope::new(
            message,
            Arc::clone(&self.client),
            Arc::clone(&self.dead_letter_client),
            Arc::clone(&self.registry),
        )
    }
}
