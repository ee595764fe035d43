//! In-process pub/sub transport.
//!
//! Behaves like the managed service for the parts this crate relies on:
//! topics fan out to their subscriptions, pulled messages stay in flight
//! until acknowledged, and unknown resources fail with `NotFound`. Used by
//! the loopback binary and by tests in place of an emulator.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use qmsg_core::error::TransportError;
use qmsg_core::protocol::Attributes;

use super::{Delivery, RawMessage, Transport};
use crate::config::{MessagingConfig, TransportSettings};

#[derive(Debug, Default)]
struct SubscriptionState {
    backlog: VecDeque<RawMessage>,
    in_flight: HashMap<String, RawMessage>,
    push: Option<mpsc::UnboundedSender<RawMessage>>,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    settings: TransportSettings,
    /// topic -> attached subscriptions
    topics: DashMap<String, Vec<String>>,
    subscriptions: DashMap<String, SubscriptionState>,
    /// topic -> everything ever published to it
    history: DashMap<String, Vec<RawMessage>>,
    seq: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: TransportSettings) -> Self {
        tracing::info!(
            endpoint = settings.endpoint(),
            emulator = settings.uses_emulator(),
            "in-memory transport created"
        );
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Create the topics and subscription named by `cfg`.
    pub fn provision(cfg: &MessagingConfig) -> Result<Self, TransportError> {
        let transport = Self::with_settings(cfg.transport_settings());
        transport.create_topic(&cfg.topic_path());
        transport.create_topic(&cfg.dead_letter_topic_path());
        transport.create_subscription(&cfg.topic_path(), &cfg.subscription_path())?;
        Ok(transport)
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn create_topic(&self, topic: &str) {
        self.topics.entry(topic.to_owned()).or_default();
        self.history.entry(topic.to_owned()).or_default();
    }

    pub fn create_subscription(&self, topic: &str, subscription: &str) -> Result<(), TransportError> {
        let mut subs = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| TransportError::not_found(format!("topic not found: {topic}")))?;
        if !subs.iter().any(|s| s == subscription) {
            subs.push(subscription.to_owned());
        }
        self.subscriptions
            .entry(subscription.to_owned())
            .or_default();
        Ok(())
    }

    /// Messages published to `topic`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<RawMessage> {
        self.history
            .get(topic)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn backlog_len(&self, subscription: &str) -> usize {
        self.subscriptions
            .get(subscription)
            .map_or(0, |s| s.backlog.len())
    }

    pub fn in_flight_len(&self, subscription: &str) -> usize {
        self.subscriptions
            .get(subscription)
            .map_or(0, |s| s.in_flight.len())
    }

    /// Return every unacknowledged delivery to the subscription, the way the
    /// managed service does once an ack deadline expires.
    pub fn redeliver_unacked(&self, subscription: &str) -> usize {
        let Some(mut state) = self.subscriptions.get_mut(subscription) else {
            return 0;
        };
        let pending: Vec<RawMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        let count = pending.len();
        for msg in pending {
            self.deliver(subscription, &mut state, msg);
        }
        tracing::debug!(subscription, count, "redelivered unacked messages");
        count
    }

    fn next(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn deliver(&self, subscription: &str, state: &mut SubscriptionState, mut msg: RawMessage) {
        msg.ack_id = format!("{subscription}#{}", self.next());
        if let Some(push) = &state.push {
            if push.send(msg.clone()).is_ok() {
                state.in_flight.insert(msg.ack_id.clone(), msg);
                return;
            }
            state.push = None;
        }
        state.backlog.push_back(msg);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(
        &self,
        destination: &str,
        payload: Bytes,
        attributes: &Attributes,
    ) -> Result<String, TransportError> {
        let subs = self
            .topics
            .get(destination)
            .map(|s| s.value().clone())
            .ok_or_else(|| TransportError::not_found(format!("topic not found: {destination}")))?;

        let message_id = self.next().to_string();
        let msg = RawMessage {
            payload,
            ack_id: String::new(),
            message_id: message_id.clone(),
            attributes: attributes.clone(),
        };

        for sub in &subs {
            if let Some(mut state) = self.subscriptions.get_mut(sub) {
                self.deliver(sub, &mut state, msg.clone());
            }
        }
        self.history
            .entry(destination.to_owned())
            .or_default()
            .push(msg);

        tracing::debug!(topic = destination, %message_id, fanout = subs.len(), "published");
        Ok(message_id)
    }

    async fn pull(&self, source: &str) -> Result<Option<RawMessage>, TransportError> {
        let mut state = self
            .subscriptions
            .get_mut(source)
            .ok_or_else(|| TransportError::not_found(format!("subscription not found: {source}")))?;

        let Some(msg) = state.backlog.pop_front() else {
            return Ok(None);
        };
        state.in_flight.insert(msg.ack_id.clone(), msg.clone());
        Ok(Some(msg))
    }

    async fn acknowledge(&self, source: &str, ack_id: &str) -> Result<(), TransportError> {
        let mut state = self
            .subscriptions
            .get_mut(source)
            .ok_or_else(|| TransportError::not_found(format!("subscription not found: {source}")))?;

        state
            .in_flight
            .remove(ack_id)
            .map(|_| ())
            .ok_or_else(|| TransportError::not_found(format!("unknown ack id: {ack_id}")))
    }

    async fn subscribe(&self, source: &str) -> Result<Delivery, TransportError> {
        let mut state = self
            .subscriptions
            .get_mut(source)
            .ok_or_else(|| TransportError::not_found(format!("subscription not found: {source}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        state.push = Some(tx);
        let backlog: Vec<RawMessage> = state.backlog.drain(..).collect();
        for msg in backlog {
            self.deliver(source, &mut state, msg);
        }
        Ok(rx)
    }
}
