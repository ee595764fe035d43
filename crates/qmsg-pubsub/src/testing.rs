//! Test doubles for exercising the delivery pipeline without a broker.
//!
//! `ScriptedTransport` records every call it receives and replays scripted
//! outcomes: queued failures per operation, and queued pull results.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use qmsg_core::error::TransportError;
use qmsg_core::protocol::Attributes;

use crate::transport::{RawMessage, Transport};

/// One observed transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish {
        destination: String,
        payload: Bytes,
        attributes: Attributes,
    },
    Pull {
        source: String,
    },
    Acknowledge {
        source: String,
        ack_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Publish,
    Pull,
    Acknowledge,
}

#[derive(Debug, Default)]
struct Script {
    calls: Vec<Call>,
    /// (operation, resource) -> errors to return before succeeding
    failures: HashMap<(Op, String), VecDeque<TransportError>>,
    pulls: VecDeque<RawMessage>,
    published: u64,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `errors` for publishes to `destination`; later calls succeed.
    pub fn fail_publish(&self, destination: &str, errors: impl IntoIterator<Item = TransportError>) {
        self.queue_failures(Op::Publish, destination, errors);
    }

    pub fn fail_pull(&self, source: &str, errors: impl IntoIterator<Item = TransportError>) {
        self.queue_failures(Op::Pull, source, errors);
    }

    pub fn fail_acknowledge(&self, source: &str, errors: impl IntoIterator<Item = TransportError>) {
        self.queue_failures(Op::Acknowledge, source, errors);
    }

    /// Next message handed out by `pull` (any source).
    pub fn push_pull(&self, msg: RawMessage) {
        self.lock().pulls.push_back(msg);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn publishes_to(&self, destination: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Publish { destination: d, .. } if d == destination))
            .collect()
    }

    pub fn acknowledgements(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Acknowledge { .. }))
            .collect()
    }

    fn queue_failures(&self, op: Op, resource: &str, errors: impl IntoIterator<Item = TransportError>) {
        self.lock()
            .failures
            .entry((op, resource.to_owned()))
            .or_default()
            .extend(errors);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // a panicking test thread must not hide the recorded calls
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, op: Op, resource: &str, call: Call) -> Result<(), TransportError> {
        let mut script = self.lock();
        script.calls.push(call);
        match script
            .failures
            .get_mut(&(op, resource.to_owned()))
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn publish(
        &self,
        destination: &str,
        payload: Bytes,
        attributes: &Attributes,
    ) -> Result<String, TransportError> {
        self.record(
            Op::Publish,
            destination,
            Call::Publish {
                destination: destination.to_owned(),
                payload,
                attributes: attributes.clone(),
            },
        )?;
        let mut script = self.lock();
        script.published += 1;
        Ok(format!("msg-{}", script.published))
    }

    async fn pull(&self, source: &str) -> Result<Option<RawMessage>, TransportError> {
        self.record(
            Op::Pull,
            source,
            Call::Pull {
                source: source.to_owned(),
            },
        )?;
        Ok(self.lock().pulls.pop_front())
    }

    async fn acknowledge(&self, source: &str, ack_id: &str) -> Result<(), TransportError> {
        self.record(
            Op::Acknowledge,
            source,
            Call::Acknowledge {
                source: source.to_owned(),
                ack_id: ack_id.to_owned(),
            },
        )
    }
}

/// Raw message with the given attributes and body.
pub fn raw_message(ack_id: &str, payload: &str, attributes: &[(&str, &str)]) -> RawMessage {
    RawMessage {
        payload: Bytes::from(payload.to_owned()),
        ack_id: ack_id.to_owned(),
        message_id: format!("id-{ack_id}"),
        attributes: attributes
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
    }
}
