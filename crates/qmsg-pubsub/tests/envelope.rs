//! Envelope behaviour: lazy decoding, acknowledgement and dead-lettering.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use qmsg_core::error::{QmsgError, Settlement, TransportError, TransportErrorKind};
use qmsg_core::record::DecodedRecord;
use qmsg_core::ErrorKind;
use qmsg_pubsub::testing::{raw_message, Call, ScriptedTransport};
use qmsg_pubsub::Envelope;

use fixtures::{fancy, messaging, FancyEvent, DEAD_LETTER_TOPIC, FANCY_PAYLOAD, FANCY_TIMESTAMP, SUBSCRIPTION};

const ATTRS: &[(&str, &str)] = &[("type", "FancyEvent"), ("timestamp", FANCY_TIMESTAMP)];

async fn received(transport: &Arc<ScriptedTransport>, payload: &str, attrs: &[(&str, &str)]) -> Envelope {
    transport.push_pull(raw_message("ack-1", payload, attrs));
    messaging(transport.clone()).receive().await.unwrap()
}

#[tokio::test]
async fn model_decodes_registered_payload() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    assert!(!envelope.is_empty());
    assert_eq!(envelope.message_id(), Some("id-ack-1"));
    assert_eq!(envelope.model_as::<FancyEvent>().unwrap(), &fancy());
    assert_eq!(envelope.model().unwrap().tag(), "FancyEvent");

    let header = envelope.header().unwrap();
    assert_eq!(header.msg_type, "FancyEvent");
}

#[tokio::test]
async fn decoded_record_is_cached() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    let first: *const DecodedRecord = envelope.model().unwrap();
    let second: *const DecodedRecord = envelope.model().unwrap();
    let typed: *const FancyEvent = envelope.model_as::<FancyEvent>().unwrap();

    assert_eq!(first, second);
    // the typed view borrows the same cached record
    assert_eq!(typed, envelope.model().unwrap().downcast_ref::<FancyEvent>().unwrap() as *const _);
}

#[tokio::test]
async fn decode_failure_is_cached() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(
        &transport,
        FANCY_PAYLOAD,
        &[("type", "NobodyKnowsMe"), ("timestamp", FANCY_TIMESTAMP)],
    )
    .await;

    let first = envelope.model().unwrap_err();
    let second = envelope.model().unwrap_err();
    assert_eq!(first.kind(), ErrorKind::Decoding);
    assert_eq!(first.to_string(), second.to_string());
    assert!(first.to_string().contains("unknown type: NobodyKnowsMe"));
}

#[tokio::test]
async fn missing_header_surfaces_on_model() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(&transport, FANCY_PAYLOAD, &[("type", "FancyEvent")]).await;

    assert!(envelope.header().is_err());
    assert!(envelope.model().is_err());
}

#[tokio::test]
async fn wrong_typed_view_is_a_decoding_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    let err = envelope.model_as::<fixtures::OtherEvent>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decoding);
}

#[tokio::test]
async fn empty_envelope_reports_no_messages() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = messaging(transport.clone()).receive().await.unwrap();

    assert!(envelope.is_empty());
    assert_eq!(envelope.model().unwrap_err().kind(), ErrorKind::NoMessagesReceived);
    assert_eq!(envelope.acknowledge().await.unwrap_err().kind(), ErrorKind::NoMessagesReceived);
    assert_eq!(
        envelope.mark_as_dead_letter().await.unwrap_err().kind(),
        ErrorKind::NoMessagesReceived
    );
    assert!(transport.acknowledgements().is_empty());
}

#[tokio::test]
async fn acknowledge_settles_once() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    envelope.acknowledge().await.unwrap();
    assert_eq!(envelope.settlement(), Some(Settlement::Acknowledged));
    assert_eq!(
        transport.acknowledgements(),
        vec![Call::Acknowledge {
            source: SUBSCRIPTION.into(),
            ack_id: "ack-1".into(),
        }]
    );

    let err = envelope.acknowledge().await.unwrap_err();
    assert!(matches!(err, QmsgError::AlreadySettled(Settlement::Acknowledged)));
    assert_eq!(transport.acknowledgements().len(), 1);
}

#[tokio::test]
async fn dead_letter_copies_then_acknowledges() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut envelope = received(&transport, "not even json", ATTRS).await;

    assert!(envelope.model().is_err());
    envelope.mark_as_dead_letter().await.unwrap();

    let calls = transport.calls();
    let copy_at = calls
        .iter()
        .position(|c| matches!(c, Call::Publish { .. }))
        .expect("no dead letter publish");
    let ack_at = calls
        .iter()
        .position(|c| matches!(c, Call::Acknowledge { .. }))
        .expect("no acknowledge");
    assert!(copy_at < ack_at);

    let copies = transport.publishes_to(DEAD_LETTER_TOPIC);
    assert_eq!(copies.len(), 1);
    match &copies[0] {
        Call::Publish { payload, attributes, .. } => {
            assert_eq!(payload.as_ref(), b"not even json");
            assert_eq!(attributes.get("type").map(String::as_str), Some("FancyEvent"));
            assert_eq!(attributes.get("timestamp").map(String::as_str), Some(FANCY_TIMESTAMP));
            assert_eq!(attributes.len(), 2);
        }
        other => panic!("unexpected call: {other:?}"),
    }
    assert_eq!(transport.acknowledgements().len(), 1);
    assert_eq!(envelope.settlement(), Some(Settlement::DeadLettered));

    let err = envelope.acknowledge().await.unwrap_err();
    assert!(matches!(err, QmsgError::AlreadySettled(Settlement::DeadLettered)));
}

#[tokio::test]
async fn failed_dead_letter_copy_leaves_message_unacknowledged() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_publish(
        DEAD_LETTER_TOPIC,
        [TransportError::new(TransportErrorKind::PermissionDenied, "denied")],
    );
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    let err = envelope.mark_as_dead_letter().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueueMessaging);
    assert!(err.to_string().contains("dead letter queue"));
    match &err {
        QmsgError::Messaging { attributes, payload, source, .. } => {
            assert_eq!(attributes.get("type").map(String::as_str), Some("FancyEvent"));
            assert_eq!(payload.as_deref(), Some(FANCY_PAYLOAD));
            assert_eq!(source.kind(), ErrorKind::QueueClient);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(transport.acknowledgements().is_empty());
    assert_eq!(envelope.settlement(), None);
}

#[tokio::test]
async fn exhausted_dead_letter_retries_keep_transient_cause() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_publish(
        DEAD_LETTER_TOPIC,
        (0..3).map(|_| TransportError::new(TransportErrorKind::BrokenPipe, "pipe")),
    );
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    let err = envelope.mark_as_dead_letter().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueueMessaging);
    assert_eq!(err.transport_error().unwrap().kind, TransportErrorKind::BrokenPipe);
    assert_eq!(transport.publishes_to(DEAD_LETTER_TOPIC).len(), 3);
    assert!(transport.acknowledgements().is_empty());
}

#[tokio::test]
async fn dead_letter_retry_after_failed_ack_does_not_copy_again() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_acknowledge(SUBSCRIPTION, [TransportError::not_found("ack deadline expired")]);
    let mut envelope = received(&transport, FANCY_PAYLOAD, ATTRS).await;

    let err = envelope.mark_as_dead_letter().await.unwrap_err();
    assert!(err.to_string().contains("acknowledging"));
    assert_eq!(envelope.settlement(), None);

    envelope.mark_as_dead_letter().await.unwrap();

    assert_eq!(transport.publishes_to(DEAD_LETTER_TOPIC).len(), 1);
    assert_eq!(transport.acknowledgements().len(), 2);
    assert_eq!(envelope.settlement(), Some(Settlement::DeadLettered));
}
