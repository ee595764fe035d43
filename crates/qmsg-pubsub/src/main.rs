//! qmsg loopback
//!
//! Sends one heartbeat through an in-process transport provisioned from the
//! config file, receives it back, logs it and acknowledges it.
//!
//! Usage: `qmsg-pubsub [config.yaml]` (default `qmsg.yaml`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use qmsg_core::record::{Field, FieldKind, Record, RecordType, Schema};
use qmsg_pubsub::{config, MemoryTransport, Messaging};

static HEARTBEAT: Schema = Schema {
    tag: Some("Heartbeat"),
    fields: &[
        Field::required("id", FieldKind::Uuid),
        Field::optional("note", FieldKind::String),
    ],
};

#[derive(Debug, Serialize, Deserialize)]
struct Heartbeat {
    id: Uuid,
    note: Option<String>,
}

impl Record for Heartbeat {
    fn schema() -> &'static Schema {
        &HEARTBEAT
    }
}

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "qmsg.yaml".into());
    let cfg = config::load_from_file(&path).expect("config load failed");

    let transport = Arc::new(MemoryTransport::provision(&cfg).expect("transport provisioning failed"));
    let messaging = Messaging::from_config(&cfg, transport, [RecordType::of::<Heartbeat>()])
        .expect("messaging setup failed");

    let beat = Heartbeat {
        id: Uuid::new_v4(),
        note: Some("loopback".into()),
    };
    let message_id = messaging.send(&beat).await.expect("send failed");
    tracing::info!(%message_id, "heartbeat sent");

    let mut envelope = messaging.receive().await.expect("receive failed");
    match envelope.model_as::<Heartbeat>() {
        Ok(received) => tracing::info!(?received, "heartbeat received"),
        Err(e) => tracing::error!(error = %e, "heartbeat could not be decoded"),
    }
    envelope.acknowledge().await.expect("acknowledge failed");
}
