//! Top-level facade crate for qmsg.
//!
//! Re-exports the core record/codec types and the pub/sub delivery library so
//! applications can depend on a single crate.

pub mod core {
    pub use qmsg_core::*;
}

pub mod pubsub {
    pub use qmsg_pubsub::*;
}

pub use qmsg_core::{QmsgError, Record, RecordType, Result, Schema};
pub use qmsg_pubsub::{Envelope, EnvelopeHandler, Messaging};
