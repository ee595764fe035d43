//! qmsg pub/sub library entry.
//!
//! This crate wires the transport seam, retry policy, envelopes and the
//! messaging facade into a delivery pipeline on top of `qmsg-core`. It is
//! consumed by the loopback binary (`main.rs`) and by integration tests.

pub mod config;
pub mod envelope;
pub mod messaging;
pub mod testing;
pub mod transport;

pub use envelope::Envelope;
pub use messaging::{EnvelopeHandler, Messaging};
pub use transport::{MemoryTransport, RawMessage, RetryPolicy, RetryingClient, Transport};
