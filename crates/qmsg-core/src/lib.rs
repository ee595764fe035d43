//! qmsg core: typed records, type registry, codec and header protocol.
//!
//! This crate defines the wire contract (attributes + JSON payload) and the
//! error surface shared by the pub/sub layer. It carries no transport or
//! runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed payloads
//! and headers surface as `QmsgError`/`Result`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;
pub mod record;
pub mod registry;

/// Shared result type.
pub use error::{ErrorKind, QmsgError, Result};
pub use record::{DecodedRecord, Field, FieldKind, MacAddress, Record, RecordType, Schema};
pub use registry::Registry;
