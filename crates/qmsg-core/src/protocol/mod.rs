//! Wire protocol: attributes header + JSON payload codec.
//!
//! A message on the queue is a UTF-8 JSON object body plus a two-key
//! attribute map. Both halves are parsed without panicking; malformed input
//! is reported as `QmsgError::Decoding`.

pub mod codec;
pub mod header;

pub use codec::{decode, decode_payload, encode};
pub use header::{create_attributes, create_attributes_at, create_header, Attributes, Header};
