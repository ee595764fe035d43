//! Record payload codec (JSON object bodies).
//!
//! - encode: serde layout -> schema check (strict) -> JSON text
//! - decode: JSON text -> schema check (lenient, unknown keys dropped) -> record

use serde_json::{Map, Value};

use crate::error::{QmsgError, Result};
use crate::protocol::header::Header;
use crate::record::{DecodedRecord, Mode, Record};
use crate::registry::Registry;

pub fn encode<R: Record>(record: &R) -> Result<String> {
    let value = serde_json::to_value(record)
        .map_err(|e| QmsgError::encoding(format!("record serialization failed: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(QmsgError::encoding("record did not serialize to an object"));
    };

    let cleaned = R::schema()
        .validate(&fields, Mode::Strict)
        .map_err(|errors| QmsgError::Encoding {
            message: "record failed schema validation".into(),
            errors,
        })?;

    serde_json::to_string(&Value::Object(cleaned))
        .map_err(|e| QmsgError::encoding(format!("json encode failed: {e}")))
}

pub fn decode<R: Record>(payload: &str) -> Result<R> {
    let fields = parse_object(payload)?;

    let cleaned = R::schema()
        .validate(&fields, Mode::Lenient)
        .map_err(|errors| {
            tracing::debug!(%errors, "payload failed schema validation");
            QmsgError::Decoding {
                message: "payload failed schema validation".into(),
                errors,
            }
        })?;

    serde_json::from_value(Value::Object(cleaned))
        .map_err(|e| QmsgError::decoding(format!("payload does not match record layout: {e}")))
}

/// Resolve the header's tag through the registry and decode the payload.
pub fn decode_payload(
    header: Option<&Header>,
    payload: &[u8],
    registry: &Registry,
) -> Result<DecodedRecord> {
    let header = header
        .filter(|h| !h.msg_type.is_empty())
        .ok_or_else(|| QmsgError::decoding("invalid header"))?;

    let rt = registry
        .type_for(&header.msg_type)
        .ok_or_else(|| QmsgError::decoding(format!("unknown type: {}", header.msg_type)))?;

    let text = std::str::from_utf8(payload)
        .map_err(|e| QmsgError::decoding(format!("payload is not valid UTF-8: {e}")))?;

    let record = rt.decode(text)?;
    Ok(DecodedRecord::new(header.msg_type.clone(), record))
}

fn parse_object(payload: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(QmsgError::decoding("payload is not a JSON object")),
        Err(e) => Err(QmsgError::decoding(format!("error while decoding: {e}"))),
    }
}
