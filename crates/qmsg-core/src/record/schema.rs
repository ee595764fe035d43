//! Static field schemas and the validator that enforces them.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::error::ValidationErrors;

use super::mac::MacAddress;

const MISSING: &str = "Missing data for required field.";
const NULL: &str = "Field may not be null.";
const UNKNOWN: &str = "Unknown field.";

/// Wire type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Uuid,
    Integer,
    Float,
    Boolean,
    /// Any RFC3339 timestamp.
    DateTime,
    /// EUI-48 MAC address.
    MacAddress,
}

impl FieldKind {
    fn check(self, value: &Value) -> Result<(), String> {
        let ok = match self {
            FieldKind::String => value.is_string(),
            FieldKind::Uuid => value
                .as_str()
                .map_or(false, |s| uuid::Uuid::parse_str(s).is_ok()),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::DateTime => value
                .as_str()
                .map_or(false, |s| DateTime::parse_from_rfc3339(s).is_ok()),
            FieldKind::MacAddress => {
                return match value.as_str() {
                    Some(s) if s.parse::<MacAddress>().is_ok() => Ok(()),
                    Some("") => Err("Not a valid MAC.".into()),
                    Some(s) => Err(format!("\"{s}\" cannot be formatted as MAC.")),
                    None => Err("Not a valid MAC.".into()),
                };
            }
        };
        if ok {
            Ok(())
        } else {
            Err(self.invalid_message().into())
        }
    }

    fn invalid_message(self) -> &'static str {
        match self {
            FieldKind::String => "Not a valid string.",
            FieldKind::Uuid => "Not a valid UUID.",
            FieldKind::Integer => "Not a valid integer.",
            FieldKind::Float => "Not a valid number.",
            FieldKind::Boolean => "Not a valid boolean.",
            FieldKind::DateTime => "Not a valid datetime.",
            FieldKind::MacAddress => "Not a valid MAC.",
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// How to treat keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Unknown keys are errors (construction, encoding).
    Strict,
    /// Unknown keys are dropped (decoding).
    Lenient,
}

/// Declared field set and wire tag of a record type.
#[derive(Debug)]
pub struct Schema {
    pub tag: Option<&'static str>,
    pub fields: &'static [Field],
}

impl Schema {
    pub const fn new(tag: Option<&'static str>, fields: &'static [Field]) -> Self {
        Self { tag, fields }
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate `input` and return an object holding exactly the schema's
    /// fields (absent optional fields become `null`).
    ///
    /// Every problem is collected before returning.
    pub fn validate(
        &self,
        input: &Map<String, Value>,
        mode: Mode,
    ) -> Result<Map<String, Value>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut out = Map::with_capacity(self.fields.len());

        for field in self.fields {
            match input.get(field.name) {
                None if field.required => errors.add(field.name, MISSING),
                None | Some(Value::Null) if !field.required => {
                    out.insert(field.name.to_owned(), Value::Null);
                }
                Some(Value::Null) => errors.add(field.name, NULL),
                Some(value) => match field.kind.check(value) {
                    Ok(()) => {
                        out.insert(field.name.to_owned(), normalize(field.kind, value));
                    }
                    Err(msg) => errors.add(field.name, msg),
                },
                None => {}
            }
        }

        if mode == Mode::Strict {
            for key in input.keys() {
                if self.field(key).is_none() {
                    errors.add(key.as_str(), UNKNOWN);
                }
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }
}

fn normalize(kind: FieldKind, value: &Value) -> Value {
    match (kind, value.as_str()) {
        (FieldKind::MacAddress, Some(s)) => match s.parse::<MacAddress>() {
            Ok(mac) => Value::String(mac.to_string()),
            Err(_) => value.clone(),
        },
        (FieldKind::Uuid, Some(s)) => match uuid::Uuid::parse_str(s) {
            Ok(id) => Value::String(id.hyphenated().to_string()),
            Err(_) => value.clone(),
        },
        _ => value.clone(),
    }
}
