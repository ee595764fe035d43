//! Typed message records.
//!
//! A record type binds three things at compile time: its serde layout, a
//! static `Schema` (field names, kinds, required flags) and an optional wire
//! tag. The registry and codec only ever look at these declarations.

pub mod mac;
pub mod schema;

use std::any::{Any, TypeId};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{QmsgError, Result, ValidationErrors};
use crate::protocol::codec;

pub use mac::MacAddress;
pub use schema::{Field, FieldKind, Mode, Schema};

/// An application record that can travel through the queue.
///
/// ```ignore
/// static FANCY_EVENT: Schema = Schema {
///     tag: Some("FancyEvent"),
///     fields: &[
///         Field::required("uuid_field", FieldKind::Uuid),
///         Field::optional("string_field", FieldKind::String),
///     ],
/// };
///
/// impl Record for FancyEvent {
///     fn schema() -> &'static Schema {
///         &FANCY_EVENT
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    fn schema() -> &'static Schema;

    /// Build a record from loose fields, rejecting unknown and missing ones.
    fn from_fields(fields: Value) -> Result<Self> {
        let Value::Object(map) = fields else {
            let mut errors = ValidationErrors::new();
            errors.add("_schema", "Invalid input type.");
            return Err(QmsgError::InvalidRecord(errors));
        };
        let cleaned = Self::schema()
            .validate(&map, Mode::Strict)
            .map_err(QmsgError::InvalidRecord)?;
        serde_json::from_value(Value::Object(cleaned)).map_err(|e| {
            let mut errors = ValidationErrors::new();
            errors.add("_schema", e.to_string());
            QmsgError::InvalidRecord(errors)
        })
    }
}

/// Object-safe view of a record, used once the concrete type is erased.
pub trait AnyRecord: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn type_name(&self) -> &'static str;
}

impl<R: Record> AnyRecord for R {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }
}

type DecodeFn = fn(&str) -> Result<Box<dyn AnyRecord>>;

/// Registry-time descriptor of a record type.
#[derive(Clone, Copy)]
pub struct RecordType {
    type_id: TypeId,
    type_name: &'static str,
    schema: &'static Schema,
    tag: Option<&'static str>,
    decode: DecodeFn,
}

impl RecordType {
    pub fn of<R: Record>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            schema: R::schema(),
            tag: R::schema().tag(),
            decode: decode_erased::<R>,
        }
    }

    /// Register under `tag` instead of the schema's declared tag.
    pub fn tagged(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    pub fn decode(&self, payload: &str) -> Result<Box<dyn AnyRecord>> {
        (self.decode)(payload)
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("type_name", &self.type_name)
            .field("tag", &self.tag)
            .finish()
    }
}

fn decode_erased<R: Record>(payload: &str) -> Result<Box<dyn AnyRecord>> {
    let record: R = codec::decode(payload)?;
    Ok(Box::new(record))
}

/// A decoded inbound record together with the tag it arrived under.
#[derive(Debug)]
pub struct DecodedRecord {
    tag: String,
    record: Box<dyn AnyRecord>,
}

impl DecodedRecord {
    pub fn new(tag: impl Into<String>, record: Box<dyn AnyRecord>) -> Self {
        Self {
            tag: tag.into(),
            record,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn type_name(&self) -> &'static str {
        self.record.type_name()
    }

    pub fn is<R: Record>(&self) -> bool {
        self.record.as_any().is::<R>()
    }

    pub fn downcast_ref<R: Record>(&self) -> Option<&R> {
        self.record.as_any().downcast_ref::<R>()
    }

    /// Take ownership of the concrete record, `None` on a type mismatch.
    pub fn downcast<R: Record>(self) -> Option<R> {
        self.record.into_any().downcast::<R>().ok().map(|record| *record)
    }
}
