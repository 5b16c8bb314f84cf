//! Source record types.
//!
//! A `SourceRecord` is a row read from the system of record. The pipeline
//! never writes records; it only reads them to build index documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::types::entity_type::EntityType;

/// Primary identifier of a source record.
///
/// Serialized untagged so job payloads read naturally: `42` or
/// `"550e8400-e29b-41d4-a716-446655440000"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Uuid(Uuid),
}

impl RecordId {
    /// Read an identifier out of a JSON value (a number or a UUID string).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => s
                .parse::<i64>()
                .map(RecordId::Int)
                .ok()
                .or_else(|| Uuid::parse_str(s).ok().map(RecordId::Uuid)),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        RecordId::Uuid(id)
    }
}

/// A record as read from the relational store.
///
/// `fields` holds the row's columns keyed by column name. Adapters pick the
/// searchable ones out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: RecordId,
    pub entity_type: EntityType,
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(entity_type: EntityType, id: impl Into<RecordId>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            entity_type,
            fields,
        }
    }

    /// Raw column value, `None` when absent or SQL `NULL`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(Value::as_bool)
    }
}
