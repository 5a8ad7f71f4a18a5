//! Schema-directed JSON codec.
//!
//! `encode` goes through `serde_json::Value`, whose object map is ordered,
//! so the output has a canonical key order regardless of struct layout.
//! `decode` rejects malformed JSON, fills defaults declared on the type and
//! keeps unknown fields in the entity's `extra` map, then runs the schema's
//! own validation.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SchemaError;

/// A persisted entity shape.
///
/// Schemas only evolve additively: new fields must carry a serde default so
/// values written by older versions keep decoding.
pub trait Schema: Serialize + DeserializeOwned {
    const NAME: &'static str;

    /// Semantic checks beyond what serde enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl<T: Schema> Schema for Vec<T> {
    const NAME: &'static str = T::NAME;

    fn validate(&self) -> Result<(), String> {
        self.iter()
            .enumerate()
            .try_for_each(|(i, item)| item.validate().map_err(|e| format!("[{i}] {e}")))
    }
}

impl Schema for String {
    const NAME: &'static str = "string";
}

/// Canonical encoding: object keys sorted, no insignificant whitespace.
pub fn encode<T: Schema>(entity: &T) -> Result<String, SchemaError> {
    entity
        .validate()
        .map_err(|reason| SchemaError::new(T::NAME, reason))?;
    let value = serde_json::to_value(entity).map_err(|e| SchemaError::new(T::NAME, e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| SchemaError::new(T::NAME, e.to_string()))
}

pub fn decode<T: Schema>(raw: &str) -> Result<T, SchemaError> {
    let entity: T = serde_json::from_str(raw).map_err(|e| SchemaError::new(T::NAME, e.to_string()))?;
    entity
        .validate()
        .map_err(|reason| SchemaError::new(T::NAME, reason))?;
    Ok(entity)
}

/// Decodes from an already-parsed JSON value (remote rows, queue payloads).
pub fn decode_value<T: Schema>(value: serde_json::Value) -> Result<T, SchemaError> {
    let entity: T = serde_json::from_value(value).map_err(|e| SchemaError::new(T::NAME, e.to_string()))?;
    entity
        .validate()
        .map_err(|reason| SchemaError::new(T::NAME, reason))?;
    Ok(entity)
}
