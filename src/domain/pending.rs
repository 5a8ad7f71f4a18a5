use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persistence::codec::Schema;
use crate::remote::types::{Row, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOp {
    Insert,
    Upsert,
    Update,
    Delete,
}

/// A remote mutation waiting for connectivity. Replayed strictly FIFO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: String,
    pub created_at: u64,
    pub op: PendingOp,
    pub collection: String,
    /// A row object, or an array of rows for batched insert/upsert.
    pub payload: Value,
    #[serde(default)]
    pub selector: Option<Selector>,
    /// Comma separated conflict columns for upserts, e.g. `user_id,achievement_id`.
    #[serde(default)]
    pub conflict_key: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Namespace of the identity that produced the action.
    #[serde(default)]
    pub identity_key: Option<String>,
}

impl PendingAction {
    fn new(op: PendingOp, collection: &str, payload: Value, created_at: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at,
            op,
            collection: collection.to_string(),
            payload,
            selector: None,
            conflict_key: None,
            attempts: 0,
            last_error: None,
            identity_key: None,
        }
    }

    pub fn upsert(collection: &str, rows: Vec<Row>, conflict_key: &str, created_at: u64) -> Self {
        let payload = match <[Row; 1]>::try_from(rows) {
            Ok([row]) => Value::Object(row),
            Err(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
        };
        let mut action = Self::new(PendingOp::Upsert, collection, payload, created_at);
        action.conflict_key = Some(conflict_key.to_string());
        action
    }

    pub fn insert_many(collection: &str, rows: Vec<Row>, created_at: u64) -> Self {
        let payload = Value::Array(rows.into_iter().map(Value::Object).collect());
        Self::new(PendingOp::Insert, collection, payload, created_at)
    }

    pub fn update(collection: &str, selector: Selector, patch: Row, created_at: u64) -> Self {
        let mut action = Self::new(PendingOp::Update, collection, Value::Object(patch), created_at);
        action.selector = Some(selector);
        action
    }

    pub fn delete(collection: &str, selector: Selector, created_at: u64) -> Self {
        let mut action = Self::new(PendingOp::Delete, collection, Value::Null, created_at);
        action.selector = Some(selector);
        action
    }

    pub fn owned_by(mut self, identity_key: impl Into<String>) -> Self {
        self.identity_key = Some(identity_key.into());
        self
    }

    /// Payload rows, whether it was written as one object or as an array.
    pub fn rows(&self) -> Vec<Row> {
        match &self.payload {
            Value::Object(row) => vec![row.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn conflict_columns(&self) -> Vec<&str> {
        self.conflict_key
            .as_deref()
            .map(|k| k.split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default()
    }
}

impl Schema for PendingAction {
    const NAME: &'static str = "PendingAction";

    fn validate(&self) -> Result<(), String> {
        if self.collection.is_empty() {
            return Err("empty collection".into());
        }
        match self.op {
            PendingOp::Upsert if self.conflict_key.is_none() => Err("upsert without conflictKey".into()),
            PendingOp::Update | PendingOp::Delete if self.selector.is_none() => {
                Err("update/delete without selector".into())
            }
            _ => Ok(()),
        }
    }
}

/// A poisoned action parked for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub action: PendingAction,
    pub poisoned_at: u64,
    pub reason: String,
}

impl Schema for DeadLetter {
    const NAME: &'static str = "DeadLetter";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn single_row_upsert_is_an_object() {
        let a = PendingAction::upsert("user_progress", vec![row(json!({"user_id": "u"}))], "user_id", 1);
        assert!(a.payload.is_object());
        assert_eq!(a.rows().len(), 1);
        assert_eq!(a.conflict_columns(), vec!["user_id"]);
    }

    #[test]
    fn batched_upsert_is_an_array() {
        let a = PendingAction::upsert(
            "achievements",
            vec![row(json!({"a": 1})), row(json!({"a": 2}))],
            "user_id, achievement_id",
            1,
        );
        assert!(a.payload.is_array());
        assert_eq!(a.conflict_columns(), vec!["user_id", "achievement_id"]);
    }

    #[test]
    fn validation_requires_selector_for_delete() {
        let mut a = PendingAction::delete("game_sessions", Selector::new().eq("id", "s1"), 1);
        assert!(a.validate().is_ok());
        a.selector = None;
        assert!(a.validate().is_err());
    }
}
