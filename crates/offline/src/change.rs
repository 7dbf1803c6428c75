//! Queued mutations
//!
//! A [`ChangeOperation`] is validated when it is built, so a malformed
//! payload is rejected at enqueue time instead of failing on every replay.

use backend_client::{Row, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{OfflineError, Result};

/// Kind of a queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Row insert
    Insert,
    /// Row update matched on `id`
    Update,
    /// Row delete matched on `id`
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A mutation with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeOperation {
    /// Insert `row`
    Insert {
        /// Row to insert
        row: Row,
    },
    /// Apply `changes` to the row with `id`
    Update {
        /// Target row id
        id: String,
        /// Columns to change
        changes: Row,
    },
    /// Delete the row with `id`
    Delete {
        /// Target row id
        id: String,
    },
}

impl ChangeOperation {
    /// Build an insert from a JSON object
    pub fn insert(data: Value) -> Result<Self> {
        let row = into_row(data, OperationKind::Insert)?;
        if row.is_empty() {
            return Err(OfflineError::InvalidChange("insert payload is empty".to_string()));
        }
        Ok(Self::Insert { row })
    }

    /// Build an update from a JSON object carrying an `id` field
    pub fn update(data: Value) -> Result<Self> {
        let changes = into_row(data, OperationKind::Update)?;
        let id = row_id(&changes, OperationKind::Update)?;
        Ok(Self::Update { id, changes })
    }

    /// Build a delete from a JSON object carrying an `id` field, or a bare id
    pub fn delete(data: Value) -> Result<Self> {
        let id = match data {
            Value::Object(row) => row_id(&row, OperationKind::Delete)?,
            other => id_from_value(&other, OperationKind::Delete)?,
        };
        Ok(Self::Delete { id })
    }

    /// Insert a typed record
    pub fn insert_record<R: Table>(record: &R) -> Result<Self> {
        Self::insert(Value::Object(record.to_row()?))
    }

    /// Overwrite a typed record with its current field values
    pub fn update_record<R: Table>(record: &R) -> Result<Self> {
        Self::update(Value::Object(record.to_row()?))
    }

    /// Delete a typed record
    pub fn delete_record<R: Table>(record: &R) -> Result<Self> {
        Self::delete(Value::from(record.id()))
    }

    /// Kind of this operation
    pub fn kind(&self) -> OperationKind {
        match self {
            ChangeOperation::Insert { .. } => OperationKind::Insert,
            ChangeOperation::Update { .. } => OperationKind::Update,
            ChangeOperation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Id of the targeted row, if known
    pub fn target_id(&self) -> Option<&str> {
        match self {
            ChangeOperation::Insert { row } => row.get("id").and_then(Value::as_str),
            ChangeOperation::Update { id, .. } | ChangeOperation::Delete { id } => Some(id),
        }
    }
}

fn into_row(data: Value, kind: OperationKind) -> Result<Row> {
    match data {
        Value::Object(row) => Ok(row),
        other => Err(OfflineError::InvalidChange(format!(
            "{kind} payload must be an object, got {other}"
        ))),
    }
}

fn row_id(row: &Row, kind: OperationKind) -> Result<String> {
    match row.get("id") {
        Some(value) => id_from_value(value, kind),
        None => Err(OfflineError::InvalidChange(format!("{kind} payload has no id"))),
    }
}

fn id_from_value(value: &Value, kind: OperationKind) -> Result<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(OfflineError::InvalidChange(format!("{kind} id is not usable: {other}"))),
    }
}

/// Reject table names the backend cannot address
pub(crate) fn validate_table(table: &str) -> Result<()> {
    if table.trim().is_empty() || table.contains(['/', '?', '#']) {
        return Err(OfflineError::InvalidChange(format!("invalid table name: {table:?}")));
    }
    Ok(())
}

/// A mutation recorded in the ledger and not yet confirmed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Generated identifier, `"{timestamp}-{sequence}"`
    pub id: String,
    /// Position in the ledger; replay follows ascending sequence
    pub sequence: u64,
    /// Target table
    pub table: String,
    /// Mutation and payload
    pub operation: ChangeOperation,
    /// Enqueue time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Earliest time of the next replay, milliseconds since the Unix epoch
    #[serde(default)]
    pub next_attempt_at: Option<i64>,
    /// Message of the most recent failure
    #[serde(default)]
    pub last_error: Option<String>,
}

impl PendingChange {
    /// Whether the change may be replayed at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_attempt_at.is_none_or(|at| at <= now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_client::Customer;
    use serde_json::json;

    #[test]
    fn test_insert_requires_object() {
        assert!(ChangeOperation::insert(json!({"id": "c1", "name": "Acme"})).is_ok());
        assert!(matches!(
            ChangeOperation::insert(json!(["c1"])),
            Err(OfflineError::InvalidChange(_))
        ));
        assert!(matches!(ChangeOperation::insert(json!({})), Err(OfflineError::InvalidChange(_))));
    }

    #[test]
    fn test_insert_without_id_is_allowed() {
        let op = ChangeOperation::insert(json!({"name": "Generated id"})).unwrap();
        assert_eq!(op.target_id(), None);
    }

    #[test]
    fn test_update_extracts_id() {
        let op = ChangeOperation::update(json!({"id": "a1", "name": "Warehouse"})).unwrap();
        match op {
            ChangeOperation::Update { id, changes } => {
                assert_eq!(id, "a1");
                assert_eq!(changes.get("name"), Some(&json!("Warehouse")));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_update_accepts_numeric_id() {
        let op = ChangeOperation::update(json!({"id": 42, "notes": "ok"})).unwrap();
        assert_eq!(op.target_id(), Some("42"));
    }

    #[test]
    fn test_update_rejects_missing_or_blank_id() {
        assert!(ChangeOperation::update(json!({"name": "x"})).is_err());
        assert!(ChangeOperation::update(json!({"id": "  "})).is_err());
        assert!(ChangeOperation::update(json!({"id": null})).is_err());
    }

    #[test]
    fn test_delete_from_object_or_bare_id() {
        let from_object = ChangeOperation::delete(json!({"id": "a1"})).unwrap();
        let from_id = ChangeOperation::delete(json!("a1")).unwrap();
        assert_eq!(from_object, from_id);
        assert!(ChangeOperation::delete(json!(true)).is_err());
    }

    #[test]
    fn test_typed_record_helpers() {
        let customer = Customer::new("c1", "Acme");

        assert_eq!(ChangeOperation::insert_record(&customer).unwrap().kind(), OperationKind::Insert);
        assert_eq!(ChangeOperation::update_record(&customer).unwrap().target_id(), Some("c1"));
        assert_eq!(
            ChangeOperation::delete_record(&customer).unwrap(),
            ChangeOperation::Delete { id: "c1".to_string() }
        );
    }

    #[test]
    fn test_operation_serialized_shape() {
        let op = ChangeOperation::delete(json!("a1")).unwrap();
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"kind": "delete", "id": "a1"}));
    }

    #[test]
    fn test_validate_table() {
        assert!(validate_table("anlegg").is_ok());
        assert!(validate_table("").is_err());
        assert!(validate_table("customer?select=*").is_err());
    }

    #[test]
    fn test_is_due() {
        let mut change = PendingChange {
            id: "1-1".into(),
            sequence: 1,
            table: "customer".into(),
            operation: ChangeOperation::delete(json!("c1")).unwrap(),
            timestamp: 1,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
        };
        assert!(change.is_due(0));

        change.next_attempt_at = Some(1_000);
        assert!(!change.is_due(999));
        assert!(change.is_due(1_000));
    }
}
