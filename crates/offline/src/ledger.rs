//! Pending-change ledger
//!
//! Every queued mutation is stored under its own key,
//! `ledger:pending:{sequence}`, with the sequence zero-padded so key order is
//! insertion order. Multi-entry updates go through a single [`KvBatch`], which
//! the store applies atomically. Entries that exhaust their retry budget move
//! to `ledger:dead:{sequence}`.

use backend_client::Table;
use chrono::Utc;
use serde_json::Value;
use storage::{KvBatch, KvStore};

use crate::change::{validate_table, ChangeOperation, PendingChange};
use crate::error::{OfflineError, Result};

const PENDING_PREFIX: &str = "ledger:pending:";
const DEAD_PREFIX: &str = "ledger:dead:";

fn pending_key(sequence: u64) -> String {
    format!("{PENDING_PREFIX}{sequence:020}")
}

fn dead_key(sequence: u64) -> String {
    format!("{DEAD_PREFIX}{sequence:020}")
}

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Flush the store to disk after every write
    pub flush_on_write: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { flush_on_write: true }
    }
}

impl LedgerConfig {
    /// Enable or disable flushing after every write
    pub fn flush_on_write(mut self, enabled: bool) -> Self {
        self.flush_on_write = enabled;
        self
    }
}

/// Ordered, persistent list of not-yet-synced mutations
#[derive(Clone)]
pub struct PendingLedger {
    kv: KvStore,
    config: LedgerConfig,
}

impl PendingLedger {
    /// Create a ledger stored in `kv`
    pub fn new(kv: KvStore, config: LedgerConfig) -> Self {
        Self { kv, config }
    }

    /// Append a mutation for `table`
    ///
    /// The entry is persisted before this returns. Identical changes are not
    /// merged; each call produces its own entry.
    pub fn enqueue(
        &self,
        table: impl Into<String>,
        operation: ChangeOperation,
    ) -> Result<PendingChange> {
        let table = table.into();
        validate_table(&table)?;

        let sequence = self.kv.generate_id()?;
        let timestamp = Utc::now().timestamp_millis();
        let change = PendingChange {
            id: format!("{timestamp}-{sequence}"),
            sequence,
            table,
            operation,
            timestamp,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
        };

        self.kv.set(&pending_key(sequence), &change)?;
        self.flush()?;

        tracing::debug!(
            id = %change.id,
            table = %change.table,
            operation = %change.operation.kind(),
            "queued change"
        );

        Ok(change)
    }

    /// Queue an insert of a JSON object
    pub fn enqueue_insert(&self, table: &str, data: Value) -> Result<PendingChange> {
        self.enqueue(table, ChangeOperation::insert(data)?)
    }

    /// Queue an update of a JSON object carrying an `id`
    pub fn enqueue_update(&self, table: &str, data: Value) -> Result<PendingChange> {
        self.enqueue(table, ChangeOperation::update(data)?)
    }

    /// Queue a delete of a JSON object carrying an `id`, or of a bare id
    pub fn enqueue_delete(&self, table: &str, data: Value) -> Result<PendingChange> {
        self.enqueue(table, ChangeOperation::delete(data)?)
    }

    /// Queue an insert of a typed record
    pub fn enqueue_record<R: Table>(&self, record: &R) -> Result<PendingChange> {
        self.enqueue(R::TABLE, ChangeOperation::insert_record(record)?)
    }

    /// Queue an update of a typed record
    pub fn enqueue_record_update<R: Table>(&self, record: &R) -> Result<PendingChange> {
        self.enqueue(R::TABLE, ChangeOperation::update_record(record)?)
    }

    /// Queue a delete of a typed record
    pub fn enqueue_record_delete<R: Table>(&self, record: &R) -> Result<PendingChange> {
        self.enqueue(R::TABLE, ChangeOperation::delete_record(record)?)
    }

    /// All pending changes in insertion order
    ///
    /// A storage failure is logged and yields an empty list.
    pub fn pending(&self) -> Vec<PendingChange> {
        match self.try_pending() {
            Ok(changes) => changes,
            Err(e) => {
                tracing::error!(error = %e, "failed to read pending changes");
                Vec::new()
            }
        }
    }

    /// All pending changes in insertion order, surfacing storage failures
    pub fn try_pending(&self) -> Result<Vec<PendingChange>> {
        let entries = self.kv.scan_prefix::<PendingChange>(PENDING_PREFIX)?;
        Ok(entries.into_iter().map(|(_, change)| change).collect())
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        match self.kv.count_prefix(PENDING_PREFIX) {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "failed to count pending changes");
                0
            }
        }
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every pending change
    pub fn drain(&self) -> Result<Vec<PendingChange>> {
        let changes = self.try_pending()?;

        let mut batch = KvBatch::new();
        for change in &changes {
            batch.remove(&pending_key(change.sequence));
        }
        self.commit(batch)?;

        Ok(changes)
    }

    /// Replace the pending list with `survivors`
    pub fn rewrite(&self, survivors: &[PendingChange]) -> Result<()> {
        let mut batch = KvBatch::new();
        for key in self.kv.keys_with_prefix(PENDING_PREFIX)? {
            batch.remove(&key);
        }
        for change in survivors {
            batch.set(&pending_key(change.sequence), change)?;
        }
        self.commit(batch)
    }

    /// Record the outcome of a sync pass
    ///
    /// Only the listed entries are touched, so changes queued while the pass
    /// was running stay in the ledger. Retained and dead entries that were
    /// removed while the pass was running stay removed.
    pub fn commit_pass(
        &self,
        succeeded: &[PendingChange],
        retained: &[PendingChange],
        dead: &[PendingChange],
    ) -> Result<()> {
        let mut batch = KvBatch::new();
        for change in succeeded {
            batch.remove(&pending_key(change.sequence));
        }
        for change in retained {
            batch.set_if_present(&pending_key(change.sequence), change)?;
        }
        for change in dead {
            batch.move_if_present(&pending_key(change.sequence), &dead_key(change.sequence), change)?;
        }
        self.commit(batch)
    }

    /// Changes that exhausted their retry budget, in insertion order
    pub fn dead_letters(&self) -> Result<Vec<PendingChange>> {
        let entries = self.kv.scan_prefix::<PendingChange>(DEAD_PREFIX)?;
        Ok(entries.into_iter().map(|(_, change)| change).collect())
    }

    /// Move a dead-lettered change back into the ledger with a fresh retry budget
    ///
    /// It keeps its original position in the replay order.
    pub fn requeue_dead_letter(&self, id: &str) -> Result<PendingChange> {
        let mut change = self
            .dead_letters()?
            .into_iter()
            .find(|change| change.id == id)
            .ok_or_else(|| OfflineError::NotFound(id.to_string()))?;

        change.attempts = 0;
        change.next_attempt_at = None;
        change.last_error = None;

        let mut batch = KvBatch::new();
        batch.remove(&dead_key(change.sequence));
        batch.set(&pending_key(change.sequence), &change)?;
        self.commit(batch)?;

        tracing::info!(id = %change.id, table = %change.table, "requeued dead-lettered change");
        Ok(change)
    }

    /// Permanently drop a dead-lettered change
    pub fn discard_dead_letter(&self, id: &str) -> Result<bool> {
        let Some(change) = self.dead_letters()?.into_iter().find(|change| change.id == id) else {
            return Ok(false);
        };
        let removed = self.kv.remove(&dead_key(change.sequence))?;
        self.flush()?;
        Ok(removed)
    }

    /// Remove every pending change, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let removed = self.kv.remove_prefix(PENDING_PREFIX)?;
        self.flush()?;
        Ok(removed)
    }

    fn commit(&self, batch: KvBatch) -> Result<()> {
        self.kv.apply(batch)?;
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if self.config.flush_on_write {
            self.kv.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_client::{Customer, Facility};
    use serde_json::json;

    fn ledger() -> PendingLedger {
        PendingLedger::new(KvStore::in_memory().unwrap(), LedgerConfig::default())
    }

    fn ids(changes: &[PendingChange]) -> Vec<String> {
        changes.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn test_enqueue_counts_every_call() {
        let ledger = ledger();

        for n in 1..=5 {
            ledger.enqueue_insert("customer", json!({"id": format!("c{n}")})).unwrap();
            assert_eq!(ledger.len(), n);
            assert_eq!(ledger.pending().len(), n);
        }
    }

    #[test]
    fn test_duplicates_are_kept() {
        let ledger = ledger();
        let data = json!({"id": "c1", "name": "Acme"});

        let first = ledger.enqueue_insert("customer", data.clone()).unwrap();
        let second = ledger.enqueue_insert("customer", data).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_pending_preserves_insertion_order() {
        let ledger = ledger();
        let a = ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        let b = ledger.enqueue_update("anlegg", json!({"id": "a1", "name": "x"})).unwrap();
        let c = ledger.enqueue_delete("anlegg", json!("a2")).unwrap();

        assert_eq!(ids(&ledger.pending()), vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_invalid_changes_are_rejected() {
        let ledger = ledger();

        assert!(matches!(
            ledger.enqueue_update("anlegg", json!({"name": "no id"})),
            Err(OfflineError::InvalidChange(_))
        ));
        assert!(matches!(
            ledger.enqueue_insert("", json!({"id": "c1"})),
            Err(OfflineError::InvalidChange(_))
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_typed_records() {
        let ledger = ledger();
        let facility = Facility::new("a1", "c1", "Warehouse");

        ledger.enqueue_record(&Customer::new("c1", "Acme")).unwrap();
        ledger.enqueue_record_update(&facility).unwrap();
        ledger.enqueue_record_delete(&facility).unwrap();

        let tables: Vec<String> = ledger.pending().into_iter().map(|c| c.table).collect();
        assert_eq!(tables, vec!["customer", "anlegg", "anlegg"]);
    }

    #[test]
    fn test_drain_then_rewrite_nothing_succeeded_is_identity() {
        let ledger = ledger();
        ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        ledger.enqueue_insert("anlegg", json!({"id": "a1"})).unwrap();
        ledger.enqueue_delete("anlegg", json!("a2")).unwrap();
        let before = ledger.pending();

        let drained = ledger.drain().unwrap();
        assert!(ledger.is_empty());

        ledger.rewrite(&drained).unwrap();
        assert_eq!(ledger.pending(), before);
    }

    #[test]
    fn test_rewrite_keeps_only_survivors() {
        let ledger = ledger();
        let a = ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        ledger.enqueue_insert("customer", json!({"id": "c2"})).unwrap();
        let c = ledger.enqueue_insert("customer", json!({"id": "c3"})).unwrap();

        ledger.rewrite(&[a.clone(), c.clone()]).unwrap();
        assert_eq!(ids(&ledger.pending()), vec![a.id, c.id]);
    }

    #[test]
    fn test_commit_pass_preserves_concurrent_enqueues() {
        let ledger = ledger();
        let ok = ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        let mut failed = ledger.enqueue_insert("customer", json!({"id": "c2"})).unwrap();

        // Queued while the pass was in flight
        let late = ledger.enqueue_insert("customer", json!({"id": "c3"})).unwrap();

        failed.attempts = 1;
        failed.last_error = Some("boom".to_string());
        ledger.commit_pass(&[ok], &[failed.clone()], &[]).unwrap();

        let pending = ledger.pending();
        assert_eq!(ids(&pending), vec![failed.id.clone(), late.id]);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_commit_pass_does_not_restore_cleared_entries() {
        let ledger = ledger();
        let mut retry = ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        let mut dead = ledger.enqueue_insert("customer", json!({"id": "c2"})).unwrap();

        // Cleared while the pass was in flight
        assert_eq!(ledger.clear().unwrap(), 2);

        retry.attempts = 1;
        dead.attempts = 10;
        ledger.commit_pass(&[], &[retry], &[dead]).unwrap();

        assert!(ledger.is_empty());
        assert!(ledger.dead_letters().unwrap().is_empty());
    }

    #[test]
    fn test_dead_letter_lifecycle() {
        let ledger = ledger();
        let mut change = ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        change.attempts = 10;
        change.last_error = Some("backend error 409: 23505 - duplicate".to_string());

        ledger.commit_pass(&[], &[], &[change.clone()]).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ids(&ledger.dead_letters().unwrap()), vec![change.id.clone()]);

        let requeued = ledger.requeue_dead_letter(&change.id).unwrap();
        assert_eq!(requeued.attempts, 0);
        assert_eq!(requeued.last_error, None);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.dead_letters().unwrap().is_empty());

        assert!(matches!(
            ledger.requeue_dead_letter("missing"),
            Err(OfflineError::NotFound(_))
        ));
    }

    #[test]
    fn test_discard_dead_letter() {
        let ledger = ledger();
        let change = ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        ledger.commit_pass(&[], &[], &[change.clone()]).unwrap();

        assert!(ledger.discard_dead_letter(&change.id).unwrap());
        assert!(!ledger.discard_dead_letter(&change.id).unwrap());
        assert!(ledger.dead_letters().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_entry_yields_empty_list() {
        let kv = KvStore::in_memory().unwrap();
        let ledger = PendingLedger::new(kv.clone(), LedgerConfig::default());
        ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        kv.set("ledger:pending:99999999999999999999", &"garbage").unwrap();

        assert!(ledger.pending().is_empty());
        assert!(ledger.try_pending().is_err());
    }

    #[test]
    fn test_clear() {
        let ledger = ledger();
        ledger.enqueue_insert("customer", json!({"id": "c1"})).unwrap();
        ledger.enqueue_insert("customer", json!({"id": "c2"})).unwrap();

        assert_eq!(ledger.clear().unwrap(), 2);
        assert!(ledger.is_empty());
    }
}
