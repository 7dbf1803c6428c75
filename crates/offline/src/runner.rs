//! Sync runner
//!
//! Replays the ledger against the backend one entry at a time, in insertion
//! order. Failures never abort the pass; they are collected into the
//! [`SyncReport`] and the failing entry stays in the ledger for a later pass.

use backend_client::{BackendError, RemoteStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::change::{ChangeOperation, PendingChange};
use crate::connectivity::{ConnectivityMonitor, ConnectivityState, ListenerId};
use crate::ledger::PendingLedger;
use crate::policy::RetryPolicy;

/// What the sync indicator shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    /// Connected and idle
    Online,
    /// No connection
    Offline,
    /// A sync pass is running
    Syncing,
}

impl SyncStatus {
    fn idle(state: ConnectivityState) -> Self {
        match state {
            ConnectivityState::Online => SyncStatus::Online,
            ConnectivityState::Offline => SyncStatus::Offline,
        }
    }
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// The pass ran and every attempted entry was applied
    pub success: bool,
    /// Entries applied and removed from the ledger
    pub synced: usize,
    /// Entries that failed, including those dead-lettered
    pub failed: usize,
    /// Entries skipped because their backoff had not elapsed
    pub deferred: usize,
    /// Failed entries moved to the dead-letter area
    pub dead_lettered: usize,
    /// One message per failure
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Report for a pass skipped because the device is offline
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Apply one mutation to the backend
pub(crate) async fn apply_change(
    remote: &dyn RemoteStore,
    table: &str,
    operation: &ChangeOperation,
) -> Result<(), BackendError> {
    match operation {
        ChangeOperation::Insert { row } => remote.insert(table, row).await,
        ChangeOperation::Update { id, changes } => remote.update(table, id, changes).await,
        ChangeOperation::Delete { id } => remote.delete(table, id).await,
    }
}

/// Replays pending changes against the backend
pub struct SyncRunner {
    ledger: PendingLedger,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
    policy: RetryPolicy,
    status: Arc<watch::Sender<SyncStatus>>,
    status_listener: ListenerId,
    pass_lock: Mutex<()>,
}

impl SyncRunner {
    /// Create a runner
    pub fn new(
        ledger: PendingLedger,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        policy: RetryPolicy,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::idle(connectivity.state()));
        let status = Arc::new(status_tx);

        let indicator = Arc::clone(&status);
        let status_listener = connectivity.subscribe(move |state| {
            // A running pass restores the indicator itself when it ends
            indicator.send_if_modified(|current| {
                if *current == SyncStatus::Syncing {
                    return false;
                }
                let next = SyncStatus::idle(state);
                let changed = *current != next;
                *current = next;
                changed
            });
        });

        Self {
            ledger,
            remote,
            connectivity,
            policy,
            status,
            status_listener,
            pass_lock: Mutex::new(()),
        }
    }

    /// Subscribe to the sync indicator
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Current indicator value
    pub fn current_status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Retry policy applied to failing entries
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one sync pass
    ///
    /// While offline this is a no-op returning [`SyncReport::offline`].
    /// Concurrent callers are serialised; each runs its own pass.
    pub async fn run(&self) -> SyncReport {
        if !self.connectivity.is_online() {
            tracing::debug!("skipping sync pass while offline");
            return SyncReport::offline();
        }

        let _pass = self.pass_lock.lock().await;
        if !self.connectivity.is_online() {
            return SyncReport::offline();
        }

        self.status.send_replace(SyncStatus::Syncing);
        let report = self.replay().await;
        self.status.send_replace(SyncStatus::idle(self.connectivity.state()));

        report
    }

    async fn replay(&self) -> SyncReport {
        let entries = self.ledger.pending();
        let pass_started = Utc::now().timestamp_millis();
        let total = entries.len();

        tracing::info!(pending = total, "starting sync pass");

        let mut report = SyncReport::default();
        let mut succeeded = Vec::new();
        let mut retained = Vec::new();
        let mut dead = Vec::new();

        for mut change in entries {
            if !change.is_due(pass_started) {
                report.deferred += 1;
                continue;
            }

            match apply_change(self.remote.as_ref(), &change.table, &change.operation).await {
                Ok(()) => {
                    report.synced += 1;
                    succeeded.push(change);
                }
                Err(err) => {
                    report.failed += 1;
                    report.errors.push(failure_message(&change, &err));
                    tracing::warn!(
                        id = %change.id,
                        table = %change.table,
                        operation = %change.operation.kind(),
                        attempts = change.attempts.saturating_add(1),
                        error = %err,
                        "failed to sync change"
                    );

                    change.attempts = change.attempts.saturating_add(1);
                    change.last_error = Some(err.to_string());

                    if self.policy.is_exhausted(change.attempts) {
                        report.dead_lettered += 1;
                        tracing::error!(id = %change.id, table = %change.table, "change dead-lettered");
                        dead.push(change);
                    } else {
                        change.next_attempt_at = self.next_attempt_at(change.attempts);
                        retained.push(change);
                    }
                }
            }
        }

        report.success = report.failed == 0;

        if let Err(e) = self.ledger.commit_pass(&succeeded, &retained, &dead) {
            tracing::error!(error = %e, "failed to record sync pass");
            report.errors.push(format!("ledger: {e}"));
            report.success = false;
        }

        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            deferred = report.deferred,
            dead_lettered = report.dead_lettered,
            "sync pass finished"
        );

        report
    }

    fn next_attempt_at(&self, attempts: u32) -> Option<i64> {
        let delay = self.policy.delay_for(attempts);
        if delay.is_zero() {
            return None;
        }
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Some(Utc::now().timestamp_millis().saturating_add(delay_ms))
    }
}

impl Drop for SyncRunner {
    fn drop(&mut self) {
        self.connectivity.unsubscribe(self.status_listener);
    }
}

fn failure_message(change: &PendingChange, err: &BackendError) -> String {
    format!("{} {} {}: {}", change.table, change.operation.kind(), change.id, err)
}
