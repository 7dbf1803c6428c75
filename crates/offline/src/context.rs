//! Offline context
//!
//! [`OfflineContext`] is built once at application start and handed to every
//! screen that reads or writes backend data. It owns the connectivity monitor,
//! the ledger, the response cache and the sync runner, and it schedules a sync
//! pass shortly after each reconnect.

use backend_client::{BackendError, RemoteStore, Row, SelectQuery, Table};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storage::{CacheConfig, KvStore, ResponseCache};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::change::{validate_table, ChangeOperation, PendingChange};
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::error::{OfflineError, Result};
use crate::ledger::{LedgerConfig, PendingLedger};
use crate::policy::RetryPolicy;
use crate::runner::{apply_change, SyncReport, SyncRunner, SyncStatus};

/// Configuration for the offline layer
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Wait between a reconnect and the sync pass it triggers
    pub reconnect_delay: Duration,
    /// Backoff and cutoff for failing entries
    pub retry: RetryPolicy,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Ledger settings
    pub ledger: LedgerConfig,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl OfflineConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the cache configuration
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the ledger configuration
    pub fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }
}

/// Result of [`OfflineContext::write`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The backend confirmed the write
    Applied,
    /// The write was recorded for the next sync pass
    Queued(PendingChange),
}

/// A value read through the cache
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    /// The value
    pub value: T,
    /// Whether the value came from the cache instead of the backend
    pub from_cache: bool,
}

/// Application-wide offline support
pub struct OfflineContext {
    connectivity: ConnectivityMonitor,
    ledger: PendingLedger,
    cache: ResponseCache,
    remote: Arc<dyn RemoteStore>,
    runner: Arc<SyncRunner>,
    config: OfflineConfig,
    // Closed on drop, which stops every reconnect watcher
    shutdown: watch::Sender<()>,
}

impl OfflineContext {
    /// Wire up the offline layer
    pub fn new(
        kv: KvStore,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        config: OfflineConfig,
    ) -> Self {
        let ledger = PendingLedger::new(kv.clone(), config.ledger.clone());
        let cache = ResponseCache::new(kv, config.cache.clone());
        let runner = Arc::new(SyncRunner::new(
            ledger.clone(),
            Arc::clone(&remote),
            connectivity.clone(),
            config.retry.clone(),
        ));

        let (shutdown, _) = watch::channel(());

        Self { connectivity, ledger, cache, remote, runner, config, shutdown }
    }

    /// Start the reconnect watcher
    ///
    /// Every transition to online schedules a sync pass after
    /// `reconnect_delay`. If the device is already online with changes left
    /// over from a previous session, a pass is scheduled right away. The
    /// watcher stops when the context is dropped; a pass already running is
    /// allowed to finish first. Abort the returned handle to stop it sooner.
    pub fn start(&self) -> JoinHandle<()> {
        let mut events = self.connectivity.watch();
        let mut shutdown = self.shutdown.subscribe();
        let runner = Arc::clone(&self.runner);
        let connectivity = self.connectivity.clone();
        let delay = self.config.reconnect_delay;
        let resume = self.connectivity.is_online() && !self.ledger.is_empty();

        tokio::spawn(async move {
            if resume {
                if !pause(&mut shutdown, delay).await {
                    return;
                }
                runner.run().await;
            }

            loop {
                let event = tokio::select! {
                    _ = shutdown.changed() => break,
                    event = events.recv() => event,
                };

                let state = match event {
                    Ok(state) => state,
                    Err(missed) => {
                        tracing::warn!(error = %missed, "missed connectivity events");
                        connectivity.state()
                    }
                };

                if state == ConnectivityState::Online {
                    if !pause(&mut shutdown, delay).await {
                        break;
                    }
                    runner.run().await;
                }
            }

            tracing::debug!("reconnect watcher stopped");
        })
    }

    /// The connectivity monitor
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// The pending-change ledger
    pub fn ledger(&self) -> &PendingLedger {
        &self.ledger
    }

    /// The response cache
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The sync runner
    pub fn runner(&self) -> &SyncRunner {
        &self.runner
    }

    /// Subscribe to the sync indicator
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.runner.status()
    }

    /// Number of changes waiting for a sync pass
    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }

    /// Run a sync pass now
    pub async fn sync_now(&self) -> SyncReport {
        self.runner.run().await
    }

    /// Queue an insert of a JSON object
    pub fn queue_insert(&self, table: &str, data: Value) -> Result<PendingChange> {
        self.ledger.enqueue_insert(table, data)
    }

    /// Queue an update of a JSON object carrying an `id`
    pub fn queue_update(&self, table: &str, data: Value) -> Result<PendingChange> {
        self.ledger.enqueue_update(table, data)
    }

    /// Queue a delete of a JSON object carrying an `id`, or of a bare id
    pub fn queue_delete(&self, table: &str, data: Value) -> Result<PendingChange> {
        self.ledger.enqueue_delete(table, data)
    }

    /// Write through to the backend, queueing when that is not possible
    ///
    /// Offline, or on a network-class failure, the change is queued. Any other
    /// backend error is returned and nothing is queued.
    pub async fn write(&self, table: &str, operation: ChangeOperation) -> Result<WriteOutcome> {
        validate_table(table)?;

        if self.connectivity.is_online() {
            match apply_change(self.remote.as_ref(), table, &operation).await {
                Ok(()) => return Ok(WriteOutcome::Applied),
                Err(err) if err.is_network_error() => {
                    tracing::warn!(table, error = %err, "write failed, queueing for sync");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let change = self.ledger.enqueue(table, operation)?;
        Ok(WriteOutcome::Queued(change))
    }

    /// Insert a typed record, queueing when the backend is unreachable
    pub async fn write_record<R: Table>(&self, record: &R) -> Result<WriteOutcome> {
        self.write(R::TABLE, ChangeOperation::insert_record(record)?).await
    }

    /// Fetch a value, falling back to the last cached copy
    ///
    /// Online, `fetch` runs and its result replaces the cached copy. Offline
    /// or on a network-class failure the cached copy is returned; without one
    /// the failure is returned. Other backend errors are returned as is.
    pub async fn fetch_with_cache<T, F, Fut>(&self, key: &str, fetch: F) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let mut failure = None;

        if self.connectivity.is_online() {
            match fetch().await {
                Ok(value) => {
                    if let Err(e) = self.cache.set(key, &value) {
                        tracing::warn!(key, error = %e, "failed to cache response");
                    }
                    return Ok(Cached { value, from_cache: false });
                }
                Err(err) if err.is_network_error() => {
                    tracing::warn!(key, error = %err, "fetch failed, using cached copy");
                    failure = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let cached = match self.cache.get::<T>(key) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read cached response");
                None
            }
        };

        match (cached, failure) {
            (Some(value), _) => Ok(Cached { value, from_cache: true }),
            (None, Some(err)) => Err(err.into()),
            (None, None) => Err(OfflineError::NoCachedData(key.to_string())),
        }
    }

    /// Select rows from `table`, falling back to the last cached result
    pub async fn select_with_cache(
        &self,
        table: &str,
        query: &SelectQuery,
    ) -> Result<Cached<Vec<Row>>> {
        let key = select_cache_key(table, query);
        self.fetch_with_cache(&key, || self.remote.select(table, query)).await
    }

    /// Fetch typed records, falling back to the last cached result
    pub async fn fetch_records<R: Table>(&self, query: &SelectQuery) -> Result<Cached<Vec<R>>> {
        let rows = self.select_with_cache(R::TABLE, query).await?;
        let value = rows
            .value
            .into_iter()
            .map(R::from_row)
            .collect::<std::result::Result<Vec<R>, _>>()?;
        Ok(Cached { value, from_cache: rows.from_cache })
    }
}

/// Sleep for `delay`; `false` if the context went away first
async fn pause(shutdown: &mut watch::Receiver<()>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn select_cache_key(table: &str, query: &SelectQuery) -> String {
    let params: Vec<String> = query.to_params().into_iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("select:{table}?{}", params.join("&"))
}
