//! Reconnect watcher tests

mod common;

use brannvern::offline::{
    ConnectivityMonitor, ConnectivityState, OfflineConfig, OfflineContext, RetryPolicy, SyncStatus,
};
use brannvern::storage::{KvConfig, KvStore};
use common::FakeBackend;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn context(kv: KvStore, backend: &Arc<FakeBackend>, online: bool) -> OfflineContext {
    OfflineContext::new(
        kv,
        backend.clone(),
        ConnectivityMonitor::new(ConnectivityState::from_online(online)),
        OfflineConfig::new()
            .retry(RetryPolicy::unbounded())
            .reconnect_delay(Duration::from_millis(20)),
    )
}

async fn wait_until_synced(ctx: &OfflineContext) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.pending_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ledger was not drained");
}

#[tokio::test]
async fn test_reconnect_replays_queued_changes() {
    let backend = Arc::new(FakeBackend::new());
    let ctx = context(KvStore::in_memory().unwrap(), &backend, false);
    let watcher = ctx.start();

    ctx.queue_insert("customer", json!({"id": "c1", "name": "Acme"})).unwrap();
    ctx.queue_insert("anlegg", json!({"id": "a1", "customer_id": "c1"})).unwrap();

    ctx.connectivity().set_online(true);
    wait_until_synced(&ctx).await;

    assert_eq!(backend.calls(), vec!["insert customer c1", "insert anlegg a1"]);
    watcher.abort();
}

#[tokio::test]
async fn test_flapping_connection_applies_each_change_once() {
    let backend = Arc::new(FakeBackend::new());
    let ctx = context(KvStore::in_memory().unwrap(), &backend, false);
    let watcher = ctx.start();

    ctx.queue_insert("customer", json!({"id": "c1"})).unwrap();
    for _ in 0..5 {
        ctx.connectivity().set_online(true);
        ctx.connectivity().set_online(false);
    }
    ctx.connectivity().set_online(true);

    wait_until_synced(&ctx).await;
    // Let the queued reconnect events play out
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(backend.calls(), vec!["insert customer c1"]);
    watcher.abort();
}

#[tokio::test]
async fn test_start_resumes_leftover_changes() {
    let backend = Arc::new(FakeBackend::new());
    let kv = KvStore::in_memory().unwrap();
    let ctx = context(kv, &backend, true);
    ctx.queue_delete("anlegg", json!("a1")).unwrap();

    let watcher = ctx.start();
    wait_until_synced(&ctx).await;

    assert_eq!(backend.calls(), vec!["delete anlegg a1"]);
    watcher.abort();
}

#[tokio::test]
async fn test_stopped_watcher_does_not_sync() {
    let backend = Arc::new(FakeBackend::new());
    let ctx = context(KvStore::in_memory().unwrap(), &backend, false);
    let watcher = ctx.start();
    watcher.abort();
    let _ = watcher.await;

    ctx.queue_insert("customer", json!({"id": "c1"})).unwrap();
    ctx.connectivity().set_online(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ctx.pending_count(), 1);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_dropping_context_stops_watcher() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offline.db").to_string_lossy().to_string();
    let backend = Arc::new(FakeBackend::new());

    let ctx = context(KvStore::new(KvConfig::new(path.clone())).unwrap(), &backend, false);
    let watcher = ctx.start();
    drop(ctx);

    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watcher kept running")
        .unwrap();

    // The watcher no longer holds the store open
    assert!(KvStore::new(KvConfig::new(path)).is_ok());
}

#[tokio::test]
async fn test_status_follows_connectivity_and_sync() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_latency(Duration::from_millis(100));
    let ctx = context(KvStore::in_memory().unwrap(), &backend, false);
    let mut status = ctx.status();
    assert_eq!(*status.borrow(), SyncStatus::Offline);

    ctx.queue_insert("customer", json!({"id": "c1"})).unwrap();
    ctx.connectivity().set_online(true);
    assert_eq!(*status.borrow_and_update(), SyncStatus::Online);

    let (report, seen) = tokio::join!(ctx.sync_now(), async {
        let seen = status.wait_for(|s| *s == SyncStatus::Syncing).await.map(|s| *s);
        seen.ok()
    });

    assert!(report.success);
    assert_eq!(seen, Some(SyncStatus::Syncing));
    assert_eq!(ctx.runner().current_status(), SyncStatus::Online);

    ctx.connectivity().set_online(false);
    assert_eq!(ctx.runner().current_status(), SyncStatus::Offline);
}
