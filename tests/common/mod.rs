//! In-memory backend used by the end-to-end tests

#![allow(dead_code)] // Not every test binary uses every helper

use async_trait::async_trait;
use brannvern::backend_client::{BackendError, RemoteStore, Row, SelectQuery};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// A backend that keeps rows in memory and can be told to fail calls
#[derive(Default)]
pub struct FakeBackend {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Row>>>,
    calls: Mutex<Vec<String>>,
    fail_calls: Mutex<HashSet<usize>>,
    fail_ids: Mutex<HashSet<String>>,
    latency: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th call (1-based) with a 503
    pub fn fail_call(&self, n: usize) {
        self.fail_calls.lock().unwrap().insert(n);
    }

    /// Fail every call that targets row `id`
    pub fn fail_id(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }

    /// Stop failing calls that target row `id`
    pub fn heal_id(&self, id: &str) {
        self.fail_ids.lock().unwrap().remove(id);
    }

    /// Delay every write by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Calls received so far, as "op table id"
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        self.tables.lock().unwrap().get(table).and_then(|rows| rows.get(id)).cloned()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().unwrap().get(table).map_or(0, |rows| rows.len())
    }

    fn record(&self, op: &str, table: &str, id: &str) -> Result<(), BackendError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(format!("{op} {table} {id}"));
        let n = calls.len();

        if self.fail_calls.lock().unwrap().contains(&n)
            || self.fail_ids.lock().unwrap().contains(id)
        {
            return Err(BackendError::new(503, "Unavailable", format!("call {n} failed")));
        }
        Ok(())
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn id_of(row: &Row) -> String {
    match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl RemoteStore for FakeBackend {
    async fn insert(&self, table: &str, row: &Row) -> Result<(), BackendError> {
        let id = id_of(row);
        self.wait().await;
        self.record("insert", table, &id)?;
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id, row.clone());
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, changes: &Row) -> Result<(), BackendError> {
        self.wait().await;
        self.record("update", table, id)?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables.get_mut(table).and_then(|rows| rows.get_mut(id)) {
            for (key, value) in changes {
                row.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        self.wait().await;
        self.record("delete", table, id)?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn select(&self, table: &str, _query: &SelectQuery) -> Result<Vec<Row>, BackendError> {
        self.record("select", table, "")?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(table).map(|rows| rows.values().cloned().collect()).unwrap_or_default())
    }
}
