//! In-memory store
//!
//! Used by tests and dry runs where no remote database is reachable. Every
//! successful write is recorded so callers can assert on exactly what the
//! tracker published.

use super::{RemoteStateClient, StoreError, StoreResult, StoreValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, StoreValue>>,
    writes: RwLock<Vec<(String, StoreValue)>>,
    offline: AtomicBool,
    read_only: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value without recording it as a write.
    pub fn with_value(self, path: impl Into<String>, value: StoreValue) -> Self {
        self.values.write().insert(path.into(), value);
        self
    }

    /// Simulates the store being unreachable for reads and writes.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reads keep working while every write fails.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Out-of-band edit, as an operator would make it.
    pub fn put(&self, path: impl Into<String>, value: StoreValue) {
        self.values.write().insert(path.into(), value);
    }

    pub fn value(&self, path: &str) -> Option<StoreValue> {
        self.values.read().get(path).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.read().len()
    }

    pub fn writes(&self) -> Vec<(String, StoreValue)> {
        self.writes.read().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.write().clear();
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn record(&self, path: &str, value: StoreValue) -> StoreResult<()> {
        self.ensure_online()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Response {
                status: 401,
                message: "Permission denied".to_string(),
            });
        }

        self.values.write().insert(path.to_string(), value.clone());
        self.writes.write().push((path.to_string(), value));
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteStateClient for InMemoryStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.ensure_online()?;
        Ok(self.values.read().contains_key(path))
    }

    async fn get_string(&self, path: &str) -> StoreResult<String> {
        self.ensure_online()?;
        match self.values.read().get(path) {
            Some(StoreValue::Text(value)) => Ok(value.clone()),
            Some(StoreValue::Flag(_)) => Err(StoreError::Type {
                path: path.to_string(),
                expected: "string",
            }),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    async fn get_bool(&self, path: &str) -> StoreResult<bool> {
        self.ensure_online()?;
        match self.values.read().get(path) {
            Some(StoreValue::Flag(value)) => Ok(*value),
            Some(StoreValue::Text(_)) => Err(StoreError::Type {
                path: path.to_string(),
                expected: "bool",
            }),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    async fn set_string(&self, path: &str, value: &str) -> StoreResult<()> {
        self.record(path, StoreValue::text(value))
    }

    async fn set_bool(&self, path: &str, value: bool) -> StoreResult<()> {
        self.record(path, StoreValue::Flag(value))
    }
}
