//! Remote state store
//!
//! The remote key tree is the single source of truth for the last published
//! position and the notify flag. Nothing is cached on disk; callers keep at
//! most an in-process copy of the last values they managed to read.
//!
//! ```text
//! {root}/coordinates/latitude    "0"            last published latitude
//! {root}/coordinates/longitude   "0"            last published longitude
//! {root}/maps/pin                "placeholder"  search link for the position
//! {root}/maps/directions         "placeholder"  directions link
//! {root}/timestamp               ""             publication time
//! {root}/shouldNotify            false          operator alert switch
//! ```

mod memory;

pub use memory::InMemoryStore;

use tracing::{debug, info, warn};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Response error ({status}): {message}")]
    Response { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Value at {path} is not a {expected}")]
    Type { path: String, expected: &'static str },

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Typed accessors over a remote key-value hierarchy.
///
/// Calls are independent: a read followed by a write is not atomic.
#[async_trait::async_trait]
pub trait RemoteStateClient: Send + Sync {
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    async fn get_string(&self, path: &str) -> StoreResult<String>;

    async fn get_bool(&self, path: &str) -> StoreResult<bool>;

    async fn set_string(&self, path: &str, value: &str) -> StoreResult<()>;

    async fn set_bool(&self, path: &str, value: bool) -> StoreResult<()>;
}

/// Absolute paths of the tracker keys under a configurable root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: String,
}

impl StorePaths {
    pub fn new(root: impl AsRef<str>) -> Self {
        let trimmed = root.as_ref().trim().trim_end_matches('/');
        let root = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { root }
    }

    fn join(&self, suffix: &str) -> String {
        format!("{}/{}", self.root, suffix)
    }

    pub fn latitude(&self) -> String {
        self.join("coordinates/latitude")
    }

    pub fn longitude(&self) -> String {
        self.join("coordinates/longitude")
    }

    pub fn maps_pin(&self) -> String {
        self.join("maps/pin")
    }

    pub fn maps_directions(&self) -> String {
        self.join("maps/directions")
    }

    pub fn timestamp(&self) -> String {
        self.join("timestamp")
    }

    pub fn should_notify(&self) -> String {
        self.join("shouldNotify")
    }

    /// Every key with the value it is created with when missing.
    pub fn defaults(&self) -> Vec<(String, StoreValue)> {
        vec![
            (self.latitude(), StoreValue::text("0")),
            (self.longitude(), StoreValue::text("0")),
            (self.maps_pin(), StoreValue::text("placeholder")),
            (self.maps_directions(), StoreValue::text("placeholder")),
            (self.timestamp(), StoreValue::text("")),
            (self.should_notify(), StoreValue::Flag(false)),
        ]
    }
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::new("/")
    }
}

/// A value as the tracker reads or writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    Text(String),
    Flag(bool),
}

impl StoreValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    async fn write(&self, store: &dyn RemoteStateClient, path: &str) -> StoreResult<()> {
        match self {
            Self::Text(value) => store.set_string(path, value).await,
            Self::Flag(value) => store.set_bool(path, *value).await,
        }
    }
}

/// Outcome of [`initialize_store`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub created: Vec<String>,
    pub existing: usize,
    pub failed: Vec<String>,
}

/// Creates every tracker key that is missing.
///
/// Existing keys are never touched. A key whose existence cannot be
/// determined is skipped rather than risk overwriting it, so running this
/// again later fills in whatever the first run could not.
pub async fn initialize_store(store: &dyn RemoteStateClient, paths: &StorePaths) -> InitReport {
    let mut report = InitReport::default();

    for (path, default) in paths.defaults() {
        match store.exists(&path).await {
            Ok(true) => {
                debug!(path = %path, "Key present");
                report.existing += 1;
            }
            Ok(false) => match default.write(store, &path).await {
                Ok(()) => {
                    info!(path = %path, "Created missing key");
                    report.created.push(path);
                }
                Err(e) => {
                    warn!(path = %path, "Failed to create key: {}", e);
                    report.failed.push(path);
                }
            },
            Err(e) => {
                warn!(path = %path, "Could not check key, leaving it alone: {}", e);
                report.failed.push(path);
            }
        }
    }

    report
}
