//! Firebase Realtime Database over its REST interface
//!
//! Each key is addressed as `{database_url}/{path}.json`, authenticated with
//! the database secret in the `auth` query parameter. A missing key reads
//! back as JSON `null`.

use std::time::Duration;

use drift_tracker_core::{RemoteStateClient, StoreError, StoreResult};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FirebaseStore {
    client: Client,
    base_url: String,
    secret: String,
}

impl FirebaseStore {
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn auth(&self) -> Vec<(&'static str, &str)> {
        if self.secret.is_empty() {
            Vec::new()
        } else {
            vec![("auth", self.secret.as_str())]
        }
    }

    async fn get_value(&self, path: &str) -> StoreResult<Value> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(&self.auth())
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn put_value(&self, path: &str, value: &Value) -> StoreResult<()> {
        debug!(path, "PUT {}", value);

        let response = self
            .client
            .put(self.endpoint(path))
            .query(&self.auth())
            .json(value)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: Response) -> StoreResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(StoreError::Response {
            status: status.as_u16(),
            message: text,
        })
    }
}

/// Strings come back as-is; numbers are accepted because the console stores
/// hand-typed coordinates as numbers.
fn string_from_value(path: &str, value: Value) -> StoreResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Err(StoreError::NotFound(path.to_string())),
        _ => Err(StoreError::Type {
            path: path.to_string(),
            expected: "string",
        }),
    }
}

fn bool_from_value(path: &str, value: Value) -> StoreResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Null => Err(StoreError::NotFound(path.to_string())),
        _ => Err(StoreError::Type {
            path: path.to_string(),
            expected: "bool",
        }),
    }
}

#[async_trait::async_trait]
impl RemoteStateClient for FirebaseStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(!self.get_value(path).await?.is_null())
    }

    async fn get_string(&self, path: &str) -> StoreResult<String> {
        string_from_value(path, self.get_value(path).await?)
    }

    async fn get_bool(&self, path: &str) -> StoreResult<bool> {
        bool_from_value(path, self.get_value(path).await?)
    }

    async fn set_string(&self, path: &str, value: &str) -> StoreResult<()> {
        self.put_value(path, &Value::String(value.to_string())).await
    }

    async fn set_bool(&self, path: &str, value: bool) -> StoreResult<()> {
        self.put_value(path, &Value::Bool(value)).await
    }
}
