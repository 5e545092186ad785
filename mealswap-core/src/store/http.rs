//! HTTP client for the remote store.
//!
//! Endpoints (JSON, bearer API key):
//! - `GET  /entities/{kind}?id=&meal_id=&user_id=&email=` -> `[Entity]`
//! - `POST /changes` with a `ChangeSet` body
//! - `GET  /health` (no auth)

use async_trait::async_trait;
use std::time::Duration;

use super::{ChangeSet, Entity, EntityKind, Filter, Store, StoreError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Remote store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&server_url.into()),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Returns true if the server answers its health check.
    pub async fn check_health(&self) -> bool {
        self.client
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(StoreError::Rejected(message));
        }
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Store for HttpStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch_all(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<Entity>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/entities/{}", kind)))
            .bearer_auth(&self.api_key)
            .query(filter)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let response = Self::error_for_status(response).await?;
        let entities: Vec<Entity> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(kind.to_string(), e.to_string()))?;

        // The server is trusted to filter, but a record of the wrong kind is
        // never handed to callers.
        Ok(entities.into_iter().filter(|e| e.kind() == kind).collect())
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("/changes"))
            .bearer_auth(&self.api_key)
            .json(changes)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::error_for_status(response).await?;
        Ok(())
    }
}

/// Adds a scheme to bare hosts and strips trailing slashes.
fn normalize_base_url(server_url: &str) -> String {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
