//! HTTP client for the on-device helper app (accessibility service).
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{TutanError, TutanResult};

/// The helper app's high-level API.
#[async_trait]
pub trait Companion: Send + Sync {
    /// Raw accessibility tree. Any non-success response is an error.
    async fn aria_tree(&self) -> TutanResult<Value>;

    /// Gesture tap dispatched by the accessibility service. `Ok(false)` when
    /// the service answered but could not perform it.
    async fn tap(&self, x: i32, y: i32) -> TutanResult<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionStatus {
    pub status: String,
    #[serde(default)]
    pub service_active: bool,
}

pub struct CompanionClient {
    base_url: String,
    client: reqwest::Client,
}

impl CompanionClient {
    /// Client for a helper reachable on `localhost:<port>` (adb-forwarded).
    pub fn new(port: u16, timeout: Duration) -> TutanResult<Self> {
        Self::with_base_url(format!("http://localhost:{port}"), timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> TutanResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /status`: whether the helper is up and its service is bound.
    pub async fn status(&self) -> TutanResult<CompanionStatus> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TutanError::Companion(format!(
                "/status returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Companion for CompanionClient {
    async fn aria_tree(&self) -> TutanResult<Value> {
        let response = self
            .client
            .get(format!("{}/aria-tree", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TutanError::Companion(format!("/aria-tree returned {status}: {body}")));
        }
        Ok(response.json().await?)
    }

    async fn tap(&self, x: i32, y: i32) -> TutanResult<bool> {
        let response = self
            .client
            .post(format!("{}/tap", self.base_url))
            .json(&serde_json::json!({ "x": x, "y": y }))
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "helper tap rejected");
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(body["success"].as_bool().unwrap_or(false))
    }
}
