//! Agent Client
//!
//! HTTP client for the status API served by a running agent.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

use ids_agent::agent::state::{LevelTransition, StatusSnapshot};

pub struct AgentClient {
    client: reqwest::Client,
    base_url: String,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Agent request failed with status {}", status);
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid response from {}", url))
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.get("/status").await
    }

    pub async fn transitions(&self, count: usize) -> Result<Vec<LevelTransition>> {
        self.get(&format!("/transitions?count={}", count)).await
    }
}
