use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::IndexingConfig;
use crate::error::IndexerError;

const URL_UPDATED: &str = "URL_UPDATED";

#[derive(Clone)]
pub struct IndexingClient {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl IndexingClient {
    pub fn from_config(config: &IndexingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build indexing HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
        })
    }

    pub async fn submit(&self, url: &str, access_token: &str) -> Result<(), IndexerError> {
        let payload = PublishRequest {
            url,
            kind: URL_UPDATED,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| IndexerError::Submission(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "url notification published");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(IndexerError::Submission(failure_detail(status, &body)))
    }
}

fn failure_detail(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|detail| detail.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()))
}
