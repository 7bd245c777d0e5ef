use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::IndexerError;
use crate::indexing::IndexingClient;
use crate::oauth::{Authorizer, TokenProvider, TokenState};
use crate::submission_log::SubmissionLog;

const SUCCESS_DETAIL: &str = "URL successfully indexed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub url: String,
    pub status: SubmissionStatus,
    #[serde(rename = "details")]
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatus {
    pub processed: usize,
    pub total: usize,
    pub results: Vec<SubmissionResult>,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct BatchProgress {
    inner: Arc<Mutex<BatchStatus>>,
}

impl BatchProgress {
    pub fn snapshot(&self) -> BatchStatus {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn claim(&self, total: usize) -> Result<RunGuard, IndexerError> {
        let mut status = self.lock();
        if status.running {
            return Err(IndexerError::BatchInProgress);
        }

        *status = BatchStatus {
            processed: 0,
            total,
            results: Vec::with_capacity(total),
            running: true,
        };

        Ok(RunGuard {
            progress: self.clone(),
        })
    }

    fn record(&self, result: SubmissionResult) -> (usize, usize) {
        let mut status = self.lock();
        status.results.push(result);
        status.processed += 1;
        (status.processed, status.total)
    }

    fn lock(&self) -> MutexGuard<'_, BatchStatus> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("batch progress mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

struct RunGuard {
    progress: BatchProgress,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.progress.lock().running = false;
    }
}

/// Reads a newline-delimited URL list, dropping blank lines.
pub async fn read_url_batch(path: &Path) -> Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read URL file {}", path.display()))?;
    Ok(parse_url_batch(&raw))
}

pub fn parse_url_batch(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct BatchRunner {
    client: IndexingClient,
    log: SubmissionLog,
    progress: BatchProgress,
}

impl BatchRunner {
    pub fn new(client: IndexingClient, log: SubmissionLog) -> Self {
        Self {
            client,
            log,
            progress: BatchProgress::default(),
        }
    }

    pub fn progress(&self) -> &BatchProgress {
        &self.progress
    }

    pub fn prepare(&self, urls: Vec<String>) -> Result<PendingBatch, IndexerError> {
        if urls.is_empty() {
            return Err(IndexerError::EmptyBatch);
        }

        let guard = self.progress.claim(urls.len())?;
        Ok(PendingBatch {
            runner: self.clone(),
            urls,
            _guard: guard,
        })
    }

    pub async fn run<A, F>(
        &self,
        urls: Vec<String>,
        tokens: &TokenProvider,
        authorizer: &A,
        on_result: F,
    ) -> Result<BatchSummary, IndexerError>
    where
        A: Authorizer,
        F: FnMut(&SubmissionResult, usize, usize),
    {
        let pending = self.prepare(urls)?;
        Ok(pending.execute(tokens, authorizer, on_result).await)
    }

    async fn submit_one<A: Authorizer>(
        &self,
        url: &str,
        tokens: &TokenProvider,
        authorizer: &A,
    ) -> SubmissionResult {
        let outcome = match resolve_access_token(tokens, authorizer).await {
            Ok(access_token) => self
                .client
                .submit(url, &access_token)
                .await
                .map_err(|err| err.to_string()),
            Err(err) => Err(format!("{err:#}")),
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = self.log.append_success(url).await {
                    tracing::warn!(url, error = %format!("{err:#}"), "success log write failed");
                }
                SubmissionResult {
                    url: url.to_string(),
                    status: SubmissionStatus::Success,
                    detail: SUCCESS_DETAIL.to_string(),
                }
            }
            Err(detail) => {
                tracing::warn!(url, %detail, "submission failed");
                if let Err(err) = self.log.append_failure(url, &detail).await {
                    tracing::warn!(url, error = %format!("{err:#}"), "error log write failed");
                }
                SubmissionResult {
                    url: url.to_string(),
                    status: SubmissionStatus::Failed,
                    detail,
                }
            }
        }
    }
}

/// A claimed batch. Dropping it, finished or not, releases the runner.
pub struct PendingBatch {
    runner: BatchRunner,
    urls: Vec<String>,
    _guard: RunGuard,
}

impl PendingBatch {
    pub fn total(&self) -> usize {
        self.urls.len()
    }

    // One URL at a time; each result is logged before the next starts.
    pub async fn execute<A, F>(
        self,
        tokens: &TokenProvider,
        authorizer: &A,
        mut on_result: F,
    ) -> BatchSummary
    where
        A: Authorizer,
        F: FnMut(&SubmissionResult, usize, usize),
    {
        let mut summary = BatchSummary {
            total: self.urls.len(),
            ..BatchSummary::default()
        };

        for url in &self.urls {
            let result = self.runner.submit_one(url, tokens, authorizer).await;
            match result.status {
                SubmissionStatus::Success => summary.succeeded += 1,
                SubmissionStatus::Failed => summary.failed += 1,
            }

            let (processed, total) = self.runner.progress.record(result.clone());
            on_result(&result, processed, total);
        }

        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch completed"
        );

        summary
    }
}

async fn resolve_access_token<A: Authorizer>(
    tokens: &TokenProvider,
    authorizer: &A,
) -> Result<String> {
    match tokens.access_token().await? {
        TokenState::Ready(access_token) => Ok(access_token),
        TokenState::AuthorizationRequired(auth_url) => {
            let code = authorizer.authorization_code(&auth_url).await?;
            let token = tokens.exchange_code(&code).await?;
            Ok(token.access_token)
        }
    }
}
