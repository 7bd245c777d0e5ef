use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct SubmissionLog {
    success_path: PathBuf,
    error_path: PathBuf,
}

impl SubmissionLog {
    pub fn new(success_path: impl Into<PathBuf>, error_path: impl Into<PathBuf>) -> Self {
        Self {
            success_path: success_path.into(),
            error_path: error_path.into(),
        }
    }

    pub async fn append_success(&self, url: &str) -> Result<()> {
        append_line(&self.success_path, &success_line(Utc::now(), url)).await
    }

    pub async fn append_failure(&self, url: &str, reason: &str) -> Result<()> {
        append_line(&self.error_path, &failure_line(Utc::now(), url, reason)).await
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn success_line(at: DateTime<Utc>, url: &str) -> String {
    format!("{} - {url}\n", timestamp(at))
}

fn failure_line(at: DateTime<Utc>, url: &str, reason: &str) -> String {
    format!("{} - {url} - {reason}\n", timestamp(at))
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .await
        .with_context(|| format!("failed to append to log {}", path.display()))?;
    file.flush().await?;
    Ok(())
}
