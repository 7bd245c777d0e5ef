use std::io::Write;

use anyhow::Result;

use crate::batch::{read_url_batch, BatchRunner, BatchSummary};
use crate::config::AppConfig;
use crate::credentials::{ClientCredentials, TokenStore};
use crate::error::IndexerError;
use crate::indexing::IndexingClient;
use crate::oauth::{Authorizer, ConsoleAuthorizer, TokenProvider};
use crate::submission_log::SubmissionLog;

/// Terminal flow: prompts for a code when needed, then streams progress to stdout.
pub async fn run(config: &AppConfig) -> Result<()> {
    let summary = run_with(config, &ConsoleAuthorizer::stdin()).await?;
    if summary.failed > 0 {
        println!(
            "{} of {} URLs failed; see {}",
            summary.failed,
            summary.total,
            config.error_log_path().display()
        );
    }
    Ok(())
}

async fn run_with<A: Authorizer>(config: &AppConfig, authorizer: &A) -> Result<BatchSummary> {
    let credentials = ClientCredentials::load(&config.credentials_path, &config.oauth)?;
    let tokens = TokenProvider::new(
        credentials,
        TokenStore::new(&config.token_path),
        config.oauth.scope.clone(),
        config.oauth.timeout_secs,
    )?;
    let runner = BatchRunner::new(
        IndexingClient::from_config(&config.indexing)?,
        SubmissionLog::new(config.success_log_path(), config.error_log_path()),
    );

    let urls = read_url_batch(&config.url_file).await?;
    if !urls.is_empty() {
        println!("Total URLs to process: {}", urls.len());
    }

    let outcome = runner
        .run(urls, &tokens, authorizer, |_, processed, total| {
            print!("Processed {processed}/{total} URLs\r");
            std::io::stdout().flush().ok();
        })
        .await;

    let summary = match outcome {
        Ok(summary) => summary,
        Err(IndexerError::EmptyBatch) => {
            println!("{}", IndexerError::EmptyBatch);
            return Ok(BatchSummary::default());
        }
        Err(err) => return Err(err.into()),
    };

    println!();
    println!("Processing complete.");
    Ok(summary)
}
