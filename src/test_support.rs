//! Fixtures shared by the unit tests.

use std::path::Path;

use chrono::Utc;

use crate::batch::BatchRunner;
use crate::config::IndexingConfig;
use crate::credentials::{ClientCredentials, Token, TokenStore};
use crate::indexing::IndexingClient;
use crate::oauth::TokenProvider;
use crate::submission_log::SubmissionLog;

pub const PUBLISH_PATH: &str = "/v3/urlNotifications:publish";

pub fn credentials(token_uri: &str) -> ClientCredentials {
    ClientCredentials {
        client_id: "client-1".to_string(),
        client_secret: "s3cret".to_string(),
        redirect_uri: "http://localhost:7890/token-callback".to_string(),
        auth_uri: "https://accounts.example/o/oauth2/auth".to_string(),
        token_uri: token_uri.to_string(),
    }
}

pub fn token_provider(dir: &Path, token_uri: &str) -> TokenProvider {
    TokenProvider::new(
        credentials(token_uri),
        TokenStore::new(dir.join("token.json")),
        "https://www.googleapis.com/auth/indexing",
        5,
    )
    .unwrap()
}

/// Writes a token expiring `valid_for_ms` from now; negative means already expired.
pub async fn store_token(dir: &Path, access_token: &str, valid_for_ms: i64) {
    let token: Token = serde_json::from_value(serde_json::json!({
        "access_token": access_token,
        "expiry_date": Utc::now().timestamp_millis() + valid_for_ms,
    }))
    .unwrap();
    TokenStore::new(dir.join("token.json"))
        .save(&token)
        .await
        .unwrap();
}

pub fn batch_runner(dir: &Path, server_url: &str) -> BatchRunner {
    let client = IndexingClient::from_config(&IndexingConfig {
        endpoint: format!("{server_url}{PUBLISH_PATH}"),
        timeout_secs: 5,
    })
    .unwrap();
    BatchRunner::new(
        client,
        SubmissionLog::new(dir.join("success_log.txt"), dir.join("error_log.txt")),
    )
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
