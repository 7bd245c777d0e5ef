use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{OAuthConfig, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
use crate::error::IndexerError;

const PLACEHOLDER_CLIENT_ID: &str = "your-client-id";
const PLACEHOLDER_CLIENT_SECRET: &str = "your-client-secret";
const PLACEHOLDER_REDIRECT_URI: &str = "http://localhost:7890/token-callback";

#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    web: WebCredentials,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebCredentials {
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_provider_x509_cert_url: Option<String>,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl WebCredentials {
    fn placeholder() -> Self {
        Self {
            client_id: PLACEHOLDER_CLIENT_ID.to_string(),
            project_id: Some("your-project-id".to_string()),
            auth_uri: Some(GOOGLE_AUTH_URI.to_string()),
            token_uri: Some(GOOGLE_TOKEN_URI.to_string()),
            auth_provider_x509_cert_url: Some(
                "https://www.googleapis.com/oauth2/v1/certs".to_string(),
            ),
            client_secret: PLACEHOLDER_CLIENT_SECRET.to_string(),
            redirect_uris: vec![PLACEHOLDER_REDIRECT_URI.to_string()],
        }
    }

    fn is_placeholder(&self) -> bool {
        let id = self.client_id.trim();
        let secret = self.client_secret.trim();
        id.is_empty()
            || secret.is_empty()
            || id == PLACEHOLDER_CLIENT_ID
            || secret == PLACEHOLDER_CLIENT_SECRET
    }
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
}

impl ClientCredentials {
    pub fn load(path: &Path, overrides: &OAuthConfig) -> Result<Self> {
        if write_placeholder(path)? {
            tracing::warn!(path = %path.display(), "created default credential file");
            return Err(IndexerError::ConfigMissing(path.to_path_buf()).into());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials at {}", path.display()))?;
        let file: CredentialFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse credentials at {}", path.display()))?;
        let web = file.web;

        if web.is_placeholder() {
            return Err(IndexerError::ConfigMissing(path.to_path_buf()).into());
        }

        let redirect_uri = web
            .redirect_uris
            .first()
            .map(|uri| uri.trim().to_string())
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| anyhow!("no redirect_uris in {}", path.display()))?;

        Ok(Self {
            client_id: web.client_id.trim().to_string(),
            client_secret: web.client_secret.trim().to_string(),
            redirect_uri,
            auth_uri: pick_uri(
                overrides.auth_uri.as_deref(),
                web.auth_uri.as_deref(),
                GOOGLE_AUTH_URI,
            ),
            token_uri: pick_uri(
                overrides.token_uri.as_deref(),
                web.token_uri.as_deref(),
                GOOGLE_TOKEN_URI,
            ),
        })
    }
}

fn pick_uri(configured: Option<&str>, from_file: Option<&str>, fallback: &str) -> String {
    configured
        .into_iter()
        .chain(from_file)
        .map(str::trim)
        .find(|uri| !uri.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Writes the placeholder credential file if none exists. Returns whether a
/// file was written.
pub fn write_placeholder(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }

    let file = CredentialFile {
        web: WebCredentials::placeholder(),
    };
    let data = serde_json::to_string_pretty(&file).context("failed to serialize credentials")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write credentials at {}", path.display()))?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    // Unix epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Token {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expiry_date {
            Some(expiry) => now_ms >= expiry,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<Token>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read token at {}", self.path.display()))
            }
        };

        match serde_json::from_str::<Token>(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create token dir {}", parent.display()))?;
        }

        let data = serde_json::to_vec(token).context("failed to serialize token")?;
        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("failed to write token at {}", self.path.display()))?;
        Ok(())
    }
}
