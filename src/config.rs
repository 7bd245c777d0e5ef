use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
pub const INDEXING_ENDPOINT: &str = "https://indexing.googleapis.com/v3/urlNotifications:publish";

const SUCCESS_LOG_FILE: &str = "success_log.txt";
const ERROR_LOG_FILE: &str = "error_log.txt";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_url_file")]
    pub url_file: PathBuf,

    #[serde(default = "default_open_browser")]
    pub open_browser: bool,

    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,
}

impl AppConfig {
    /// Reads the TOML config at `path`. A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse TOML config at {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(raw)?;

        if cfg.bind.trim().is_empty() {
            cfg.bind = default_bind();
        }
        if cfg.oauth.scope.trim().is_empty() {
            cfg.oauth.scope = default_scope();
        }
        if cfg.oauth.timeout_secs == 0 {
            cfg.oauth.timeout_secs = default_timeout_secs();
        }
        if cfg.indexing.endpoint.trim().is_empty() {
            cfg.indexing.endpoint = default_indexing_endpoint();
        }
        if cfg.indexing.timeout_secs == 0 {
            cfg.indexing.timeout_secs = default_timeout_secs();
        }

        Ok(cfg)
    }

    pub fn success_log_path(&self) -> PathBuf {
        self.log_dir.join(SUCCESS_LOG_FILE)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.log_dir.join(ERROR_LOG_FILE)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            credentials_path: default_credentials_path(),
            token_path: default_token_path(),
            log_dir: default_log_dir(),
            url_file: default_url_file(),
            open_browser: default_open_browser(),
            oauth: OAuthConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub auth_uri: Option<String>,

    #[serde(default)]
    pub token_uri: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_uri: None,
            token_uri: None,
            scope: default_scope(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_indexing_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_indexing_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7890".to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("cred.json")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_url_file() -> PathBuf {
    PathBuf::from("cek_link.txt")
}

fn default_open_browser() -> bool {
    true
}

fn default_scope() -> String {
    INDEXING_SCOPE.to_string()
}

fn default_indexing_endpoint() -> String {
    INDEXING_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
