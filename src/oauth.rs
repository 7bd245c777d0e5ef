use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::credentials::{ClientCredentials, Token, TokenStore};
use crate::error::IndexerError;

// Applied when the token response carries no `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenState {
    Ready(String),
    AuthorizationRequired(Url),
}

#[derive(Clone)]
pub struct TokenProvider {
    client: Client,
    credentials: ClientCredentials,
    store: TokenStore,
    scope: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenProvider {
    pub fn new(
        credentials: ClientCredentials,
        store: TokenStore,
        scope: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            credentials,
            store,
            scope: scope.into(),
        })
    }

    pub fn authorization_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &self.credentials.auth_uri,
            &[
                ("access_type", "offline"),
                ("scope", self.scope.as_str()),
                ("response_type", "code"),
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ],
        )
        .with_context(|| format!("invalid auth_uri {}", self.credentials.auth_uri))
    }

    pub async fn access_token(&self) -> Result<TokenState> {
        match self.store.load().await? {
            Some(token) if !token.is_expired() => Ok(TokenState::Ready(token.access_token)),
            Some(_) => {
                tracing::info!("stored token expired; authorization required");
                Ok(TokenState::AuthorizationRequired(self.authorization_url()?))
            }
            None => Ok(TokenState::AuthorizationRequired(self.authorization_url()?)),
        }
    }

    /// Trades an authorization code for a token and overwrites the token file.
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let code = code.trim();
        if code.is_empty() {
            return Err(
                IndexerError::AuthExchange("authorization code is empty".to_string()).into(),
            );
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|err| IndexerError::AuthExchange(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| IndexerError::AuthExchange(err.to_string()))?;

        if !status.is_success() {
            let message = oauth_error_message(&body)
                .unwrap_or_else(|| format!("token endpoint returned status {}", status.as_u16()));
            tracing::warn!(status = status.as_u16(), %message, "authorization code rejected");
            return Err(IndexerError::AuthExchange(message).into());
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|err| {
            IndexerError::AuthExchange(format!("malformed token response: {err}"))
        })?;
        let token = token_from_response(parsed, Utc::now().timestamp_millis())?;

        self.store.save(&token).await?;
        tracing::info!(path = %self.store.path().display(), "token saved");

        Ok(token)
    }
}

fn token_from_response(response: TokenResponse, now_ms: i64) -> Result<Token> {
    if response.access_token.trim().is_empty() {
        return Err(anyhow!(IndexerError::AuthExchange(
            "token response has no access_token".to_string()
        )));
    }

    let expires_in = response
        .expires_in
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(Token {
        access_token: response.access_token,
        expiry_date: Some(now_ms.saturating_add(expires_in.saturating_mul(1000))),
        refresh_token: response.refresh_token,
        scope: response.scope,
        token_type: response.token_type,
        id_token: response.id_token,
        extra: response.extra,
    })
}

fn oauth_error_message(body: &str) -> Option<String> {
    let parsed: OAuthErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error_description
        .into_iter()
        .chain(parsed.error)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

pub trait Authorizer {
    fn authorization_code(&self, auth_url: &Url) -> impl Future<Output = Result<String>> + Send;
}

/// Prints the consent URL and reads the code from one line of input.
pub struct ConsoleAuthorizer<R = Stdin> {
    lines: Mutex<Lines<BufReader<R>>>,
}

impl ConsoleAuthorizer {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin> ConsoleAuthorizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(BufReader::new(reader).lines()),
        }
    }
}

impl<R: AsyncRead + Unpin + Send> Authorizer for ConsoleAuthorizer<R> {
    async fn authorization_code(&self, auth_url: &Url) -> Result<String> {
        print!("{}", console_prompt(auth_url));
        std::io::stdout().flush().ok();

        let line = self
            .lines
            .lock()
            .await
            .next_line()
            .await
            .context("failed to read authorization code from stdin")?
            .unwrap_or_default();

        let code = line.trim();
        if code.is_empty() {
            bail!(IndexerError::AuthExchange("no authorization code entered".to_string()));
        }
        Ok(code.to_string())
    }
}

// Starts on a fresh line; the batch progress line ends in `\r`.
fn console_prompt(auth_url: &Url) -> String {
    format!(
        "\nAuthorize this app by visiting this url: {auth_url}\nEnter the code from that page here: "
    )
}

// The browser flow delivers codes through `/submit`, never mid-batch.
pub struct DeferredAuthorizer;

impl Authorizer for DeferredAuthorizer {
    async fn authorization_code(&self, auth_url: &Url) -> Result<String> {
        Err(IndexerError::AuthorizationRequired(auth_url.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::test_support::{store_token, token_provider as provider};

    #[test]
    fn authorization_url_carries_offline_scope() {
        let dir = tempfile::tempdir().unwrap();
        let url = provider(dir.path(), "http://127.0.0.1:1/token")
            .authorization_url()
            .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("client_id".into(), "client-1".into())));
        assert!(pairs.contains(&(
            "scope".into(),
            "https://www.googleapis.com/auth/indexing".into()
        )));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://localhost:7890/token-callback".into()
        )));
    }

    #[tokio::test]
    async fn no_token_requires_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let state = provider(dir.path(), "http://127.0.0.1:1/token")
            .access_token()
            .await
            .unwrap();
        assert!(matches!(state, TokenState::AuthorizationRequired(_)));
    }

    #[tokio::test]
    async fn expired_token_is_never_returned() {
        let dir = tempfile::tempdir().unwrap();
        store_token(dir.path(), "stale", -1_000).await;

        let state = provider(dir.path(), "http://127.0.0.1:1/token")
            .access_token()
            .await
            .unwrap();
        match state {
            TokenState::AuthorizationRequired(url) => {
                assert!(url.as_str().starts_with("https://accounts.example/o/oauth2/auth?"));
            }
            TokenState::Ready(token) => panic!("expired token returned: {token}"),
        }
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_network() {
        let mut server = Server::new_async().await;
        let token_endpoint = server.mock("POST", "/token").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        store_token(dir.path(), "fresh", 3_600_000).await;

        let state = provider(dir.path(), &format!("{}/token", server.url()))
            .access_token()
            .await
            .unwrap();
        assert_eq!(state, TokenState::Ready("fresh".to_string()));
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn exchange_persists_token() {
        let mut server = Server::new_async().await;
        let token_endpoint = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "4/abc".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"ya29.new","expires_in":3599,"refresh_token":"1//r","scope":"https://www.googleapis.com/auth/indexing","token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let tokens = provider(dir.path(), &format!("{}/token", server.url()));

        let before = Utc::now().timestamp_millis();
        let token = tokens.exchange_code(" 4/abc \n").await.unwrap();
        token_endpoint.assert_async().await;

        let expiry = token.expiry_date.unwrap();
        assert!(expiry >= before + 3_599_000);
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));

        let reloaded = TokenStore::new(dir.path().join("token.json"))
            .load()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.access_token, "ya29.new");
        assert_eq!(reloaded.expiry_date, Some(expiry));

        assert_eq!(
            tokens.access_token().await.unwrap(),
            TokenState::Ready("ya29.new".to_string())
        );
    }

    #[tokio::test]
    async fn rejected_code_is_an_exchange_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Bad Request"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path(), &format!("{}/token", server.url()))
            .exchange_code("bad")
            .await
            .unwrap_err();

        match err.downcast_ref::<IndexerError>() {
            Some(IndexerError::AuthExchange(message)) => assert_eq!(message, "Bad Request"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("token.json").exists());
    }

    #[tokio::test]
    async fn blank_code_skips_network() {
        let mut server = Server::new_async().await;
        let token_endpoint = server.mock("POST", "/token").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path(), &format!("{}/token", server.url()))
            .exchange_code("   ")
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<IndexerError>(),
            Some(IndexerError::AuthExchange(_))
        ));
        token_endpoint.assert_async().await;
    }

    #[test]
    fn error_message_prefers_description() {
        assert_eq!(
            oauth_error_message(r#"{"error":"invalid_grant","error_description":"Malformed auth code."}"#),
            Some("Malformed auth code.".to_string())
        );
        assert_eq!(
            oauth_error_message(r#"{"error":"invalid_client"}"#),
            Some("invalid_client".to_string())
        );
        assert_eq!(oauth_error_message("<html>"), None);
    }

    #[tokio::test]
    async fn console_authorizer_keeps_buffered_input_between_prompts() {
        let url = Url::parse("https://accounts.example/auth?x=1").unwrap();
        let console = ConsoleAuthorizer::new(&b" 4/first \n4/second\n\n"[..]);

        assert_eq!(console.authorization_code(&url).await.unwrap(), "4/first");
        assert_eq!(console.authorization_code(&url).await.unwrap(), "4/second");

        let err = console.authorization_code(&url).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexerError>(),
            Some(IndexerError::AuthExchange(_))
        ));
        // Input exhausted.
        assert!(console.authorization_code(&url).await.is_err());
    }

    #[test]
    fn console_prompt_starts_on_a_new_line() {
        let url = Url::parse("https://accounts.example/auth?x=1").unwrap();
        let prompt = console_prompt(&url);
        assert!(prompt.starts_with("\nAuthorize this app by visiting this url: https://accounts.example/auth?x=1\n"));
        assert!(prompt.ends_with("Enter the code from that page here: "));
    }

    #[tokio::test]
    async fn deferred_authorizer_declines() {
        let url = Url::parse("https://accounts.example/auth?x=1").unwrap();
        let err = DeferredAuthorizer.authorization_code(&url).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexerError>(),
            Some(IndexerError::AuthorizationRequired(_))
        ));
    }
}
