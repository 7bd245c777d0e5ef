use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::batch::{read_url_batch, BatchRunner, BatchStatus};
use crate::config::AppConfig;
use crate::credentials::{ClientCredentials, TokenStore};
use crate::error::IndexerError;
use crate::indexing::IndexingClient;
use crate::oauth::{DeferredAuthorizer, TokenProvider, TokenState};
use crate::submission_log::SubmissionLog;

const LANDING_HTML: &str = include_str!("static/get_token.html");
const PROCESSING_HTML: &str = include_str!("static/processing.html");
const TOKEN_CALLBACK_HTML: &str = include_str!("static/token_callback.html");
const UNABLE_HTML: &str = include_str!("static/unable_to_access_token.html");
const NOT_FOUND_HTML: &str = include_str!("static/not_found.html");

#[derive(Clone)]
pub struct AppState {
    tokens: TokenProvider,
    runner: BatchRunner,
    url_file: PathBuf,
    open_browser: bool,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let credentials = ClientCredentials::load(&config.credentials_path, &config.oauth)?;
        let tokens = TokenProvider::new(
            credentials,
            TokenStore::new(&config.token_path),
            config.oauth.scope.clone(),
            config.oauth.timeout_secs,
        )?;
        let client = IndexingClient::from_config(&config.indexing)?;
        let log = SubmissionLog::new(config.success_log_path(), config.error_log_path());

        Ok(Self::new(
            tokens,
            BatchRunner::new(client, log),
            config.url_file.clone(),
            config.open_browser,
        ))
    }

    pub fn new(
        tokens: TokenProvider,
        runner: BatchRunner,
        url_file: PathBuf,
        open_browser: bool,
    ) -> Self {
        Self {
            tokens,
            runner,
            url_file,
            open_browser,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    scope: Option<String>,
}

pub async fn serve(config: AppConfig) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(bind = %config.bind, "server is running on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/auth-url", get(auth_url_handler))
        .route("/submit", post(submit_handler))
        .route("/token-callback", get(token_callback))
        .route("/status", get(status_handler))
        .route("/unable-to-access-token", get(unable_to_access_token))
        .route("/not-found", get(not_found))
        .fallback(fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_HTML)
}

async fn unable_to_access_token() -> Html<&'static str> {
    Html(UNABLE_HTML)
}

async fn not_found() -> Html<&'static str> {
    Html(NOT_FOUND_HTML)
}

async fn fallback() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_HTML))
}

async fn auth_url_handler(State(state): State<AppState>) -> Redirect {
    let auth_url = match state.tokens.access_token().await {
        Ok(TokenState::AuthorizationRequired(auth_url)) => auth_url,
        Ok(TokenState::Ready(_)) => {
            tracing::info!("stored token still valid; no authorization needed");
            return Redirect::to("/");
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "unable to build authorization url");
            return Redirect::to("/unable-to-access-token");
        }
    };

    if state.open_browser && open_in_browser(auth_url.to_string()).await {
        return Redirect::to("/");
    }

    Redirect::to(auth_url.as_str())
}

async fn submit_handler(State(state): State<AppState>, Form(form): Form<SubmitForm>) -> Response {
    if state.runner.progress().is_running() {
        return (StatusCode::CONFLICT, "A batch is already running.").into_response();
    }

    let code = form.code.unwrap_or_default();
    let code = code.trim();

    if code.is_empty() {
        match state.tokens.access_token().await {
            Ok(TokenState::Ready(_)) => {}
            Ok(TokenState::AuthorizationRequired(_)) => {
                return plain_error("authorization code is required");
            }
            Err(err) => return plain_error(format!("{err:#}")),
        }
    } else if let Err(err) = state.tokens.exchange_code(code).await {
        return plain_error(err);
    }

    let urls = match read_url_batch(&state.url_file).await {
        Ok(urls) => urls,
        Err(err) => return plain_error(format!("{err:#}")),
    };

    let pending = match state.runner.prepare(urls) {
        Ok(pending) => pending,
        Err(IndexerError::EmptyBatch) => {
            return IndexerError::EmptyBatch.to_string().into_response();
        }
        Err(err @ IndexerError::BatchInProgress) => {
            return (StatusCode::CONFLICT, format!("Error: {err}")).into_response();
        }
        Err(err) => return plain_error(err),
    };

    tracing::info!(total = pending.total(), "starting batch");

    let tokens = state.tokens.clone();
    tokio::spawn(async move {
        pending
            .execute(&tokens, &DeferredAuthorizer, |result, processed, total| {
                tracing::debug!(url = %result.url, processed, total, "url processed");
            })
            .await;
    });

    Html(PROCESSING_HTML).into_response()
}

async fn token_callback(Query(params): Query<CallbackParams>) -> Html<&'static str> {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

    if present(&params.code) && present(&params.scope) {
        Html(TOKEN_CALLBACK_HTML)
    } else {
        Html(UNABLE_HTML)
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<BatchStatus> {
    Json(state.runner.progress().snapshot())
}

fn plain_error(err: impl std::fmt::Display) -> Response {
    format!("Error: {err}").into_response()
}

async fn open_in_browser(url: String) -> bool {
    let opened = tokio::task::spawn_blocking(move || open::that(url)).await;
    match opened {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::warn!(%err, "failed to open browser");
            false
        }
        Err(err) => {
            tracing::warn!(%err, "browser launcher task failed");
            false
        }
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "interrupt",
        _ = terminate => "terminate",
    };

    tracing::info!(signal = received, "stopping server; a running batch is abandoned");
}
