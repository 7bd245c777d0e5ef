use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};

const READY_TIMEOUT: Duration = Duration::from_secs(30);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Runs `serve` as a child process, opens the landing page once the child
/// answers on `/status`, and stops the child on Ctrl-C.
pub async fn launch(config_path: &Path, bind: &str, open_browser: bool) -> Result<()> {
    let exe = std::env::current_exe().context("failed to locate current executable")?;
    let mut child = Command::new(exe)
        .arg("serve")
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to start server process")?;

    let base_url = local_base_url(bind);
    wait_until_ready(&mut child, &base_url, READY_TIMEOUT).await?;
    tracing::info!(url = %base_url, "server ready");

    if open_browser {
        let url = base_url.clone();
        match tokio::task::spawn_blocking(move || open::that(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(%err, "failed to open browser; visit {base_url}"),
            Err(err) => tracing::warn!(%err, "browser launcher task failed"),
        }
    }

    tokio::select! {
        status = child.wait() => {
            let status = status.context("failed to wait for server process")?;
            if !status.success() {
                bail!("server exited with {status}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("stopping server");
            child.kill().await.context("failed to stop server process")?;
        }
    }

    Ok(())
}

async fn wait_until_ready(child: &mut Child, base_url: &str, timeout: Duration) -> Result<()> {
    let client = Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .context("failed to build readiness HTTP client")?;
    let status_url = format!("{base_url}/status");
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait().context("failed to poll server process")? {
            bail!("server exited before becoming ready ({status})");
        }

        match client.get(&status_url).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => tracing::debug!(status = response.status().as_u16(), "server not ready"),
            Err(err) => tracing::debug!(%err, "server not ready"),
        }

        if Instant::now() >= deadline {
            bail!("server did not become ready within {}s", timeout.as_secs());
        }
        sleep(READY_POLL_INTERVAL).await;
    }
}

/// Maps a bind address to a URL a local browser can reach.
fn local_base_url(bind: &str) -> String {
    let (host, port) = bind.rsplit_once(':').unwrap_or((bind, "7890"));
    let host = match host {
        "" | "0.0.0.0" | "[::]" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{port}")
}
