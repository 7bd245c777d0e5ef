use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::AppConfig;

/// Creates the log directory, both log files and the URL list if they are
/// missing. Existing files are left untouched.
pub fn prepare(config: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    if !config.log_dir.exists() {
        fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("failed to create log dir {}", config.log_dir.display())
        })?;
        created.push(config.log_dir.clone());
    }

    for path in [
        config.success_log_path(),
        config.error_log_path(),
        config.url_file.clone(),
    ] {
        if touch(&path)? {
            created.push(path);
        }
    }

    for path in &created {
        tracing::debug!(path = %path.display(), "created");
    }

    Ok(created)
}

fn touch(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    Ok(true)
}
