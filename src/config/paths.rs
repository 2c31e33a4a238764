//! Canonical local paths for pyfleet.
//!
//! | Path | Purpose |
//! |------|---------|
//! | `~/.pyfleet` (or `$PYFLEET_HOME`) | Local state, user config file |
//! | `~/.pyfleet/cache` | Source distributions produced by `build` |

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Get the pyfleet home directory (`$PYFLEET_HOME` or `~/.pyfleet`)
pub fn pyfleet_home() -> Result<PathBuf> {
    if let Ok(env_home) = std::env::var("PYFLEET_HOME") {
        return Ok(PathBuf::from(env_home));
    }

    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".pyfleet"))
}

/// Directory where source distributions are written before upload
pub fn cache_dir() -> Result<PathBuf> {
    Ok(pyfleet_home()?.join("cache"))
}

/// Expand a leading `~/` against the local home directory
pub fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ if path == "~" => dirs::home_dir()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        _ => path.to_string(),
    }
}
