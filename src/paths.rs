use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const APP_NAME: &str = "nuber";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const STATE_FILENAME: &str = "state.json";
pub const LOG_FILENAME: &str = "nuber.log";

/// Directory holding `config.toml`: the override if given, else `<config dir>/nuber`.
pub fn config_dir(override_dir: Option<&Path>) -> Option<PathBuf> {
    match override_dir {
        Some(dir) => Some(dir.to_path_buf()),
        None => dirs::config_dir().map(|config| config.join(APP_NAME)),
    }
}

pub fn config_file(override_dir: Option<&Path>) -> Option<PathBuf> {
    config_dir(override_dir).map(|dir| dir.join(CONFIG_FILENAME))
}

/// Location of the session state file. The directory is created on first save.
pub fn state_file(cache_override: Option<&Path>) -> Result<PathBuf> {
    let dir = match cache_override {
        Some(dir) => dir.to_path_buf(),
        None => dirs::cache_dir()
            .context("Could not determine cache directory")?
            .join(APP_NAME),
    };
    Ok(dir.join(STATE_FILENAME))
}

pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join(LOG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_win() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            config_file(Some(temp.path())),
            Some(temp.path().join("config.toml"))
        );
        assert_eq!(
            state_file(Some(temp.path())).unwrap(),
            temp.path().join("state.json")
        );
    }

    #[test]
    fn test_default_locations_are_namespaced() {
        if let Some(path) = config_file(None) {
            assert!(path.ends_with("nuber/config.toml"));
        }
        if let Ok(path) = state_file(None) {
            assert!(path.ends_with("nuber/state.json"));
        }
    }
}
