use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::keymap::Keymaps;
use crate::paths;

const KNOWN_KEYS: [&str; 4] = ["cache_dir", "reader", "toc", "bookmarks"];

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for `state.json` instead of the platform cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub reader: BTreeMap<String, String>,

    #[serde(default)]
    pub toc: BTreeMap<String, String>,

    #[serde(default)]
    pub bookmarks: BTreeMap<String, String>,
}

impl Config {
    /// Parses `config.toml`. Unknown keys are logged and skipped.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        for key in table.keys().filter(|key| !KNOWN_KEYS.contains(&key.as_str())) {
            warn!("Ignoring unknown config key {key:?}");
        }
        toml::Value::Table(table).try_into()
    }

    /// Loads the config from the default or overridden config directory.
    pub fn load(config_dir: Option<&Path>) -> Self {
        match paths::config_file(config_dir) {
            Some(path) => Self::load_from_path(&path),
            None => {
                warn!("Could not determine config directory, using default settings");
                Self::default()
            }
        }
    }

    /// Never fails: a missing or broken file means defaults.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    debug!("Loaded config from {path:?}");
                    config
                }
                Err(e) => {
                    error!("Failed to parse config file {path:?}: {e}");
                    Self::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config file at {path:?}, using defaults");
                Self::default()
            }
            Err(e) => {
                error!("Failed to read config file {path:?}: {e}");
                Self::default()
            }
        }
    }

    /// Built-in key tables with this config's bindings layered on top.
    pub fn keymaps(&self) -> Keymaps {
        let mut keymaps = Keymaps::default();
        keymaps.reader.apply_overrides("reader", &self.reader);
        keymaps.toc.apply_overrides("toc", &self.toc);
        keymaps.bookmarks.apply_overrides("bookmarks", &self.bookmarks);
        keymaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::Action;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
cache_dir = "/tmp/nuber-cache"

[reader]
n = "scroll_down"
"ctrl+q" = "quit"

[toc]
esc = "noop"
"#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/nuber-cache")));
        assert_eq!(config.reader.len(), 2);
        assert!(config.bookmarks.is_empty());

        let keymaps = config.keymaps();
        let n = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::NONE);
        assert_eq!(keymaps.reader.action_for(&n), Some(Action::ScrollDown));
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(keymaps.toc.action_for(&esc), Some(Action::Noop));
        assert_eq!(keymaps.bookmarks.action_for(&esc), Some(Action::CloseView));
    }

    #[test]
    fn test_unknown_tables_keep_bindings() {
        let config = Config::parse(
            r#"
theme = "dark"

[general]
wrap = true

[reader]
n = "scroll_down"
"#,
        )
        .unwrap();
        assert_eq!(config.reader.get("n").map(String::as_str), Some("scroll_down"));
        assert_eq!(config.cache_dir, None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        assert_eq!(Config::load(Some(temp.path())), Config::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.toml"), "reader = [1, 2").unwrap();
        assert_eq!(Config::load(Some(temp.path())), Config::default());
    }

    #[test]
    fn test_load_from_config_dir() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("config.toml"),
            "[bookmarks]\nx = \"delete_bookmark\"\n",
        )
        .unwrap();
        let config = Config::load(Some(temp.path()));
        assert_eq!(
            config.bookmarks.get("x").map(String::as_str),
            Some("delete_bookmark")
        );
    }
}
