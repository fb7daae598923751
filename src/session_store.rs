use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::bookmarks::Bookmark;

/// What is remembered about one book between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Last word position per chapter.
    pub positions: Vec<usize>,
    pub chapter_index: usize,
    pub bookmarks: Vec<Bookmark>,
}

/// JSON file of [`SessionRecord`]s keyed by absolute book path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    file_path: PathBuf,
}

impl SessionStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Reads the record for `book`.
    ///
    /// Never fails: an absent file, an absent entry or any malformed field
    /// falls back to that field's default.
    pub fn load(&self, book: &Path) -> SessionRecord {
        let key = book_key(book);
        let Some(entry) = self.read_all().remove(&key) else {
            debug!("No saved session for {key}");
            return SessionRecord::default();
        };
        let Value::Object(mut fields) = entry else {
            warn!("Ignoring malformed session entry for {key}");
            return SessionRecord::default();
        };
        SessionRecord {
            positions: take_field(&mut fields, "positions", &key),
            chapter_index: take_field(&mut fields, "chapterIndex", &key),
            bookmarks: take_field(&mut fields, "bookmarks", &key),
        }
    }

    /// Replaces the record for `book`, keeping every other book's entry.
    pub fn save(&self, book: &Path, record: &SessionRecord) -> Result<()> {
        let mut all = self.read_all();
        all.insert(book_key(book), serde_json::to_value(record)?);
        let content = serde_json::to_string_pretty(&Value::Object(all))?;

        let dir = match self.file_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {dir:?}"))?;

        let mut temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary state file in {dir:?}"))?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.file_path)
            .with_context(|| format!("Failed to write state file {:?}", self.file_path))?;
        debug!("Saved session for {book:?}");
        Ok(())
    }

    fn read_all(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!("Failed to read state file {:?}: {e}", self.file_path);
                return Map::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(Value::Object(all)) => all,
            _ => {
                warn!("State file {:?} is malformed, ignoring it", self.file_path);
                Map::new()
            }
        }
    }
}

fn book_key(book: &Path) -> String {
    book.to_string_lossy().into_owned()
}

fn take_field<T: DeserializeOwned + Default>(fields: &mut Map<String, Value>, name: &str, key: &str) -> T {
    let Some(value) = fields.remove(name) else {
        return T::default();
    };
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Ignoring malformed {name} for {key}: {e}");
        T::default()
    })
}
