/*!
 * On-disk cache of generation results.
 *
 * One JSON file per key. Entries are written only after a validated
 * generation and never expire; anything unreadable counts as a miss.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::app_config::UsageNotes;
use crate::file_utils::FileManager;
use crate::providers::GenerationResult;

/// Identity of one cached generation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    backend: String,
    model: String,
    usage_notes: UsageNotes,
    word: String,
}

impl CacheKey {
    /// Create a key; `word` is kept exactly as given in the input
    pub fn new(backend: &str, model: &str, usage_notes: UsageNotes, word: &str) -> Self {
        Self {
            backend: backend.to_string(),
            model: model.to_string(),
            usage_notes,
            word: word.to_string(),
        }
    }

    /// Render as `{backend}:{model}/{usage_notes}/{word}`
    pub fn as_key_string(&self) -> String {
        format!("{}:{}/{}/{}", self.backend, self.model, self.usage_notes, self.word)
    }

    /// File name of the entry: separators replaced by `_`, plus `.json`
    pub fn file_name(&self) -> String {
        let flat: String = self
            .as_key_string()
            .chars()
            .map(|c| if matches!(c, '/' | ':' | '\\') { '_' } else { c })
            .collect();
        format!("{}.json", flat)
    }
}

// Every field is optional on disk so incomplete entries can be told apart
// from unparsable ones
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheEntry {
    translation: Option<String>,
    example_src: Option<String>,
    example_tgt: Option<String>,
    note: Option<String>,
}

impl CacheEntry {
    fn into_result(self) -> Option<GenerationResult> {
        let result = GenerationResult {
            translation: self.translation?,
            example_src: self.example_src?,
            example_tgt: self.example_tgt?,
            note: self.note?,
        };
        result.validate().ok()?;
        Some(result)
    }
}

impl From<&GenerationResult> for CacheEntry {
    fn from(result: &GenerationResult) -> Self {
        Self {
            translation: Some(result.translation.clone()),
            example_src: Some(result.example_src.clone()),
            example_tgt: Some(result.example_tgt.clone()),
            note: Some(result.note.clone()),
        }
    }
}

/// Directory-backed store of generation results
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    enabled: bool,
}

impl CacheStore {
    /// Create a store rooted at `dir`; the directory is created lazily
    pub fn new<P: AsRef<Path>>(dir: P, enabled: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            enabled,
        }
    }

    /// Whether reads and writes are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the entry for `key`
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Look up a complete entry. Missing, unreadable, unparsable and
    /// incomplete entries all return `None`.
    pub fn read(&self, key: &CacheKey) -> Option<GenerationResult> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("Cache miss for '{}'", key.as_key_string());
                return None;
            }
        };

        let result = serde_json::from_str::<CacheEntry>(&raw)
            .ok()
            .and_then(CacheEntry::into_result);

        match &result {
            Some(_) => debug!("Cache hit for '{}'", key.as_key_string()),
            None => debug!("Ignoring incomplete cache entry {}", path.display()),
        }
        result
    }

    /// Store a validated result. Disabled stores ignore the call.
    pub fn write(&self, key: &CacheKey, result: &GenerationResult) -> std::io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(&CacheEntry::from(result))
            .map_err(std::io::Error::other)?;
        FileManager::write_atomic(self.entry_path(key), &json)?;
        debug!("Cached generation for '{}'", key.as_key_string());
        Ok(())
    }

    /// Store a result, logging instead of failing
    pub fn write_or_warn(&self, key: &CacheKey, result: &GenerationResult) {
        if let Err(e) = self.write(key, result) {
            warn!("Failed to write cache entry for '{}': {}", key.as_key_string(), e);
        }
    }
}
