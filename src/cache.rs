//! Translation cache persisted as JSON.
//!
//! Keyed by language pair and normalized text, so a word looked up once is
//! never sent to a backend again. A missing or unreadable file starts an empty
//! cache; the file is only rewritten when something new was stored.

use crate::backends::BackendKind;
use crate::classifier::ClassifiedEntry;
use crate::error::CacheError;
use crate::normalize::EnrichedEntry;
use crate::utils::normalize_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Enrichment fields that do not depend on where the text was highlighted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTranslation {
    pub lemma: String,
    pub translation: String,
    pub transcription: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    pub backend_used: BackendKind,
    pub cached_at: DateTime<Utc>,
}

/// In-memory view of the cache file.
#[derive(Debug, Default)]
pub struct TranslationCache {
    filepath: Option<PathBuf>,
    source_language: String,
    target_language: String,
    entries: HashMap<String, CachedTranslation>,
    dirty: bool,
}

impl TranslationCache {
    /// Loads the cache from `filepath`.
    pub fn open(filepath: &Path, source_language: &str, target_language: &str) -> Self {
        let entries = match load_entries(filepath) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %filepath.display(), error = %e, "Failed to load cache, starting fresh");
                HashMap::new()
            }
        };
        debug!(path = %filepath.display(), entries = entries.len(), "Translation cache loaded");

        Self {
            filepath: Some(filepath.to_path_buf()),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            entries,
            dirty: false,
        }
    }

    /// A cache that is never persisted.
    pub fn in_memory(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            ..Self::default()
        }
    }

    fn key(&self, text: &str) -> String {
        format!(
            "{}-{}:{}",
            self.source_language,
            self.target_language,
            normalize_key(text)
        )
    }

    /// Rebuilds an enriched entry from the cache, if the text is known.
    pub fn get(&self, entry: &ClassifiedEntry) -> Option<EnrichedEntry> {
        let cached = self.entries.get(&self.key(&entry.text))?;
        if cached.translation.trim().is_empty() {
            return None;
        }

        Some(EnrichedEntry {
            index: entry.index,
            book_title: entry.book_title.clone(),
            source_text: entry.text.clone(),
            lemma: cached.lemma.clone(),
            translation: cached.translation.clone(),
            transcription: cached.transcription.clone(),
            synonyms: cached.synonyms.clone(),
            examples: cached.examples.clone(),
            backend_used: cached.backend_used,
        })
    }

    /// Stores the result of a successful enrichment.
    pub fn insert(&mut self, entry: &EnrichedEntry) {
        let cached = CachedTranslation {
            lemma: entry.lemma.clone(),
            translation: entry.translation.clone(),
            transcription: entry.transcription.clone(),
            synonyms: entry.synonyms.clone(),
            examples: entry.examples.clone(),
            backend_used: entry.backend_used,
            cached_at: Utc::now(),
        };
        self.entries.insert(self.key(&entry.source_text), cached);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the cache if it changed since the last save.
    pub async fn save(&mut self) -> Result<(), CacheError> {
        let Some(filepath) = self.filepath.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = filepath.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp = filepath.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, filepath).await?;

        self.dirty = false;
        debug!(path = %filepath.display(), entries = self.entries.len(), "Translation cache saved");
        Ok(())
    }
}

fn load_entries(filepath: &Path) -> Result<HashMap<String, CachedTranslation>, CacheError> {
    if !filepath.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(filepath)?;
    Ok(serde_json::from_str(&content)?)
}
