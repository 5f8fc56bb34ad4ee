//! Configuration management for clipvocab.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "clipvocab";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured API keys.
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Phrasal verbs and idioms that always need whole-unit translation.
const DEFAULT_EXPRESSIONS: &[&str] = &[
    "break down",
    "bring up",
    "call off",
    "carry on",
    "come across",
    "come up with",
    "cut corners",
    "figure out",
    "get along",
    "get over",
    "give in",
    "give up",
    "go on",
    "hang out",
    "keep up",
    "let down",
    "look after",
    "look forward to",
    "look up",
    "make up",
    "pick up",
    "put off",
    "put up with",
    "run into",
    "run out of",
    "set up",
    "take after",
    "take off",
    "turn down",
    "break the ice",
    "bite the bullet",
    "once in a blue moon",
    "under the weather",
    "spill the beans",
    "the last straw",
];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Language pair for every lookup.
    pub languages: LanguagesConfig,

    /// Classification thresholds and expression list.
    pub classifier: ClassifierConfig,

    /// Dictionary-style backend.
    pub dictionary: DictionaryConfig,

    /// Machine translation backend.
    pub translation: TranslationApiConfig,

    /// LLM-based lemmatizer backend.
    pub lemmatizer: LemmatizerConfig,

    /// Batch processing settings.
    pub pipeline: PipelineConfig,

    /// CSV output settings.
    pub output: OutputConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Source and target language codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesConfig {
    /// Language of the highlighted books.
    pub source: String,

    /// Language of the flashcard backs.
    pub target: String,
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            source: "en".to_string(),
            target: "ru".to_string(),
        }
    }
}

/// Entry classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Highest word count still treated as a single dictionary word.
    pub single_word_max_words: usize,

    /// Highest word count still treated as a phrase; longer is a sentence.
    pub max_phrase_words: usize,

    /// Phrases up to this many words still try the dictionary first.
    pub dictionary_max_words: usize,

    /// Known multi-word expressions (idioms, phrasal verbs).
    pub expressions: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            single_word_max_words: 2,
            max_phrase_words: 6,
            dictionary_max_words: 2,
            expressions: DEFAULT_EXPRESSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Call timeout used when none is configured, or the configured one is unusable.
const DEFAULT_TIMEOUT_SEC: f64 = 15.0;

/// Per-backend call limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendLimits {
    /// Timeout for a single call in seconds.
    pub timeout_sec: f64,

    /// Extra attempts after a transient failure.
    pub retries: u32,

    /// Fixed pause between attempts in milliseconds.
    pub retry_backoff_ms: u64,

    /// Maximum concurrent calls to this backend.
    pub max_concurrent: usize,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            retries: 1,
            retry_backoff_ms: 500,
            max_concurrent: 4,
        }
    }
}

impl BackendLimits {
    /// Timeout as a [`Duration`]. Values no `Duration` can hold fall back to the default.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_sec)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_TIMEOUT_SEC))
    }

    /// Backoff as a [`Duration`].
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Dictionary backend configuration (Yandex Dictionary API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// API key.
    pub key: String,

    /// Lookup endpoint.
    pub endpoint: String,

    /// Call limits.
    pub limits: BackendLimits,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            key: API_KEY_PLACEHOLDER.to_string(),
            endpoint: "https://dictionary.yandex.net/api/v1/dicservice.json/lookup".to_string(),
            limits: BackendLimits::default(),
        }
    }
}

/// Machine translation backend configuration (Yandex Cloud Translate).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationApiConfig {
    /// API key.
    pub key: String,

    /// Cloud folder identifier.
    pub folder_id: String,

    /// Translate endpoint.
    pub endpoint: String,

    /// Call limits.
    pub limits: BackendLimits,
}

impl Default for TranslationApiConfig {
    fn default() -> Self {
        Self {
            key: API_KEY_PLACEHOLDER.to_string(),
            folder_id: String::new(),
            endpoint: "https://translate.api.cloud.yandex.net/translate/v2/translate".to_string(),
            limits: BackendLimits::default(),
        }
    }
}

/// LLM lemmatizer configuration (OpenAI-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LemmatizerConfig {
    /// API key.
    pub key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Model identifier.
    pub model: String,

    /// System prompt. `{source}` and `{target}` are replaced with language codes.
    pub prompt: String,

    /// Call limits.
    pub limits: BackendLimits,
}

impl Default for LemmatizerConfig {
    fn default() -> Self {
        Self {
            key: API_KEY_PLACEHOLDER.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            prompt: r#"You are a bilingual lexicographer. The user sends a word or expression in language "{source}" highlighted while reading a book.
Return ONLY JSON with this shape:
{"lemma":"<dictionary base form>","translation":"<best {target} translation>","synonyms":["<other {target} translations>"],"examples":["<short {source} example - {target} translation>"]}
Keep idioms and phrasal verbs as one unit. If the input is not a real word or expression, return {"not_found":true}. No explanations."#
                .to_string(),
            limits: BackendLimits {
                timeout_sec: 60.0,
                max_concurrent: 2,
                ..BackendLimits::default()
            },
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum entries enriched at the same time within one batch.
    pub max_concurrent_entries: usize,

    /// Drop the reader's own notes, keeping only highlights.
    pub skip_notes: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_entries: 8,
            skip_notes: true,
        }
    }
}

/// Column layout of the generated CSV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvLayout {
    /// ReWord import: Word, Transcription, Translation, Example, Ex.Translation.
    #[default]
    Reword,
    /// Word, Translation, Transcription, Synonyms, Example.
    Extended,
}

/// CSV output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for generated CSV files.
    pub directory: PathBuf,

    /// Column layout.
    pub layout: CsvLayout,

    /// Write the column header row.
    pub include_header: bool,

    /// Maximum synonyms written per card.
    pub max_synonyms: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            layout: CsvLayout::default(),
            include_header: true,
            max_synonyms: 5,
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Per-user history of processed words.
    pub history_file: Option<PathBuf>,

    /// Translation cache. Leave unset and `disable_cache` false for the default location.
    pub cache_file: Option<PathBuf>,

    /// Do not read or write the translation cache.
    pub disable_cache: bool,
}

/// Returns true when a key holds a real value rather than the placeholder.
fn key_is_configured(key: &str) -> bool {
    !key.is_empty() && key != API_KEY_PLACEHOLDER
}

impl DictionaryConfig {
    /// Checks if the API key is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        key_is_configured(&self.key)
    }
}

impl TranslationApiConfig {
    /// Checks if the API key and folder are configured.
    pub fn is_configured(&self) -> bool {
        key_is_configured(&self.key) && !self.folder_id.is_empty()
    }
}

impl LemmatizerConfig {
    /// Checks if the API key is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        key_is_configured(&self.key)
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether at least one enrichment backend has credentials.
    pub fn has_backend(&self) -> bool {
        self.dictionary.is_configured()
            || self.translation.is_configured()
            || self.lemmatizer.is_configured()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with_options(true)
    }

    /// Validates the configuration, optionally skipping the backend check
    /// (for runs that never call a backend).
    pub fn validate_with_options(&self, require_backend: bool) -> Result<(), ConfigError> {
        if require_backend && !self.has_backend() {
            return Err(ConfigError::MissingValue(
                "dictionary.key, translation.key or lemmatizer.key (set at least one API key in config file)"
                    .to_string(),
            ));
        }

        let classifier = &self.classifier;
        if classifier.single_word_max_words == 0 {
            return Err(invalid(
                "classifier.single_word_max_words",
                "must be greater than 0",
            ));
        }
        if classifier.max_phrase_words < classifier.single_word_max_words {
            return Err(invalid(
                "classifier.max_phrase_words",
                "must not be less than classifier.single_word_max_words",
            ));
        }

        if self.pipeline.max_concurrent_entries == 0 {
            return Err(invalid(
                "pipeline.max_concurrent_entries",
                "must be greater than 0",
            ));
        }

        for (key, limits) in [
            ("dictionary.limits", &self.dictionary.limits),
            ("translation.limits", &self.translation.limits),
            ("lemmatizer.limits", &self.lemmatizer.limits),
        ] {
            if limits.max_concurrent == 0 {
                return Err(invalid(key, "max_concurrent must be greater than 0"));
            }
            if !limits.timeout_sec.is_finite() || limits.timeout_sec <= 0.0 {
                return Err(invalid(key, "timeout_sec must be a finite number greater than 0"));
            }
        }

        Ok(())
    }

    /// Returns the effective history file path.
    pub fn history_path(&self) -> Result<PathBuf, ConfigError> {
        match self.paths.history_file {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("history.json")),
        }
    }

    /// Returns the effective cache file path, or `None` when caching is off.
    pub fn cache_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        if self.paths.disable_cache {
            return Ok(None);
        }
        match self.paths.cache_file {
            Some(ref path) => Ok(Some(path.clone())),
            None => Ok(Some(Self::config_dir()?.join("translation_cache.json"))),
        }
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.dictionary.is_configured());
        assert!(!config.translation.is_configured());
        assert!(!config.lemmatizer.is_configured());
        assert_eq!(config.classifier.single_word_max_words, 2);
        assert_eq!(config.classifier.max_phrase_words, 6);
        assert!(config.classifier.expressions.iter().any(|e| e == "give up"));
        assert_eq!(config.languages.target, "ru");
    }

    #[test]
    fn test_translation_needs_folder() {
        let mut api = TranslationApiConfig::default();
        api.key = "real".to_string();
        assert!(!api.is_configured());

        api.folder_id = "b1g".to_string();
        assert!(api.is_configured());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.lemmatizer.key = "sk-test".to_string();
        config.classifier.max_phrase_words = 4;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.lemmatizer.key, "sk-test");
        assert_eq!(loaded.classifier.max_phrase_words, 4);
        assert_eq!(loaded.lemmatizer.limits.max_concurrent, 2);
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(!config.has_backend());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dictionary]\nkey = \"dict-key\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.dictionary.is_configured());
        assert_eq!(config.dictionary.limits.retries, 1);
        assert_eq!(config.pipeline.max_concurrent_entries, 8);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(config.validate_with_options(false).is_ok());

        let mut config = Config::default();
        config.dictionary.key = "dict-key".to_string();
        assert!(config.validate().is_ok());

        config.classifier.max_phrase_words = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.dictionary.key = "dict-key".to_string();
        config.translation.limits.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_infinite_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[dictionary]\nkey = \"dict-key\"\n\n[dictionary.limits]\ntimeout_sec = inf\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.dictionary.limits.timeout_sec.is_infinite());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "dictionary.limits"
        ));

        // Unvalidated limits still produce a usable timeout
        assert_eq!(
            config.dictionary.limits.timeout(),
            Duration::from_secs_f64(DEFAULT_TIMEOUT_SEC)
        );
    }

    #[test]
    fn test_nan_and_negative_timeouts_rejected() {
        for timeout_sec in [f64::NAN, -1.0, 0.0] {
            let mut config = Config::default();
            config.dictionary.key = "dict-key".to_string();
            config.lemmatizer.limits.timeout_sec = timeout_sec;
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_layout_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\nlayout = \"extended\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.output.layout, CsvLayout::Extended);
        assert_eq!(Config::default().output.layout, CsvLayout::Reword);
    }

    #[test]
    fn test_explicit_paths() {
        let mut config = Config::default();
        config.paths.history_file = Some(PathBuf::from("/tmp/h.json"));
        config.paths.disable_cache = true;
        assert_eq!(config.history_path().unwrap(), PathBuf::from("/tmp/h.json"));
        assert!(config.cache_path().unwrap().is_none());
    }
}
