//! Translation router: sends each entry down an ordered chain of backends.
//!
//! Word-like entries try the dictionary first, then machine translation, then
//! the LLM lemmatizer. Idioms and longer phrases skip the dictionary. Every
//! call runs under its backend's concurrency cap and timeout, transient
//! failures are retried with a fixed backoff, and a backend that fails fatally
//! is switched off for the rest of the batch.

use crate::backends::{
    BackendKind, BackendResponse, DictionaryBackend, EnrichmentBackend, LemmatizerBackend, Lookup,
    LookupRequest, TranslationBackend,
};
use crate::classifier::{Category, ClassifiedEntry};
use crate::config::{BackendLimits, Config, LanguagesConfig};
use crate::error::BackendError;
use crate::normalize::{EnrichedEntry, normalize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Backend order for single words and short dictionary-sized phrases.
const WORD_CHAIN: [BackendKind; 3] = [
    BackendKind::Dictionary,
    BackendKind::Translation,
    BackendKind::Lemmatizer,
];

/// Backend order for idioms and longer phrases.
const PHRASE_CHAIN: [BackendKind; 2] = [BackendKind::Lemmatizer, BackendKind::Translation];

/// A backend together with its call limits.
pub struct BackendSlot {
    backend: Arc<dyn EnrichmentBackend>,
    limits: BackendLimits,
    permits: Semaphore,
}

impl BackendSlot {
    /// Wraps a backend, capping its concurrent calls at `limits.max_concurrent`.
    pub fn new(backend: Arc<dyn EnrichmentBackend>, limits: BackendLimits) -> Self {
        let permits = Semaphore::new(limits.max_concurrent.max(1));
        Self {
            backend,
            limits,
            permits,
        }
    }

    fn name(&self) -> &str {
        self.backend.name()
    }

    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// One call under the concurrency cap and timeout.
    async fn call_once(&self, request: &LookupRequest) -> Result<Lookup, BackendError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BackendError::Fatal("backend limiter closed".to_string()))?;

        let timeout = self.limits.timeout();
        match tokio::time::timeout(timeout, self.backend.lookup(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }

    /// Calls the backend, retrying transient failures.
    async fn call(&self, request: &LookupRequest) -> Result<Lookup, BackendError> {
        let attempts = self.limits.retries + 1;
        let mut attempt = 1;

        loop {
            debug!(backend = self.name(), text = %request.text, attempt, "Backend call");
            match self.call_once(request).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(backend = self.name(), error = %e, "Transient failure, retrying");
                    tokio::time::sleep(self.limits.backoff()).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Entry that no backend could translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentFailure {
    /// Position of the source block in the export.
    pub index: usize,
    /// Book the clipping came from.
    pub book_title: String,
    /// Cleaned highlight text.
    pub text: String,
    /// Last error seen while walking the chain.
    pub reason: String,
}

impl fmt::Display for EnrichmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}': {}", self.index, self.text, self.reason)
    }
}

/// State shared by all entries of one batch.
#[derive(Debug, Default)]
pub struct BatchContext {
    disabled: Mutex<HashSet<String>>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_disabled(&self, backend: &str) -> bool {
        self.lock().contains(backend)
    }

    /// Marks a backend as unusable. Returns true the first time.
    fn disable(&self, backend: &str) -> bool {
        self.lock().insert(backend.to_string())
    }

    /// Backends switched off during this batch, sorted by name.
    pub fn disabled(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().iter().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.disabled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Which chain an entry goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Word,
    Phrase,
}

/// Dispatches entries to backend chains.
pub struct Router {
    word_chain: Vec<Arc<BackendSlot>>,
    phrase_chain: Vec<Arc<BackendSlot>>,
    source_language: String,
    target_language: String,
    dictionary_max_words: usize,
}

impl Router {
    /// Builds a router from backend slots. Slots of the same kind keep their
    /// relative order; a slot shared by both chains shares its limits.
    pub fn new(
        slots: Vec<BackendSlot>,
        languages: &LanguagesConfig,
        dictionary_max_words: usize,
    ) -> Self {
        let slots: Vec<Arc<BackendSlot>> = slots.into_iter().map(Arc::new).collect();
        let chain = |order: &[BackendKind]| -> Vec<Arc<BackendSlot>> {
            order
                .iter()
                .flat_map(|kind| slots.iter().filter(move |s| s.kind() == *kind))
                .cloned()
                .collect()
        };

        Self {
            word_chain: chain(&WORD_CHAIN),
            phrase_chain: chain(&PHRASE_CHAIN),
            source_language: languages.source.clone(),
            target_language: languages.target.clone(),
            dictionary_max_words,
        }
    }

    /// Builds a router with every backend that has credentials.
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let mut slots = Vec::new();

        if config.dictionary.is_configured() {
            let backend = DictionaryBackend::new(config.dictionary.clone())?;
            slots.push(BackendSlot::new(
                Arc::new(backend),
                config.dictionary.limits.clone(),
            ));
        }
        if config.translation.is_configured() {
            let backend = TranslationBackend::new(config.translation.clone())?;
            slots.push(BackendSlot::new(
                Arc::new(backend),
                config.translation.limits.clone(),
            ));
        }
        if config.lemmatizer.is_configured() {
            let backend = LemmatizerBackend::new(config.lemmatizer.clone())?;
            slots.push(BackendSlot::new(
                Arc::new(backend),
                config.lemmatizer.limits.clone(),
            ));
        }

        Ok(Self::new(
            slots,
            &config.languages,
            config.classifier.dictionary_max_words,
        ))
    }

    /// Names of the backends in use, word chain order first.
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for slot in self.word_chain.iter().chain(&self.phrase_chain) {
            if !names.iter().any(|n| n == slot.name()) {
                names.push(slot.name().to_string());
            }
        }
        names
    }

    /// Picks the chain for an entry.
    pub fn route(&self, entry: &ClassifiedEntry) -> Route {
        match entry.category {
            Category::SingleWord => Route::Word,
            Category::ShortPhrase
                if !entry.idiomatic && entry.word_count <= self.dictionary_max_words =>
            {
                Route::Word
            }
            _ => Route::Phrase,
        }
    }

    /// Enriches one entry, walking its chain until a translation is found.
    pub async fn enrich(
        &self,
        entry: &ClassifiedEntry,
        batch: &BatchContext,
    ) -> Result<EnrichedEntry, EnrichmentFailure> {
        let chain = match self.route(entry) {
            Route::Word => &self.word_chain,
            Route::Phrase => &self.phrase_chain,
        };

        let request = LookupRequest {
            text: entry.text.clone(),
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
        };

        let mut responses: Vec<(BackendKind, BackendResponse)> = Vec::new();
        let mut last_error: Option<String> = None;

        for slot in chain {
            if batch.is_disabled(slot.name()) {
                continue;
            }

            match slot.call(&request).await {
                Ok(Lookup::Found(response)) => {
                    let translated = response.has_translation();
                    responses.push((slot.kind(), response));
                    if translated {
                        break;
                    }
                }
                Ok(Lookup::NotFound) => {
                    debug!(backend = slot.name(), text = %entry.text, "Not found");
                    last_error = Some(format!("{}: not found", slot.name()));
                }
                Err(e) => {
                    if e.is_fatal() {
                        if batch.disable(slot.name()) {
                            error!(backend = slot.name(), error = %e, "Backend disabled for this batch");
                        }
                    } else {
                        warn!(backend = slot.name(), text = %entry.text, error = %e, "Falling back");
                    }
                    last_error = Some(format!("{}: {}", slot.name(), e));
                }
            }
        }

        normalize(entry, &responses).ok_or_else(|| EnrichmentFailure {
            index: entry.index,
            book_title: entry.book_title.clone(),
            text: entry.text.clone(),
            reason: last_error.unwrap_or_else(|| "no backend available".to_string()),
        })
    }
}
