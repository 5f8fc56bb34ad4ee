//! Enrichment backend trait and common types.
//!
//! Every provider (dictionary, machine translation, LLM lemmatizer) answers
//! the same `lookup` call. The router walks ordered lists of backends and
//! never branches on which provider it is talking to.

mod dictionary;
mod lemmatizer;
#[cfg(test)]
pub(crate) mod mock;
mod translate;

pub use dictionary::DictionaryBackend;
pub use lemmatizer::LemmatizerBackend;
pub use translate::TranslationBackend;

use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of enrichment a backend performs. Drives merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Dictionary lookup: transcription, synonyms, usage examples.
    Dictionary,
    /// General-purpose machine translation.
    Translation,
    /// LLM that lemmatizes and translates with context.
    Lemmatizer,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Dictionary => "dictionary",
            BackendKind::Translation => "translation",
            BackendKind::Lemmatizer => "lemmatizer",
        };
        f.write_str(name)
    }
}

/// A single lookup request.
#[derive(Debug, Clone)]
pub struct LookupRequest {
    /// Cleaned highlight text.
    pub text: String,
    /// Source language code.
    pub source_language: String,
    /// Target language code.
    pub target_language: String,
}

/// Fields a backend managed to supply. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub lemma: Option<String>,
    pub translation: Option<String>,
    pub transcription: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl BackendResponse {
    /// Whether the response carries a usable translation.
    pub fn has_translation(&self) -> bool {
        self.translation
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

/// Successful lookup outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The backend knows the text.
    Found(BackendResponse),
    /// Explicit negative answer; try the next backend.
    NotFound,
}

/// Trait for enrichment providers.
#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    /// Returns the human-readable name of this backend.
    fn name(&self) -> &str;

    /// What kind of enrichment this backend performs.
    fn kind(&self) -> BackendKind;

    /// Looks up one text.
    async fn lookup(&self, request: &LookupRequest) -> Result<Lookup, BackendError>;
}

/// Common HTTP client configuration for backends.
///
/// The client timeout is a backstop; the router applies the per-backend
/// timeout around each call.
pub fn create_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("clipvocab/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(120))
        .build()
}

/// Maps a non-success HTTP status to the outcome it stands for.
///
/// 404 is an explicit negative lookup; 408, 429 and 5xx are transient; every
/// other status (bad key, blocked key, exhausted quota, oversized text) is
/// fatal for the backend.
pub fn classify_status(status: StatusCode, body: &str) -> Result<Lookup, BackendError> {
    let detail = format!("HTTP {}: {}", status, truncate(body, 200));
    match status.as_u16() {
        404 => Ok(Lookup::NotFound),
        408 => Err(BackendError::Unavailable(detail)),
        429 => Err(BackendError::RateLimited(detail)),
        500..=599 => Err(BackendError::Unavailable(detail)),
        _ => Err(BackendError::Fatal(detail)),
    }
}

/// Turns a failed HTTP response into a lookup outcome, reading its body for
/// the error message.
pub async fn failed_response(response: reqwest::Response) -> Result<Lookup, BackendError> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    classify_status(status, &text)
}

/// Returns the trimmed string, or `None` if nothing is left.
pub(crate) fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
