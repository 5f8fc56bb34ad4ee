//! Clipvocab - Kindle clippings to vocabulary flashcards.
//!
//! This library provides functionality for:
//! - Parsing Kindle "My Clippings" exports into clipping blocks
//! - Classifying highlights as words, phrases or sentences
//! - Skipping entries a user has already processed
//! - Enriching entries through dictionary, translation and LLM backends
//! - Writing one ReWord-compatible CSV file per book

pub mod backends;
pub mod cache;
pub mod classifier;
pub mod clippings;
pub mod config;
pub mod console;
pub mod dedup;
pub mod emitter;
pub mod error;
pub mod history;
pub mod normalize;
pub mod pipeline;
pub mod router;
pub mod utils;

// Re-export commonly used types
pub use backends::{BackendKind, BackendResponse, EnrichmentBackend, Lookup, LookupRequest};
pub use cache::TranslationCache;
pub use classifier::{Category, ClassifiedEntry, Classifier};
pub use clippings::{ClippingBlock, ClippingParser, ParseStats, parse_clippings};
pub use config::Config;
pub use console::Console;
pub use dedup::{BatchDedup, DedupDecision, DedupFilter};
pub use emitter::{BookSection, emit, write_sections};
pub use error::{BackendError, CacheError, ConfigError, EmitError, HistoryError, PipelineError};
pub use history::{HistoryRecord, HistoryStore, JsonHistoryStore, MemoryHistoryStore};
pub use normalize::{EnrichedEntry, normalize};
pub use pipeline::{BatchOutcome, BatchReport, Pipeline, PreparedBatch};
pub use router::{BackendSlot, BatchContext, EnrichmentFailure, Router};
