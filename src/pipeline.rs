//! Batch pipeline: one clippings export in, one CSV document per book out.
//!
//! Stages run strictly forward: parse, classify, dedup, enrich, emit. History
//! is written only for entries that made it into the output, and only when the
//! caller commits the prepared batch.

use crate::cache::TranslationCache;
use crate::classifier::{Category, ClassifiedEntry, Classifier};
use crate::clippings::{ClipKind, ClippingParser};
use crate::config::{Config, OutputConfig};
use crate::dedup::{BatchDedup, DedupDecision, DedupFilter};
use crate::emitter::{BookSection, emit};
use crate::error::PipelineError;
use crate::history::HistoryStore;
use crate::normalize::EnrichedEntry;
use crate::router::{BatchContext, EnrichmentFailure, Router};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Counters for one batch. Accompanies every output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Non-blank segments in the export.
    pub segments: usize,
    /// Segments parsed into clipping blocks.
    pub blocks: usize,
    /// Segments without title and metadata lines.
    pub malformed: usize,
    /// Segments with no highlighted text.
    pub empty: usize,
    /// Reader notes dropped by configuration.
    pub notes_skipped: usize,
    /// Entries too long to be vocabulary.
    pub sentences: usize,
    /// Entries the user already had in history.
    pub duplicates_history: usize,
    /// Entries repeated inside this export.
    pub duplicates_batch: usize,
    /// Entries held by another running batch of the same user.
    pub duplicates_in_flight: usize,
    /// New entries after dedup.
    pub accepted: usize,
    /// Accepted entries answered from the translation cache.
    pub cached: usize,
    /// Accepted entries enriched by a backend.
    pub enriched: usize,
    /// Accepted entries no backend could translate.
    pub failed: usize,
    /// History records written on commit.
    pub committed: usize,
    /// Failed entries in file order.
    pub failures: Vec<EnrichmentFailure>,
    /// Backends switched off after a fatal error.
    pub disabled_backends: Vec<String>,
}

impl BatchReport {
    /// All duplicates, whatever their origin.
    pub fn duplicates(&self) -> usize {
        self.duplicates_history + self.duplicates_batch + self.duplicates_in_flight
    }

    /// Cards in the output.
    pub fn cards(&self) -> usize {
        self.cached + self.enriched
    }
}

/// Final result of a committed batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub sections: Vec<BookSection>,
    pub report: BatchReport,
}

/// Output produced but not yet recorded in history.
///
/// Dropping it releases every reserved key and writes nothing.
pub struct PreparedBatch<'a> {
    pipeline: &'a Pipeline,
    dedup: BatchDedup,
    keys: Vec<String>,
    sections: Vec<BookSection>,
    report: BatchReport,
}

impl PreparedBatch<'_> {
    pub fn sections(&self) -> &[BookSection] {
        &self.sections
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// Records the emitted entries in history and saves the cache.
    pub async fn commit(self) -> Result<BatchOutcome, PipelineError> {
        let PreparedBatch {
            pipeline,
            dedup,
            keys,
            sections,
            mut report,
        } = self;

        report.committed = dedup.commit(keys).await?;
        debug!(committed = report.committed, "History updated");

        if let Err(e) = pipeline.cache.lock().await.save().await {
            warn!(error = %e, "Failed to save translation cache");
        }

        Ok(BatchOutcome { sections, report })
    }
}

/// Entries that survived dedup, with their history keys.
struct Admitted {
    dedup: BatchDedup,
    entries: Vec<(String, ClassifiedEntry)>,
    report: BatchReport,
}

/// Wires the stages together. Shared by every batch of a process.
pub struct Pipeline {
    classifier: Classifier,
    router: Router,
    dedup: DedupFilter,
    cache: Mutex<TranslationCache>,
    output: OutputConfig,
    max_concurrent_entries: usize,
    skip_notes: bool,
}

impl Pipeline {
    /// Creates a pipeline from validated configuration.
    pub fn new(
        config: &Config,
        router: Router,
        store: Arc<dyn HistoryStore>,
        cache: TranslationCache,
    ) -> Self {
        Self {
            classifier: Classifier::new(&config.classifier),
            router,
            dedup: DedupFilter::new(store),
            cache: Mutex::new(cache),
            output: config.output.clone(),
            max_concurrent_entries: config.pipeline.max_concurrent_entries.max(1),
            skip_notes: config.pipeline.skip_notes,
        }
    }

    /// Runs a whole batch and commits it.
    pub async fn process(
        &self,
        user_id: &str,
        raw: &[u8],
    ) -> Result<BatchOutcome, PipelineError> {
        self.prepare(user_id, raw).await?.commit().await
    }

    /// Parses, classifies and dedups without calling backends or touching
    /// history.
    pub async fn dry_run(
        &self,
        user_id: &str,
        raw: &[u8],
    ) -> Result<BatchReport, PipelineError> {
        let admitted = self.admit(user_id, raw).await?;
        Ok(admitted.report)
    }

    /// Runs every stage up to emission. Call [`PreparedBatch::commit`] once
    /// the sections are safely stored.
    pub async fn prepare(
        &self,
        user_id: &str,
        raw: &[u8],
    ) -> Result<PreparedBatch<'_>, PipelineError> {
        let Admitted {
            dedup,
            entries,
            mut report,
        } = self.admit(user_id, raw).await?;

        let mut keys = Vec::with_capacity(entries.len());
        let mut enriched: Vec<EnrichedEntry> = Vec::with_capacity(entries.len());
        let mut pending = Vec::new();
        {
            let cache = self.cache.lock().await;
            for (key, entry) in entries {
                match cache.get(&entry) {
                    Some(hit) => {
                        keys.push(key);
                        enriched.push(hit);
                    }
                    None => pending.push((key, entry)),
                }
            }
        }
        report.cached = enriched.len();

        let batch = BatchContext::new();
        let router = &self.router;
        let context = &batch;
        let results: Vec<(String, Result<EnrichedEntry, EnrichmentFailure>)> =
            stream::iter(pending)
                .map(|(key, entry)| async move { (key, router.enrich(&entry, context).await) })
                .buffer_unordered(self.max_concurrent_entries)
                .collect()
                .await;

        let mut failures = Vec::new();
        {
            let mut cache = self.cache.lock().await;
            for (key, result) in results {
                match result {
                    Ok(entry) => {
                        cache.insert(&entry);
                        keys.push(key);
                        enriched.push(entry);
                        report.enriched += 1;
                    }
                    Err(failure) => {
                        warn!(entry = %failure, "Enrichment failed");
                        failures.push(failure);
                    }
                }
            }
        }

        enriched.sort_by_key(|e| e.index);
        failures.sort_by_key(|f| f.index);
        report.failed = failures.len();
        report.failures = failures;
        report.disabled_backends = batch.disabled();

        let sections = emit(&enriched, &self.output)?;
        info!(
            user = user_id,
            cards = report.cards(),
            failed = report.failed,
            books = sections.len(),
            "Batch ready"
        );

        Ok(PreparedBatch {
            pipeline: self,
            dedup,
            keys,
            sections,
            report,
        })
    }

    /// Parse, classify and dedup stages.
    async fn admit(&self, user_id: &str, raw: &[u8]) -> Result<Admitted, PipelineError> {
        let mut report = BatchReport::default();
        let mut candidates = Vec::new();

        let mut parser = ClippingParser::new(raw);
        for block in parser.by_ref() {
            if self.skip_notes && block.kind == ClipKind::Note {
                report.notes_skipped += 1;
                continue;
            }

            let entry = self.classifier.classify(&block);
            if entry.category == Category::Sentence {
                report.sentences += 1;
                continue;
            }
            candidates.push(entry);
        }

        let stats = parser.stats();
        report.segments = stats.segments;
        report.blocks = stats.blocks;
        report.malformed = stats.malformed;
        report.empty = stats.empty;

        let mut dedup = self.dedup.begin_batch(user_id);
        let mut entries = Vec::with_capacity(candidates.len());
        for entry in candidates {
            match dedup.check(&entry.text).await? {
                DedupDecision::Accepted(key) => entries.push((key, entry)),
                DedupDecision::InHistory => report.duplicates_history += 1,
                DedupDecision::InBatch => report.duplicates_batch += 1,
                DedupDecision::InFlight => report.duplicates_in_flight += 1,
            }
        }
        report.accepted = entries.len();

        info!(
            user = user_id,
            blocks = report.blocks,
            accepted = report.accepted,
            duplicates = report.duplicates(),
            sentences = report.sentences,
            "Clippings parsed"
        );

        Ok(Admitted {
            dedup,
            entries,
            report,
        })
    }
}
