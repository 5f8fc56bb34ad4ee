//! Deduplication against per-user history and within a batch.
//!
//! Keys being processed by any batch are reserved in a shared in-flight set,
//! so two concurrent uploads from the same user can never both accept the
//! same text. A batch writes history only for the keys it commits, which the
//! pipeline does after enrichment succeeded.

use crate::error::HistoryError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::utils::normalize_key;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type InFlight = Arc<Mutex<HashSet<(String, String)>>>;

/// Outcome of checking one entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// New text; carries the normalized key to commit later.
    Accepted(String),
    /// Already in the user's history.
    InHistory,
    /// Appeared earlier in this batch.
    InBatch,
    /// Currently being processed by another batch of the same user.
    InFlight,
}

/// Filters entries already processed by a user.
#[derive(Clone)]
pub struct DedupFilter {
    store: Arc<dyn HistoryStore>,
    in_flight: InFlight,
}

impl DedupFilter {
    /// Creates a filter over a history store.
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Accepts the text for the user if it is new, recording it immediately.
    ///
    /// Returns false when the text is already known or is being handled by a
    /// running batch.
    pub async fn accept(&self, user_id: &str, text: &str) -> Result<bool, HistoryError> {
        let key = normalize_key(text);
        if key.is_empty() {
            return Ok(false);
        }

        let slot = (user_id.to_string(), key.clone());
        if !lock(&self.in_flight).insert(slot.clone()) {
            return Ok(false);
        }

        let result = self.store.insert(HistoryRecord::now(user_id, &key)).await;
        lock(&self.in_flight).remove(&slot);
        result
    }

    /// Starts a batch for one user.
    pub fn begin_batch(&self, user_id: &str) -> BatchDedup {
        BatchDedup {
            user_id: user_id.to_string(),
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            seen: HashMap::new(),
            reserved: HashSet::new(),
        }
    }
}

/// Dedup state for a single upload.
///
/// Dropping it without [`BatchDedup::commit`] releases every reservation and
/// leaves history untouched.
pub struct BatchDedup {
    user_id: String,
    store: Arc<dyn HistoryStore>,
    in_flight: InFlight,
    /// Keys checked so far, with the decision their repeats get.
    seen: HashMap<String, DedupDecision>,
    reserved: HashSet<String>,
}

impl BatchDedup {
    /// Checks one entry's text, reserving it when new.
    ///
    /// A repeat of an accepted text is [`DedupDecision::InBatch`]. A repeat of
    /// a text found in history or held by another batch gets the same
    /// decision as its first occurrence.
    pub async fn check(&mut self, text: &str) -> Result<DedupDecision, HistoryError> {
        let key = normalize_key(text);
        if let Some(decision) = self.seen.get(&key) {
            return Ok(decision.clone());
        }

        let decision = self.first_check(&key).await?;
        let repeat = match &decision {
            DedupDecision::Accepted(_) => DedupDecision::InBatch,
            other => other.clone(),
        };
        self.seen.insert(key, repeat);
        Ok(decision)
    }

    async fn first_check(&mut self, key: &str) -> Result<DedupDecision, HistoryError> {
        let slot = (self.user_id.clone(), key.to_string());
        if !lock(&self.in_flight).insert(slot) {
            return Ok(DedupDecision::InFlight);
        }
        self.reserved.insert(key.to_string());

        match self.store.exists(&self.user_id, key).await {
            Ok(true) => {
                self.release(key);
                Ok(DedupDecision::InHistory)
            }
            Ok(false) => Ok(DedupDecision::Accepted(key.to_string())),
            Err(e) => {
                self.release(key);
                Err(e)
            }
        }
    }

    /// Number of keys currently reserved by this batch.
    pub fn reserved(&self) -> usize {
        self.reserved.len()
    }

    /// Records the given keys in history and ends the batch.
    ///
    /// Keys this batch never accepted are ignored. Returns how many records
    /// were written.
    pub async fn commit<I>(self, keys: I) -> Result<usize, HistoryError>
    where
        I: IntoIterator<Item = String>,
    {
        let records: Vec<HistoryRecord> = keys
            .into_iter()
            .filter(|key| self.reserved.contains(key))
            .map(|key| HistoryRecord::now(&self.user_id, &key))
            .collect();

        if records.is_empty() {
            return Ok(0);
        }
        self.store.insert_many(records).await
    }

    fn release(&mut self, key: &str) {
        self.reserved.remove(key);
        lock(&self.in_flight).remove(&(self.user_id.clone(), key.to_string()));
    }
}

impl Drop for BatchDedup {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.in_flight);
        for key in self.reserved.drain() {
            in_flight.remove(&(self.user_id.clone(), key));
        }
    }
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashSet<(String, String)>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
