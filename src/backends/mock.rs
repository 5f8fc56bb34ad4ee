//! Scripted backend for tests.

use super::{BackendKind, BackendResponse, EnrichmentBackend, Lookup, LookupRequest};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the mock answers for a text.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Found(BackendResponse),
    NotFound,
    Transient,
    Fatal,
    /// Sleeps before answering with a translation.
    Slow(Duration),
}

/// Response carrying only a translation.
pub(crate) fn found(translation: &str) -> Reply {
    Reply::Found(BackendResponse {
        translation: Some(translation.to_string()),
        ..BackendResponse::default()
    })
}

pub(crate) struct MockBackend {
    name: String,
    kind: BackendKind,
    default: Reply,
    replies: HashMap<String, Reply>,
    transient_first: usize,
    attempts: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts a lookup as in flight until dropped, cancellation included.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub(crate) fn new(name: &str, kind: BackendKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: Reply::NotFound,
            replies: HashMap::new(),
            transient_first: 0,
            attempts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn default_reply(mut self, reply: Reply) -> Self {
        self.default = reply;
        self
    }

    pub(crate) fn reply(mut self, text: &str, reply: Reply) -> Self {
        self.replies.insert(text.to_string(), reply);
        self
    }

    /// Fails every text transiently this many times before answering.
    pub(crate) fn fail_first(mut self, times: usize) -> Self {
        self.transient_first = times;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Most lookups that were running at the same time.
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn lookup(&self, request: &LookupRequest) -> Result<Lookup, BackendError> {
        let _in_flight = InFlight::enter(&self.active, &self.peak);
        self.calls.lock().unwrap().push(request.text.clone());

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(request.text.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= self.transient_first {
            return Err(BackendError::Unavailable("HTTP 503".to_string()));
        }

        let reply = self
            .replies
            .get(&request.text)
            .unwrap_or(&self.default)
            .clone();

        match reply {
            Reply::Found(response) => Ok(Lookup::Found(response)),
            Reply::NotFound => Ok(Lookup::NotFound),
            Reply::Transient => Err(BackendError::RateLimited("HTTP 429".to_string())),
            Reply::Fatal => Err(BackendError::Fatal("HTTP 401: bad key".to_string())),
            Reply::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Lookup::Found(BackendResponse {
                    translation: Some(format!("slow {}", request.text)),
                    ..BackendResponse::default()
                }))
            }
        }
    }
}
