//! Fetch/cache reconciliation.
//!
//! A page holds filter state and payload state. Filter changes produce
//! a [`PendingFetch`] stamped with the current generation; a response
//! is applied only if its generation is still current, so a superseded
//! request can never overwrite fresher state (last-request-wins).
//! Loading a cache entry sets filters and payload atomically and bumps
//! the generation without producing a fetch, which makes "a cache hit
//! never causes a network request for the same data" structural rather
//! than a timing-dependent suppression flag.

use tracing::debug;

use qeval_cache::{CacheStore, KvSlot, Namespace};
use qeval_core::{CacheEntry, CachePayload, FilterSet, QevalResult};

use crate::client::QueryService;

/// A fetch the page has decided to issue, stamped with the filter-state
/// generation it belongs to.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    generation: u64,
    pub filters: FilterSet,
}

/// Per-page filter/payload state machine.
pub struct PageController {
    namespace: Namespace,
    generation: u64,
    filters: FilterSet,
    payload: Option<CachePayload>,
    error: Option<String>,
}

impl PageController {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            generation: 0,
            filters: FilterSet::default(),
            payload: None,
            error: None,
        }
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn payload(&self) -> Option<&CachePayload> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Change the filter state. Returns the fetch to issue, or `None`
    /// when required filter fields are absent (the fetch is skipped).
    pub fn set_filters(&mut self, filters: FilterSet) -> Option<PendingFetch> {
        self.generation += 1;
        self.filters = filters;
        if !self.filters.has_required() {
            return None;
        }
        Some(PendingFetch {
            generation: self.generation,
            filters: self.filters.clone(),
        })
    }

    /// Apply a completed fetch. A response from a superseded generation
    /// is discarded. On success the payload is stored and written
    /// through to the cache (the store rejects empty result sets
    /// itself); on failure the error state is set and payload cleared.
    /// Returns whether the response was applied.
    pub fn apply_fetch<S: KvSlot>(
        &mut self,
        pending: PendingFetch,
        result: QevalResult<CachePayload>,
        cache: &CacheStore<S>,
    ) -> bool {
        if pending.generation != self.generation {
            debug!(
                stale = pending.generation,
                current = self.generation,
                "discarding superseded fetch response"
            );
            return false;
        }

        match result {
            Ok(payload) => {
                cache.save(self.namespace, pending.filters, payload.clone());
                self.payload = Some(payload);
                self.error = None;
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.payload = None;
            }
        }
        true
    }

    /// Load a cache entry: filter state and payload state are set
    /// atomically from the entry, and the generation bump supersedes
    /// any in-flight fetch. No fetch is produced, so a cache hit never
    /// causes a network request; the next genuine call to
    /// [`Self::set_filters`] fetches normally.
    pub fn load_cached(&mut self, entry: CacheEntry) {
        self.generation += 1;
        self.filters = entry.filters;
        self.payload = Some(entry.payload);
        self.error = None;
    }
}

// ---------------------------------------------------------------------------
// Fetch fan-out per page
// ---------------------------------------------------------------------------

/// The report page's parallel fan-out: report rows, summary, and score
/// rows for one filter set. Issued sequentially here; any slice
/// failing fails the whole fetch.
pub fn fetch_report(
    service: &impl QueryService,
    filters: &FilterSet,
) -> QevalResult<CachePayload> {
    let rows = service.experiment_report(filters)?;
    let summary = service.experiment_summary(filters)?;
    let scores = service.experiment_scores(filters)?;
    Ok(CachePayload::Report {
        rows,
        summary,
        scores,
    })
}

pub fn fetch_evaluations(
    service: &impl QueryService,
    filters: &FilterSet,
) -> QevalResult<CachePayload> {
    let rows = service.evaluations(filters)?;
    Ok(CachePayload::Evaluations { rows })
}
