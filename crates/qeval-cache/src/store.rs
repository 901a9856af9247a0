//! The cache entry store: bounded, keyed result-set collections
//! persisted to a [`KvSlot`], one blob per namespace.
//!
//! All failure modes degrade to "no cache" rather than surfacing:
//! corrupt blobs load as empty, unusable slots drop the write, and
//! quota exhaustion runs a staged eviction ladder before giving up.

use std::fmt;

use tracing::{debug, warn};

use qeval_core::{CacheEntry, CachePayload, FilterSet};

use crate::slot::{KvSlot, SlotError};

/// Logically separate cache keyspaces, one per page purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Reports,
    Benchmarks,
    Evaluations,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Self::Reports, Self::Benchmarks, Self::Evaluations];

    /// Key the namespace's blob is stored under in the slot.
    pub fn slot_key(self) -> &'static str {
        match self {
            Self::Reports => "qeval.reports",
            Self::Benchmarks => "qeval.benchmarks",
            Self::Evaluations => "qeval.evaluations",
        }
    }

    /// Maximum entries the namespace retains.
    pub fn capacity(self) -> usize {
        match self {
            Self::Reports | Self::Benchmarks => 4,
            Self::Evaluations => 10,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reports => write!(f, "reports"),
            Self::Benchmarks => write!(f, "benchmarks"),
            Self::Evaluations => write!(f, "evaluations"),
        }
    }
}

pub struct CacheStore<S: KvSlot> {
    slot: S,
}

impl<S: KvSlot> CacheStore<S> {
    pub fn new(slot: S) -> Self {
        Self { slot }
    }

    /// Read a namespace's entries, newest first.
    ///
    /// Structurally invalid entries (missing identity fields, missing
    /// or empty primary payload) are dropped silently; a corrupt blob
    /// or unreadable slot loads as an empty namespace. Never errors.
    pub fn load(&self, ns: Namespace) -> Vec<CacheEntry> {
        let blob = match self.slot.get(ns.slot_key()) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(namespace = %ns, error = %e, "cache slot unreadable, treating as empty");
                return Vec::new();
            }
        };

        let raw: Vec<serde_json::Value> = match serde_json::from_str(&blob) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(namespace = %ns, error = %e, "corrupt cache blob, treating as empty");
                return Vec::new();
            }
        };

        let total = raw.len();
        let entries: Vec<CacheEntry> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<CacheEntry>(v).ok())
            .filter(CacheEntry::is_valid)
            .collect();

        if entries.len() < total {
            warn!(
                namespace = %ns,
                dropped = total - entries.len(),
                "dropped structurally invalid cache entries on load"
            );
        }
        entries
    }

    /// Write-through one result set under its filter key.
    ///
    /// An empty primary payload is never cached (no-op). A same-key
    /// entry is replaced and its recency refreshed. On quota failure
    /// the eviction ladder drops the oldest entry, then everything but
    /// the new entry, before giving up; a lost write is logged, never
    /// an error.
    pub fn save(&self, ns: Namespace, filters: FilterSet, payload: CachePayload) {
        if payload.primary_len() == 0 {
            debug!(namespace = %ns, "empty result set, not caching");
            return;
        }

        let entry = CacheEntry::new(filters, payload);
        let key = entry.key();

        let mut entries = self.load(ns);
        entries.retain(|e| e.key() != key);
        entries.insert(0, entry);
        entries.truncate(ns.capacity());

        match self.persist(ns, &entries) {
            Ok(()) => return,
            Err(SlotError::QuotaExceeded) => {}
            Err(e) => {
                warn!(namespace = %ns, error = %e, "cache write dropped, slot unavailable");
                return;
            }
        }

        // Ladder step 1: drop the oldest pre-existing entry.
        if entries.len() > 1 {
            entries.pop();
        }
        match self.persist(ns, &entries) {
            Ok(()) => {
                debug!(namespace = %ns, "evicted oldest entry to fit quota");
                return;
            }
            Err(SlotError::QuotaExceeded) => {}
            Err(e) => {
                warn!(namespace = %ns, error = %e, "cache write dropped, slot unavailable");
                return;
            }
        }

        // Ladder step 2: keep only the new entry.
        if entries.len() > 1 {
            entries.truncate(1);
            if self.persist(ns, &entries).is_ok() {
                debug!(namespace = %ns, "evicted all old entries to fit quota");
                return;
            }
        }

        warn!(namespace = %ns, key = %key, "cache write lost: quota exceeded even for a single entry");
    }

    /// Remove the entry with the given filter key. No match is a no-op.
    pub fn delete(&self, ns: Namespace, key: &str) {
        let mut entries = self.load(ns);
        let before = entries.len();
        entries.retain(|e| e.key() != key);
        if entries.len() == before {
            return;
        }
        if let Err(e) = self.persist(ns, &entries) {
            warn!(namespace = %ns, error = %e, "cache delete not persisted");
        }
    }

    /// Drop every entry in the namespace.
    pub fn clear(&self, ns: Namespace) {
        if let Err(e) = self.slot.remove(ns.slot_key()) {
            warn!(namespace = %ns, error = %e, "cache clear not persisted");
        }
    }

    /// Find one entry by filter key.
    pub fn find(&self, ns: Namespace, key: &str) -> Option<CacheEntry> {
        self.load(ns).into_iter().find(|e| e.key() == key)
    }

    fn persist(&self, ns: Namespace, entries: &[CacheEntry]) -> Result<(), SlotError> {
        let blob = serde_json::to_string(entries)
            .map_err(|e| SlotError::Unavailable(e.to_string()))?;
        self.slot.set(ns.slot_key(), &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::{MemorySlot, SlotResult};
    use qeval_core::{ReportRow, ScoreRow};
    use std::cell::Cell;

    fn filters(tracker: &str) -> FilterSet {
        FilterSet::new(tracker, "math")
    }

    fn payload(n: usize) -> CachePayload {
        let rows = (0..n)
            .map(|i| ReportRow {
                difficulty: format!("d{i}"),
                total_questions: 10,
                passed_questions: 5,
                mean_score: 0.5,
                ttft_p10_ms: 100.0,
                ttft_median_ms: 200.0,
                ttft_p90_ms: 300.0,
                ttft_p95_ms: 400.0,
                gen_p10_ms: 1000.0,
                gen_median_ms: 2000.0,
                gen_p90_ms: 3000.0,
                gen_p95_ms: 4000.0,
            })
            .collect();
        CachePayload::Report {
            rows,
            summary: None,
            scores: vec![ScoreRow {
                question_id: "q1".into(),
                recipe_id: "r1".into(),
                evaluator_score: 0.9,
                difficulty: "Easy".into(),
            }],
        }
    }

    /// Slot that answers the first `fail_sets` writes with a quota
    /// error, then delegates to an in-memory slot.
    struct FlakySlot {
        inner: MemorySlot,
        fail_sets: Cell<usize>,
    }

    impl FlakySlot {
        fn failing(fail_sets: usize) -> Self {
            Self {
                inner: MemorySlot::new(),
                fail_sets: Cell::new(fail_sets),
            }
        }
    }

    impl KvSlot for FlakySlot {
        fn get(&self, key: &str) -> SlotResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> SlotResult<()> {
            let remaining = self.fail_sets.get();
            if remaining > 0 {
                self.fail_sets.set(remaining - 1);
                return Err(SlotError::QuotaExceeded);
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> SlotResult<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let store = CacheStore::new(MemorySlot::new());
        store.save(Namespace::Reports, filters("exp1"), payload(2));

        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key(), "exp1|math||||");
        assert_eq!(entries[0].payload.primary_len(), 2);
    }

    #[test]
    fn test_empty_primary_payload_is_noop() {
        let store = CacheStore::new(MemorySlot::new());
        store.save(Namespace::Reports, filters("exp1"), payload(1));
        store.save(Namespace::Reports, filters("exp2"), payload(0));

        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filters.experiment_tracker, "exp1");
    }

    #[test]
    fn test_duplicate_key_replaces_and_refreshes() {
        let store = CacheStore::new(MemorySlot::new());
        store.save(Namespace::Reports, filters("exp1"), payload(1));
        let first = store.load(Namespace::Reports);

        store.save(Namespace::Reports, filters("exp2"), payload(1));
        store.save(Namespace::Reports, filters("exp1"), payload(3));

        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 2);
        // Replaced entry moves back to the front with fresh content.
        assert_eq!(entries[0].filters.experiment_tracker, "exp1");
        assert_eq!(entries[0].payload.primary_len(), 3);
        assert!(entries[0].timestamp >= first[0].timestamp);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = CacheStore::new(MemorySlot::new());
        for i in 1..=5 {
            store.save(Namespace::Reports, filters(&format!("exp{i}")), payload(1));
        }

        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), Namespace::Reports.capacity());
        let trackers: Vec<&str> = entries
            .iter()
            .map(|e| e.filters.experiment_tracker.as_str())
            .collect();
        // Newest first; the first insert is gone.
        assert_eq!(trackers, vec!["exp5", "exp4", "exp3", "exp2"]);
    }

    #[test]
    fn test_evaluations_namespace_holds_ten() {
        let store = CacheStore::new(MemorySlot::new());
        for i in 1..=12 {
            store.save(
                Namespace::Evaluations,
                filters(&format!("exp{i}")),
                CachePayload::Evaluations { rows: eval_rows() },
            );
        }
        assert_eq!(store.load(Namespace::Evaluations).len(), 10);
    }

    fn eval_rows() -> Vec<qeval_core::EvaluationRow> {
        let metrics = serde_json::from_value(serde_json::json!({
            "evaluator": "math",
            "quality_qa": { "correctness": 0.4 }
        }))
        .unwrap();
        vec![qeval_core::EvaluationRow {
            question_id: "q1".into(),
            recipe_id: "r1".into(),
            evaluator_score: 0.4,
            difficulty: "Easy".into(),
            metrics,
        }]
    }

    #[test]
    fn test_quota_ladder_drops_oldest_then_succeeds() {
        let slot = FlakySlot::failing(0);
        let store = CacheStore::new(slot);
        for i in 1..=3 {
            store.save(Namespace::Reports, filters(&format!("exp{i}")), payload(1));
        }

        // Next write hits quota once; ladder drops the oldest and retries.
        let store = CacheStore::new(FlakySlot {
            inner: rebuild_slot(&store),
            fail_sets: Cell::new(1),
        });
        store.save(Namespace::Reports, filters("exp4"), payload(1));

        let entries = store.load(Namespace::Reports);
        let trackers: Vec<&str> = entries
            .iter()
            .map(|e| e.filters.experiment_tracker.as_str())
            .collect();
        // 3 present before, minus the oldest, plus the new one.
        assert_eq!(trackers, vec!["exp4", "exp3", "exp2"]);
    }

    #[test]
    fn test_quota_ladder_falls_back_to_new_entry_only() {
        let store = CacheStore::new(FlakySlot::failing(0));
        for i in 1..=3 {
            store.save(Namespace::Reports, filters(&format!("exp{i}")), payload(1));
        }

        let store = CacheStore::new(FlakySlot {
            inner: rebuild_slot(&store),
            fail_sets: Cell::new(2),
        });
        store.save(Namespace::Reports, filters("exp4"), payload(1));

        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filters.experiment_tracker, "exp4");
    }

    #[test]
    fn test_quota_exhausted_write_is_lost_without_panic() {
        let store = CacheStore::new(FlakySlot::failing(0));
        store.save(Namespace::Reports, filters("exp1"), payload(1));

        let store = CacheStore::new(FlakySlot {
            inner: rebuild_slot(&store),
            fail_sets: Cell::new(usize::MAX),
        });
        store.save(Namespace::Reports, filters("exp2"), payload(1));

        // The prior blob is untouched.
        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filters.experiment_tracker, "exp1");
    }

    /// Copy a store's persisted blobs into a fresh MemorySlot so a new
    /// failure scenario can start from known contents.
    fn rebuild_slot<S: KvSlot>(store: &CacheStore<S>) -> MemorySlot {
        let slot = MemorySlot::new();
        for ns in Namespace::ALL {
            if let Ok(Some(blob)) = store.slot.get(ns.slot_key()) {
                slot.set(ns.slot_key(), &blob).unwrap();
            }
        }
        slot
    }

    #[test]
    fn test_delete_removes_matching_entry() {
        let store = CacheStore::new(MemorySlot::new());
        store.save(Namespace::Reports, filters("exp1"), payload(1));
        store.save(Namespace::Reports, filters("exp2"), payload(1));

        store.delete(Namespace::Reports, "exp1|math||||");
        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filters.experiment_tracker, "exp2");

        // Absent key is a no-op.
        store.delete(Namespace::Reports, "nope|nope||||");
        assert_eq!(store.load(Namespace::Reports).len(), 1);
    }

    #[test]
    fn test_corrupt_blob_loads_as_empty() {
        let slot = MemorySlot::new();
        slot.set(Namespace::Reports.slot_key(), "{not json]").unwrap();
        let store = CacheStore::new(slot);
        assert!(store.load(Namespace::Reports).is_empty());
    }

    #[test]
    fn test_invalid_entries_dropped_on_load() {
        let slot = MemorySlot::new();
        // One valid entry, one missing identity, one junk object.
        let valid = CacheEntry::new(filters("exp1"), payload(1));
        let invalid = CacheEntry::new(FilterSet::new("", ""), payload(1));
        let blob = serde_json::to_string(&serde_json::json!([
            valid,
            invalid,
            { "unrelated": true }
        ]))
        .unwrap();
        slot.set(Namespace::Reports.slot_key(), &blob).unwrap();

        let store = CacheStore::new(slot);
        let entries = store.load(Namespace::Reports);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filters.experiment_tracker, "exp1");
    }

    #[test]
    fn test_clear_empties_namespace() {
        let store = CacheStore::new(MemorySlot::new());
        store.save(Namespace::Reports, filters("exp1"), payload(1));
        store.clear(Namespace::Reports);
        assert!(store.load(Namespace::Reports).is_empty());
    }

    #[test]
    fn test_find_by_key() {
        let store = CacheStore::new(MemorySlot::new());
        store.save(Namespace::Reports, filters("exp1"), payload(1));
        assert!(store.find(Namespace::Reports, "exp1|math||||").is_some());
        assert!(store.find(Namespace::Reports, "exp9|math||||").is_none());
    }
}
