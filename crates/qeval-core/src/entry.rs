//! Cache entry model: one persisted result set per filter combination.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::filters::FilterSet;
use crate::rows::{EvaluationRow, ExperimentSummary, ReportRow, ScoreRow};

/// The result-set shapes a cache namespace can hold, discriminated by
/// page purpose. The *primary* payload is the row array in either
/// variant; entries with an empty primary payload are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePayload {
    Report {
        rows: Vec<ReportRow>,
        summary: Option<ExperimentSummary>,
        scores: Vec<ScoreRow>,
    },
    Evaluations {
        rows: Vec<EvaluationRow>,
    },
}

impl CachePayload {
    /// Length of the primary row array.
    pub fn primary_len(&self) -> usize {
        match self {
            Self::Report { rows, .. } => rows.len(),
            Self::Evaluations { rows } => rows.len(),
        }
    }
}

/// One previously fetched result set. The cache key is derived from
/// `filters`, never stored redundantly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub filters: FilterSet,
    /// Insertion time, milliseconds since epoch. Refreshed on replace.
    pub timestamp: i64,
    pub payload: CachePayload,
}

impl CacheEntry {
    pub fn new(filters: FilterSet, payload: CachePayload) -> Self {
        Self {
            filters,
            timestamp: Utc::now().timestamp_millis(),
            payload,
        }
    }

    pub fn key(&self) -> String {
        self.filters.cache_key()
    }

    /// Structural validity check applied when loading persisted blobs:
    /// identity fields present and a non-empty primary payload. Entries
    /// failing this are dropped on load, not repaired.
    pub fn is_valid(&self) -> bool {
        self.filters.has_required() && self.payload.primary_len() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_payload(n: usize) -> CachePayload {
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
            scores: Vec::new(),
        }
    }

    #[test]
    fn test_entry_key_derived_from_filters() {
        let entry = CacheEntry::new(FilterSet::new("exp1", "math"), report_payload(1));
        assert_eq!(entry.key(), "exp1|math||||");
    }

    #[test]
    fn test_empty_primary_payload_is_invalid() {
        let entry = CacheEntry::new(FilterSet::new("exp1", "math"), report_payload(0));
        assert!(!entry.is_valid());
    }

    #[test]
    fn test_missing_identity_is_invalid() {
        let entry = CacheEntry::new(FilterSet::new("", "math"), report_payload(2));
        assert!(!entry.is_valid());
    }
}
