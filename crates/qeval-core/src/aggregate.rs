//! Pure aggregation over raw row arrays.
//!
//! Everything here is recomputed from the current payload on demand and
//! never cached. Inputs are whatever the query service or the cache
//! store produced; outputs are display-ready summaries.

use crate::rows::{EvaluationRow, LatencyStats, ReportRow, ScoreRow};

/// Fixed pass/fail cutoff on the fractional 0..1 score scale.
pub const PASS_THRESHOLD: f64 = 0.85;

// ---------------------------------------------------------------------------
// Three-way score partition
// ---------------------------------------------------------------------------

/// Rows split by score band. Every input row lands in exactly one band.
#[derive(Debug, Default)]
pub struct ScorePartition<'a> {
    /// `evaluator_score == 0`.
    pub zero: Vec<&'a ScoreRow>,
    /// `0 < evaluator_score < threshold`.
    pub below: Vec<&'a ScoreRow>,
    /// `evaluator_score >= threshold`.
    pub passed: Vec<&'a ScoreRow>,
}

/// Partition score rows into zero / below-threshold / passed.
///
/// A score of exactly 0 is never counted in `below`; a score exactly at
/// the threshold counts as `passed`.
pub fn partition_scores(rows: &[ScoreRow], threshold: f64) -> ScorePartition<'_> {
    let mut out = ScorePartition::default();
    for row in rows {
        if row.evaluator_score == 0.0 {
            out.zero.push(row);
        } else if row.evaluator_score >= threshold {
            out.passed.push(row);
        } else {
            out.below.push(row);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Failure-tag frequency counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Ranked list of which metrics most commonly fail.
///
/// Considers only rows whose overall score is below `threshold`; within
/// those, every flattened metric whose own sub-score is below the same
/// threshold increments its counter. Sorted descending by count, ties
/// kept in first-encountered order (stable sort).
pub fn failure_tag_counts(rows: &[EvaluationRow], threshold: f64) -> Vec<TagCount> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for row in rows {
        if row.evaluator_score >= threshold {
            continue;
        }
        for (tag, sub_score) in row.metrics.metric_scores() {
            if sub_score < threshold {
                let slot = counts.entry(tag.to_string()).or_insert_with(|| {
                    order.push(tag.to_string());
                    0
                });
                *slot += 1;
            }
        }
    }

    let mut out: Vec<TagCount> = order
        .into_iter()
        .map(|tag| {
            let count = counts[&tag];
            TagCount { tag, count }
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

// ---------------------------------------------------------------------------
// Score histogram
// ---------------------------------------------------------------------------

/// Which scale the raw scores are on. The two scales never mix in one
/// histogram; callers pick the scale of their source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScale {
    /// Fractional 0.0..=1.0 evaluator scores.
    Fraction,
    /// Integer 0..=10 rubric scores.
    TenPoint,
}

impl ScoreScale {
    fn max(self) -> f64 {
        match self {
            Self::Fraction => 1.0,
            Self::TenPoint => 10.0,
        }
    }
}

pub const HISTOGRAM_BUCKETS: usize = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Counts per integer grid point 0..=10.
    pub buckets: [usize; HISTOGRAM_BUCKETS],
    pub mean: f64,
    pub total: usize,
}

/// Bucket scores on an integer 0..=10 grid.
///
/// The top bucket is inclusive of the scale maximum (a perfect score
/// lands in bucket 10, not past it); out-of-range inputs clamp to the
/// end buckets so bucket counts always sum to the input length.
pub fn score_histogram(scores: &[f64], scale: ScoreScale) -> Histogram {
    let mut buckets = [0usize; HISTOGRAM_BUCKETS];
    let mut sum = 0.0;
    let max = scale.max();

    for &score in scores {
        sum += score;
        let idx = ((score / max) * 10.0).floor();
        let idx = idx.clamp(0.0, 10.0) as usize;
        buckets[idx] += 1;
    }

    let mean = if scores.is_empty() {
        0.0
    } else {
        sum / scores.len() as f64
    };

    Histogram {
        buckets,
        mean,
        total: scores.len(),
    }
}

// ---------------------------------------------------------------------------
// Latency percentile comparison
// ---------------------------------------------------------------------------

/// Row-per-difficulty, column-per-report table of latency percentiles.
/// A missing difficulty/report combination is `None` and renders as
/// "n/a", never as zero.
#[derive(Debug, Clone)]
pub struct LatencyComparison {
    /// Difficulty labels, first-encountered casing, first-encountered order.
    pub difficulties: Vec<String>,
    /// Report labels, in the order given.
    pub reports: Vec<String>,
    /// `cells[difficulty_idx][report_idx]`.
    pub cells: Vec<Vec<Option<LatencyStats>>>,
}

impl LatencyComparison {
    pub fn cell(&self, difficulty_idx: usize, report_idx: usize) -> Option<&LatencyStats> {
        self.cells
            .get(difficulty_idx)
            .and_then(|row| row.get(report_idx))
            .and_then(|c| c.as_ref())
    }
}

/// Align multiple reports by difficulty label, case-insensitively.
///
/// Upstream difficulty strings are not guaranteed consistent case
/// ("Hard" vs "hard"); matching folds case but the displayed label
/// keeps the casing of the first report that mentioned it. Duplicate
/// difficulty rows within one report keep the first occurrence.
pub fn latency_comparison(reports: &[(String, Vec<ReportRow>)]) -> LatencyComparison {
    let mut difficulties: Vec<String> = Vec::new();
    let mut folded: Vec<String> = Vec::new();

    for (_, rows) in reports {
        for row in rows {
            let fold = row.difficulty.to_lowercase();
            if !folded.contains(&fold) {
                folded.push(fold);
                difficulties.push(row.difficulty.clone());
            }
        }
    }

    let mut cells = vec![vec![None; reports.len()]; difficulties.len()];
    for (report_idx, (_, rows)) in reports.iter().enumerate() {
        for row in rows {
            let fold = row.difficulty.to_lowercase();
            let difficulty_idx = folded.iter().position(|f| *f == fold).unwrap_or(0);
            let cell = &mut cells[difficulty_idx][report_idx];
            if cell.is_none() {
                *cell = Some(row.latency());
            }
        }
    }

    LatencyComparison {
        difficulties,
        reports: reports.iter().map(|(label, _)| label.clone()).collect(),
        cells,
    }
}

// ---------------------------------------------------------------------------
// Unit helpers
// ---------------------------------------------------------------------------

/// Millisecond latency fields display in seconds.
pub fn ms_to_secs(ms: f64) -> f64 {
    ms / 1000.0
}

/// Fractional 0..1 scores display as percentages.
pub fn frac_to_pct(frac: f64) -> f64 {
    frac * 100.0
}
