pub mod aggregate;
pub mod entry;
pub mod error;
pub mod filters;
pub mod rows;

pub use aggregate::{
    failure_tag_counts, frac_to_pct, latency_comparison, ms_to_secs, partition_scores,
    score_histogram, Histogram, LatencyComparison, ScorePartition, ScoreScale, TagCount,
    PASS_THRESHOLD,
};
pub use entry::{CacheEntry, CachePayload};
pub use error::{QevalError, QevalResult};
pub use filters::FilterSet;
pub use rows::{
    EvaluationRow, EvaluatorMetrics, ExperimentSummary, LatencyStats, LeaderboardRow, RecipeRow,
    ReportRow, ScoreRow,
};
