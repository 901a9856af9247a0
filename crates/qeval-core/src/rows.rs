//! Row types returned by the query service.
//!
//! Field names mirror the snake_case columns the API emits, so rows
//! deserialize directly from the response JSON. Latency fields are
//! milliseconds as aggregated upstream; conversion to display units
//! happens in [`crate::aggregate`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Atomic unit of score distributions: one evaluated question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub question_id: String,
    pub recipe_id: String,
    /// Fractional 0..1 evaluator score.
    pub evaluator_score: f64,
    pub difficulty: String,
}

/// One per-difficulty row of an experiment report, with latency
/// percentiles precomputed by the SQL layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub difficulty: String,
    pub total_questions: u64,
    pub passed_questions: u64,
    pub mean_score: f64,
    pub ttft_p10_ms: f64,
    pub ttft_median_ms: f64,
    pub ttft_p90_ms: f64,
    pub ttft_p95_ms: f64,
    pub gen_p10_ms: f64,
    pub gen_median_ms: f64,
    pub gen_p90_ms: f64,
    pub gen_p95_ms: f64,
}

/// Percentile latency fields of one report row, grouped for the
/// cross-report comparison table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub ttft_p10_ms: f64,
    pub ttft_median_ms: f64,
    pub ttft_p90_ms: f64,
    pub ttft_p95_ms: f64,
    pub gen_p10_ms: f64,
    pub gen_median_ms: f64,
    pub gen_p90_ms: f64,
    pub gen_p95_ms: f64,
}

impl ReportRow {
    pub fn latency(&self) -> LatencyStats {
        LatencyStats {
            ttft_p10_ms: self.ttft_p10_ms,
            ttft_median_ms: self.ttft_median_ms,
            ttft_p90_ms: self.ttft_p90_ms,
            ttft_p95_ms: self.ttft_p95_ms,
            gen_p10_ms: self.gen_p10_ms,
            gen_median_ms: self.gen_median_ms,
            gen_p90_ms: self.gen_p90_ms,
            gen_p95_ms: self.gen_p95_ms,
        }
    }
}

/// Experiment-level rollup. The API returns `null` when no rows match,
/// which deserializes to `None` at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment_tracker: String,
    pub total_questions: u64,
    pub passed_questions: u64,
    pub mean_score: f64,
    #[serde(default)]
    pub evaluator_version: Option<String>,
}

/// One leaderboard row: an experiment ranked across subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub experiment_tracker: String,
    pub subject: String,
    pub total_questions: u64,
    pub mean_score: f64,
    pub pass_rate: f64,
    #[serde(default)]
    pub evaluator_version: Option<String>,
}

/// A generation recipe, for drill-down from a failing evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRow {
    pub recipe_id: String,
    #[serde(default)]
    pub description: String,
}

/// One evaluation with its per-metric sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub question_id: String,
    pub recipe_id: String,
    pub evaluator_score: f64,
    pub difficulty: String,
    pub metrics: EvaluatorMetrics,
}

/// Per-evaluator metric maps, discriminated by the `evaluator` tag.
///
/// Each variant carries one or more named sub-score maps. Maps keep the
/// upstream key order (serde_json `preserve_order`), which fixes the
/// tie-break order of failure-tag counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "evaluator", rename_all = "snake_case")]
pub enum EvaluatorMetrics {
    Reading {
        quality_qa: Map<String, Value>,
        #[serde(default)]
        image_quality: Map<String, Value>,
    },
    Math {
        quality_qa: Map<String, Value>,
    },
    Localization {
        quality_qa: Map<String, Value>,
        #[serde(default)]
        image_quality: Map<String, Value>,
    },
}

impl EvaluatorMetrics {
    /// Flatten the variant's metric maps into `(name, sub_score)` pairs,
    /// in map order, skipping non-numeric values. Aggregation consumes
    /// this normalized form instead of re-probing nested JSON.
    pub fn metric_scores(&self) -> Vec<(&str, f64)> {
        let maps: Vec<&Map<String, Value>> = match self {
            Self::Reading {
                quality_qa,
                image_quality,
            }
            | Self::Localization {
                quality_qa,
                image_quality,
            } => vec![quality_qa, image_quality],
            Self::Math { quality_qa } => vec![quality_qa],
        };

        let mut out = Vec::new();
        for map in maps {
            for (name, value) in map {
                if let Some(score) = value.as_f64() {
                    out.push((name.as_str(), score));
                }
            }
        }
        out
    }
}
