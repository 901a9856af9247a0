//! Filter tuples and the cache key function.
//!
//! A [`FilterSet`] identifies one query against the evaluation store:
//! which experiment, which subject, and any narrowing dimensions the
//! page applies on top. Two filter sets that would produce the same
//! query must produce the same cache key, regardless of whether an
//! unused field was never set or was cleared back to empty.

use serde::{Deserialize, Serialize};

/// The key-defining tuple for one query.
///
/// `experiment_tracker` and `subject` are required for any fetch;
/// everything else is optional and normalizes to the empty string when
/// absent, so clearing a field and never setting it key identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub experiment_tracker: String,
    pub subject: String,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub max_score: Option<f64>,
}

impl FilterSet {
    pub fn new(experiment_tracker: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            experiment_tracker: experiment_tracker.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Whether the fields required for any fetch are present.
    pub fn has_required(&self) -> bool {
        !self.experiment_tracker.is_empty() && !self.subject.is_empty()
    }

    /// Deterministic cache key for this filter set.
    ///
    /// Field order is fixed: experiment_tracker, subject, grade_level,
    /// question_type, difficulty, max_score, joined with `|`. Absent
    /// optional fields serialize as the empty string, so every key
    /// carries all six slots — pages that never set the trailing
    /// extras produce keys ending in `||`.
    ///
    /// Field values are not validated against the delimiter, so a value
    /// containing `|` collides with a differently-split tuple. Known
    /// limitation, pinned by `test_pipe_in_field_collides`.
    pub fn cache_key(&self) -> String {
        let max_score = self
            .max_score
            .map(|s| s.to_string())
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.experiment_tracker,
            self.subject,
            self.grade_level.as_deref().unwrap_or(""),
            self.question_type.as_deref().unwrap_or(""),
            self.difficulty.as_deref().unwrap_or(""),
            max_score,
        )
    }
}
