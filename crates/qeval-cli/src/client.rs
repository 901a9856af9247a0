//! Query service contract and its HTTP implementation.
//!
//! The dashboard backend exposes one endpoint per result-set shape;
//! given a filter set it returns an array of snake_case rows (or, for
//! the summary, a single object or null). Error bodies carry
//! `{error}` on 400 and `{error, message}` on 500.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use qeval_core::{
    EvaluationRow, ExperimentSummary, FilterSet, LeaderboardRow, QevalError, QevalResult,
    RecipeRow, ReportRow, ScoreRow,
};

/// Query parameters specific to the leaderboard endpoint.
#[derive(Debug, Clone, Default)]
pub struct LeaderboardParams {
    pub subject: Option<String>,
    pub min_total_questions: Option<u64>,
    pub evaluator_version: Option<String>,
    pub view_mode: Option<String>,
}

/// External collaborator producing rows for a filter set. One method
/// per endpoint; implementations are the HTTP client and, in tests, a
/// call-counting mock.
pub trait QueryService {
    fn leaderboard(&self, params: &LeaderboardParams) -> QevalResult<Vec<LeaderboardRow>>;
    fn experiment_report(&self, filters: &FilterSet) -> QevalResult<Vec<ReportRow>>;
    fn experiment_summary(&self, filters: &FilterSet) -> QevalResult<Option<ExperimentSummary>>;
    fn experiment_scores(&self, filters: &FilterSet) -> QevalResult<Vec<ScoreRow>>;
    fn evaluations(&self, filters: &FilterSet) -> QevalResult<Vec<EvaluationRow>>;
    fn recipes(&self, recipe_ids: &[String]) -> QevalResult<Vec<RecipeRow>>;
}

/// Blocking HTTP client against the dashboard API.
pub struct HttpQueryService {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpQueryService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            agent: ureq::agent(),
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> QevalResult<T> {
        let mut req = self.agent.get(&format!("{}{}", self.base_url, path));
        for (name, value) in params {
            if !value.is_empty() {
                req = req.query(name, value);
            }
        }

        match req.call() {
            Ok(resp) => resp
                .into_json::<T>()
                .map_err(|e| QevalError::Network(format!("bad response body: {e}"))),
            Err(ureq::Error::Status(status, resp)) => {
                let body: ApiError = resp.into_json().unwrap_or_default();
                let message = body
                    .message
                    .or(body.error)
                    .unwrap_or_else(|| "unknown error".into());
                Err(QevalError::Query { status, message })
            }
            Err(ureq::Error::Transport(e)) => Err(QevalError::Network(e.to_string())),
        }
    }
}

fn filter_params(filters: &FilterSet) -> Vec<(&'static str, String)> {
    vec![
        ("experiment_tracker", filters.experiment_tracker.clone()),
        ("subject", filters.subject.clone()),
        (
            "grade_level",
            filters.grade_level.clone().unwrap_or_default(),
        ),
        (
            "question_type",
            filters.question_type.clone().unwrap_or_default(),
        ),
        (
            "difficulty",
            filters.difficulty.clone().unwrap_or_default(),
        ),
        (
            "max_score",
            filters.max_score.map(|s| s.to_string()).unwrap_or_default(),
        ),
    ]
}

impl QueryService for HttpQueryService {
    fn leaderboard(&self, params: &LeaderboardParams) -> QevalResult<Vec<LeaderboardRow>> {
        let query = vec![
            ("subject", params.subject.clone().unwrap_or_default()),
            (
                "min_total_questions",
                params
                    .min_total_questions
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
            ),
            (
                "evaluator_version",
                params.evaluator_version.clone().unwrap_or_default(),
            ),
            ("view_mode", params.view_mode.clone().unwrap_or_default()),
        ];
        self.get("/api/leaderboard", &query)
    }

    fn experiment_report(&self, filters: &FilterSet) -> QevalResult<Vec<ReportRow>> {
        self.get("/api/experiment-report", &filter_params(filters))
    }

    fn experiment_summary(&self, filters: &FilterSet) -> QevalResult<Option<ExperimentSummary>> {
        // The API returns `null` when nothing matches.
        self.get("/api/experiment-summary", &filter_params(filters))
    }

    fn experiment_scores(&self, filters: &FilterSet) -> QevalResult<Vec<ScoreRow>> {
        self.get("/api/experiment-scores", &filter_params(filters))
    }

    fn evaluations(&self, filters: &FilterSet) -> QevalResult<Vec<EvaluationRow>> {
        self.get("/api/evaluations", &filter_params(filters))
    }

    fn recipes(&self, recipe_ids: &[String]) -> QevalResult<Vec<RecipeRow>> {
        let ids = recipe_ids.join(",");
        self.get("/api/recipes", &[("recipe_ids", ids)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpQueryService::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_filter_params_omit_absent_fields() {
        let filters = FilterSet::new("exp1", "math");
        let params = filter_params(&filters);
        // Empty values are skipped at request time; the param list
        // itself always carries all six slots in fixed order.
        assert_eq!(params[0], ("experiment_tracker", "exp1".to_string()));
        assert_eq!(params[1], ("subject", "math".to_string()));
        assert!(params[2..].iter().all(|(_, v)| v.is_empty()));
    }
}
