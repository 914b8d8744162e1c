//! Request, result, and stage-identity types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque stage output. The engine schedules, caches, and merges stage
/// values without interpreting them; concrete stages serialize their typed
/// output through serde.
pub type StageValue = serde_json::Value;

/// Identifies one independently schedulable unit of document analysis.
///
/// Stage ids key the cache (together with the content fingerprint) and the
/// stage registry, and order result assembly via configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Create a stage id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The stage name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One analysis call's input. Created per external call; never persisted.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// The extracted document text to analyze
    pub text: String,
    /// Optional per-request stage subset. Stages enabled in configuration
    /// but omitted here are reported as [`StageOutcome::Skipped`]. `None`
    /// runs every configured stage.
    pub stages: Option<Vec<StageId>>,
}

impl AnalysisRequest {
    /// Request analysis with every configured stage enabled.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stages: None,
        }
    }

    /// Restrict this request to a subset of the configured stages.
    pub fn with_stages(mut self, stages: Vec<StageId>) -> Self {
        self.stages = Some(stages);
        self
    }
}

/// Tagged outcome of one stage for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage produced a value (possibly served from cache)
    Ok {
        /// The stage's merged output
        value: StageValue,
    },
    /// The stage failed; sibling stages are unaffected
    Failed {
        /// Human-readable failure reason
        reason: String,
    },
    /// The stage was enabled in configuration but not requested
    Skipped,
}

impl StageOutcome {
    /// Whether this outcome carries a value.
    pub fn is_ok(&self) -> bool {
        matches!(self, StageOutcome::Ok { .. })
    }

    /// Whether this outcome is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    /// The stage value, if the stage succeeded.
    pub fn value(&self) -> Option<&StageValue> {
        match self {
            StageOutcome::Ok { value } => Some(value),
            _ => None,
        }
    }
}

/// Per-stage entry in an [`AnalysisResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage this report describes
    pub stage: StageId,
    /// What the stage produced
    pub outcome: StageOutcome,
    /// Whether the value was served from the cache without invoking the
    /// stage
    pub from_cache: bool,
    /// Wall-clock time spent settling this stage
    pub duration: Duration,
}

/// Aggregated outcome of one analysis call.
///
/// Reports appear in the fixed stage order declared by configuration,
/// never in completion order, so results are reproducible and diffable
/// across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Content fingerprint of the analyzed text
    pub fingerprint: String,
    /// When the call started
    pub started_at: DateTime<Utc>,
    /// End-to-end wall-clock time for the call
    pub total_duration: Duration,
    /// Per-stage reports in configured order
    pub reports: Vec<StageReport>,
}

impl AnalysisResult {
    /// Look up the report for one stage.
    pub fn report(&self, stage: &StageId) -> Option<&StageReport> {
        self.reports.iter().find(|r| &r.stage == stage)
    }

    /// Number of stages that produced a value.
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// Number of stages that failed.
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_display_roundtrip() {
        let id = StageId::new("entity-extract");
        assert_eq!(id.to_string(), "entity-extract");
        assert_eq!(id.as_str(), "entity-extract");
        assert_eq!(StageId::from("entity-extract"), id);
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = StageOutcome::Ok {
            value: serde_json::json!({"n": 1}),
        };
        assert!(ok.is_ok());
        assert!(!ok.is_failed());
        assert_eq!(ok.value().unwrap()["n"], 1);

        let failed = StageOutcome::Failed {
            reason: "x".to_string(),
        };
        assert!(failed.is_failed());
        assert!(failed.value().is_none());

        assert!(!StageOutcome::Skipped.is_ok());
    }

    #[test]
    fn test_outcome_serialization_tags() {
        let json = serde_json::to_value(StageOutcome::Skipped).unwrap();
        assert_eq!(json["status"], "skipped");

        let json = serde_json::to_value(StageOutcome::Failed {
            reason: "r".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "r");
    }

    #[test]
    fn test_result_lookup_and_counts() {
        let result = AnalysisResult {
            fingerprint: "abc".to_string(),
            started_at: Utc::now(),
            total_duration: Duration::from_millis(5),
            reports: vec![
                StageReport {
                    stage: StageId::new("a"),
                    outcome: StageOutcome::Ok {
                        value: serde_json::json!(1),
                    },
                    from_cache: false,
                    duration: Duration::ZERO,
                },
                StageReport {
                    stage: StageId::new("b"),
                    outcome: StageOutcome::Failed {
                        reason: "r".to_string(),
                    },
                    from_cache: false,
                    duration: Duration::ZERO,
                },
            ],
        };

        assert!(result.report(&StageId::new("a")).is_some());
        assert!(result.report(&StageId::new("missing")).is_none());
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 1);
    }
}
