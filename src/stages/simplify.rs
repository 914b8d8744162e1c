//! Clause extraction and plain-English simplification.
//!
//! The rewrite rules live in a [`SimplifierModel`], the expensive shared
//! dependency of the pipeline. Constructing the model compiles the full
//! jargon rule table, so the orchestrator initializes it exactly once
//! process-wide through a
//! [`SharedResourceHandle`](crate::resource::SharedResourceHandle) and every
//! concurrent invocation shares the same instance.

use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::core::error::StageError;
use crate::core::traits::AnalysisStage;
use crate::core::types::{StageId, StageValue};
use crate::resource::ResourceError;

/// Clauses shorter than this are unlikely to carry meaning on their own.
const MIN_CLAUSE_LEN: usize = 50;
/// Only the first clauses of a document are simplified per invocation.
const MAX_CLAUSES: usize = 10;
/// De-duplication compares this many leading characters of each clause.
const DEDUP_PREFIX: usize = 100;

/// One clause rewritten into plain English.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedClause {
    /// The clause as found in the document
    pub original: String,
    /// The clause after jargon replacement
    pub simplified: String,
    /// One-line description of what the clause is about
    pub plain_summary: String,
    /// Notable facts found in the clause (amounts, deadlines, obligations)
    pub key_points: Vec<String>,
    /// How much simpler the rewrite is, in `0.0..=1.0`
    pub score: f64,
}

/// Output of the simplification stage for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplificationOutput {
    /// Simplified clauses in document order
    pub clauses: Vec<SimplifiedClause>,
    /// Number of clauses considered before the per-invocation cap
    pub total_clauses: usize,
}

/// Compiled jargon→plain-English rewrite tables plus the scanners used for
/// key-point extraction.
///
/// Immutable after loading; shared across all concurrent simplifications.
pub struct SimplifierModel {
    rewrite_rules: Vec<(Regex, &'static str)>,
    money: Regex,
    time_periods: Regex,
    percentages: Regex,
    whitespace: Regex,
}

impl SimplifierModel {
    /// Compile the rule tables. This is the slow construction step the
    /// shared resource handle guards.
    pub fn load() -> Result<Self, ResourceError> {
        let table: &[(&str, &'static str)] = &[
            // Common legal terms
            (r"\bheretofore\b", "before this"),
            (r"\bhereinafter\b", "from now on"),
            (r"\bwhereas\b", "since"),
            (r"\btherefore\b", "so"),
            (r"\bnotwithstanding\b", "despite"),
            (r"\bpursuant to\b", "according to"),
            (r"\bin consideration of\b", "in exchange for"),
            (r"\bshall\b", "will"),
            (r"\bmay not\b", "cannot"),
            (r"\bprovided that\b", "if"),
            (r"\bsubject to\b", "depending on"),
            // Complex phrases
            (r"\bin the event that\b", "if"),
            (r"\bfor the purpose of\b", "to"),
            (r"\bwith respect to\b", "about"),
            (r"\bin accordance with\b", "following"),
            (r"\bprior to\b", "before"),
            (r"\bsubsequent to\b", "after"),
            (r"\bin lieu of\b", "instead of"),
            (r"\bby virtue of\b", "because of"),
            // Redundant pairs
            (r"\bnull and void\b", "invalid"),
            (r"\beach and every\b", "all"),
            (r"\bfull and complete\b", "complete"),
            (r"\bfinal and binding\b", "final"),
            (r"\bterms and conditions\b", "terms"),
            // Time references
            (r"\bforthwith\b", "immediately"),
            (r"\bhenceforth\b", "from now on"),
            // Structure cleanups
            (r"\bthe said\b", "the"),
            (r"\baforesaid\b", "mentioned"),
            (r"\bshall be deemed to be\b", "is considered"),
            (r"\bshall be construed as\b", "means"),
        ];

        let mut rewrite_rules = Vec::with_capacity(table.len());
        for (pattern, replacement) in table {
            rewrite_rules.push((Self::compile(pattern)?, *replacement));
        }

        Ok(Self {
            rewrite_rules,
            money: Self::compile(r"\$[\d,]+(?:\.\d{2})?")?,
            time_periods: Self::compile(r"\b\d+\s+(?:days?|weeks?|months?|years?)\b")?,
            percentages: Self::compile(r"\d+(?:\.\d+)?%")?,
            whitespace: Self::compile(r"\s+")?,
        })
    }

    fn compile(pattern: &str) -> Result<Regex, ResourceError> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ResourceError::InitializationFailed(format!("bad rewrite rule: {e}")))
    }

    /// Rewrite one clause and derive its summary, key points, and score.
    pub fn simplify_clause(&self, clause: &str) -> SimplifiedClause {
        let original = clause.trim().to_string();
        let simplified = self.apply_rules(&original);

        SimplifiedClause {
            plain_summary: self.plain_summary(&simplified),
            key_points: self.key_points(&original),
            score: simplification_score(&original, &simplified),
            original,
            simplified,
        }
    }

    fn apply_rules(&self, text: &str) -> String {
        let mut simplified = text.to_string();
        for (pattern, replacement) in &self.rewrite_rules {
            simplified = pattern.replace_all(&simplified, *replacement).into_owned();
        }
        self.whitespace.replace_all(&simplified, " ").trim().to_string()
    }

    fn plain_summary(&self, clause: &str) -> String {
        let lowered = clause.to_lowercase();
        let topic = [
            (&["payment", "pay", "$"][..], "This clause deals with payment terms and amounts."),
            (&["termination", "terminate"][..], "This clause explains how the agreement can be ended."),
            (&["confidential", "non-disclosure"][..], "This clause requires keeping information secret."),
            (&["liability", "responsible"][..], "This clause defines who is responsible for what."),
            (&["intellectual property", "copyright"][..], "This clause deals with ownership of ideas and creations."),
            (&["dispute", "arbitration"][..], "This clause explains how disagreements will be resolved."),
            (&["force majeure", "act of god"][..], "This clause covers situations beyond anyone's control."),
        ]
        .iter()
        .find(|(markers, _)| markers.iter().any(|marker| lowered.contains(marker)))
        .map(|(_, summary)| *summary);

        if let Some(summary) = topic {
            return summary.to_string();
        }

        // Fall back to the first sentence when no topic marker fires.
        let first_sentence = clause
            .split_terminator(['.', '!', '?'])
            .next()
            .map(str::trim)
            .unwrap_or("");
        if first_sentence.len() > 20 {
            format!("In simple terms: {}.", first_sentence.to_lowercase())
        } else {
            "This clause contains important legal terms and conditions.".to_string()
        }
    }

    fn key_points(&self, clause: &str) -> Vec<String> {
        let mut points = Vec::new();
        let lowered = clause.to_lowercase();

        let amounts: Vec<&str> = self.money.find_iter(clause).map(|m| m.as_str()).collect();
        if !amounts.is_empty() {
            points.push(format!("Involves money: {}", amounts.join(", ")));
        }

        let periods: Vec<&str> = self
            .time_periods
            .find_iter(clause)
            .map(|m| m.as_str())
            .collect();
        if !periods.is_empty() {
            points.push(format!("Time periods: {}", periods.join(", ")));
        }

        let percents: Vec<&str> = self
            .percentages
            .find_iter(clause)
            .map(|m| m.as_str())
            .collect();
        if !percents.is_empty() {
            points.push(format!("Percentages: {}", percents.join(", ")));
        }

        let obligations: Vec<&str> = ["must", "shall", "will", "required", "obligated"]
            .iter()
            .filter(|word| lowered.contains(**word))
            .copied()
            .collect();
        if !obligations.is_empty() {
            points.push(format!("Creates obligations: {}", obligations.join(", ")));
        }

        let conditions: Vec<&str> = ["if", "unless", "provided", "subject to", "in case"]
            .iter()
            .filter(|word| lowered.contains(**word))
            .copied()
            .collect();
        if !conditions.is_empty() {
            points.push(format!("Has conditions: {}", conditions.join(", ")));
        }

        points.truncate(5);
        points
    }
}

/// Weighted blend of word-count reduction and average-word-length
/// reduction, clamped to `0.0..=1.0`.
fn simplification_score(original: &str, simplified: &str) -> f64 {
    let original_words: Vec<&str> = original.split_whitespace().collect();
    let simplified_words: Vec<&str> = simplified.split_whitespace().collect();
    if original_words.is_empty() || simplified_words.is_empty() {
        return 0.0;
    }

    let avg_len = |words: &[&str]| {
        words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len() as f64
    };

    let word_reduction =
        (original_words.len() as f64 - simplified_words.len() as f64) / original_words.len() as f64;
    let original_avg = avg_len(&original_words);
    let complexity_reduction = if original_avg > 0.0 {
        (original_avg - avg_len(&simplified_words)) / original_avg
    } else {
        0.0
    };

    (word_reduction * 0.3 + complexity_reduction * 0.7).clamp(0.0, 1.0)
}

/// Splits a document into clauses and rewrites each through the shared
/// [`SimplifierModel`].
///
/// Declares an input limit so oversized documents run through the chunking
/// policy; chunk outputs merge by concatenation with prefix-based
/// de-duplication.
pub struct ClauseSimplifier {
    max_input_len: usize,
}

impl ClauseSimplifier {
    /// Stage name used in cache keys and configuration.
    pub const NAME: &'static str = "clause-simplify";

    /// Default largest input handled in one invocation.
    pub const DEFAULT_MAX_INPUT: usize = 10_000;

    /// Create the stage with the default input limit.
    pub fn new() -> Self {
        Self {
            max_input_len: Self::DEFAULT_MAX_INPUT,
        }
    }

    /// Override the input limit (mainly for tests exercising chunking).
    pub fn with_max_input_len(max_input_len: usize) -> Self {
        Self { max_input_len }
    }

    /// Split text into candidate clauses.
    ///
    /// Tries separators in order (paragraph break, sentence end, semicolon)
    /// and uses the first that actually splits. Short fragments are
    /// dropped unless nothing else qualifies.
    pub fn split_clauses(text: &str) -> Vec<String> {
        let mut clauses: Vec<String> = Vec::new();
        for separator in ["\n\n", ". ", "; "] {
            let parts: Vec<&str> = text
                .split(separator)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            if parts.len() > 1 {
                clauses = parts.into_iter().map(String::from).collect();
                break;
            }
        }

        if clauses.is_empty() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                clauses.push(trimmed.to_string());
            }
        }

        let meaningful: Vec<String> = clauses
            .iter()
            .filter(|clause| clause.len() > MIN_CLAUSE_LEN)
            .cloned()
            .collect();
        if meaningful.is_empty() {
            clauses
        } else {
            meaningful
        }
    }
}

impl Default for ClauseSimplifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisStage<SimplifierModel> for ClauseSimplifier {
    fn id(&self) -> StageId {
        StageId::new(Self::NAME)
    }

    fn needs_resource(&self) -> bool {
        true
    }

    fn max_input_len(&self) -> Option<usize> {
        Some(self.max_input_len)
    }

    async fn run(
        &self,
        text: &str,
        resource: Option<Arc<SimplifierModel>>,
    ) -> Result<StageValue, StageError> {
        let model = resource.ok_or_else(|| {
            StageError::Execution("clause simplification requires the shared model".to_string())
        })?;

        let clauses = Self::split_clauses(text);
        let total_clauses = clauses.len();
        let simplified: Vec<SimplifiedClause> = clauses
            .iter()
            .take(MAX_CLAUSES)
            .map(|clause| model.simplify_clause(clause))
            .collect();

        Ok(serde_json::to_value(SimplificationOutput {
            clauses: simplified,
            total_clauses,
        })?)
    }

    fn merge(&self, parts: Vec<StageValue>) -> Result<StageValue, StageError> {
        let mut clauses: Vec<SimplifiedClause> = Vec::new();
        let mut total_clauses = 0;

        for part in parts {
            let segment: SimplificationOutput = serde_json::from_value(part)
                .map_err(|e| StageError::Merge(format!("invalid simplification segment: {e}")))?;
            total_clauses += segment.total_clauses;
            for clause in segment.clauses {
                let prefix = clause_prefix(&clause.original);
                let duplicate = clauses
                    .iter()
                    .any(|existing| clause_prefix(&existing.original) == prefix);
                if !duplicate {
                    clauses.push(clause);
                }
            }
        }

        Ok(serde_json::to_value(SimplificationOutput {
            clauses,
            total_clauses,
        })?)
    }
}

/// Leading characters of a clause, snapped to a char boundary.
fn clause_prefix(clause: &str) -> &str {
    let trimmed = clause.trim();
    let mut end = DEDUP_PREFIX.min(trimmed.len());
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    &trimmed[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SimplifierModel {
        SimplifierModel::load().unwrap()
    }

    #[test]
    fn test_model_replaces_jargon() {
        let clause = "Notwithstanding the foregoing, the tenant shall pay rent pursuant to \
                      the schedule heretofore agreed.";
        let result = model().simplify_clause(clause);
        let lowered = result.simplified.to_lowercase();
        assert!(lowered.contains("despite"));
        assert!(lowered.contains("will"));
        assert!(lowered.contains("according to"));
        assert!(!lowered.contains("notwithstanding"));
        assert!(!lowered.contains("pursuant"));
    }

    #[test]
    fn test_key_points_find_amounts_and_deadlines() {
        let clause = "The borrower shall repay $10,000.00 within 30 days at 5% interest.";
        let result = model().simplify_clause(clause);
        assert!(result.key_points.iter().any(|p| p.contains("$10,000.00")));
        assert!(result.key_points.iter().any(|p| p.contains("30 days")));
        assert!(result.key_points.iter().any(|p| p.contains("5%")));
    }

    #[test]
    fn test_topic_summary_for_confidentiality() {
        let clause = "The receiving party shall keep all confidential information secret \
                      for the duration of this agreement and thereafter.";
        let result = model().simplify_clause(clause);
        assert_eq!(
            result.plain_summary,
            "This clause requires keeping information secret."
        );
    }

    #[test]
    fn test_split_clauses_prefers_paragraphs() {
        let text = "First clause body that is clearly long enough to be meaningful here.\n\n\
                    Second clause body that is also clearly long enough to be meaningful.";
        let clauses = ClauseSimplifier::split_clauses(text);
        assert_eq!(clauses.len(), 2);
        assert!(clauses[0].starts_with("First clause"));
    }

    #[test]
    fn test_split_clauses_keeps_short_text_whole() {
        let clauses = ClauseSimplifier::split_clauses("Short text.");
        assert_eq!(clauses, vec!["Short text.".to_string()]);
    }

    #[tokio::test]
    async fn test_run_requires_resource() {
        let stage = ClauseSimplifier::new();
        let err = stage.run("some text", None).await.unwrap_err();
        assert!(matches!(err, StageError::Execution(_)));
    }

    #[tokio::test]
    async fn test_run_simplifies_clauses() {
        let stage = ClauseSimplifier::new();
        let model = Arc::new(model());
        let text = "The lessee shall pay the monthly rent forthwith upon receipt of the \
                    invoice from the lessor. \
                    Notwithstanding any other provision, the security deposit shall be \
                    returned within 30 days of lease termination.";

        let value = stage.run(text, Some(model)).await.unwrap();
        let output: SimplificationOutput = serde_json::from_value(value).unwrap();
        assert_eq!(output.clauses.len(), 2);
        assert!(output.clauses[0].simplified.to_lowercase().contains("immediately"));
    }

    #[tokio::test]
    async fn test_merge_dedupes_by_prefix() {
        let stage = ClauseSimplifier::new();
        let model = Arc::new(model());
        let clause = "The parties shall maintain strict confidentiality regarding all \
                      proprietary information exchanged under this agreement.";

        let a = stage.run(clause, Some(Arc::clone(&model))).await.unwrap();
        let b = stage.run(clause, Some(model)).await.unwrap();
        let merged = stage.merge(vec![a, b]).unwrap();
        let output: SimplificationOutput = serde_json::from_value(merged).unwrap();
        assert_eq!(output.clauses.len(), 1, "identical clause survives once");
    }
}
