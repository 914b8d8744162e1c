//! Regex-driven entity extraction for legal text.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::core::error::StageError;
use crate::core::traits::AnalysisStage;
use crate::core::types::{StageId, StageValue};

/// Characters of surrounding text captured on each side of a match.
const CONTEXT_WINDOW: usize = 50;

/// One entity occurrence. Offsets are byte positions relative to the
/// analyzed segment, not the whole document: after chunk merging only the
/// matched text and context remain meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    /// The matched text
    pub text: String,
    /// Byte offset of the match start within the analyzed segment
    pub start: usize,
    /// Byte offset of the match end within the analyzed segment
    pub end: usize,
    /// Surrounding text window for display
    pub context: String,
}

/// All entities found in one document, grouped by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCollection {
    /// Matches per category (sorted map for stable serialization)
    pub entities: BTreeMap<String, Vec<EntityMatch>>,
    /// Total match count across categories
    pub total: usize,
}

struct CategoryRule {
    category: &'static str,
    patterns: Vec<Regex>,
}

/// Extracts dates, monetary values, parties, contact details, legal terms,
/// obligations, and durations with per-category pattern groups.
///
/// Matches de-duplicate case-insensitively within a category. The pattern
/// tables are immutable after construction, so concurrent invocation is
/// safe and output is deterministic for identical input.
pub struct EntityExtractor {
    rules: Vec<CategoryRule>,
}

impl EntityExtractor {
    /// Stage name used in cache keys and configuration.
    pub const NAME: &'static str = "entity-extract";

    /// Build the extractor, compiling every category's patterns.
    pub fn new() -> Result<Self, StageError> {
        const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December";

        // (category, patterns, case_insensitive). Party names keep their
        // capitalization requirement, so that group matches case-sensitively.
        let table: Vec<(&'static str, Vec<String>, bool)> = vec![
            (
                "dates",
                vec![
                    r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b".to_string(),
                    format!(r"\b\d{{1,2}}\s+(?:{MONTHS})\s+\d{{2,4}}\b"),
                    format!(r"\b(?:{MONTHS})\s+\d{{1,2}},?\s+\d{{2,4}}\b"),
                ],
                true,
            ),
            (
                "monetary_values",
                vec![
                    r"\$[\d,]+\.?\d*".to_string(),
                    r"\b\d+\s*dollars?\b".to_string(),
                    r"\b\d+\s*USD\b".to_string(),
                ],
                true,
            ),
            (
                "parties",
                vec![
                    r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\s*(?:Inc\.?|LLC|Corp\.?|Corporation|Company|Ltd\.?|Limited)?\b"
                        .to_string(),
                    r"\b(?:The\s+)?[A-Z][A-Za-z\s&]+(?:Inc\.?|LLC|Corp\.?|Corporation|Company|Ltd\.?|Limited)\b"
                        .to_string(),
                ],
                false,
            ),
            (
                "addresses",
                vec![
                    r"\b\d+\s+[A-Za-z\s]+(?:Street|St\.?|Avenue|Ave\.?|Road|Rd\.?|Boulevard|Blvd\.?|Drive|Dr\.?|Lane|Ln\.?|Way|Court|Ct\.?)\b"
                        .to_string(),
                ],
                true,
            ),
            (
                "phone_numbers",
                vec![
                    r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b".to_string(),
                    r"\(\d{3}\)\s*\d{3}[-.]?\d{4}\b".to_string(),
                ],
                true,
            ),
            (
                "email_addresses",
                vec![r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string()],
                true,
            ),
            (
                "legal_terms",
                vec![
                    r"\b(?:whereas|therefore|hereby|herein|hereof|hereunder|notwithstanding|pursuant|covenant|indemnify|liability|breach|termination|confidential|proprietary)\b"
                        .to_string(),
                ],
                true,
            ),
            (
                "obligations",
                vec![
                    r"\b(?:shall|must|agree to|required to|obligated to|responsible for)\b[^.]*"
                        .to_string(),
                ],
                true,
            ),
            (
                "durations",
                vec![
                    r"\b\d+\s*(?:days?|weeks?|months?|years?)\b".to_string(),
                    r"\b(?:one|two|three|four|five|six|seven|eight|nine|ten)\s+(?:days?|weeks?|months?|years?)\b"
                        .to_string(),
                ],
                true,
            ),
        ];

        let mut rules = Vec::with_capacity(table.len());
        for (category, patterns, case_insensitive) in table {
            let compiled = patterns
                .iter()
                .map(|pattern| {
                    RegexBuilder::new(pattern)
                        .case_insensitive(case_insensitive)
                        .build()
                        .map_err(StageError::from)
                })
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(CategoryRule {
                category,
                patterns: compiled,
            });
        }

        Ok(Self { rules })
    }

    /// Scan the text against every category's pattern group.
    pub fn extract(&self, text: &str) -> EntityCollection {
        let mut entities = BTreeMap::new();
        let mut total = 0;

        for rule in &self.rules {
            let mut matches: Vec<EntityMatch> = Vec::new();
            for pattern in &rule.patterns {
                for found in pattern.find_iter(text) {
                    let candidate = found.as_str();
                    let duplicate = matches
                        .iter()
                        .any(|existing| existing.text.eq_ignore_ascii_case(candidate));
                    if duplicate {
                        continue;
                    }
                    matches.push(EntityMatch {
                        text: candidate.to_string(),
                        start: found.start(),
                        end: found.end(),
                        context: context_window(text, found.start(), found.end()),
                    });
                }
            }
            total += matches.len();
            entities.insert(rule.category.to_string(), matches);
        }

        EntityCollection { entities, total }
    }
}

/// Clip a context window around `[start, end)`, snapped to char boundaries.
fn context_window(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_WINDOW);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_WINDOW).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim().to_string()
}

#[async_trait]
impl<R: Send + Sync + 'static> AnalysisStage<R> for EntityExtractor {
    fn id(&self) -> StageId {
        StageId::new(Self::NAME)
    }

    async fn run(&self, text: &str, _resource: Option<Arc<R>>) -> Result<StageValue, StageError> {
        Ok(serde_json::to_value(self.extract(text))?)
    }

    /// Chunk outputs concatenate per category, de-duplicating matches that
    /// appear in more than one segment.
    fn merge(&self, parts: Vec<StageValue>) -> Result<StageValue, StageError> {
        let mut entities: BTreeMap<String, Vec<EntityMatch>> = BTreeMap::new();

        for part in parts {
            let segment: EntityCollection = serde_json::from_value(part)
                .map_err(|e| StageError::Merge(format!("invalid entity segment: {e}")))?;
            for (category, matches) in segment.entities {
                let bucket = entities.entry(category).or_default();
                for candidate in matches {
                    let duplicate = bucket
                        .iter()
                        .any(|existing| existing.text.eq_ignore_ascii_case(&candidate.text));
                    if !duplicate {
                        bucket.push(candidate);
                    }
                }
            }
        }

        let total = entities.values().map(Vec::len).sum();
        Ok(serde_json::to_value(EntityCollection { entities, total })?)
    }
}
