//! Rule-based document type classification.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::core::error::StageError;
use crate::core::traits::AnalysisStage;
use crate::core::types::{StageId, StageValue};

/// Keyword matches score 1.0, pattern matches 2.0.
const KEYWORD_SCORE: f64 = 1.0;
const PATTERN_SCORE: f64 = 2.0;
/// Minimum score before a prediction is considered confident.
const CONFIDENCE_THRESHOLD: f64 = 2.0;
/// Score normalization divisor for the 0..1 confidence value.
const CONFIDENCE_SCALE: f64 = 10.0;

struct TypeRule {
    doc_type: &'static str,
    keywords: &'static [&'static str],
    patterns: Vec<regex::Regex>,
}

/// Classification produced for one document (or one segment of it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Best-scoring document type, or `"unknown"` below the confidence
    /// threshold
    pub predicted_type: String,
    /// Normalized confidence in `0.0..=1.0`
    pub confidence: f64,
    /// Whether the best score cleared the confidence threshold
    pub is_confident: bool,
    /// Raw score per document type (sorted map for stable serialization)
    pub scores: BTreeMap<String, f64>,
    /// Keywords that contributed to the winning score
    pub matched_keywords: Vec<String>,
    /// Pattern matches that contributed to the winning score
    pub matched_patterns: Vec<String>,
}

/// Classifies documents into legal agreement types with a weighted
/// keyword-and-pattern rule table.
///
/// All rules compile once at construction; invocation is pure over the
/// input text, so concurrent use needs no synchronization and caching the
/// output is sound.
pub struct DocumentClassifier {
    rules: Vec<TypeRule>,
}

impl DocumentClassifier {
    /// Stage name used in cache keys and configuration.
    pub const NAME: &'static str = "doc-classify";

    /// Build the classifier, compiling the rule table.
    pub fn new() -> Result<Self, StageError> {
        let table: &[(&'static str, &'static [&'static str], &[&str])] = &[
            (
                "nda",
                &[
                    "non-disclosure",
                    "confidentiality",
                    "confidential information",
                    "proprietary information",
                    "trade secrets",
                    "non-disclosure agreement",
                    "confidentiality agreement",
                    "secrecy agreement",
                ],
                &[
                    r"non[- ]disclosure",
                    r"confidential(?:ity)?",
                    r"proprietary\s+information",
                    r"trade\s+secrets?",
                ],
            ),
            (
                "employment_contract",
                &[
                    "employment",
                    "employee",
                    "employer",
                    "position",
                    "salary",
                    "wages",
                    "benefits",
                    "termination",
                    "resignation",
                    "work schedule",
                    "duties",
                    "responsibilities",
                ],
                &[
                    r"employment\s+(?:agreement|contract)",
                    r"employee\s+handbook",
                    r"job\s+description",
                    r"salary\s+and\s+benefits",
                ],
            ),
            (
                "service_agreement",
                &[
                    "service",
                    "services",
                    "provider",
                    "client",
                    "customer",
                    "deliverables",
                    "scope of work",
                    "statement of work",
                    "professional services",
                    "consulting",
                ],
                &[
                    r"service\s+agreement",
                    r"professional\s+services",
                    r"scope\s+of\s+work",
                    r"statement\s+of\s+work",
                ],
            ),
            (
                "lease_agreement",
                &[
                    "lease",
                    "rent",
                    "tenant",
                    "landlord",
                    "property",
                    "premises",
                    "rental",
                    "lease term",
                    "security deposit",
                    "monthly rent",
                ],
                &[
                    r"lease\s+agreement",
                    r"rental\s+agreement",
                    r"landlord\s+and\s+tenant",
                    r"monthly\s+rent",
                ],
            ),
            (
                "purchase_agreement",
                &[
                    "purchase",
                    "sale",
                    "buyer",
                    "seller",
                    "goods",
                    "merchandise",
                    "purchase price",
                    "delivery",
                    "payment terms",
                    "invoice",
                ],
                &[
                    r"purchase\s+agreement",
                    r"sale\s+agreement",
                    r"buyer\s+and\s+seller",
                    r"purchase\s+price",
                ],
            ),
            (
                "partnership_agreement",
                &[
                    "partnership",
                    "partners",
                    "joint venture",
                    "collaboration",
                    "profit sharing",
                    "equity",
                    "capital contribution",
                    "dissolution",
                ],
                &[
                    r"partnership\s+agreement",
                    r"joint\s+venture",
                    r"profit\s+sharing",
                    r"capital\s+contribution",
                ],
            ),
            (
                "license_agreement",
                &[
                    "license",
                    "licensing",
                    "licensor",
                    "licensee",
                    "intellectual property",
                    "copyright",
                    "trademark",
                    "patent",
                    "royalty",
                    "usage rights",
                ],
                &[
                    r"license\s+agreement",
                    r"licensing\s+agreement",
                    r"intellectual\s+property",
                    r"usage\s+rights",
                ],
            ),
            (
                "loan_agreement",
                &[
                    "loan",
                    "lender",
                    "borrower",
                    "principal",
                    "interest",
                    "repayment",
                    "default",
                    "collateral",
                    "credit",
                    "promissory note",
                ],
                &[
                    r"loan\s+agreement",
                    r"promissory\s+note",
                    r"lender\s+and\s+borrower",
                    r"interest\s+rate",
                ],
            ),
        ];

        let mut rules = Vec::with_capacity(table.len());
        for &(doc_type, keywords, patterns) in table {
            let compiled = patterns
                .iter()
                .map(|pattern| {
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(StageError::from)
                })
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(TypeRule {
                doc_type,
                keywords,
                patterns: compiled,
            });
        }

        Ok(Self { rules })
    }

    /// Score every document type against the text and pick the winner.
    ///
    /// Ties resolve to the rule-table order, which keeps the result
    /// deterministic for any input.
    pub fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        let mut scores = BTreeMap::new();
        let mut best: Option<(&TypeRule, f64)> = None;
        let mut per_type_matches: BTreeMap<&str, (Vec<String>, Vec<String>)> = BTreeMap::new();

        for rule in &self.rules {
            let mut score = 0.0;
            let mut keywords = Vec::new();
            let mut patterns = Vec::new();

            for keyword in rule.keywords {
                if lowered.contains(keyword) {
                    score += KEYWORD_SCORE;
                    keywords.push((*keyword).to_string());
                }
            }

            for pattern in &rule.patterns {
                if let Some(found) = pattern.find(text) {
                    score += PATTERN_SCORE;
                    patterns.push(found.as_str().to_string());
                }
            }

            scores.insert(rule.doc_type.to_string(), score);
            per_type_matches.insert(rule.doc_type, (keywords, patterns));
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((rule, score)),
            }
        }

        let (winner, score) = match best {
            Some(found) => found,
            // The rule table is never empty; this arm is unreachable in
            // practice but keeps the function total.
            None => {
                return Classification {
                    predicted_type: "unknown".to_string(),
                    confidence: 0.0,
                    is_confident: false,
                    scores,
                    matched_keywords: Vec::new(),
                    matched_patterns: Vec::new(),
                }
            }
        };

        let is_confident = score >= CONFIDENCE_THRESHOLD;
        let (matched_keywords, matched_patterns) = per_type_matches
            .remove(winner.doc_type)
            .unwrap_or_default();

        Classification {
            predicted_type: if is_confident {
                winner.doc_type.to_string()
            } else {
                "unknown".to_string()
            },
            confidence: (score / CONFIDENCE_SCALE).min(1.0),
            is_confident,
            scores,
            matched_keywords,
            matched_patterns,
        }
    }

    fn winner_from_scores(scores: &BTreeMap<String, f64>) -> (String, f64) {
        let mut winner = ("unknown".to_string(), 0.0);
        for (doc_type, score) in scores {
            if *score > winner.1 {
                winner = (doc_type.clone(), *score);
            }
        }
        winner
    }
}

#[async_trait]
impl<R: Send + Sync + 'static> AnalysisStage<R> for DocumentClassifier {
    fn id(&self) -> StageId {
        StageId::new(Self::NAME)
    }

    async fn run(&self, text: &str, _resource: Option<Arc<R>>) -> Result<StageValue, StageError> {
        Ok(serde_json::to_value(self.classify(text))?)
    }

    /// Segment scores sum per type, then the winner is re-derived with the
    /// same threshold logic a whole-document pass would use.
    fn merge(&self, parts: Vec<StageValue>) -> Result<StageValue, StageError> {
        let mut scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut keywords = BTreeSet::new();
        let mut patterns = BTreeSet::new();

        for part in parts {
            let segment: Classification = serde_json::from_value(part)
                .map_err(|e| StageError::Merge(format!("invalid classification segment: {e}")))?;
            for (doc_type, score) in segment.scores {
                *scores.entry(doc_type).or_insert(0.0) += score;
            }
            keywords.extend(segment.matched_keywords);
            patterns.extend(segment.matched_patterns);
        }

        let (winner, score) = Self::winner_from_scores(&scores);
        let is_confident = score >= CONFIDENCE_THRESHOLD;

        Ok(serde_json::to_value(Classification {
            predicted_type: if is_confident {
                winner
            } else {
                "unknown".to_string()
            },
            confidence: (score / CONFIDENCE_SCALE).min(1.0),
            is_confident,
            scores,
            matched_keywords: keywords.into_iter().collect(),
            matched_patterns: patterns.into_iter().collect(),
        })?)
    }
}
