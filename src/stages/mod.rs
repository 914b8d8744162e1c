//! Concrete analysis stages.
//!
//! Three built-in stages conform to the
//! [`AnalysisStage`](crate::core::AnalysisStage) contract:
//!
//! - [`DocumentClassifier`]: weighted keyword/pattern document typing
//! - [`EntityExtractor`]: regex-driven entity recognition
//! - [`ClauseSimplifier`]: clause splitting plus jargon rewriting through
//!   the shared [`SimplifierModel`]
//!
//! The classifier and extractor are resource-agnostic and work with any
//! orchestrator; the simplifier requires the shared model and declares an
//! input limit so oversized documents are chunked.

pub mod classify;
pub mod extract;
pub mod simplify;

pub use classify::{Classification, DocumentClassifier};
pub use extract::{EntityCollection, EntityExtractor, EntityMatch};
pub use simplify::{ClauseSimplifier, SimplifiedClause, SimplificationOutput, SimplifierModel};

use std::sync::Arc;

use crate::core::error::StageError;
use crate::core::traits::{AnalysisStage, StageSet};

/// Assemble the three built-in stages into a registry.
pub fn builtin_stages() -> Result<StageSet<SimplifierModel>, StageError> {
    let mut set = StageSet::new();
    set.register(Arc::new(DocumentClassifier::new()?) as Arc<dyn AnalysisStage<SimplifierModel>>);
    set.register(Arc::new(EntityExtractor::new()?) as Arc<dyn AnalysisStage<SimplifierModel>>);
    set.register(Arc::new(ClauseSimplifier::new()) as Arc<dyn AnalysisStage<SimplifierModel>>);
    Ok(set)
}
