//! # Document Analyzer Core
//!
//! Result-caching and concurrent-orchestration engine for document
//! analysis. Independent derivation stages (classification, entity
//! extraction, clause simplification) run concurrently over one input;
//! repeated requests for the same content are served from a bounded,
//! time-aware cache instead of redoing expensive work.
//!
//! ## Architecture
//!
//! - [`caching`]: thread-safe key→value store with LRU eviction and TTL
//!   expiry, keyed by a content fingerprint plus a stage identifier
//! - [`resource`]: lazy, once-only initializer for an expensive shared
//!   dependency (e.g. a loaded model), safe under concurrent first access
//! - [`text`]: deterministic bounded-size chunking for stages that cannot
//!   process arbitrarily large inputs
//! - [`stages`]: concrete analysis stages conforming to the
//!   [`AnalysisStage`](core::AnalysisStage) contract
//! - [`orchestrator`]: concurrent fan-out over enabled stages with
//!   fixed-order result assembly and per-stage failure isolation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docanalyzer_core::config::AnalyzerConfig;
//! use docanalyzer_core::core::AnalysisRequest;
//! use docanalyzer_core::orchestrator::Orchestrator;
//! use docanalyzer_core::resource::boxed_factory;
//! use docanalyzer_core::stages::{builtin_stages, SimplifierModel};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(
//!     AnalyzerConfig::default(),
//!     builtin_stages()?,
//!     boxed_factory(|| async { SimplifierModel::load() }),
//! )?;
//!
//! let result = orchestrator
//!     .analyze(AnalysisRequest::new("This Non-Disclosure Agreement..."))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Core types, errors, and the stage contract
pub mod core;

/// Configuration management and validation
pub mod config;

/// Content-fingerprint caching with LRU eviction and TTL expiry
pub mod caching;

/// Lazy once-only initialization of shared resources
pub mod resource;

/// Text chunking utilities
pub mod text;

/// Concrete analysis stage implementations
pub mod stages;

/// Concurrent stage orchestration
pub mod orchestrator;

pub use crate::core::{
    AnalysisRequest, AnalysisResult, AnalysisStage, OrchestratorError, Result, StageError,
    StageId, StageOutcome, StageReport, StageValue,
};
pub use caching::{AnalysisCache, CacheKey, Fingerprint};
pub use config::AnalyzerConfig;
pub use orchestrator::Orchestrator;
pub use resource::{ResourceError, ResourceState, SharedResourceHandle};
