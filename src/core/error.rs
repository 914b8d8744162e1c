//! Unified error handling for the analysis engine.
//!
//! Two error boundaries exist: [`StageError`] covers everything that can go
//! wrong inside a single stage invocation, and [`OrchestratorError`] covers
//! failures visible to the caller of an analysis call. Stage-local failures
//! are caught at the invocation boundary and folded into a `Failed` stage
//! outcome; only mandatory-stage failure, resource initialization failure,
//! or a timeout surface as a call-level error.

use std::time::Duration;

use thiserror::Error;

use crate::core::types::StageId;
use crate::resource::ResourceError;

/// Errors visible to callers of [`Orchestrator::analyze`](crate::orchestrator::Orchestrator::analyze)
/// or raised while constructing the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration rejected at construction time
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The request carried no analyzable text
    #[error("empty input text")]
    EmptyInput,

    /// The shared resource could not be initialized; sticky until the
    /// handle is explicitly reset
    #[error(transparent)]
    ResourceInitialization(#[from] ResourceError),

    /// A stage declared mandatory by configuration failed
    #[error("mandatory stage '{stage}' failed: {reason}")]
    MandatoryStageFailed {
        /// The failing stage
        stage: StageId,
        /// Why the stage failed
        reason: String,
    },

    /// The call exceeded its configured deadline. Outstanding stage tasks
    /// keep draining in the background and still populate the cache.
    #[error("orchestration timed out after {elapsed:?}")]
    Timeout {
        /// How long the call waited before giving up
        elapsed: Duration,
    },
}

/// Errors raised inside a single stage invocation.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage's own processing logic failed
    #[error("stage execution failed: {0}")]
    Execution(String),

    /// The stage required the shared resource and acquiring it failed
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Combining chunk-level outputs failed
    #[error("chunk merge failed: {0}")]
    Merge(String),

    /// A rule-table pattern failed to compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Stage output could not be serialized into a stage value
    #[error("output serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
