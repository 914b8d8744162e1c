//! Core types, errors, and the stage contract.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{OrchestratorError, StageError};
pub use traits::{AnalysisStage, StageSet};
pub use types::{
    AnalysisRequest, AnalysisResult, StageId, StageOutcome, StageReport, StageValue,
};

/// Convenient Result type alias for orchestration-level operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
