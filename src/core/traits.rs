//! The stage contract and the stage registry.
//!
//! A stage is the fundamental pluggable unit of document analysis. The
//! engine only knows how to schedule, cache, chunk for, and merge stages,
//! never what they compute.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::StageError;
use crate::core::types::{StageId, StageValue};

/// One independently schedulable analysis capability over
/// `(text, shared resource) -> value`, generic over the shared resource
/// type `R`.
///
/// Implementations must be safe to invoke concurrently with other stages
/// and with other invocations of themselves for different requests: any
/// internal state must be immutable or internally synchronized. A stage
/// must not mutate its input text. Stages are expected to be deterministic
/// for identical `(text, resource)` so that caching is sound;
/// non-determinism is permitted but caching such a stage hides variance
/// and must be documented by the caller.
#[async_trait]
pub trait AnalysisStage<R>: Send + Sync {
    /// Stable identifier for this stage; keys the cache and the registry.
    fn id(&self) -> StageId;

    /// Whether this stage needs the shared resource. When `true`, the
    /// orchestrator acquires the resource before invoking [`run`](Self::run)
    /// and passes it along; acquisition failure fails the stage.
    fn needs_resource(&self) -> bool {
        false
    }

    /// Largest input (in bytes) this stage processes in one invocation.
    /// Longer inputs are split by the chunking policy and the stage runs
    /// once per segment; `None` accepts arbitrarily large inputs.
    fn max_input_len(&self) -> Option<usize> {
        None
    }

    /// Analyze one text segment.
    async fn run(&self, text: &str, resource: Option<Arc<R>>) -> Result<StageValue, StageError>;

    /// Combine per-segment outputs into one value. The merge rule belongs
    /// to the stage (concatenation, score summation, voting), not to the
    /// orchestrator. Called only when the input was chunked.
    fn merge(&self, parts: Vec<StageValue>) -> Result<StageValue, StageError>;
}

/// Registered stage implementations keyed by stage id.
///
/// Registration happens once at startup; the set is immutable while the
/// orchestrator runs, which is what makes concurrent lookup safe without
/// locking.
pub struct StageSet<R> {
    stages: HashMap<StageId, Arc<dyn AnalysisStage<R>>>,
}

impl<R> StageSet<R> {
    /// Create an empty stage set.
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// Register a stage. Returns `false` (and keeps the existing entry) if
    /// a stage with the same id is already registered.
    pub fn register(&mut self, stage: Arc<dyn AnalysisStage<R>>) -> bool {
        let id = stage.id();
        if self.stages.contains_key(&id) {
            return false;
        }
        self.stages.insert(id, stage);
        true
    }

    /// Look up a stage by id.
    pub fn get(&self, id: &StageId) -> Option<Arc<dyn AnalysisStage<R>>> {
        self.stages.get(id).cloned()
    }

    /// Whether a stage with this id is registered.
    pub fn contains(&self, id: &StageId) -> bool {
        self.stages.contains_key(id)
    }

    /// Ids of all registered stages (unordered).
    pub fn ids(&self) -> Vec<StageId> {
        self.stages.keys().cloned().collect()
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<R> Default for StageSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FromIterator<Arc<dyn AnalysisStage<R>>> for StageSet<R> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn AnalysisStage<R>>>>(iter: I) -> Self {
        let mut set = Self::new();
        for stage in iter {
            set.register(stage);
        }
        set
    }
}
