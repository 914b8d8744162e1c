//! Concurrent stage orchestration.
//!
//! The orchestrator owns the process-wide shared state (the result cache
//! and the shared-resource handle) and turns one [`AnalysisRequest`] into
//! one [`AnalysisResult`]:
//!
//! 1. Fingerprint the input text.
//! 2. For every enabled stage, independently and concurrently: probe the
//!    cache under `(fingerprint, stage-id)`; on a miss, chunk oversized
//!    input, acquire the shared resource if the stage declares it, run the
//!    stage per segment, merge per the stage's rule, and store the value.
//! 3. Wait for every dispatched stage to settle; partial failure of one
//!    stage never cancels the others.
//! 4. Assemble reports in the fixed configured stage order, never in
//!    completion order, so results are reproducible and diffable.
//!
//! Only mandatory-stage failure, resource initialization failure, or a
//! timeout fail the overall call; optional-stage failures are reported
//! inside the result. On timeout the already-spawned stage tasks keep
//! running on the runtime and still populate the cache, so their work is
//! not wasted, while the caller gets the timeout error immediately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinError;

use crate::caching::{AnalysisCache, CacheKey, CacheSnapshot, Fingerprint};
use crate::config::AnalyzerConfig;
use crate::core::error::{OrchestratorError, StageError};
use crate::core::traits::{AnalysisStage, StageSet};
use crate::core::types::{
    AnalysisRequest, AnalysisResult, StageOutcome, StageReport, StageValue,
};
use crate::core::Result;
use crate::resource::{ResourceError, ResourceFactory, ResourceState, SharedResourceHandle};
use crate::text::TextChunker;

/// Runs a fixed set of independent analysis stages concurrently over one
/// input, with per-stage result caching and a once-only shared resource.
pub struct Orchestrator<R: Send + Sync + 'static> {
    config: AnalyzerConfig,
    stages: Arc<StageSet<R>>,
    cache: Arc<AnalysisCache<CacheKey, StageValue>>,
    resource: Arc<SharedResourceHandle<R>>,
    chunker: TextChunker,
}

impl<R: Send + Sync + 'static> std::fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("enabled_stages", &self.config.enabled_stages.len())
            .finish_non_exhaustive()
    }
}

impl<R: Send + Sync + 'static> Orchestrator<R> {
    /// Construct an orchestrator, validating configuration up front.
    ///
    /// Every enabled stage must be registered in `stages`. The resource
    /// factory is invoked at most once, lazily, on the first stage that
    /// declares it needs the resource.
    pub fn new(
        config: AnalyzerConfig,
        stages: StageSet<R>,
        factory: ResourceFactory<R>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(OrchestratorError::InvalidConfiguration)?;

        for stage_id in &config.enabled_stages {
            if !stages.contains(stage_id) {
                return Err(OrchestratorError::InvalidConfiguration(format!(
                    "enabled stage '{stage_id}' is not registered"
                )));
            }
        }

        Ok(Self {
            cache: Arc::new(AnalysisCache::new(config.cache_capacity, config.cache_ttl())),
            resource: Arc::new(SharedResourceHandle::new(factory)),
            stages: Arc::new(stages),
            chunker: TextChunker::new(),
            config,
        })
    }

    /// Analyze one document.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        if request.text.trim().is_empty() {
            return Err(OrchestratorError::EmptyInput);
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let fingerprint = Fingerprint::compute(&request.text);

        tracing::info!(
            fingerprint = fingerprint.short(),
            stages = self.config.enabled_stages.len(),
            text_len = request.text.len(),
            "dispatching analysis"
        );

        let requested: Option<HashSet<_>> =
            request.stages.as_ref().map(|ids| ids.iter().collect());
        let text: Arc<str> = Arc::from(request.text.as_str());

        let mut slots: Vec<Option<StageReport>> = vec![None; self.config.enabled_stages.len()];
        let mut tasks = Vec::new();

        for (index, stage_id) in self.config.enabled_stages.iter().enumerate() {
            if requested.as_ref().is_some_and(|set| !set.contains(stage_id)) {
                slots[index] = Some(StageReport {
                    stage: stage_id.clone(),
                    outcome: StageOutcome::Skipped,
                    from_cache: false,
                    duration: Duration::ZERO,
                });
                continue;
            }

            // Presence was validated at construction.
            let Some(stage) = self.stages.get(stage_id) else {
                slots[index] = Some(StageReport {
                    stage: stage_id.clone(),
                    outcome: StageOutcome::Failed {
                        reason: "stage not registered".to_string(),
                    },
                    from_cache: false,
                    duration: Duration::ZERO,
                });
                continue;
            };

            let key = CacheKey::new(fingerprint.clone(), stage_id.clone());
            let handle = tokio::spawn(run_stage_task(
                stage,
                Arc::clone(&text),
                key,
                Arc::clone(&self.cache),
                Arc::clone(&self.resource),
                self.chunker.clone(),
                self.config.max_chunk_size,
            ));
            tasks.push(async move { (index, handle.await) });
        }

        let settled: Vec<(usize, std::result::Result<StageTaskOutput, JoinError>)> =
            match self.config.stage_timeout {
                Some(limit) => match tokio::time::timeout(limit, join_all(tasks)).await {
                    Ok(settled) => settled,
                    Err(_) => {
                        let elapsed = start.elapsed();
                        tracing::warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            "analysis timed out; outstanding stages drain in the background"
                        );
                        return Err(OrchestratorError::Timeout { elapsed });
                    }
                },
                None => join_all(tasks).await,
            };

        let mut resource_failure: Option<ResourceError> = None;
        for (index, joined) in settled {
            let report = match joined {
                Ok(output) => {
                    if resource_failure.is_none() {
                        resource_failure = output.resource_failure;
                    }
                    output.report
                }
                Err(join_error) => StageReport {
                    stage: self.config.enabled_stages[index].clone(),
                    outcome: StageOutcome::Failed {
                        reason: format!("stage task panicked: {join_error}"),
                    },
                    from_cache: false,
                    duration: start.elapsed(),
                },
            };
            slots[index] = Some(report);
        }

        if let Some(err) = resource_failure {
            return Err(err.into());
        }

        let reports: Vec<StageReport> = slots.into_iter().flatten().collect();

        for report in &reports {
            if let StageOutcome::Failed { reason } = &report.outcome {
                if self.config.is_mandatory(&report.stage) {
                    return Err(OrchestratorError::MandatoryStageFailed {
                        stage: report.stage.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        let total_duration = start.elapsed();
        tracing::info!(
            fingerprint = fingerprint.short(),
            succeeded = reports.iter().filter(|r| r.outcome.is_ok()).count(),
            failed = reports.iter().filter(|r| r.outcome.is_failed()).count(),
            duration_ms = total_duration.as_millis() as u64,
            "analysis completed"
        );

        Ok(AnalysisResult {
            fingerprint: fingerprint.to_string(),
            started_at,
            total_duration,
            reports,
        })
    }

    /// Point-in-time cache counters.
    pub fn cache_stats(&self) -> CacheSnapshot {
        self.cache.stats()
    }

    /// Current live-entry count of the result cache.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Lifecycle state of the shared resource.
    pub fn resource_state(&self) -> ResourceState {
        self.resource.state()
    }

    /// The configuration this orchestrator was built with.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Drain cached results. Called at process shutdown; nothing is
    /// persisted.
    pub fn drain(&self) {
        self.cache.clear();
    }
}

struct StageTaskOutput {
    report: StageReport,
    resource_failure: Option<ResourceError>,
}

/// Settle one stage: cache probe, resource acquisition, chunked execution,
/// merge, and cache store. Runs as an independent spawned task.
async fn run_stage_task<R: Send + Sync + 'static>(
    stage: Arc<dyn AnalysisStage<R>>,
    text: Arc<str>,
    key: CacheKey,
    cache: Arc<AnalysisCache<CacheKey, StageValue>>,
    resource: Arc<SharedResourceHandle<R>>,
    chunker: TextChunker,
    max_chunk_size: usize,
) -> StageTaskOutput {
    let stage_id = stage.id();
    let start = Instant::now();

    if let Some(value) = cache.get(&key) {
        tracing::debug!(stage = %stage_id, key = %key, "cache hit");
        return StageTaskOutput {
            report: StageReport {
                stage: stage_id,
                outcome: StageOutcome::Ok { value },
                from_cache: true,
                duration: start.elapsed(),
            },
            resource_failure: None,
        };
    }
    tracing::debug!(stage = %stage_id, key = %key, "cache miss");

    let instance = if stage.needs_resource() {
        match resource.acquire().await {
            Ok(instance) => Some(instance),
            Err(err) => {
                tracing::warn!(stage = %stage_id, error = %err, "shared resource unavailable");
                return StageTaskOutput {
                    report: StageReport {
                        stage: stage_id,
                        outcome: StageOutcome::Failed {
                            reason: err.to_string(),
                        },
                        from_cache: false,
                        duration: start.elapsed(),
                    },
                    resource_failure: Some(err),
                };
            }
        }
    } else {
        None
    };

    let segments = match stage.max_input_len() {
        Some(max) if text.len() > max => {
            // Segments must satisfy the stage's own limit even when the
            // configured chunk size is larger.
            let segments = chunker.split(&text, max_chunk_size.min(max));
            tracing::debug!(
                stage = %stage_id,
                segments = segments.len(),
                "input exceeds stage limit; chunking"
            );
            segments
        }
        _ => vec![text.to_string()],
    };

    match execute_segments(stage.as_ref(), &segments, instance).await {
        Ok(value) => {
            cache.put(key, value.clone());
            StageTaskOutput {
                report: StageReport {
                    stage: stage_id,
                    outcome: StageOutcome::Ok { value },
                    from_cache: false,
                    duration: start.elapsed(),
                },
                resource_failure: None,
            }
        }
        Err(err) => {
            tracing::warn!(stage = %stage_id, error = %err, "stage failed");
            let resource_failure = match &err {
                StageError::Resource(resource_err) => Some(resource_err.clone()),
                _ => None,
            };
            StageTaskOutput {
                report: StageReport {
                    stage: stage_id,
                    outcome: StageOutcome::Failed {
                        reason: err.to_string(),
                    },
                    from_cache: false,
                    duration: start.elapsed(),
                },
                resource_failure,
            }
        }
    }
}

/// Run the stage over every segment concurrently, then apply its merge
/// rule. A single segment bypasses the merge entirely.
async fn execute_segments<R>(
    stage: &dyn AnalysisStage<R>,
    segments: &[String],
    resource: Option<Arc<R>>,
) -> std::result::Result<StageValue, StageError> {
    if segments.len() == 1 {
        return stage.run(&segments[0], resource).await;
    }

    let runs = segments
        .iter()
        .map(|segment| stage.run(segment, resource.clone()));
    let parts = join_all(runs)
        .await
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    stage.merge(parts)
}
