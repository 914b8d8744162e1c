//! End-to-end orchestration tests: caching across calls, concurrent
//! fan-out, failure policy, timeout drain, and the built-in stages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docanalyzer_core::config::AnalyzerConfig;
use docanalyzer_core::core::{
    AnalysisRequest, AnalysisStage, OrchestratorError, StageError, StageId, StageOutcome,
    StageSet, StageValue,
};
use docanalyzer_core::orchestrator::Orchestrator;
use docanalyzer_core::resource::{boxed_factory, ResourceError, ResourceFactory, ResourceState};
use docanalyzer_core::stages::{builtin_stages, ClauseSimplifier, SimplifierModel};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("docanalyzer_core=debug")
        .with_test_writer()
        .try_init();
}

/// Test stage that counts invocations and produces a value derived only
/// from its input text, so identical calls yield identical values.
struct CountingStage {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    fail: bool,
    delay: Option<Duration>,
}

impl CountingStage {
    fn ok(name: &'static str, calls: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls,
            fail: false,
            delay: None,
        })
    }

    fn failing(name: &'static str, calls: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls,
            fail: true,
            delay: None,
        })
    }

    fn slow(name: &'static str, calls: Arc<AtomicUsize>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls,
            fail: false,
            delay: Some(delay),
        })
    }
}

#[async_trait]
impl AnalysisStage<()> for CountingStage {
    fn id(&self) -> StageId {
        StageId::new(self.name)
    }

    async fn run(
        &self,
        text: &str,
        _resource: Option<Arc<()>>,
    ) -> Result<StageValue, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StageError::Execution("deliberate failure".to_string()));
        }
        Ok(serde_json::json!({ "stage": self.name, "text_len": text.len() }))
    }

    fn merge(&self, parts: Vec<StageValue>) -> Result<StageValue, StageError> {
        Ok(StageValue::Array(parts))
    }
}

/// Stage that declares a need for the shared resource.
struct ResourceHungryStage;

#[async_trait]
impl AnalysisStage<()> for ResourceHungryStage {
    fn id(&self) -> StageId {
        StageId::new("hungry")
    }

    fn needs_resource(&self) -> bool {
        true
    }

    async fn run(
        &self,
        _text: &str,
        resource: Option<Arc<()>>,
    ) -> Result<StageValue, StageError> {
        assert!(resource.is_some(), "orchestrator must supply the resource");
        Ok(serde_json::json!("fed"))
    }

    fn merge(&self, parts: Vec<StageValue>) -> Result<StageValue, StageError> {
        Ok(StageValue::Array(parts))
    }
}

fn unit_factory() -> ResourceFactory<()> {
    boxed_factory(|| async { Ok(()) })
}

fn config_for(stages: &[&str], mandatory: &[&str]) -> AnalyzerConfig {
    AnalyzerConfig::builder()
        .enabled_stages(stages.iter().map(|s| StageId::new(*s)).collect())
        .mandatory_stages(mandatory.iter().map(|s| StageId::new(*s)))
        .build()
}

#[tokio::test]
async fn test_second_identical_call_hits_cache_for_every_stage() {
    init_tracing();
    let classify_calls = Arc::new(AtomicUsize::new(0));
    let extract_calls = Arc::new(AtomicUsize::new(0));

    let mut stages: StageSet<()> = StageSet::new();
    stages.register(CountingStage::ok("classify", Arc::clone(&classify_calls)));
    stages.register(CountingStage::ok("extract", Arc::clone(&extract_calls)));

    let orchestrator = Orchestrator::new(
        config_for(&["classify", "extract"], &[]),
        stages,
        unit_factory(),
    )
    .unwrap();

    let text = "identical document text";
    let first = orchestrator.analyze(AnalysisRequest::new(text)).await.unwrap();
    assert!(first.reports.iter().all(|r| !r.from_cache));
    assert_eq!(classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(extract_calls.load(Ordering::SeqCst), 1);

    let second = orchestrator.analyze(AnalysisRequest::new(text)).await.unwrap();
    assert!(
        second.reports.iter().all(|r| r.from_cache),
        "every stage lookup must hit on the second call"
    );
    assert_eq!(classify_calls.load(Ordering::SeqCst), 1, "stage logic not re-invoked");
    assert_eq!(extract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.cache_stats().hits, 2);
}

#[tokio::test]
async fn test_results_are_deterministic_across_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stages: StageSet<()> = StageSet::new();
    // Register in the opposite order of configuration: assembly order must
    // come from configuration alone.
    stages.register(CountingStage::ok("beta", Arc::clone(&calls)));
    stages.register(CountingStage::ok("alpha", Arc::clone(&calls)));

    let orchestrator = Orchestrator::new(
        config_for(&["alpha", "beta"], &[]),
        stages,
        unit_factory(),
    )
    .unwrap();

    let first = orchestrator
        .analyze(AnalysisRequest::new("stable input"))
        .await
        .unwrap();
    let second = orchestrator
        .analyze(AnalysisRequest::new("stable input"))
        .await
        .unwrap();

    let order: Vec<_> = first.reports.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(order, vec!["alpha", "beta"]);
    assert_eq!(first.fingerprint, second.fingerprint);
    for (a, b) in first.reports.iter().zip(&second.reports) {
        assert_eq!(a.stage, b.stage);
        assert_eq!(a.outcome.value(), b.outcome.value());
    }
}

#[tokio::test]
async fn test_optional_stage_failure_is_reported_not_fatal() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stages: StageSet<()> = StageSet::new();
    stages.register(CountingStage::ok("good", Arc::clone(&calls)));
    stages.register(CountingStage::failing("flaky", Arc::clone(&calls)));

    let orchestrator = Orchestrator::new(
        config_for(&["good", "flaky"], &[]),
        stages,
        unit_factory(),
    )
    .unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("some text"))
        .await
        .unwrap();

    assert_eq!(result.succeeded(), 1);
    assert_eq!(result.failed(), 1);
    let flaky = result.report(&StageId::new("flaky")).unwrap();
    assert!(matches!(&flaky.outcome, StageOutcome::Failed { reason } if reason.contains("deliberate")));

    // A failed stage stores nothing: only the good stage is cached.
    assert_eq!(orchestrator.cache_len(), 1);
}

#[tokio::test]
async fn test_mandatory_stage_failure_fails_the_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stages: StageSet<()> = StageSet::new();
    stages.register(CountingStage::ok("good", Arc::clone(&calls)));
    stages.register(CountingStage::failing("vital", Arc::clone(&calls)));

    let orchestrator = Orchestrator::new(
        config_for(&["good", "vital"], &["vital"]),
        stages,
        unit_factory(),
    )
    .unwrap();

    let err = orchestrator
        .analyze(AnalysisRequest::new("some text"))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::MandatoryStageFailed { stage, .. } => {
            assert_eq!(stage, StageId::new("vital"));
        }
        other => panic!("expected mandatory-stage failure, got: {other}"),
    }

    // The sibling stage still ran and cached its result.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.cache_len(), 1);
}

#[tokio::test]
async fn test_unrequested_stage_is_skipped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stages: StageSet<()> = StageSet::new();
    stages.register(CountingStage::ok("wanted", Arc::clone(&calls)));
    stages.register(CountingStage::ok("unwanted", Arc::clone(&calls)));

    let orchestrator = Orchestrator::new(
        config_for(&["wanted", "unwanted"], &[]),
        stages,
        unit_factory(),
    )
    .unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("text").with_stages(vec![StageId::new("wanted")]))
        .await
        .unwrap();

    assert_eq!(result.reports.len(), 2, "skipped stages still appear in order");
    assert_eq!(
        result.report(&StageId::new("unwanted")).unwrap().outcome,
        StageOutcome::Skipped
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1, "skipped stage never invoked");
}

#[tokio::test]
async fn test_timeout_returns_early_while_stages_drain() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stages: StageSet<()> = StageSet::new();
    stages.register(CountingStage::slow(
        "slow",
        Arc::clone(&calls),
        Duration::from_millis(150),
    ));

    let config = AnalyzerConfig::builder()
        .enabled_stages(vec![StageId::new("slow")])
        .mandatory_stages([])
        .stage_timeout(Duration::from_millis(30))
        .build();
    let orchestrator = Orchestrator::new(config, stages, unit_factory()).unwrap();

    let err = orchestrator
        .analyze(AnalysisRequest::new("big document"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Timeout { .. }));
    assert_eq!(orchestrator.cache_len(), 0, "stage still running at timeout");

    // The spawned stage keeps draining in the background and its work is
    // not wasted: the cache fills after it completes.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(orchestrator.cache_len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resource_failure_surfaces_at_call_level() {
    let mut stages: StageSet<()> = StageSet::new();
    stages.register(Arc::new(ResourceHungryStage));

    let config = config_for(&["hungry"], &[]);
    let factory: ResourceFactory<()> = boxed_factory(|| async {
        Err(ResourceError::InitializationFailed("no model".to_string()))
    });
    let orchestrator = Orchestrator::new(config, stages, factory).unwrap();

    // Even though the stage is optional, a resource initialization failure
    // is a call-level error.
    let err = orchestrator
        .analyze(AnalysisRequest::new("text"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceInitialization(_)));
    assert_eq!(orchestrator.resource_state(), ResourceState::Failed);
}

#[tokio::test]
async fn test_resource_initialized_once_across_calls() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut stages: StageSet<()> = StageSet::new();
    stages.register(Arc::new(ResourceHungryStage));

    let factory: ResourceFactory<()> = {
        let loads = Arc::clone(&loads);
        boxed_factory(move || {
            let loads = Arc::clone(&loads);
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    // Cache disabled so every call actually invokes the stage.
    let config = AnalyzerConfig::builder()
        .cache_capacity(0)
        .enabled_stages(vec![StageId::new("hungry")])
        .mandatory_stages([])
        .build();
    let orchestrator = Orchestrator::new(config, stages, factory).unwrap();

    for i in 0..4 {
        let result = orchestrator
            .analyze(AnalysisRequest::new(format!("document {i}")))
            .await
            .unwrap();
        assert_eq!(result.succeeded(), 1);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1, "factory invoked at most once");
}

#[tokio::test]
async fn test_builtin_stages_end_to_end() {
    init_tracing();
    let orchestrator = Orchestrator::new(
        AnalyzerConfig::default(),
        builtin_stages().unwrap(),
        boxed_factory(|| async { SimplifierModel::load() }),
    )
    .unwrap();

    let text = "This Non-Disclosure Agreement is entered into on 01/15/2024 between \
                Acme Corp and Jane Smith. The receiving party shall keep all \
                confidential information and trade secrets strictly secret. \
                A penalty of $50,000 applies to any breach, payable within 30 days. \
                Notwithstanding the foregoing, disclosures required by law are permitted.";

    let result = orchestrator
        .analyze(AnalysisRequest::new(text))
        .await
        .unwrap();

    assert_eq!(result.reports.len(), 3);
    assert_eq!(result.succeeded(), 3);

    let classification = result
        .report(&StageId::new("doc-classify"))
        .and_then(|r| r.outcome.value())
        .unwrap();
    assert_eq!(classification["predicted_type"], "nda");

    let entities = result
        .report(&StageId::new("entity-extract"))
        .and_then(|r| r.outcome.value())
        .unwrap();
    assert!(entities["total"].as_u64().unwrap() > 0);

    let simplification = result
        .report(&StageId::new("clause-simplify"))
        .and_then(|r| r.outcome.value())
        .unwrap();
    assert!(!simplification["clauses"].as_array().unwrap().is_empty());

    // Identical re-analysis is served entirely from cache.
    let second = orchestrator.analyze(AnalysisRequest::new(text)).await.unwrap();
    assert!(second.reports.iter().all(|r| r.from_cache));
}

#[tokio::test]
async fn test_oversized_document_is_chunked_and_merged() {
    let mut stages: StageSet<SimplifierModel> = StageSet::new();
    // A tiny input limit forces the chunking path on a modest document.
    stages.register(Arc::new(ClauseSimplifier::with_max_input_len(120))
        as Arc<dyn AnalysisStage<SimplifierModel>>);

    let config = AnalyzerConfig::builder()
        .max_chunk_size(100)
        .enabled_stages(vec![StageId::new("clause-simplify")])
        .mandatory_stages([StageId::new("clause-simplify")])
        .build();
    let orchestrator = Orchestrator::new(
        config,
        stages,
        boxed_factory(|| async { SimplifierModel::load() }),
    )
    .unwrap();

    let text = "The tenant shall pay rent forthwith upon the first day of each month. \
                The landlord shall maintain the premises in accordance with applicable law. \
                Notwithstanding anything herein, either party may terminate pursuant to \
                thirty days written notice delivered to the other party.";
    assert!(text.len() > 120);

    let result = orchestrator
        .analyze(AnalysisRequest::new(text))
        .await
        .unwrap();

    let output = result.reports[0].outcome.value().unwrap();
    assert!(
        !output["clauses"].as_array().unwrap().is_empty(),
        "chunked segments must merge into a combined output"
    );
}
