//! Fallback orchestrator
//!
//! Every operation follows the same protocol: try the pattern matcher, serve
//! the stored output on a hit, otherwise call the generator once and write
//! the fresh result back as a new pattern.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ForgeError, GenerationError, Result};
use crate::generator::Generator;
use crate::patterns::kinds::PatternRequest;
use crate::patterns::matcher::PatternMatcher;
use crate::patterns::similarity::TokenizerRegistry;
use crate::patterns::stats::{
    apply_outcome, ApproximateEstimator, PatternStats, SuccessRateEstimator, UsageSnapshot, UsageTracker,
};
use crate::patterns::store::{KindSummary, PatternRecord, PatternStore};
use crate::types::*;

/// Routes requests between the pattern store and the external generator
#[derive(Clone)]
pub struct FallbackOrchestrator {
    store: Arc<dyn PatternStore>,
    matcher: PatternMatcher,
    generator: Arc<dyn Generator>,
    estimator: Arc<dyn SuccessRateEstimator>,
    usage: Arc<UsageTracker>,
    matching_enabled: bool,
}

impl FallbackOrchestrator {
    pub fn new(store: Arc<dyn PatternStore>, generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self::with_tokenizers(store, generator, config, TokenizerRegistry::with_builtin())
    }

    /// Build with deployment-specific source tokenizers
    pub fn with_tokenizers(
        store: Arc<dyn PatternStore>,
        generator: Arc<dyn Generator>,
        config: &Config,
        tokenizers: TokenizerRegistry,
    ) -> Self {
        Self {
            matcher: PatternMatcher::new(store.clone(), &config.matching, tokenizers),
            store,
            generator,
            estimator: Arc::new(ApproximateEstimator),
            usage: Arc::new(UsageTracker::new(config.telemetry.clone())),
            matching_enabled: config.matching.enabled,
        }
    }

    /// Swap the per-pattern success-rate estimator
    pub fn with_estimator(mut self, estimator: Arc<dyn SuccessRateEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Share a telemetry aggregate between orchestrators
    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn matching_enabled(&self) -> bool {
        self.matching_enabled
    }

    pub async fn generate_docs(&self, request: DocsRequest) -> Result<DocsResponse> {
        self.resolve(&request).await
    }

    pub async fn generate_code(&self, request: CodeRequest) -> Result<CodeResponse> {
        self.resolve(&request).await
    }

    pub async fn fix_code(&self, request: FixRequest) -> Result<FixResponse> {
        self.resolve(&request).await
    }

    /// Never fails: when both matching and generation fail the original
    /// files come back unchanged with an explanation.
    pub async fn add_features(&self, request: FeatureRequest) -> FeatureResponse {
        match self.resolve(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Feature addition failed, returning original files: {}", e);
                FeatureResponse {
                    files: request.files,
                    explanation: format!(
                        "Could not add the requested feature ({}). The original files are returned unchanged.",
                        e
                    ),
                    logs: vec![format!("feature addition failed: {}", e)],
                }
            }
        }
    }

    pub async fn generate_ideas(&self, request: IdeasRequest) -> Result<IdeasResponse> {
        self.resolve(&request).await
    }

    pub async fn expand_idea(&self, request: ExpandRequest) -> Result<ExpandResponse> {
        self.resolve(&request).await
    }

    pub fn usage_metrics(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Record how a served pattern worked out for the caller
    pub async fn report_outcome(&self, kind: PatternKind, pattern_id: &str, outcome: Outcome) -> Result<PatternStats> {
        apply_outcome(self.store.as_ref(), self.estimator.as_ref(), kind, pattern_id, outcome).await
    }

    pub async fn pattern_summary(&self) -> Result<Vec<KindSummary>> {
        self.store.summary().await
    }

    async fn resolve<R: PatternRequest>(&self, request: &R) -> Result<R::Output> {
        request.validate()?;
        self.usage.record_request();

        if self.matching_enabled {
            if let Some(output) = self.serve_from_pattern(request).await {
                return Ok(output);
            }
        }

        self.usage.record_fallback();
        let generated = self.generator.generate(request.to_generation()).await?;
        let output: R::Output = serde_json::from_value(generated)
            .map_err(|e| ForgeError::Generation(GenerationError::Malformed(e.to_string())))?;

        self.write_through(request, &output).await;
        Ok(output)
    }

    async fn serve_from_pattern<R: PatternRequest>(&self, request: &R) -> Option<R::Output> {
        let result = self.matcher.find_match(request).await;
        let (Some(pattern_id), Some(stored)) = (result.pattern_id, result.matched_output) else {
            return None;
        };

        let output: R::Output = match serde_json::from_value(stored) {
            Ok(output) => output,
            Err(e) => {
                warn!("Stored {} pattern {} has unreadable output, falling back: {}", R::KIND, pattern_id, e);
                return None;
            }
        };

        info!("Served {} from pattern {} (confidence {:.2})", R::KIND, pattern_id, result.confidence);
        self.usage.record_hit(R::KIND);
        if let Err(e) = self.report_outcome(R::KIND, &pattern_id, Outcome::Success).await {
            warn!("Failed to update stats for pattern {}: {}", pattern_id, e);
        }
        Some(output)
    }

    /// Persist a fresh generation as a new pattern. Failures are logged only.
    async fn write_through<R: PatternRequest>(&self, request: &R, output: &R::Output) {
        let record = match (serde_json::to_value(request), serde_json::to_value(output)) {
            (Ok(input), Ok(output)) => {
                PatternRecord::new(R::KIND, request.attributes(self.matcher.tokenizers()), input, output)
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Could not serialize {} pattern for storage: {}", R::KIND, e);
                return;
            }
        };

        match self.store.insert(&record).await {
            Ok(id) => info!("Stored new {} pattern {}", R::KIND, id),
            Err(e) => warn!("Failed to store {} pattern: {}", R::KIND, e),
        }
    }
}
