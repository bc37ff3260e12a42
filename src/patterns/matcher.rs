//! Pattern matcher: bounded candidate retrieval, scoring and thresholding

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::MatchingConfig;
use crate::error::Result;
use crate::patterns::kinds::PatternRequest;
use crate::patterns::similarity::{
    BlendScorer, FingerprintScorer, SimilarityScorer, TokenSetScorer, TokenizerRegistry,
};
use crate::patterns::store::{Filter, OrderKey, PatternStore};
use crate::types::PatternKind;

/// Best stored answer for a request, or the empty result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub pattern_id: Option<String>,
    pub matched_output: Option<Value>,
    pub confidence: f64,
}

impl MatchResult {
    pub fn none() -> Self {
        Self { pattern_id: None, matched_output: None, confidence: 0.0 }
    }

    pub fn is_hit(&self) -> bool {
        self.pattern_id.is_some() && self.matched_output.is_some()
    }
}

/// Retrieval and acceptance rules for one kind
#[derive(Clone)]
pub struct MatchPolicy {
    pub order: OrderKey,
    pub limit: usize,
    pub threshold: f64,
    pub scorer: Arc<dyn SimilarityScorer>,
}

impl MatchPolicy {
    /// Default policy for `kind` with limits and thresholds from config
    pub fn for_kind(kind: PatternKind, config: &MatchingConfig, tokenizers: &TokenizerRegistry) -> Self {
        let structure = FingerprintScorer::new(tokenizers.clone());
        let (order, scorer): (OrderKey, Arc<dyn SimilarityScorer>) = match kind {
            PatternKind::IdeaGeneration => (OrderKey::UseCountDesc, Arc::new(TokenSetScorer)),
            PatternKind::IdeaExpansion => (OrderKey::UseCountDesc, Arc::new(TokenSetScorer)),
            PatternKind::CodeGeneration => (OrderKey::SuccessRateDesc, Arc::new(TokenSetScorer)),
            PatternKind::Documentation => (OrderKey::SuccessRateDesc, Arc::new(structure)),
            PatternKind::CodeFix => (OrderKey::SuccessRateDesc, Arc::new(BlendScorer::new(structure, 0.5))),
            PatternKind::FeatureAddition => (OrderKey::SuccessRateDesc, Arc::new(BlendScorer::new(structure, 0.5))),
        };

        Self {
            order,
            limit: config.candidate_limit,
            threshold: config.thresholds.get(kind),
            scorer,
        }
    }
}

/// Finds the best stored pattern for a request
#[derive(Clone)]
pub struct PatternMatcher {
    store: Arc<dyn PatternStore>,
    policies: HashMap<PatternKind, MatchPolicy>,
    tokenizers: TokenizerRegistry,
}

impl PatternMatcher {
    pub fn new(store: Arc<dyn PatternStore>, config: &MatchingConfig, tokenizers: TokenizerRegistry) -> Self {
        let policies = PatternKind::ALL
            .iter()
            .map(|kind| (*kind, MatchPolicy::for_kind(*kind, config, &tokenizers)))
            .collect();
        Self { store, policies, tokenizers }
    }

    /// Replace the policy for one kind
    pub fn with_policy(mut self, kind: PatternKind, policy: MatchPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn policy(&self, kind: PatternKind) -> Option<&MatchPolicy> {
        self.policies.get(&kind)
    }

    pub fn tokenizers(&self) -> &TokenizerRegistry {
        &self.tokenizers
    }

    /// Best match at or above the kind's threshold. Store and scoring errors
    /// are logged and reported as no match.
    pub async fn find_match<R: PatternRequest>(&self, request: &R) -> MatchResult {
        match self.try_match(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Pattern matching for {} failed, treating as miss: {}", R::KIND, e);
                MatchResult::none()
            }
        }
    }

    async fn try_match<R: PatternRequest>(&self, request: &R) -> Result<MatchResult> {
        let Some(policy) = self.policies.get(&R::KIND) else {
            return Ok(MatchResult::none());
        };

        let attributes = request.attributes(&self.tokenizers);
        let filters: Vec<Filter> = R::FILTER_FIELDS
            .iter()
            .map(|field| Filter::eq(*field, attributes.get(*field).cloned().unwrap_or_default()))
            .collect();

        let candidates = self
            .store
            .query_candidates(R::KIND, &filters, policy.order, policy.limit)
            .await?;
        if candidates.is_empty() {
            debug!("No {} candidates", R::KIND);
            return Ok(MatchResult::none());
        }

        let probe = request.probe();
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            let stored: R = match serde_json::from_value(candidate.input.clone()) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Skipping unreadable {} pattern {}: {}", R::KIND, candidate.id, e);
                    continue;
                }
            };
            let score = policy.scorer.score(&probe, &stored.probe())?;
            debug!("{} candidate {} scored {:.3}", R::KIND, candidate.id, score);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) if score >= policy.threshold => {
                let record = &candidates[idx];
                Ok(MatchResult {
                    pattern_id: Some(record.id.clone()),
                    matched_output: Some(record.output.clone()),
                    confidence: score,
                })
            }
            Some((_, score)) => {
                debug!("Best {} score {:.3} below threshold {}", R::KIND, score, policy.threshold);
                Ok(MatchResult::none())
            }
            None => Ok(MatchResult::none()),
        }
    }
}
