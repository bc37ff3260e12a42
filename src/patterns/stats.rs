//! Usage statistics
//!
//! Two concerns live here:
//! - the per-pattern success-rate estimator, applied on every recorded outcome
//! - the process-local hit/cost telemetry aggregate

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::error::{ForgeError, Result};
use crate::patterns::store::PatternStore;
use crate::types::{Outcome, PatternKind};

/// Mutable statistics of one pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternStats {
    pub use_count: u32,
    pub success_rate: u8,
}

/// Folds one outcome into a pattern's statistics
pub trait SuccessRateEstimator: Send + Sync {
    fn next(&self, current: PatternStats, outcome: Outcome) -> PatternStats;
}

/// Rebuilds a success count from the stored percentage instead of keeping an
/// exact counter. Drifts slightly over many updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateEstimator;

impl SuccessRateEstimator for ApproximateEstimator {
    fn next(&self, current: PatternStats, outcome: Outcome) -> PatternStats {
        let total_uses = current.use_count as u64 + 1;
        // floor(successRate / 100 * useCount), in integers
        let successes = (current.success_rate.min(100) as u64 * current.use_count as u64) / 100;
        let successes = successes + matches!(outcome, Outcome::Success) as u64;
        let rate = (successes as f64 / total_uses as f64 * 100.0).round();

        PatternStats {
            use_count: total_uses.min(u32::MAX as u64) as u32,
            success_rate: rate.clamp(0.0, 100.0) as u8,
        }
    }
}

/// Read-modify-write of a pattern's statistics. Not transactional: concurrent
/// recordings for one pattern are last-write-wins.
pub async fn apply_outcome(
    store: &dyn PatternStore,
    estimator: &dyn SuccessRateEstimator,
    kind: PatternKind,
    id: &str,
    outcome: Outcome,
) -> Result<PatternStats> {
    let record = store
        .get(kind, id)
        .await?
        .ok_or_else(|| ForgeError::NotFound { kind, id: id.to_string() })?;

    let current = PatternStats { use_count: record.use_count, success_rate: record.success_rate };
    let next = estimator.next(current, outcome);
    store.update_stats(kind, id, next.use_count, next.success_rate, Utc::now()).await?;

    debug!(
        "Pattern {} {} {:?}: uses {} -> {}, rate {} -> {}",
        kind, id, outcome, current.use_count, next.use_count, current.success_rate, next.success_rate
    );
    Ok(next)
}

/// Point-in-time copy of the telemetry counters plus derived views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub total_requests: u64,
    pub pattern_matches: u64,
    pub api_calls: u64,
    pub estimated_tokens_saved: u64,
    pub estimated_cost_saved: f64,
    pub pattern_match_percentage: f64,
    pub efficiency_rate: f64,
}

/// Hit/miss/savings counters owned by one orchestrator. Never persisted.
#[derive(Debug)]
pub struct UsageTracker {
    total_requests: AtomicU64,
    pattern_matches: AtomicU64,
    api_calls: AtomicU64,
    estimated_tokens_saved: AtomicU64,
    config: TelemetryConfig,
}

impl UsageTracker {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            pattern_matches: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            estimated_tokens_saved: AtomicU64::new(0),
            config,
        }
    }

    /// Fixed token estimate credited when a request of `kind` is served from a pattern
    pub fn token_estimate(&self, kind: PatternKind) -> u64 {
        match kind {
            PatternKind::FeatureAddition => self.config.feature_token_estimate,
            _ => self.config.default_token_estimate,
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self, kind: PatternKind) {
        self.pattern_matches.fetch_add(1, Ordering::Relaxed);
        self.estimated_tokens_saved.fetch_add(self.token_estimate(kind), Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let pattern_matches = self.pattern_matches.load(Ordering::Relaxed);
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let tokens_saved = self.estimated_tokens_saved.load(Ordering::Relaxed);

        let pattern_match_percentage = if pattern_matches == 0 || total_requests == 0 {
            0.0
        } else {
            pattern_matches as f64 / total_requests as f64 * 100.0
        };

        let mut denominator = api_calls as f64 * self.config.avg_tokens_per_request as f64;
        if denominator == 0.0 {
            denominator = 1.0;
        }

        UsageSnapshot {
            total_requests,
            pattern_matches,
            api_calls,
            estimated_tokens_saved: tokens_saved,
            estimated_cost_saved: tokens_saved as f64 / 1000.0 * self.config.cost_per_1k_tokens,
            pattern_match_percentage,
            efficiency_rate: tokens_saved as f64 / denominator,
        }
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::store::{PatternRecord, SqlitePatternStore};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn stats(use_count: u32, success_rate: u8) -> PatternStats {
        PatternStats { use_count, success_rate }
    }

    #[test]
    fn test_fresh_pattern_stays_at_100_on_successes() {
        let mut current = stats(0, 100);
        for _ in 0..50 {
            current = ApproximateEstimator.next(current, Outcome::Success);
            assert_eq!(current.success_rate, 100);
        }
        assert_eq!(current.use_count, 50);
    }

    #[test]
    fn test_failure_lowers_rate() {
        let next = ApproximateEstimator.next(stats(1, 100), Outcome::Failure);
        assert_eq!(next, stats(2, 50));
        let next = ApproximateEstimator.next(next, Outcome::Failure);
        // floor(0.5 * 2) = 1 success of 3 uses
        assert_eq!(next, stats(3, 33));
    }

    #[test]
    fn test_rate_reconstruction_is_approximate() {
        // 33% of 3 uses floors to 0 successes, so one success lands at 25%
        // rather than the exact 2/4.
        let next = ApproximateEstimator.next(stats(3, 33), Outcome::Success);
        assert_eq!(next, stats(4, 25));
    }

    #[test]
    fn test_rate_stays_in_bounds() {
        let mut current = stats(0, 100);
        let outcomes = [Outcome::Failure, Outcome::Success, Outcome::Failure, Outcome::Failure];
        for i in 0..200 {
            current = ApproximateEstimator.next(current, outcomes[i % outcomes.len()]);
            assert!(current.success_rate <= 100);
        }
        let stored_out_of_range = ApproximateEstimator.next(stats(4, 250), Outcome::Success);
        assert!(stored_out_of_range.success_rate <= 100);
    }

    #[test]
    fn test_match_percentage_zero_without_matches() {
        let tracker = UsageTracker::default();
        for _ in 0..5 {
            tracker.record_request();
            tracker.record_fallback();
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.total_requests, 5);
        assert_eq!(snap.pattern_match_percentage, 0.0);
        assert_eq!(snap.efficiency_rate, 0.0);
    }

    #[test]
    fn test_snapshot_derived_fields() {
        let tracker = UsageTracker::default();
        tracker.record_request();
        tracker.record_hit(PatternKind::Documentation);
        tracker.record_request();
        tracker.record_hit(PatternKind::FeatureAddition);
        tracker.record_request();
        tracker.record_fallback();
        tracker.record_request();
        tracker.record_fallback();

        let snap = tracker.snapshot();
        assert_eq!(snap.pattern_matches, 2);
        assert_eq!(snap.api_calls, 2);
        assert_eq!(snap.estimated_tokens_saved, 6000);
        assert_eq!(snap.pattern_match_percentage, 50.0);
        assert!((snap.estimated_cost_saved - 0.012).abs() < 1e-9);
        // 6000 / (2 * 2000)
        assert!((snap.efficiency_rate - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_with_no_api_calls_uses_unit_denominator() {
        let tracker = UsageTracker::default();
        tracker.record_request();
        tracker.record_hit(PatternKind::IdeaGeneration);
        assert_eq!(tracker.snapshot().efficiency_rate, 2000.0);
    }

    #[tokio::test]
    async fn test_apply_outcome_updates_store() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let record = PatternRecord::new(PatternKind::IdeaExpansion, BTreeMap::new(), json!({}), json!({}));
        let id = store.insert(&record).await.unwrap();

        let next = apply_outcome(&store, &ApproximateEstimator, PatternKind::IdeaExpansion, &id, Outcome::Failure)
            .await
            .unwrap();
        assert_eq!(next, stats(1, 0));

        let loaded = store.get(PatternKind::IdeaExpansion, &id).await.unwrap().unwrap();
        assert_eq!(loaded.use_count, 1);
        assert_eq!(loaded.success_rate, 0);
    }

    #[tokio::test]
    async fn test_apply_outcome_missing_pattern() {
        let store = SqlitePatternStore::in_memory().unwrap();
        let err = apply_outcome(&store, &ApproximateEstimator, PatternKind::CodeFix, "nope", Outcome::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { .. }));
    }
}
