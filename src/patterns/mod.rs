//! Pattern-learning cache
//!
//! Answers generation requests from recorded input -> output examples and
//! falls back to the external generator on a miss:
//! - `store`: durable per-kind pattern collections (SQLite)
//! - `similarity`: token-set and structural-fingerprint scoring
//! - `matcher`: bounded candidate retrieval and thresholding
//! - `orchestrator`: the match-or-generate protocol with write-through
//! - `stats`: per-pattern success rates and process-local savings telemetry

pub mod store;
pub mod similarity;
pub mod kinds;
pub mod matcher;
pub mod stats;
pub mod orchestrator;

pub use store::{Filter, FilterOp, KindSummary, OrderKey, PatternRecord, PatternStore, SqlitePatternStore};
pub use similarity::{
    BlendScorer, Fingerprint, FingerprintScorer, KeywordTokenizer, Probe, SimilarityScorer, StructureTokenizer,
    TokenSetScorer, TokenizerRegistry,
};
pub use kinds::PatternRequest;
pub use matcher::{MatchPolicy, MatchResult, PatternMatcher};
pub use stats::{ApproximateEstimator, PatternStats, SuccessRateEstimator, UsageSnapshot, UsageTracker};
pub use orchestrator::FallbackOrchestrator;
