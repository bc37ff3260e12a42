//! Similarity scoring between a request and a stored pattern
//!
//! Two strategies:
//! - token-set overlap (Jaccard) for free-text prompts
//! - structural fingerprint + length blend for source code
//!
//! Both are pure and deterministic; scores are always in [0, 1].

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{ForgeError, Result};

/// Weight of the fingerprint term in the structural blend
const FINGERPRINT_WEIGHT: f64 = 0.7;
/// Weight of the length term in the structural blend
const SIZE_WEIGHT: f64 = 0.3;

/// The comparable view of a request or a stored pattern input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Probe {
    /// Free text compared by token overlap
    pub text: Option<String>,
    /// Source text compared by structure
    pub code: Option<String>,
    /// Language of `code`, used to pick a tokenizer
    pub language: Option<String>,
}

impl Probe {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Default::default() }
    }

    pub fn source(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            text: None,
            code: Some(code.into()),
            language: Some(language.into()),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Scores a request probe against a candidate probe
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, request: &Probe, candidate: &Probe) -> Result<f64>;
}

// ============ Token-set overlap ============

/// Lower-case, whitespace-split token set
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Jaccard similarity of the two token sets. Two empty inputs score 0.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let a = tokenize(a);
    let b = tokenize(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    intersection as f64 / union as f64
}

/// Jaccard overlap on `Probe::text`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetScorer;

impl SimilarityScorer for TokenSetScorer {
    fn score(&self, request: &Probe, candidate: &Probe) -> Result<f64> {
        let (Some(a), Some(b)) = (&request.text, &candidate.text) else {
            return Err(ForgeError::Match("token-set scoring needs text on both sides".into()));
        };
        Ok(token_set_similarity(a, b))
    }
}

// ============ Structural fingerprint ============

/// Coarse structural signature of a piece of source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub types: usize,
    pub functions: usize,
    pub imports: usize,
    pub loops: usize,
    pub conditionals: usize,
}

impl Fingerprint {
    /// Dominant declaration form, used as the documentation `code_type`
    pub fn code_type(&self) -> &'static str {
        if self.types > 0 {
            "class"
        } else if self.functions > 0 {
            "function"
        } else {
            "snippet"
        }
    }
}

/// Produces a [`Fingerprint`] for one source language
pub trait StructureTokenizer: Send + Sync {
    fn fingerprint(&self, source: &str) -> Fingerprint;
}

/// Regex-driven tokenizer; each field counts the matches of one pattern
pub struct KeywordTokenizer {
    types: &'static Regex,
    functions: &'static Regex,
    imports: &'static Regex,
    loops: &'static Regex,
    conditionals: &'static Regex,
}

impl StructureTokenizer for KeywordTokenizer {
    fn fingerprint(&self, source: &str) -> Fingerprint {
        Fingerprint {
            types: self.types.find_iter(source).count(),
            functions: self.functions.find_iter(source).count(),
            imports: self.imports.find_iter(source).count(),
            loops: self.loops.find_iter(source).count(),
            conditionals: self.conditionals.find_iter(source).count(),
        }
    }
}

static C_TYPES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|interface|enum|struct|trait|record|object)\s+[A-Za-z_]\w*").unwrap()
});
static C_FUNCTIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:fn|function|func|fun)\s+[A-Za-z_]\w*|\b(?:public|private|protected|static)\s+(?:[\w<>\[\],]+\s+)*[A-Za-z_]\w*\s*\(",
    )
    .unwrap()
});
static C_IMPORTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:import|use|using|#include|require)\b").unwrap());
static C_LOOPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:for|while|do|loop|foreach)\b").unwrap());
static C_CONDITIONALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:if|switch|match|when)\b").unwrap());

static PY_TYPES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*class\s+[A-Za-z_]\w*").unwrap());
static PY_FUNCTIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?def\s+[A-Za-z_]\w*").unwrap());
static PY_IMPORTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:import|from)\s+\w").unwrap());
static PY_LOOPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:for|while)\b").unwrap());
static PY_CONDITIONALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:if|elif|match)\b").unwrap());

impl KeywordTokenizer {
    /// Java, Kotlin, JavaScript, TypeScript, C, C++, C#, Rust, Go
    pub fn c_family() -> Self {
        Self {
            types: &C_TYPES,
            functions: &C_FUNCTIONS,
            imports: &C_IMPORTS,
            loops: &C_LOOPS,
            conditionals: &C_CONDITIONALS,
        }
    }

    pub fn python() -> Self {
        Self {
            types: &PY_TYPES,
            functions: &PY_FUNCTIONS,
            imports: &PY_IMPORTS,
            loops: &PY_LOOPS,
            conditionals: &PY_CONDITIONALS,
        }
    }
}

/// Language name -> tokenizer. Unknown languages use the fallback.
#[derive(Clone)]
pub struct TokenizerRegistry {
    by_language: HashMap<String, Arc<dyn StructureTokenizer>>,
    fallback: Arc<dyn StructureTokenizer>,
}

impl TokenizerRegistry {
    /// Empty registry with the given fallback
    pub fn new(fallback: Arc<dyn StructureTokenizer>) -> Self {
        Self { by_language: HashMap::new(), fallback }
    }

    /// Registry with the C-family and Python tokenizers installed
    pub fn with_builtin() -> Self {
        let c_family: Arc<dyn StructureTokenizer> = Arc::new(KeywordTokenizer::c_family());
        let mut registry = Self::new(c_family.clone());
        for lang in [
            "java", "kotlin", "javascript", "js", "typescript", "ts", "c", "cpp", "c++", "csharp", "c#",
            "rust", "go",
        ] {
            registry.register(lang, c_family.clone());
        }
        registry.register("python", Arc::new(KeywordTokenizer::python()));
        registry.register("py", Arc::new(KeywordTokenizer::python()));
        registry
    }

    pub fn register(&mut self, language: &str, tokenizer: Arc<dyn StructureTokenizer>) {
        self.by_language.insert(language.to_lowercase(), tokenizer);
    }

    pub fn get(&self, language: &str) -> &dyn StructureTokenizer {
        self.by_language
            .get(&language.to_lowercase())
            .map(|t| t.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn fingerprint(&self, language: &str, source: &str) -> Fingerprint {
        self.get(language).fingerprint(source)
    }
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// `1 - |lenA - lenB| / max(lenA, lenB)`; two empty inputs are identical
pub fn size_similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let max = len_a.max(len_b);
    if max == 0 {
        return 1.0;
    }
    1.0 - (len_a.abs_diff(len_b) as f64 / max as f64)
}

/// Fingerprint equality blended with length similarity
#[derive(Clone, Default)]
pub struct FingerprintScorer {
    tokenizers: TokenizerRegistry,
}

impl FingerprintScorer {
    pub fn new(tokenizers: TokenizerRegistry) -> Self {
        Self { tokenizers }
    }

    pub fn similarity(&self, language: &str, a: &str, b: &str) -> f64 {
        let tokenizer = self.tokenizers.get(language);
        let fingerprint_similarity = if tokenizer.fingerprint(a) == tokenizer.fingerprint(b) { 1.0 } else { 0.0 };
        FINGERPRINT_WEIGHT * fingerprint_similarity + SIZE_WEIGHT * size_similarity(a, b)
    }
}

impl SimilarityScorer for FingerprintScorer {
    fn score(&self, request: &Probe, candidate: &Probe) -> Result<f64> {
        let (Some(a), Some(b)) = (&request.code, &candidate.code) else {
            return Err(ForgeError::Match("fingerprint scoring needs code on both sides".into()));
        };
        let language = request.language.as_deref().unwrap_or_default();
        Ok(self.similarity(language, a, b))
    }
}

/// Weighted blend of token-set overlap on text and structure on code
#[derive(Clone)]
pub struct BlendScorer {
    structure: FingerprintScorer,
    text_weight: f64,
}

impl BlendScorer {
    pub fn new(structure: FingerprintScorer, text_weight: f64) -> Self {
        Self { structure, text_weight: text_weight.clamp(0.0, 1.0) }
    }
}

impl SimilarityScorer for BlendScorer {
    fn score(&self, request: &Probe, candidate: &Probe) -> Result<f64> {
        let text = TokenSetScorer.score(request, candidate)?;
        let structure = self.structure.score(request, candidate)?;
        Ok(self.text_weight * text + (1.0 - self.text_weight) * structure)
    }
}
