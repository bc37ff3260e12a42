//! Shared request/response types for the exposed operations

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Transformation kind. Each kind owns one pattern collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Documentation,
    CodeGeneration,
    CodeFix,
    FeatureAddition,
    IdeaGeneration,
    IdeaExpansion,
}

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Documentation,
        PatternKind::CodeGeneration,
        PatternKind::CodeFix,
        PatternKind::FeatureAddition,
        PatternKind::IdeaGeneration,
        PatternKind::IdeaExpansion,
    ];

    /// SQLite table holding this kind's patterns
    pub fn table(&self) -> &'static str {
        match self {
            PatternKind::Documentation => "doc_patterns",
            PatternKind::CodeGeneration => "code_patterns",
            PatternKind::CodeFix => "fix_patterns",
            PatternKind::FeatureAddition => "feature_patterns",
            PatternKind::IdeaGeneration => "idea_patterns",
            PatternKind::IdeaExpansion => "expansion_patterns",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Documentation => "documentation",
            PatternKind::CodeGeneration => "code_generation",
            PatternKind::CodeFix => "code_fix",
            PatternKind::FeatureAddition => "feature_addition",
            PatternKind::IdeaGeneration => "idea_generation",
            PatternKind::IdeaExpansion => "idea_expansion",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = crate::error::ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "documentation" | "docs" => Ok(PatternKind::Documentation),
            "code_generation" | "code" => Ok(PatternKind::CodeGeneration),
            "code_fix" | "fix" => Ok(PatternKind::CodeFix),
            "feature_addition" | "features" => Ok(PatternKind::FeatureAddition),
            "idea_generation" | "ideas" => Ok(PatternKind::IdeaGeneration),
            "idea_expansion" | "expand" => Ok(PatternKind::IdeaExpansion),
            other => Err(crate::error::ForgeError::InvalidInput(format!(
                "unknown pattern kind '{}'",
                other
            ))),
        }
    }
}

/// Outcome recorded against a pattern after it was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// One file of a project, used by feature addition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

// ============ Documentation ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsRequest {
    pub code: String,
    pub language: String,
    #[serde(default = "default_doc_style")]
    pub style: String,
}

fn default_doc_style() -> String {
    "standard".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsResponse {
    pub text: String,
}

// ============ Code generation ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub prompt: String,
    pub language: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default = "default_complexity")]
    pub complexity: String,
}

fn default_complexity() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeResponse {
    pub code: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_file_name: Option<String>,
}

// ============ Code fix ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRequest {
    pub code: String,
    #[serde(default)]
    pub errors: Vec<String>,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResponse {
    pub code: String,
    #[serde(default)]
    pub explanation: String,
}

// ============ Feature addition ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    pub files: Vec<SourceFile>,
    pub feature_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResponse {
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub logs: Vec<String>,
}

// ============ Ideas ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeasRequest {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default = "default_complexity")]
    pub complexity: String,
    #[serde(default)]
    pub mod_loader: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub existing_ideas: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeasResponse {
    pub ideas: Vec<Idea>,
    #[serde(default)]
    pub inspirations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandResponse {
    pub expanded_idea: serde_json::Value,
}
