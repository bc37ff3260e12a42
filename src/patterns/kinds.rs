//! How each request type maps onto a pattern collection

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{ForgeError, Result};
use crate::generator::GenerationRequest;
use crate::patterns::similarity::{Probe, TokenizerRegistry};
use crate::types::*;

/// A request that can be answered from, and written back to, a pattern collection.
///
/// The serialized request is the stored input payload; the serialized
/// `Output` is the stored output payload.
pub trait PatternRequest: Serialize + DeserializeOwned + Clone + Send + Sync {
    type Output: Serialize + DeserializeOwned + Send;

    const KIND: PatternKind;

    /// Attributes that must match exactly for a stored pattern to be a candidate
    const FILTER_FIELDS: &'static [&'static str];

    /// Categorical attributes stored alongside the pattern
    fn attributes(&self, tokenizers: &TokenizerRegistry) -> BTreeMap<String, String>;

    /// Comparable view used for similarity scoring
    fn probe(&self) -> Probe;

    fn to_generation(&self) -> GenerationRequest;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ForgeError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

impl PatternRequest for DocsRequest {
    type Output = DocsResponse;
    const KIND: PatternKind = PatternKind::Documentation;
    const FILTER_FIELDS: &'static [&'static str] = &["language", "code_type", "style"];

    fn attributes(&self, tokenizers: &TokenizerRegistry) -> BTreeMap<String, String> {
        let code_type = tokenizers.fingerprint(&self.language, &self.code).code_type();
        BTreeMap::from([
            ("language".to_string(), normalized(&self.language)),
            ("code_type".to_string(), code_type.to_string()),
            ("style".to_string(), normalized(&self.style)),
        ])
    }

    fn probe(&self) -> Probe {
        Probe::source(normalized(&self.language), self.code.clone())
    }

    fn to_generation(&self) -> GenerationRequest {
        GenerationRequest::Documentation(self.clone())
    }

    fn validate(&self) -> Result<()> {
        require("code", &self.code)?;
        require("language", &self.language)
    }
}

impl PatternRequest for CodeRequest {
    type Output = CodeResponse;
    const KIND: PatternKind = PatternKind::CodeGeneration;
    const FILTER_FIELDS: &'static [&'static str] = &["language", "complexity"];

    fn attributes(&self, _tokenizers: &TokenizerRegistry) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("language".to_string(), normalized(&self.language)),
            ("complexity".to_string(), normalized(&self.complexity)),
        ])
    }

    fn probe(&self) -> Probe {
        Probe::text(self.prompt.clone())
    }

    fn to_generation(&self) -> GenerationRequest {
        GenerationRequest::CodeGeneration(self.clone())
    }

    fn validate(&self) -> Result<()> {
        require("prompt", &self.prompt)?;
        require("language", &self.language)
    }
}

impl PatternRequest for FixRequest {
    type Output = FixResponse;
    const KIND: PatternKind = PatternKind::CodeFix;
    const FILTER_FIELDS: &'static [&'static str] = &["language"];

    fn attributes(&self, _tokenizers: &TokenizerRegistry) -> BTreeMap<String, String> {
        BTreeMap::from([("language".to_string(), normalized(&self.language))])
    }

    /// Text carries the errors and the code's own tokens, so two programs of
    /// the same shape with different identifiers or errors stay apart.
    fn probe(&self) -> Probe {
        let text = format!("{}\n{}", self.errors.join("\n"), self.code);
        Probe::source(normalized(&self.language), self.code.clone()).with_text(text)
    }

    fn to_generation(&self) -> GenerationRequest {
        GenerationRequest::CodeFix(self.clone())
    }

    fn validate(&self) -> Result<()> {
        require("code", &self.code)?;
        require("language", &self.language)
    }
}

/// Best-effort language name from a file extension
fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_lowercase();
    Some(match ext.as_str() {
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "cs" => "csharp",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        _ => return None,
    })
}

impl PatternRequest for FeatureRequest {
    type Output = FeatureResponse;
    const KIND: PatternKind = PatternKind::FeatureAddition;
    const FILTER_FIELDS: &'static [&'static str] = &[];

    fn attributes(&self, _tokenizers: &TokenizerRegistry) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn probe(&self) -> Probe {
        let language = self
            .files
            .iter()
            .find_map(|f| f.language.clone().or_else(|| language_for_path(&f.path).map(String::from)))
            .unwrap_or_default();

        // Sorted so file order in the request does not change the score
        let mut files: Vec<&SourceFile> = self.files.iter().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let code = files
            .iter()
            .map(|f| format!("// {}\n{}", f.path, f.content))
            .collect::<Vec<_>>()
            .join("\n");

        Probe::source(normalized(&language), code).with_text(self.feature_description.clone())
    }

    fn to_generation(&self) -> GenerationRequest {
        GenerationRequest::FeatureAddition(self.clone())
    }

    fn validate(&self) -> Result<()> {
        require("featureDescription", &self.feature_description)
    }
}

impl PatternRequest for IdeasRequest {
    type Output = IdeasResponse;
    const KIND: PatternKind = PatternKind::IdeaGeneration;
    const FILTER_FIELDS: &'static [&'static str] = &["complexity"];

    fn attributes(&self, _tokenizers: &TokenizerRegistry) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::from([("complexity".to_string(), normalized(&self.complexity))]);
        let optional = [("theme", &self.theme), ("mod_loader", &self.mod_loader), ("version", &self.version)];
        for (key, value) in optional {
            if let Some(value) = value {
                attributes.insert(key.to_string(), normalized(value));
            }
        }
        attributes
    }

    fn probe(&self) -> Probe {
        Probe::text(self.theme.clone().unwrap_or_default())
    }

    fn to_generation(&self) -> GenerationRequest {
        GenerationRequest::IdeaGeneration(self.clone())
    }

    fn validate(&self) -> Result<()> {
        require("complexity", &self.complexity)
    }
}

impl PatternRequest for ExpandRequest {
    type Output = ExpandResponse;
    const KIND: PatternKind = PatternKind::IdeaExpansion;
    const FILTER_FIELDS: &'static [&'static str] = &[];

    fn attributes(&self, _tokenizers: &TokenizerRegistry) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn probe(&self) -> Probe {
        Probe::text(format!("{} {}", self.title, self.description))
    }

    fn to_generation(&self) -> GenerationRequest {
        GenerationRequest::IdeaExpansion(self.clone())
    }

    fn validate(&self) -> Result<()> {
        require("title", &self.title)
    }
}
