//! Pattern Forge - pattern-learning cache for AI-assisted mod development
//!
//! Serves documentation, code generation, code fixes, feature additions and
//! idea generation from previously recorded examples, and only calls the
//! external LLM when no stored pattern is similar enough.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pattern_forge::{Config, FallbackOrchestrator, OpenRouterGenerator, SqlitePatternStore};
//! use pattern_forge::types::DocsRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(SqlitePatternStore::new(&config.storage.database_path).await?);
//!     let generator = Arc::new(OpenRouterGenerator::new(&config.generator, config.api_key()?)?);
//!     let forge = FallbackOrchestrator::new(store, generator, &config);
//!
//!     let docs = forge.generate_docs(DocsRequest {
//!         code: "class Foo {}".into(),
//!         language: "java".into(),
//!         style: "javadoc".into(),
//!     }).await?;
//!     println!("{}", docs.text);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod generator;
pub mod patterns;
pub mod server;
pub mod cli;

pub use config::Config;
pub use error::{ForgeError, GenerationError};
pub use generator::{GenerationRequest, Generator, OpenRouterGenerator};
pub use patterns::{FallbackOrchestrator, PatternStore, SqlitePatternStore, UsageSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - pattern-learning generation cache", NAME, VERSION)
}
