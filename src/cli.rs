//! CLI interface for pattern-forge

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{self, Config};
use crate::generator::OpenRouterGenerator;
use crate::patterns::{FallbackOrchestrator, SqlitePatternStore};
use crate::types::*;

#[derive(Parser)]
#[command(name = "pattern-forge")]
#[command(about = "Pattern-learning cache in front of an LLM code assistant", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
        /// Always call the generator, never serve stored patterns
        #[arg(long)]
        no_matching: bool,
    },
    /// Generate documentation for a source file
    Docs {
        /// Source file to document
        file: PathBuf,
        /// Language (guessed from the file extension when omitted)
        #[arg(short, long)]
        language: Option<String>,
        /// Documentation style
        #[arg(short, long, default_value = "standard")]
        style: String,
    },
    /// Generate code from a prompt
    Code {
        prompt: String,
        #[arg(short, long, default_value = "java")]
        language: String,
        /// File whose content is passed as extra context
        #[arg(long)]
        context: Option<PathBuf>,
        #[arg(long, default_value = "medium")]
        complexity: String,
    },
    /// Fix a source file given its compiler errors
    Fix {
        file: PathBuf,
        /// One error message per flag
        #[arg(short, long = "error")]
        errors: Vec<String>,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Add a feature across a set of files
    Features {
        /// What to add
        description: String,
        /// Files to modify
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Brainstorm mod ideas
    Ideas {
        #[arg(short, long)]
        theme: Option<String>,
        #[arg(long, default_value = "medium")]
        complexity: String,
        #[arg(long)]
        mod_loader: Option<String>,
        /// Target game version
        #[arg(long = "game-version")]
        game_version: Option<String>,
    },
    /// Expand a short idea into a detailed plan
    Expand {
        title: String,
        description: String,
    },
    /// Show usage metrics of a running server
    Metrics,
    /// Show stored pattern counts per kind
    Patterns,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, no_matching } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if no_matching {
                config.matching.enabled = false;
            }
            let forge = build_forge(&config).await?;
            crate::server::start(forge, &config).await?;
        }
        Commands::Docs { file, language, style } => {
            let code = read_source(&file)?;
            let language = language.unwrap_or_else(|| guess_language(&file));
            let forge = build_forge(&config).await?;
            let response = forge.generate_docs(DocsRequest { code, language, style }).await?;
            println!("{}", response.text);
        }
        Commands::Code { prompt, language, context, complexity } => {
            let context = context.map(|path| read_source(&path)).transpose()?;
            let forge = build_forge(&config).await?;
            let response = forge
                .generate_code(CodeRequest { prompt, language, context, complexity })
                .await?;
            print_json(&response)?;
        }
        Commands::Fix { file, errors, language } => {
            let code = read_source(&file)?;
            let language = language.unwrap_or_else(|| guess_language(&file));
            let forge = build_forge(&config).await?;
            let response = forge.fix_code(FixRequest { code, errors, language }).await?;
            print_json(&response)?;
        }
        Commands::Features { description, files } => {
            let mut sources = Vec::with_capacity(files.len());
            for path in &files {
                sources.push(SourceFile {
                    path: path.display().to_string(),
                    content: read_source(path)?,
                    language: None,
                });
            }
            let forge = build_forge(&config).await?;
            let response = forge
                .add_features(FeatureRequest { files: sources, feature_description: description })
                .await;
            print_json(&response)?;
        }
        Commands::Ideas { theme, complexity, mod_loader, game_version } => {
            let forge = build_forge(&config).await?;
            let response = forge
                .generate_ideas(IdeasRequest { theme, complexity, mod_loader, version: game_version, existing_ideas: None })
                .await?;
            print_json(&response)?;
        }
        Commands::Expand { title, description } => {
            let forge = build_forge(&config).await?;
            let response = forge.expand_idea(ExpandRequest { title, description }).await?;
            print_json(&response)?;
        }
        Commands::Metrics => {
            let url = format!("http://{}:{}/api/metrics", config.server.host, config.server.port);
            let metrics: serde_json::Value = reqwest::get(&url)
                .await
                .with_context(|| format!("No server reachable at {}", url))?
                .error_for_status()?
                .json()
                .await
                .context("Invalid metrics response")?;
            print_json(&metrics)?;
        }
        Commands::Patterns => {
            let store = SqlitePatternStore::new(&config.storage.database_path).await?;
            let summary = crate::patterns::PatternStore::summary(&store).await?;
            println!("{:<20} {:>8} {:>9} {:>8} {:>8}", "KIND", "PATTERNS", "RELIABLE", "USES", "SUCCESS");
            for row in summary {
                println!(
                    "{:<20} {:>8} {:>9} {:>8} {:>7.1}%",
                    row.kind.as_str(),
                    row.total_patterns,
                    row.reliable_patterns,
                    row.total_uses,
                    row.mean_success_rate
                );
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            }
            ConfigCommands::Init { force } => {
                let path = match cli.config {
                    Some(path) => path,
                    None => config::config_path()?,
                };
                if path.exists() && !force {
                    println!("Config already exists at {} (use --force to overwrite)", path.display());
                } else {
                    Config::default().save_to(&path)?;
                    println!("Wrote default config to {}", path.display());
                }
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) if path.exists() => Config::load_from(path),
        Some(_) => Ok(Config::default()),
        None => Config::load(),
    }
}

async fn build_forge(config: &Config) -> Result<FallbackOrchestrator> {
    let store = SqlitePatternStore::new(&config.storage.database_path)
        .await
        .context("Failed to open pattern store")?;
    let generator = OpenRouterGenerator::new(&config.generator, config.api_key()?)?;
    Ok(FallbackOrchestrator::new(Arc::new(store), Arc::new(generator), config))
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn guess_language(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "py" => "python",
        "rs" => "rust",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "cs" => "csharp",
        "cpp" | "cc" | "hpp" | "h" => "cpp",
        "c" => "c",
        "go" => "go",
        _ => "text",
    }
    .to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
