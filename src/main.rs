//! Clipvocab CLI - Kindle clippings to flashcard CSV files.

use anyhow::{Context, Result};
use clap::Parser;
use clipvocab::config::Config;
use clipvocab::console::Console;
use clipvocab::history::JsonHistoryStore;
use clipvocab::{Pipeline, Router, TranslationCache, write_sections};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Turns a Kindle "My Clippings.txt" export into vocabulary flashcards.
#[derive(Parser, Debug)]
#[command(name = "clipvocab")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the clippings export.
    file: PathBuf,

    /// User whose history is used for deduplication.
    #[arg(long, default_value = "local")]
    user: String,

    /// Use this config file instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the generated CSV files.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Parse, classify and dedup only. No lookups, no history writes.
    #[arg(long)]
    dry_run: bool,

    /// Show debug logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let console = Console::new();

    console.section("Clipvocab - Kindle Clippings to Flashcards");

    console.step("Loading configuration...");
    let (loaded, config_path) = match &args.config {
        Some(path) => (Config::load_from(path), path.clone()),
        None => (Config::load(), Config::config_path()?),
    };
    let mut config = loaded.context("Failed to load configuration")?;
    if let Some(dir) = args.output.clone() {
        config.output.directory = dir;
    }

    // First run: nothing to look words up with yet
    if !args.dry_run && !config.has_backend() {
        console.warning(&format!(
            "No backend API key configured. Please edit: {}",
            config_path.display()
        ));
        console.info("Set a dictionary, translation or lemmatizer key and run again.");
        return Ok(());
    }

    config
        .validate_with_options(!args.dry_run)
        .context("Invalid configuration")?;
    console.success("Configuration loaded");

    let raw = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let history_path = config.history_path()?;
    let store = JsonHistoryStore::open(&history_path)
        .with_context(|| format!("Failed to open history {}", history_path.display()))?;

    let cache = match config.cache_path()? {
        Some(path) if !args.dry_run => {
            TranslationCache::open(&path, &config.languages.source, &config.languages.target)
        }
        _ => TranslationCache::in_memory(&config.languages.source, &config.languages.target),
    };

    let router = Router::from_config(&config).context("Failed to create backends")?;
    if !args.dry_run {
        console.info(&format!("Backends: {}", router.backend_names().join(", ")));
    }
    let pipeline = Pipeline::new(&config, router, Arc::new(store), cache);

    if args.dry_run {
        console.step(&format!("Checking {}...", args.file.display()));
        let report = pipeline
            .dry_run(&args.user, &raw)
            .await
            .context("Failed to process clippings")?;
        console.report(&report);
        console.info(&format!(
            "{} new entries would be looked up",
            console.count(report.accepted)
        ));
        return Ok(());
    }

    console.step(&format!("Processing {}...", args.file.display()));
    let prepared = pipeline
        .prepare(&args.user, &raw)
        .await
        .context("Failed to process clippings")?;

    if prepared.sections().is_empty() {
        console.info("Nothing new to export");
    }
    let paths = write_sections(prepared.sections(), &config.output.directory)
        .await
        .context("Failed to write CSV files")?;
    for (section, path) in prepared.sections().iter().zip(&paths) {
        console.success(&format!(
            "{} {} {}",
            section.title,
            console.muted(&format!("({} cards)", section.entries)),
            path.display()
        ));
    }

    let outcome = prepared.commit().await.context("Failed to update history")?;
    console.report(&outcome.report);

    console.section("Done!");
    Ok(())
}

/// Installs the log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "clipvocab=debug"
    } else {
        "clipvocab=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
