//! Command implementations for review-pulse.
//!
//! Handles:
//! - run: Load config, read reviews, run the theme pipeline, write artifacts
//! - dedup: Canonicalize and deduplicate only
//! - config: Print the effective configuration

use std::path::Path;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use pulse_themes::artifact::{write_run, ASSIGNMENTS_FILE, SUMMARY_FILE};
use pulse_themes::{
    canonicalize_reviews, unique_reviews, AssignmentStore, CancelFlag, DedupOutcome, Deduplicator,
    KeywordLabeler, LlmLabeler, NoOpLlmClient, ThemeLabeler, ThemePipeline, ThemesError,
};
use pulse_types::{Review, RunConfig, Settings};

use crate::cli::RunOverrides;
use crate::input::{read_input, ReviewInput};

/// Load settings and apply the global log level override.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Apply `run` flags (highest precedence).
pub fn apply_run_overrides(settings: &mut Settings, overrides: &RunOverrides) {
    if let Some(dir) = &overrides.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(max_themes) = overrides.max_themes {
        settings.themes.max_themes = max_themes;
    }
    if let Some(size) = overrides.min_cluster_size {
        settings.clustering.min_cluster_size = size;
    }
    if let Some(samples) = overrides.min_samples {
        settings.clustering.min_samples = samples;
    }
}

/// Initialize logging on stderr so stdout stays free for results.
fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Keyword labeler seeded with the whole input corpus.
///
/// No LLM client is wired into the binary; the LLM labeler runs in
/// keyword-only mode.
pub fn build_labeler(config: &RunConfig, input: &ReviewInput) -> Box<dyn ThemeLabeler> {
    let corpus: Vec<&str> = input.reviews.iter().map(|r| r.content.as_str()).collect();
    let keywords = KeywordLabeler::new(config.labeling.clone()).with_corpus(&corpus);
    Box::new(
        LlmLabeler::<NoOpLlmClient>::without_llm(config.labeling.clone())
            .with_keyword_fallback(keywords),
    )
}

/// Run the pipeline synchronously over parsed input.
pub fn run_pipeline(
    config: RunConfig,
    input: &ReviewInput,
    cancel: &CancelFlag,
) -> Result<AssignmentStore, ThemesError> {
    let labeler = build_labeler(&config, input);
    let pipeline = ThemePipeline::new(config, Box::new(input.embeddings.clone()), labeler);
    pipeline.run(&input.reviews, cancel)
}

/// Run the theme pipeline.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Read the review file
/// 3. Run the pipeline on a blocking thread, cancelling on Ctrl-C
/// 4. Write `assignments.jsonl` and `themes.json`
pub async fn run_themes(
    config_path: Option<&str>,
    log_level: Option<&str>,
    input_path: &Path,
    overrides: RunOverrides,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level)?;
    apply_run_overrides(&mut settings, &overrides);
    init_logging(&settings)?;

    let config = settings.validate().context("Invalid configuration")?;
    info!(?config, "Configuration validated");

    let input = read_input(input_path)?;
    if !input.skipped_lines.is_empty() {
        warn!(
            lines = ?input.skipped_lines,
            "Some input lines were skipped"
        );
    }

    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        let result = run_pipeline(config, &input, &worker_cancel);
        (input, result)
    });

    let (input, result) = tokio::select! {
        joined = &mut handle => joined.context("Pipeline task panicked")?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling run");
            cancel.cancel();
            handle.await.context("Pipeline task panicked")?
        }
    };

    let store = match result {
        Ok(store) => store,
        Err(ThemesError::Cancelled(stage)) => {
            println!("Run cancelled after {}; nothing written.", stage);
            return Ok(());
        }
        Err(e) => return Err(e).context("Theme run failed"),
    };

    let output_dir = settings.output_path();
    write_run(&output_dir, &store).context("Failed to write artifacts")?;

    print_run(&store, input.skipped_lines.len());
    println!();
    println!("Wrote {}", output_dir.join(ASSIGNMENTS_FILE).display());
    println!("Wrote {}", output_dir.join(SUMMARY_FILE).display());
    Ok(())
}

fn print_run(store: &AssignmentStore, skipped_lines: usize) {
    let stats = store.stats();
    println!("Run {}", store.run_id());
    println!(
        "  Reviews:         {} ({} duplicates, {} skipped lines)",
        stats.input_reviews, stats.duplicates, skipped_lines
    );
    println!(
        "  Clusters:        {} raw, {} merged, {} demoted",
        stats.raw_clusters, stats.merges, stats.demoted_clusters
    );
    if stats.rejected_embeddings > 0 {
        println!("  Rejected:        {} embeddings", stats.rejected_embeddings);
    }
    println!();
    println!("{:<15} {:>8} {:>8}  LABEL", "THEME", "REVIEWS", "UNIQUE");
    for theme in store.themes() {
        println!(
            "{:<15} {:>8} {:>8}  {}",
            theme.id().to_string(),
            store.review_count(theme.id()),
            store.representative_count(theme.id()),
            theme.label()
        );
    }
}

/// Canonicalize and deduplicate parsed input the way a theme run does.
///
/// Repeated review ids keep their first occurrence.
pub fn dedup_input(config: &RunConfig, input: &ReviewInput) -> (Vec<Review>, DedupOutcome) {
    let reviews = canonicalize_reviews(&unique_reviews(&input.reviews));
    let outcome = Deduplicator::from_config(config).deduplicate(&reviews);
    (reviews, outcome)
}

/// Canonicalize and deduplicate, printing every group with duplicates.
pub fn dedup_reviews(
    config_path: Option<&str>,
    log_level: Option<&str>,
    input_path: &Path,
    threshold: Option<f64>,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level)?;
    if let Some(threshold) = threshold {
        settings.dedup.similarity_threshold = threshold;
    }
    init_logging(&settings)?;
    let config = settings.validate().context("Invalid configuration")?;

    let input = read_input(input_path)?;
    let (reviews, outcome) = dedup_input(&config, &input);

    println!(
        "{} reviews, {} groups, {} duplicates (threshold {})",
        reviews.len(),
        outcome.groups.len(),
        outcome.duplicate_count(),
        config.similarity_threshold
    );
    for group in outcome.groups.iter().filter(|g| g.size() > 1) {
        println!();
        println!("{} ({} reviews)", group.representative, group.size());
        for member in group.duplicates() {
            println!("  - {}", member);
        }
    }
    Ok(())
}

/// Print the effective configuration as TOML after validating it.
pub fn show_config(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    settings.validate().context("Invalid configuration")?;
    let rendered = toml::to_string_pretty(&settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
