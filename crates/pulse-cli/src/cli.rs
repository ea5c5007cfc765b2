//! CLI argument parsing for review-pulse.
//!
//! CLI flags override all other config sources.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Review Pulse
///
/// Deduplicates app reviews, clusters them and consolidates the clusters
/// into a bounded set of themes.
#[derive(Parser, Debug)]
#[command(name = "review-pulse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/review-pulse/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full theme pipeline and write the artifacts
    Run {
        /// Reviews as JSON Lines ({review_id, content, score?, date?, embedding?})
        #[arg(short, long)]
        input: PathBuf,

        /// Override output directory
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Override maximum number of named themes (K)
        #[arg(long, allow_negative_numbers = true)]
        max_themes: Option<i64>,

        /// Override minimum cluster size
        #[arg(long, allow_negative_numbers = true)]
        min_cluster_size: Option<i64>,

        /// Override HDBSCAN min_samples
        #[arg(long, allow_negative_numbers = true)]
        min_samples: Option<i64>,
    },

    /// Canonicalize and deduplicate only, printing the duplicate groups
    Dedup {
        /// Reviews as JSON Lines
        #[arg(short, long)]
        input: PathBuf,

        /// Override similarity threshold (0.0-1.0]
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Print the effective configuration
    Config,
}

/// Overrides collected from `run` flags.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub output_dir: Option<String>,
    pub max_themes: Option<i64>,
    pub min_cluster_size: Option<i64>,
    pub min_samples: Option<i64>,
}
