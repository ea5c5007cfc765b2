//! Review Pulse
//!
//! Turns a batch of app reviews into a small set of labeled themes.
//!
//! # Usage
//!
//! ```bash
//! review-pulse run --input reviews.jsonl [--output-dir DIR] [--max-themes K]
//! review-pulse dedup --input reviews.jsonl [--threshold 0.9]
//! review-pulse config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/review-pulse/config.toml)
//! 3. Environment variables (PULSE_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use pulse_cli::{dedup_reviews, run_themes, show_config, Cli, Commands, RunOverrides};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output_dir,
            max_themes,
            min_cluster_size,
            min_samples,
        } => {
            run_themes(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                &input,
                RunOverrides {
                    output_dir,
                    max_themes,
                    min_cluster_size,
                    min_samples,
                },
            )
            .await?;
        }
        Commands::Dedup { input, threshold } => {
            dedup_reviews(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                &input,
                threshold,
            )?;
        }
        Commands::Config => {
            show_config(cli.config.as_deref(), cli.log_level.as_deref())?;
        }
    }

    Ok(())
}
