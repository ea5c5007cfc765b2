//! review-pulse library exports.
//!
//! This crate provides the `review-pulse` binary.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, dedup, config)
//! - `input`: JSON Lines review reader

pub mod cli;
pub mod commands;
pub mod input;

pub use cli::{Cli, Commands, RunOverrides};
pub use commands::{dedup_input, dedup_reviews, run_pipeline, run_themes, show_config};
pub use input::{parse_input, read_input, ReviewInput};
