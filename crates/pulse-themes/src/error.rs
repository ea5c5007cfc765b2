//! Theme pipeline error types.

use thiserror::Error;

/// Errors that can occur during a theme run.
///
/// Only `Config` and `Cancelled` abort a run. The other kinds are raised by
/// collaborators and recovered locally: a failing embedding routes its review
/// to `miscellaneous`, a failing labeler yields a fallback label.
#[derive(Debug, Error)]
pub enum ThemesError {
    /// Invalid configuration (caller-correctable)
    #[error("Invalid configuration: {0}")]
    Config(#[from] pulse_types::PulseError),

    /// Clustering error
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Embedding provider error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Theme labeler error
    #[error("Labeling error: {0}")]
    Labeling(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Run cancelled between stages
    #[error("Run cancelled after {0}")]
    Cancelled(&'static str),
}
