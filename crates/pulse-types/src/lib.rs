//! # pulse-types
//!
//! Shared domain types for the review-pulse theme pipeline.
//!
//! This crate defines the data structures passed between pipeline stages:
//! - Reviews: raw input records and their canonicalized form
//! - Labels: cluster labels (including noise) and theme ids (including
//!   the reserved `miscellaneous` theme)
//! - Settings: layered configuration and the validated run parameters
//!
//! ## Usage
//!
//! ```rust
//! use pulse_types::{RawReview, ThemeId};
//!
//! let review = RawReview::new("r-1", "Great app, fast payments");
//! assert_eq!(review.review_id, "r-1");
//! assert_eq!(ThemeId::Miscellaneous.to_string(), "miscellaneous");
//! ```

pub mod config;
pub mod error;
pub mod label;
pub mod review;

pub use config::{
    ClusteringParams, ClusteringSettings, ConsolidationParams, DedupSettings, LabelingSettings,
    MergeTieBreak, RunConfig, Settings, ThemeSettings,
};
pub use error::PulseError;
pub use label::{ClusterLabel, ThemeId};
pub use review::{RawReview, Review, ReviewId};
