//! Configuration loading for review-pulse.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/review-pulse/config.toml`.
//!
//! `Settings` mirrors the on-disk format and keeps clustering parameters
//! signed so that negative values reach validation instead of failing as an
//! opaque parse error. `Settings::validate` is the only place parameters are
//! checked; the resulting `RunConfig` is passed explicitly to every stage.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PulseError;

/// Near-duplicate detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    /// Minimum normalized similarity (0.0-1.0] for two reviews to be duplicates.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.9
}

/// Density clustering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSettings {
    /// Minimum members to form a non-noise cluster
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: i64,

    /// Neighbourhood size used for core distances (density sensitivity)
    #[serde(default = "default_min_samples")]
    pub min_samples: i64,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            min_samples: default_min_samples(),
        }
    }
}

fn default_min_cluster_size() -> i64 {
    5
}

fn default_min_samples() -> i64 {
    3
}

/// Which pair to merge first when two candidate pairs are equally close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeTieBreak {
    /// Merge the pair with the smaller combined size (keeps large themes stable)
    #[default]
    SmallerCombinedSize,
    /// Merge the pair with the larger combined size
    LargerCombinedSize,
    /// Merge the pair with the lowest cluster ids
    LowestClusterIds,
}

/// Theme consolidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeSettings {
    /// Maximum number of named themes (K). Values <= 0 yield no named themes.
    #[serde(default = "default_max_themes")]
    pub max_themes: i64,

    /// Smallest cluster promoted to a theme; defaults to `min_cluster_size`
    #[serde(default)]
    pub min_theme_size: Option<i64>,

    /// Tie-break for equally close merge candidates
    #[serde(default)]
    pub merge_tie_break: MergeTieBreak,

    /// Member texts handed to the labeler per theme
    #[serde(default = "default_label_samples")]
    pub label_samples: usize,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            max_themes: default_max_themes(),
            min_theme_size: None,
            merge_tie_break: MergeTieBreak::default(),
            label_samples: default_label_samples(),
        }
    }
}

fn default_max_themes() -> i64 {
    5
}

fn default_label_samples() -> usize {
    10
}

/// Theme labeling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingSettings {
    /// Whether to use the LLM client for labels
    #[serde(default = "default_true")]
    pub use_llm: bool,

    /// Fall back to keyword labels if the LLM fails (otherwise "Theme N")
    #[serde(default)]
    pub fallback_to_keywords: bool,

    /// Maximum label length in characters
    #[serde(default = "default_max_label_length")]
    pub max_label_length: usize,

    /// Number of top keywords to extract
    #[serde(default = "default_top_keywords")]
    pub top_keywords: usize,

    /// Suggested category names offered to the LLM
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for LabelingSettings {
    fn default() -> Self {
        Self {
            use_llm: default_true(),
            fallback_to_keywords: false,
            max_label_length: default_max_label_length(),
            top_keywords: default_top_keywords(),
            categories: default_categories(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_label_length() -> usize {
    50
}

fn default_top_keywords() -> usize {
    5
}

fn default_categories() -> Vec<String> {
    [
        "Features & Functionality",
        "App Updates & Performance",
        "Transactions & Payments",
        "Customer Service & Support",
        "Product Marketing & Communication",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Duplicate detection
    #[serde(default)]
    pub dedup: DedupSettings,

    /// Density clustering
    #[serde(default)]
    pub clustering: ClusteringSettings,

    /// Theme consolidation
    #[serde(default)]
    pub themes: ThemeSettings,

    /// Theme labeling
    #[serde(default)]
    pub labeling: LabelingSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the assignment artifact and theme summary
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dedup: DedupSettings::default(),
            clustering: ClusteringSettings::default(),
            themes: ThemeSettings::default(),
            labeling: LabelingSettings::default(),
            log_level: default_log_level(),
            output_dir: default_output_dir(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/review-pulse/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (PULSE_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, PulseError> {
        let config_dir = ProjectDirs::from("", "", "review-pulse")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| PulseError::Config(e.to_string()))?
            .set_default("output_dir", default_output_dir())
            .map_err(|e| PulseError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: PULSE_THEMES__MAX_THEMES, PULSE_CLUSTERING__MIN_SAMPLES, PULSE_LOG_LEVEL
        builder = builder.add_source(
            Environment::with_prefix("PULSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| PulseError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| PulseError::Config(e.to_string()))
    }

    /// Validate every parameter and produce the typed run configuration.
    ///
    /// Negative cluster sizes are rejected; a non-positive `max_themes`
    /// is accepted and means "no named themes".
    pub fn validate(&self) -> Result<RunConfig, PulseError> {
        let threshold = self.dedup.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(PulseError::Config(format!(
                "dedup.similarity_threshold must be in (0.0, 1.0], got {}",
                threshold
            )));
        }

        let min_cluster_size = non_negative(
            "clustering.min_cluster_size",
            self.clustering.min_cluster_size,
        )?;
        if min_cluster_size < 2 {
            return Err(PulseError::Config(format!(
                "clustering.min_cluster_size must be >= 2, got {}",
                min_cluster_size
            )));
        }

        let min_samples = non_negative("clustering.min_samples", self.clustering.min_samples)?;
        if min_samples == 0 {
            return Err(PulseError::Config(
                "clustering.min_samples must be >= 1".to_string(),
            ));
        }

        let min_theme_size = match self.themes.min_theme_size {
            Some(size) => non_negative("themes.min_theme_size", size)?,
            None => min_cluster_size,
        };

        if self.themes.label_samples == 0 {
            return Err(PulseError::Config(
                "themes.label_samples must be >= 1".to_string(),
            ));
        }
        if self.labeling.max_label_length == 0 {
            return Err(PulseError::Config(
                "labeling.max_label_length must be >= 1".to_string(),
            ));
        }

        Ok(RunConfig {
            similarity_threshold: threshold,
            clustering: ClusteringParams {
                min_cluster_size,
                min_samples,
            },
            consolidation: ConsolidationParams {
                max_themes: usize::try_from(self.themes.max_themes.max(0)).unwrap_or(0),
                min_theme_size,
                tie_break: self.themes.merge_tie_break,
                label_samples: self.themes.label_samples,
            },
            labeling: self.labeling.clone(),
        })
    }

    /// Output directory as a path.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

fn non_negative(name: &str, value: i64) -> Result<usize, PulseError> {
    usize::try_from(value)
        .map_err(|_| PulseError::Config(format!("{} must not be negative, got {}", name, value)))
}

/// Validated clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusteringParams {
    /// Minimum members to form a non-noise cluster (>= 2)
    pub min_cluster_size: usize,
    /// Density sensitivity (>= 1)
    pub min_samples: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
        }
    }
}

/// Validated consolidation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationParams {
    /// Maximum number of named themes (K)
    pub max_themes: usize,
    /// Clusters smaller than this go to `miscellaneous`
    pub min_theme_size: usize,
    /// Tie-break between equally close merge candidates
    pub tie_break: MergeTieBreak,
    /// Member texts handed to the labeler per theme
    pub label_samples: usize,
}

impl Default for ConsolidationParams {
    fn default() -> Self {
        Self {
            max_themes: 5,
            min_theme_size: 5,
            tie_break: MergeTieBreak::default(),
            label_samples: 10,
        }
    }
}

/// Everything one pipeline run needs, already validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Near-duplicate similarity threshold
    pub similarity_threshold: f64,
    /// Cluster engine parameters
    pub clustering: ClusteringParams,
    /// Theme consolidator parameters
    pub consolidation: ConsolidationParams,
    /// Labeling behaviour
    pub labeling: LabelingSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            clustering: ClusteringParams::default(),
            consolidation: ConsolidationParams::default(),
            labeling: LabelingSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.clustering.min_cluster_size, 5);
        assert_eq!(settings.clustering.min_samples, 3);
        assert_eq!(settings.themes.max_themes, 5);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.labeling.categories.len(), 5);
    }

    #[test]
    fn test_default_settings_validate() {
        let run = Settings::default().validate().unwrap();
        assert_eq!(run.clustering, ClusteringParams::default());
        assert_eq!(run.consolidation, ConsolidationParams::default());
        assert!((run.similarity_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.output_dir, "output");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        std::fs::write(
            &path,
            "[themes]\nmax_themes = 3\nmerge_tie_break = \"lowest_cluster_ids\"\n\n[clustering]\nmin_samples = 2\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.themes.max_themes, 3);
        assert_eq!(settings.themes.merge_tie_break, MergeTieBreak::LowestClusterIds);
        assert_eq!(settings.clustering.min_samples, 2);
        assert_eq!(settings.clustering.min_cluster_size, 5);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = Settings::load(Some("/nonexistent/review-pulse.toml"));
        assert!(matches!(result, Err(PulseError::Config(_))));
    }

    #[test]
    fn test_negative_min_cluster_size_rejected() {
        let mut settings = Settings::default();
        settings.clustering.min_cluster_size = -1;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn test_min_cluster_size_of_one_rejected() {
        let mut settings = Settings::default();
        settings.clustering.min_cluster_size = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_min_samples_rejected() {
        let mut settings = Settings::default();
        settings.clustering.min_samples = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut settings = Settings::default();
        settings.dedup.similarity_threshold = 0.0;
        assert!(settings.validate().is_err());
        settings.dedup.similarity_threshold = 1.5;
        assert!(settings.validate().is_err());
        settings.dedup.similarity_threshold = 1.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_non_positive_max_themes_means_zero() {
        let mut settings = Settings::default();
        settings.themes.max_themes = -3;
        assert_eq!(settings.validate().unwrap().consolidation.max_themes, 0);
        settings.themes.max_themes = 0;
        assert_eq!(settings.validate().unwrap().consolidation.max_themes, 0);
    }

    #[test]
    fn test_min_theme_size_defaults_to_min_cluster_size() {
        let mut settings = Settings::default();
        settings.clustering.min_cluster_size = 8;
        assert_eq!(settings.validate().unwrap().consolidation.min_theme_size, 8);

        settings.themes.min_theme_size = Some(2);
        assert_eq!(settings.validate().unwrap().consolidation.min_theme_size, 2);

        settings.themes.min_theme_size = Some(-2);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_tie_break_serialization() {
        let json = serde_json::to_string(&MergeTieBreak::SmallerCombinedSize).unwrap();
        assert_eq!(json, "\"smaller_combined_size\"");
        let parsed: MergeTieBreak = serde_json::from_str("\"larger_combined_size\"").unwrap();
        assert_eq!(parsed, MergeTieBreak::LargerCombinedSize);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.themes.max_themes, settings.themes.max_themes);
        assert_eq!(parsed.labeling.categories, settings.labeling.categories);
    }
}
