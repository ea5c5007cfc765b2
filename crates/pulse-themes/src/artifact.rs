//! Persisted run artifacts.
//!
//! `assignments.jsonl` holds one flat record per input review, in input
//! order, with stable field names. Duplicate rows name their
//! representative in `is_duplicate_of` and leave the cluster and theme
//! fields empty. `themes.json` summarizes the themes of the run.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use pulse_types::{ClusterLabel, ReviewId, ThemeId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ThemesError;
use crate::store::{AssignmentStore, RunStats};

/// File name of the assignment records.
pub const ASSIGNMENTS_FILE: &str = "assignments.jsonl";

/// File name of the theme summary.
pub const SUMMARY_FILE: &str = "themes.json";

/// One row of the assignment artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub review_id: ReviewId,
    pub canonical_text: String,
    pub is_duplicate_of: Option<ReviewId>,
    pub cluster_id: Option<ClusterLabel>,
    pub theme_id: Option<ThemeId>,
    pub theme_label: Option<String>,
}

/// Per-theme entry of the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSummaryEntry {
    pub theme_id: ThemeId,
    pub label: String,
    /// Original review volume (duplicates included)
    pub review_count: usize,
    pub representative_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Vec<f32>>,
}

/// Summary written next to the assignment records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub stats: RunStats,
    pub themes: Vec<ThemeSummaryEntry>,
}

impl ThemeSummary {
    /// Summarize a completed run.
    pub fn from_store(store: &AssignmentStore) -> Self {
        let themes = store
            .themes()
            .iter()
            .map(|theme| ThemeSummaryEntry {
                theme_id: theme.id(),
                label: theme.label().to_string(),
                review_count: store.review_count(theme.id()),
                representative_count: theme.members().len(),
                centroid: theme.centroid().map(<[f32]>::to_vec),
            })
            .collect();

        Self {
            run_id: store.run_id().to_string(),
            generated_at: store.generated_at(),
            stats: store.stats().clone(),
            themes,
        }
    }
}

/// Flatten a store into artifact rows, in input order.
pub fn records(store: &AssignmentStore) -> Vec<AssignmentRecord> {
    store
        .reviews()
        .iter()
        .map(|review| {
            let id = review.review_id.as_str();
            match store.duplicate_of(id) {
                Some(rep) => AssignmentRecord {
                    review_id: review.review_id.clone(),
                    canonical_text: review.canonical_text.clone(),
                    is_duplicate_of: Some(rep.clone()),
                    cluster_id: None,
                    theme_id: None,
                    theme_label: None,
                },
                None => {
                    let theme_id = store.theme_of(id);
                    AssignmentRecord {
                        review_id: review.review_id.clone(),
                        canonical_text: review.canonical_text.clone(),
                        is_duplicate_of: None,
                        cluster_id: store.cluster_of(id),
                        theme_id,
                        theme_label: theme_id
                            .and_then(|t| store.label_of(t))
                            .map(str::to_string),
                    }
                }
            }
        })
        .collect()
}

/// Write records as JSON Lines.
pub fn write_records<W: Write>(writer: W, records: &[AssignmentRecord]) -> Result<(), ThemesError> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse JSON Lines records; blank lines are skipped.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<AssignmentRecord>, ThemesError> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            ThemesError::InvalidInput(format!("line {}: {}", line_no + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write `assignments.jsonl` and `themes.json` into `dir`.
pub fn write_run(dir: &Path, store: &AssignmentStore) -> Result<(), ThemesError> {
    std::fs::create_dir_all(dir)?;

    let rows = records(store);
    write_records(File::create(dir.join(ASSIGNMENTS_FILE))?, &rows)?;

    let summary = ThemeSummary::from_store(store);
    let mut file = BufWriter::new(File::create(dir.join(SUMMARY_FILE))?);
    serde_json::to_writer_pretty(&mut file, &summary)?;
    file.write_all(b"\n")?;
    file.flush()?;

    info!(
        dir = %dir.display(),
        records = rows.len(),
        themes = summary.themes.len(),
        "Artifacts written"
    );
    Ok(())
}

/// Read `assignments.jsonl` from a run directory.
pub fn read_assignments(dir: &Path) -> Result<Vec<AssignmentRecord>, ThemesError> {
    let file = File::open(dir.join(ASSIGNMENTS_FILE))?;
    read_records(BufReader::new(file))
}

/// Read `themes.json` from a run directory.
pub fn read_summary(dir: &Path) -> Result<ThemeSummary, ThemesError> {
    let file = File::open(dir.join(SUMMARY_FILE))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::PrecomputedEmbeddings;
    use crate::labeling::KeywordLabeler;
    use crate::pipeline::{CancelFlag, ThemePipeline};
    use pulse_types::{RawReview, RunConfig};

    fn record(id: &str) -> AssignmentRecord {
        AssignmentRecord {
            review_id: id.to_string(),
            canonical_text: "late refund".to_string(),
            is_duplicate_of: None,
            cluster_id: Some(ClusterLabel::Cluster(2)),
            theme_id: Some(ThemeId::Theme(1)),
            theme_label: Some("Refunds".to_string()),
        }
    }

    #[test]
    fn test_record_field_names_are_stable() {
        let json = serde_json::to_value(record("r1")).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "canonical_text",
                "cluster_id",
                "is_duplicate_of",
                "review_id",
                "theme_id",
                "theme_label"
            ]
        );
        assert_eq!(obj["cluster_id"], "2");
        assert_eq!(obj["theme_id"], "1");
        assert!(obj["is_duplicate_of"].is_null());
    }

    #[test]
    fn test_duplicate_row_leaves_assignment_empty() {
        let dup = AssignmentRecord {
            is_duplicate_of: Some("r1".to_string()),
            cluster_id: None,
            theme_id: None,
            theme_label: None,
            ..record("r2")
        };
        let line = serde_json::to_string(&dup).unwrap();
        assert!(line.contains("\"is_duplicate_of\":\"r1\""));
        assert!(line.contains("\"theme_id\":null"));
    }

    #[test]
    fn test_read_records_reports_line_number() {
        let input = "{\"review_id\":\"r1\"}\n\nnot json\n";
        let err = read_records(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));

        let mut buf = Vec::new();
        write_records(&mut buf, &[record("r1")]).unwrap();
        buf.extend_from_slice(b"\nnot json\n");
        let err = read_records(buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_noise_and_miscellaneous_codes() {
        let row = AssignmentRecord {
            cluster_id: Some(ClusterLabel::Noise),
            theme_id: Some(ThemeId::Miscellaneous),
            theme_label: Some("Miscellaneous".to_string()),
            ..record("r9")
        };
        let line = serde_json::to_string(&row).unwrap();
        assert!(line.contains("\"cluster_id\":\"noise\""));
        assert!(line.contains("\"theme_id\":\"miscellaneous\""));

        let parsed = read_records(line.as_bytes()).unwrap();
        assert_eq!(parsed, vec![row]);
    }

    #[test]
    fn test_write_run_round_trip() {
        let raw = vec![
            RawReview::new("r1", "Great app"),
            RawReview::new("r2", "great app!!"),
            RawReview::new("r3", "refund stuck"),
        ];
        let embeddings: PrecomputedEmbeddings = vec![
            ("Great app", vec![1.0, 0.0]),
            ("refund stuck", vec![0.0, 1.0]),
        ]
        .into_iter()
        .collect();
        let store = ThemePipeline::new(
            RunConfig::default(),
            Box::new(embeddings),
            Box::new(KeywordLabeler::default()),
        )
        .run(&raw, &CancelFlag::new())
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_run(dir.path(), &store).unwrap();

        let rows = read_assignments(dir.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cluster_id, Some(ClusterLabel::Noise));
        assert_eq!(rows[0].theme_id, Some(ThemeId::Miscellaneous));
        assert_eq!(rows[1].is_duplicate_of.as_deref(), Some("r1"));
        assert_eq!(rows[1].theme_id, None);
        assert_eq!(rows[1].canonical_text, "great app");

        let summary = read_summary(dir.path()).unwrap();
        assert_eq!(summary.run_id, store.run_id().to_string());
        assert_eq!(summary.themes.len(), 1);
        assert_eq!(summary.themes[0].review_count, 3);
        assert_eq!(summary.themes[0].representative_count, 2);
        assert_eq!(summary.stats.duplicates, 1);
    }
}
