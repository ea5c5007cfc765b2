//! Review input reader.
//!
//! Reviews arrive as JSON Lines, one object per line:
//! `{"review_id": "...", "content": "...", "score": 4, "date": "...", "embedding": [..]}`.
//! `score`, `date` and `embedding` are optional. Lines that fail to parse
//! are skipped with a warning; the run continues with the rest.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use pulse_themes::{Embedding, PrecomputedEmbeddings};
use pulse_types::RawReview;

/// One input line.
#[derive(Debug, Deserialize)]
struct InputRecord {
    review_id: String,
    content: String,
    #[serde(default)]
    score: Option<u8>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    embedding: Option<Embedding>,
}

/// Parsed input file.
#[derive(Debug, Default)]
pub struct ReviewInput {
    /// Reviews in file order
    pub reviews: Vec<RawReview>,
    /// Vectors supplied alongside the reviews, keyed by review text
    pub embeddings: PrecomputedEmbeddings,
    /// 1-based line numbers that could not be parsed
    pub skipped_lines: Vec<usize>,
}

/// Read a JSON Lines review file.
pub fn read_input(path: &Path) -> Result<ReviewInput> {
    let file =
        File::open(path).with_context(|| format!("Failed to open input {}", path.display()))?;
    let input = parse_input(BufReader::new(file))?;
    info!(
        path = %path.display(),
        reviews = input.reviews.len(),
        embeddings = input.embeddings.len(),
        skipped = input.skipped_lines.len(),
        "Input loaded"
    );
    Ok(input)
}

/// Parse JSON Lines reviews from any reader.
pub fn parse_input<R: BufRead>(reader: R) -> Result<ReviewInput> {
    let mut input = ReviewInput::default();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: InputRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed review");
                input.skipped_lines.push(line_no);
                continue;
            }
        };

        if let Some(vector) = record.embedding {
            input.embeddings.insert(record.content.clone(), vector);
        }

        let mut review = RawReview::new(record.review_id, record.content);
        review.rating = record.score;
        review.timestamp = record.date;
        input.reviews.push(review);
    }

    Ok(input)
}
