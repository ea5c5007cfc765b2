//! Run-scoped data types.
//!
//! Clusters and themes are created fresh for every run and dropped once
//! downstream generation has consumed the assignment store.

use pulse_types::{ReviewId, ThemeId};
use serde::{Deserialize, Serialize};

/// An embedding vector.
pub type Embedding = Vec<f32>;

/// Reviews judged equivalent, collapsed onto one representative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Review that stands in for the whole group
    pub representative: ReviewId,
    /// All members in input order, representative included
    pub members: Vec<ReviewId>,
}

impl DuplicateGroup {
    /// Number of original reviews in the group.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Members other than the representative.
    pub fn duplicates(&self) -> impl Iterator<Item = &ReviewId> {
        self.members
            .iter()
            .filter(move |id| **id != self.representative)
    }
}

/// A density cluster produced by the cluster engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster id (0-based, ordered by smallest member id)
    pub cluster_id: u32,
    /// Representative review ids, sorted
    pub members: Vec<ReviewId>,
    /// Mean of the members' (unit-normalized) embeddings
    pub centroid: Embedding,
}

impl Cluster {
    /// Number of (deduplicated) members.
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Why a review was kept out of clustering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedEmbedding {
    /// Affected representative review
    pub review_id: ReviewId,
    /// Human-readable reason, also logged
    pub reason: String,
}

/// A consolidated theme with a label from the labeling collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTheme {
    /// 1-based theme number
    pub number: u32,
    /// Human-readable label (or the "Theme N" fallback)
    pub label: String,
    /// Mean of the member embeddings
    pub centroid: Embedding,
    /// Representative review ids, sorted
    pub members: Vec<ReviewId>,
}

/// The catch-all theme for noise, small clusters and unusable embeddings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiscellaneousTheme {
    /// Representative review ids, sorted
    pub members: Vec<ReviewId>,
}

/// Label used for the catch-all theme.
pub const MISCELLANEOUS_LABEL: &str = "Miscellaneous";

/// A theme slot in a run's output.
///
/// Consumers match on both variants; the catch-all is never implied by a
/// magic label or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Theme {
    /// A named, cardinality-bounded theme
    Named(NamedTheme),
    /// The reserved `miscellaneous` theme
    Miscellaneous(MiscellaneousTheme),
}

impl Theme {
    /// Theme identifier.
    pub fn id(&self) -> ThemeId {
        match self {
            Theme::Named(theme) => ThemeId::Theme(theme.number),
            Theme::Miscellaneous(_) => ThemeId::Miscellaneous,
        }
    }

    /// Display label.
    pub fn label(&self) -> &str {
        match self {
            Theme::Named(theme) => &theme.label,
            Theme::Miscellaneous(_) => MISCELLANEOUS_LABEL,
        }
    }

    /// Representative members.
    pub fn members(&self) -> &[ReviewId] {
        match self {
            Theme::Named(theme) => &theme.members,
            Theme::Miscellaneous(theme) => &theme.members,
        }
    }

    /// Centroid, if the theme has one.
    pub fn centroid(&self) -> Option<&[f32]> {
        match self {
            Theme::Named(theme) => Some(&theme.centroid),
            Theme::Miscellaneous(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_group_duplicates_excludes_representative() {
        let group = DuplicateGroup {
            representative: "b".to_string(),
            members: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert_eq!(group.size(), 3);
        let dups: Vec<&ReviewId> = group.duplicates().collect();
        assert_eq!(dups, vec!["a", "c"]);
    }

    #[test]
    fn test_theme_accessors() {
        let named = Theme::Named(NamedTheme {
            number: 2,
            label: "Payments".to_string(),
            centroid: vec![1.0, 0.0],
            members: vec!["r1".to_string()],
        });
        assert_eq!(named.id(), ThemeId::Theme(2));
        assert_eq!(named.label(), "Payments");
        assert_eq!(named.centroid(), Some(&[1.0f32, 0.0][..]));

        let misc = Theme::Miscellaneous(MiscellaneousTheme::default());
        assert_eq!(misc.id(), ThemeId::Miscellaneous);
        assert_eq!(misc.label(), MISCELLANEOUS_LABEL);
        assert!(misc.members().is_empty());
        assert!(misc.centroid().is_none());
    }

    #[test]
    fn test_theme_serialization_tagged() {
        let misc = Theme::Miscellaneous(MiscellaneousTheme {
            members: vec!["r1".to_string()],
        });
        let json = serde_json::to_string(&misc).unwrap();
        assert!(json.contains("\"kind\":\"miscellaneous\""));
        let parsed: Theme = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, misc);
    }
}
