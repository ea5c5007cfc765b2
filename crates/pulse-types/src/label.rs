//! Cluster and theme labels.
//!
//! Both labels carry an explicit catch-all variant so consumers must
//! handle noise and the `miscellaneous` theme rather than relying on a
//! sentinel number.

use serde::{Deserialize, Serialize};

/// Label assigned to a review by the cluster engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ClusterLabel {
    /// Member of the cluster with this id
    Cluster(u32),
    /// Not reachable from any dense core
    Noise,
}

impl ClusterLabel {
    /// Parse from the stored code (`"noise"` or a cluster number).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "noise" => Some(ClusterLabel::Noise),
            other => other.parse().ok().map(ClusterLabel::Cluster),
        }
    }

    /// Check whether this is the noise label.
    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }

    /// Get the cluster id, if any.
    pub fn cluster_id(&self) -> Option<u32> {
        match self {
            ClusterLabel::Cluster(id) => Some(*id),
            ClusterLabel::Noise => None,
        }
    }
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterLabel::Cluster(id) => write!(f, "{}", id),
            ClusterLabel::Noise => write!(f, "noise"),
        }
    }
}

impl From<ClusterLabel> for String {
    fn from(label: ClusterLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for ClusterLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ClusterLabel::from_code(&value).ok_or_else(|| format!("invalid cluster label: {}", value))
    }
}

/// Identifier of a consolidated theme.
///
/// Numbered themes start at 1. `Miscellaneous` always exists in a run's
/// output, even when it has no members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ThemeId {
    /// A named theme slot (1-based)
    Theme(u32),
    /// Reserved catch-all for noise and sub-threshold clusters
    Miscellaneous,
}

impl ThemeId {
    /// Parse from the stored code (`"miscellaneous"` or a theme number).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "miscellaneous" => Some(ThemeId::Miscellaneous),
            other => other.parse().ok().map(ThemeId::Theme),
        }
    }

    /// Check whether this is the catch-all theme.
    pub fn is_miscellaneous(&self) -> bool {
        matches!(self, ThemeId::Miscellaneous)
    }
}

impl std::fmt::Display for ThemeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThemeId::Theme(n) => write!(f, "{}", n),
            ThemeId::Miscellaneous => write!(f, "miscellaneous"),
        }
    }
}

impl From<ThemeId> for String {
    fn from(id: ThemeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ThemeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ThemeId::from_code(&value).ok_or_else(|| format!("invalid theme id: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_label_codes() {
        assert_eq!(ClusterLabel::Cluster(3).to_string(), "3");
        assert_eq!(ClusterLabel::Noise.to_string(), "noise");
        assert_eq!(ClusterLabel::from_code("7"), Some(ClusterLabel::Cluster(7)));
        assert_eq!(ClusterLabel::from_code("noise"), Some(ClusterLabel::Noise));
        assert_eq!(ClusterLabel::from_code("-1"), None);
        assert_eq!(ClusterLabel::from_code(""), None);
    }

    #[test]
    fn test_cluster_label_accessors() {
        assert!(ClusterLabel::Noise.is_noise());
        assert_eq!(ClusterLabel::Noise.cluster_id(), None);
        assert_eq!(ClusterLabel::Cluster(2).cluster_id(), Some(2));
    }

    #[test]
    fn test_theme_id_codes() {
        assert_eq!(ThemeId::Theme(1).to_string(), "1");
        assert_eq!(ThemeId::Miscellaneous.to_string(), "miscellaneous");
        assert_eq!(ThemeId::from_code("5"), Some(ThemeId::Theme(5)));
        assert_eq!(
            ThemeId::from_code("miscellaneous"),
            Some(ThemeId::Miscellaneous)
        );
        assert_eq!(ThemeId::from_code("Miscellaneous"), None);
        assert!(ThemeId::Miscellaneous.is_miscellaneous());
    }

    #[test]
    fn test_labels_serialize_as_strings() {
        let json = serde_json::to_string(&(ClusterLabel::Noise, ThemeId::Theme(2))).unwrap();
        assert_eq!(json, r#"["noise","2"]"#);

        let parsed: (ClusterLabel, ThemeId) =
            serde_json::from_str(r#"["4","miscellaneous"]"#).unwrap();
        assert_eq!(parsed, (ClusterLabel::Cluster(4), ThemeId::Miscellaneous));

        assert!(serde_json::from_str::<ThemeId>(r#""other""#).is_err());
    }
}
