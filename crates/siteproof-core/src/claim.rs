use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactId;
use crate::job::{JobId, JobKind};

/// Key prefix reserved for open-ended discovery claims.
pub const DISCOVERY_PREFIX: &str = "disc:";

const MAX_SLUG_LEN: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub artifact_id: ArtifactId,
    pub job_id: JobId,
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A validated claim ready to be written by a completing job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClaim {
    pub key: String,
    pub value: String,
    pub unit: Option<String>,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub category: Option<String>,
}

impl NewClaim {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            unit: None,
            confidence,
            evidence: None,
            category: None,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[must_use]
pub fn is_discovery_key(key: &str) -> bool {
    key.starts_with(DISCOVERY_PREFIX)
}

/// Which stage owns claims with this key. Re-running a stage replaces only its own claims.
#[must_use]
pub fn producing_kind(key: &str) -> JobKind {
    if is_discovery_key(key) {
        JobKind::DiscoveryExtract
    } else {
        JobKind::StructuredExtract
    }
}

#[must_use]
pub fn confidence_in_range(confidence: f64) -> bool {
    (0.0..=1.0).contains(&confidence)
}

/// Canonicalize a free-form label into the discovery namespace, e.g.
/// `"Substation Capacity (MVA)"` becomes `disc:substation_capacity_mva`.
/// A label already carrying the prefix is not nested inside it again.
#[must_use]
pub fn discovery_key(label: &str) -> String {
    let label = label.trim();
    let label = label
        .get(..DISCOVERY_PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(DISCOVERY_PREFIX))
        .map_or(label, |_| &label[DISCOVERY_PREFIX.len()..]);

    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        format!("{DISCOVERY_PREFIX}fact")
    } else {
        format!("{DISCOVERY_PREFIX}{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_labels() {
        assert_eq!(
            discovery_key("Substation Capacity (MVA)"),
            "disc:substation_capacity_mva"
        );
        assert_eq!(discovery_key("  --Feeder  ID-- "), "disc:feeder_id");
        assert_eq!(discovery_key("???"), "disc:fact");
    }

    #[test]
    fn prefixed_labels_are_not_nested() {
        assert_eq!(discovery_key("disc:feeder_id"), "disc:feeder_id");
        assert_eq!(discovery_key("  DISC:Feeder ID"), "disc:feeder_id");
        assert_eq!(discovery_key("disc:"), "disc:fact");
        assert_eq!(discovery_key("discount rate"), "disc:discount_rate");
    }

    #[test]
    fn slug_is_capped() {
        let label = "a".repeat(200);
        let key = discovery_key(&label);
        assert_eq!(key.len(), DISCOVERY_PREFIX.len() + 80);
    }

    #[test]
    fn confidence_range_is_inclusive() {
        assert!(confidence_in_range(0.0));
        assert!(confidence_in_range(1.0));
        assert!(!confidence_in_range(1.01));
        assert!(!confidence_in_range(-0.1));
        assert!(!confidence_in_range(f64::NAN));
    }

    #[test]
    fn producing_kind_follows_namespace() {
        assert_eq!(producing_kind("disc:feeder"), JobKind::DiscoveryExtract);
        assert_eq!(producing_kind("available_capacity"), JobKind::StructuredExtract);
    }
}
