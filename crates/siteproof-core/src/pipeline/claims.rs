use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use super::{Pipeline, StageError, StageResult};
use crate::{
    artifact::Artifact,
    claim::{confidence_in_range, discovery_key, NewClaim},
    providers::{Provider, RawClaim},
    queue::{Completion, StageOutput},
    schema::{self, ValueType},
    segment::full_text,
};

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?|-?\.\d+").expect("number pattern"));

impl Pipeline {
    pub(super) async fn structured_extract(&self, artifact: &Artifact) -> StageResult<Completion> {
        let Provider::Configured(extractor) = &self.providers.structured else {
            return Err(StageError::unavailable("no structured extractor configured", true));
        };
        let Some(text) = self.artifact_text(artifact).await? else {
            return Ok(empty_text_completion());
        };

        let raw = extractor.structured_extract(&text, schema::FIELDS).await?;
        let returned = raw.len();
        let claims = validate_structured(raw);
        finish(artifact, returned, claims)
    }

    pub(super) async fn discovery_extract(&self, artifact: &Artifact) -> StageResult<Completion> {
        let Provider::Configured(extractor) = &self.providers.discovery else {
            return Err(StageError::unavailable("no discovery extractor configured", true));
        };
        let Some(text) = self.artifact_text(artifact).await? else {
            return Ok(empty_text_completion());
        };

        let max_facts = self.settings.discovery_max_facts;
        let raw = extractor.discovery_extract(&text, max_facts).await?;
        let returned = raw.len();
        let claims = validate_discovery(raw, max_facts);
        finish(artifact, returned, claims)
    }

    /// Segment text in reading order, cut to the model budget. `None` when
    /// the artifact has no text yet.
    async fn artifact_text(&self, artifact: &Artifact) -> StageResult<Option<String>> {
        let segments = self.storage.segments(artifact.id).await?;
        let text = full_text(&segments);
        let text = truncate_chars(text.trim(), self.settings.llm_max_chars);
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }
}

fn empty_text_completion() -> Completion {
    Completion::summary("no text to extract from").with_output(StageOutput::Claims(Vec::new()))
}

fn finish(artifact: &Artifact, returned: usize, claims: Vec<NewClaim>) -> StageResult<Completion> {
    if returned > 0 && claims.is_empty() {
        return Err(StageError::Validation(format!(
            "all {returned} returned claims were invalid"
        )));
    }

    let discarded = returned.saturating_sub(claims.len());
    info!(
        artifact_id = %artifact.id,
        kept = claims.len(),
        discarded,
        "claims validated"
    );
    let summary = if discarded > 0 {
        format!("{} claims ({discarded} discarded)", claims.len())
    } else {
        format!("{} claims", claims.len())
    };
    Ok(Completion::summary(summary).with_output(StageOutput::Claims(claims)))
}

/// Keep claims for schema keys whose value coerces to the key's type and
/// whose confidence is present and in range. One claim per key survives,
/// the most confident.
fn validate_structured(raw: Vec<RawClaim>) -> Vec<NewClaim> {
    let mut best: BTreeMap<String, NewClaim> = BTreeMap::new();

    for item in raw {
        let key = item.key.trim();
        let Some(field) = schema::field(key) else {
            debug!(key, "discarding claim for unknown key");
            continue;
        };
        let Some(confidence) = item.confidence.filter(|c| confidence_in_range(*c)) else {
            debug!(key, confidence = ?item.confidence, "discarding claim with bad confidence");
            continue;
        };
        let Some(value) = coerce_value(&item.value, field.value_type) else {
            debug!(key, value = %item.value, "discarding claim with unusable value");
            continue;
        };

        let mut claim = NewClaim::new(field.key, value, confidence);
        if let Some(unit) = field.unit {
            claim = claim.with_unit(unit);
        }
        if let Some(evidence) = item.evidence {
            claim = claim.with_evidence(evidence);
        }
        keep_best(&mut best, claim);
    }

    best.into_values().collect()
}

/// Open-ended facts go into the `disc:` namespace, most confident first,
/// capped at `max_facts`.
fn validate_discovery(raw: Vec<RawClaim>, max_facts: usize) -> Vec<NewClaim> {
    let mut best: BTreeMap<String, NewClaim> = BTreeMap::new();

    for item in raw {
        if item.key.trim().is_empty() {
            continue;
        }
        let Some(confidence) = item.confidence.filter(|c| confidence_in_range(*c)) else {
            continue;
        };
        let Some(value) = coerce_value(&item.value, ValueType::String) else {
            continue;
        };

        let mut claim = NewClaim::new(discovery_key(&item.key), value, confidence);
        if let Some(unit) = item.unit {
            claim = claim.with_unit(unit);
        }
        if let Some(evidence) = item.evidence {
            claim = claim.with_evidence(evidence);
        }
        if let Some(category) = item.category {
            claim = claim.with_category(category.to_lowercase());
        }
        keep_best(&mut best, claim);
    }

    let mut claims: Vec<NewClaim> = best.into_values().collect();
    claims.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.key.cmp(&b.key)));
    claims.truncate(max_facts);
    claims
}

fn keep_best(best: &mut BTreeMap<String, NewClaim>, claim: NewClaim) {
    match best.get(&claim.key) {
        Some(existing) if existing.confidence >= claim.confidence => {}
        _ => {
            best.insert(claim.key.clone(), claim);
        }
    }
}

/// Render a provider value as claim text of the given type, or `None` when
/// it cannot be read as that type.
#[must_use]
pub fn coerce_value(value: &Value, value_type: ValueType) -> Option<String> {
    let text = match (value_type, value) {
        (_, Value::Null) => None,
        (ValueType::String, Value::String(s)) => Some(s.trim().to_string()),
        (ValueType::String, Value::Number(n)) => Some(n.to_string()),
        (ValueType::String, Value::Bool(b)) => Some(b.to_string()),
        (ValueType::String, other) => Some(other.to_string()),
        (ValueType::Number, Value::Number(n)) => n.as_f64().map(format_number),
        (ValueType::Number, Value::String(s)) => parse_number(s).map(format_number),
        (ValueType::Bool, Value::Bool(b)) => Some(b.to_string()),
        (ValueType::Bool, Value::String(s)) => parse_flag(s).map(|b| b.to_string()),
        _ => None,
    };
    text.filter(|s| !s.is_empty())
}

fn parse_number(raw: &str) -> Option<f64> {
    let found = LEADING_NUMBER.find(raw)?;
    found
        .as_str()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// At most `max` characters of `text`, cut on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(coerce_value(&json!(40), ValueType::Number).as_deref(), Some("40"));
        assert_eq!(coerce_value(&json!("1,250.5 kW"), ValueType::Number).as_deref(), Some("1250.5"));
        assert_eq!(coerce_value(&json!("40MVA"), ValueType::Number).as_deref(), Some("40"));
        assert_eq!(coerce_value(&json!("unknown"), ValueType::Number), None);
        assert_eq!(coerce_value(&json!(true), ValueType::Number), None);
    }

    #[test]
    fn test_coerce_flags_and_strings() {
        assert_eq!(coerce_value(&json!("Yes"), ValueType::Bool).as_deref(), Some("true"));
        assert_eq!(coerce_value(&json!(false), ValueType::Bool).as_deref(), Some("false"));
        assert_eq!(coerce_value(&json!("maybe"), ValueType::Bool), None);
        assert_eq!(coerce_value(&json!("  Elm St  "), ValueType::String).as_deref(), Some("Elm St"));
        assert_eq!(coerce_value(&json!("   "), ValueType::String), None);
        assert_eq!(coerce_value(&Value::Null, ValueType::String), None);
    }

    #[test]
    fn test_structured_validation_discards_bad_claims() {
        let mut no_confidence = RawClaim::new("site_name", "North Lot", 0.5);
        no_confidence.confidence = None;

        let claims = validate_structured(vec![
            RawClaim::new("available_capacity", "40", 0.9),
            RawClaim::new("available_capacity", "35", 0.6),
            RawClaim::new("substation_name", "Elm", 1.4),
            RawClaim::new("favorite_color", "blue", 0.9),
            RawClaim::new("utility_name", "", 0.8),
            no_confidence,
        ]);

        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].key, "available_capacity");
        assert_eq!(claims[0].value, "40");
        assert_eq!(claims[0].unit.as_deref(), Some("MW"));
        assert!((claims[0].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_bounds_are_inclusive() {
        let claims = validate_structured(vec![
            RawClaim::new("site_name", "North Lot", 0.0),
            RawClaim::new("utility_name", "PG&E", 1.0),
            RawClaim::new("city", "Fresno", -0.01),
        ]);
        let keys: Vec<_> = claims.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["site_name", "utility_name"]);
    }

    #[test]
    fn test_discovery_namespaces_and_caps() {
        let claims = validate_discovery(
            vec![
                RawClaim::new("Feeder ID", "12F3", 0.6).with_category("Power"),
                RawClaim::new("Nearest Substation", "Elm", 0.9),
                RawClaim::new("Tie line", json!(12.5), 0.7),
                RawClaim::new("", "orphan", 0.9),
            ],
            2,
        );
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].key, "disc:nearest_substation");
        assert_eq!(claims[1].key, "disc:tie_line");
        assert_eq!(claims[1].value, "12.5");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
