//! Keyword search over filenames, claims and extracted text.
//!
//! Matching is a case-insensitive substring test. Results are ordered by the
//! best tier an artifact matched in (filename, then claim, then text), then
//! newest artifact first. A search can be scoped to one building or park.
//! `SearchIndex` is the seam where a real index could replace the table scan.

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    artifact::{Artifact, ArtifactId, Owner},
    segment::full_text,
    storage::Storage,
    Result,
};

const SNIPPET_RADIUS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Filename,
    Claim,
    Text,
}

impl MatchTier {
    fn from_rank(rank: i64) -> Self {
        match rank {
            0 => Self::Filename,
            1 => Self::Claim,
            _ => Self::Text,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filename => "filename",
            Self::Claim => "claim",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMatch {
    pub artifact: Artifact,
    pub tier: MatchTier,
    /// Matched text with some surrounding context
    pub snippet: String,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Artifacts matching `query`, limited to `scope` when one is given.
    async fn search(&self, query: &str, scope: Option<Owner>) -> Result<Vec<ArtifactMatch>>;
}

/// Scans the record tables directly; no index to maintain.
#[derive(Clone)]
pub struct ScanIndex {
    storage: Storage,
}

impl ScanIndex {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn snippet(
        &self,
        id: ArtifactId,
        tier: MatchTier,
        needle: &str,
        filename: &str,
    ) -> Result<String> {
        let snippet = match tier {
            MatchTier::Filename => filename.to_string(),
            MatchTier::Claim => self
                .storage
                .claims(id)
                .await?
                .into_iter()
                .map(|c| format!("{}: {}", c.key, c.value))
                .find(|line| line.to_ascii_lowercase().contains(needle))
                .unwrap_or_default(),
            MatchTier::Text => {
                let text = full_text(&self.storage.segments(id).await?);
                context_around(&text, needle, SNIPPET_RADIUS)
            }
        };
        Ok(snippet)
    }
}

#[async_trait]
impl SearchIndex for ScanIndex {
    async fn search(&self, query: &str, scope: Option<Owner>) -> Result<Vec<ArtifactMatch>> {
        let needle = query.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        // Claim keys are searchable alongside values. Segment text is joined
        // in reading order so matches may span segments.
        let hits: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, tier FROM (
                SELECT a.id, a.created_at,
                    CASE
                        WHEN instr(lower(a.original_filename), ?1) > 0 THEN 0
                        WHEN EXISTS (
                            SELECT 1 FROM claims c
                            WHERE c.artifact_id = a.id
                              AND (instr(lower(c.value), ?1) > 0 OR instr(lower(c.key), ?1) > 0)
                        ) THEN 1
                        WHEN instr(lower((
                            SELECT group_concat(text, char(10)) FROM (
                                SELECT s.text FROM text_segments s
                                WHERE s.artifact_id = a.id
                                ORDER BY s.seq
                            )
                        )), ?1) > 0 THEN 2
                    END AS tier
                FROM artifacts a
                WHERE ?2 IS NULL OR (a.owner_type = ?2 AND a.owner_id = ?3)
            )
            WHERE tier IS NOT NULL
            ORDER BY tier, created_at DESC, id DESC
            "#,
        )
        .bind(&needle)
        .bind(scope.map(|o| o.type_str()))
        .bind(scope.map(|o| o.id()))
        .fetch_all(self.storage.pool())
        .await?;

        let ids: Vec<ArtifactId> = hits.iter().map(|(id, _)| ArtifactId(*id)).collect();
        let artifacts = self.storage.artifacts_by_ids(&ids).await?;

        let mut matches = Vec::with_capacity(artifacts.len());
        for (artifact, (_, rank)) in artifacts.into_iter().zip(hits) {
            let tier = MatchTier::from_rank(rank);
            let snippet = self
                .snippet(artifact.id, tier, &needle, &artifact.original_filename)
                .await?;
            matches.push(ArtifactMatch {
                artifact,
                tier,
                snippet,
            });
        }

        tracing::debug!(query, scope = ?scope, results = matches.len(), "search");
        Ok(matches)
    }
}

/// `radius` bytes either side of the first match, widened to char boundaries.
fn context_around(text: &str, needle: &str, radius: usize) -> String {
    let Some(pos) = text.to_ascii_lowercase().find(needle) else {
        return String::new();
    };

    let mut start = pos.saturating_sub(radius);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + needle.len() + radius).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let mut snippet = text[start..end].replace('\n', " ");
    if start > 0 {
        snippet.insert_str(0, "...");
    }
    if end < text.len() {
        snippet.push_str("...");
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_order_filename_first() {
        assert!(MatchTier::Filename < MatchTier::Claim);
        assert!(MatchTier::Claim < MatchTier::Text);
        assert_eq!(MatchTier::from_rank(1), MatchTier::Claim);
    }

    #[test]
    fn test_context_around_match() {
        let text = "The pad-mounted transformer sits near the north gate.";
        assert_eq!(context_around(text, "transformer", 4), "...ted transformer sit...");
        assert_eq!(context_around(text, "the", 200), text);
        assert_eq!(context_around(text, "absent", 10), "");
    }

    #[tokio::test]
    async fn test_blank_query_matches_nothing() {
        let storage = Storage::open_memory().await.unwrap();
        let index = ScanIndex::new(storage);
        assert!(index.search("   ", None).await.unwrap().is_empty());
    }
}
