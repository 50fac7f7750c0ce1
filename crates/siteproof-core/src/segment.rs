use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactId;
use crate::job::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSource {
    Embedded,
    Ocr,
    Transcript,
    Note,
}

impl SegmentSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Ocr => "ocr",
            Self::Transcript => "transcript",
            Self::Note => "note",
        }
    }
}

impl std::fmt::Display for SegmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SegmentSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded" => Ok(Self::Embedded),
            "ocr" => Ok(Self::Ocr),
            "transcript" => Ok(Self::Transcript),
            "note" => Ok(Self::Note),
            _ => Err(crate::Error::InvalidSegmentSource(s.to_string())),
        }
    }
}

/// A persisted chunk of extracted text. `seq` is zero-based reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSegment {
    pub artifact_id: ArtifactId,
    pub job_id: JobId,
    pub seq: u32,
    pub source: SegmentSource,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Segment content produced by a stage, before the store assigns sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSegment {
    pub source: SegmentSource,
    pub text: String,
    pub page: Option<u32>,
    pub offset_ms: Option<i64>,
}

impl NewSegment {
    #[must_use]
    pub fn new(source: SegmentSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            page: None,
            offset_ms: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_offset_ms(mut self, offset_ms: i64) -> Self {
        self.offset_ms = Some(offset_ms);
        self
    }
}

/// Reconstruct the full extracted text from segments already in `seq` order.
#[must_use]
pub fn full_text(segments: &[TextSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(seq: u32, text: &str) -> TextSegment {
        TextSegment {
            artifact_id: ArtifactId(1),
            job_id: JobId(1),
            seq,
            source: SegmentSource::Embedded,
            text: text.to_string(),
            page: Some(seq + 1),
            offset_ms: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn full_text_joins_in_order() {
        let segments = vec![segment(0, "first page"), segment(1, "second page")];
        assert_eq!(full_text(&segments), "first page\nsecond page");
        assert_eq!(full_text(&[]), "");
    }

    #[test]
    fn source_parses() {
        assert_eq!("ocr".parse::<SegmentSource>().unwrap(), SegmentSource::Ocr);
        assert!("handwriting".parse::<SegmentSource>().is_err());
    }
}
