use tracing::{debug, info, warn};

use super::{Pipeline, StageError, StageResult};
use crate::{
    artifact::{Artifact, MediaKind},
    job::JobKind,
    providers::{EmbeddedText, OcrInput, PageText, Provider, TimedText},
    queue::{Completion, StageOutput},
    segment::{NewSegment, SegmentSource},
};

impl Pipeline {
    pub(super) async fn extract_text(&self, artifact: &Artifact) -> StageResult<Completion> {
        let bytes = self.read_bytes(artifact).await?;

        let segments = match artifact.media_kind {
            MediaKind::Document => self.document_segments(&bytes).await?,
            MediaKind::Image => {
                let pages = self.run_ocr(&bytes, OcrInput::Image).await?;
                page_segments(pages, SegmentSource::Ocr)
            }
            MediaKind::Audio | MediaKind::Video => {
                let Provider::Configured(transcriber) = &self.providers.transcriber else {
                    return Err(StageError::unavailable(
                        "no transcriber configured for audio/video",
                        false,
                    ));
                };
                timed_segments(transcriber.transcribe(&bytes).await?)
            }
            MediaKind::Note => note_segments(&bytes)?,
        };

        let Some(first) = segments.first() else {
            // Never trade stored text for nothing; the claims rest on it.
            let existing = self.storage.segments(artifact.id).await?.len();
            if existing > 0 {
                return Err(StageError::Validation(format!(
                    "no text found, refusing to replace {existing} existing segments"
                )));
            }
            info!(artifact_id = %artifact.id, "no text found");
            return Ok(Completion::summary("no text found"));
        };

        let summary = format!("{} segments ({})", segments.len(), first.source);
        Ok(Completion::summary(summary)
            .with_output(StageOutput::Segments(segments))
            .with_follow_ups(self.claim_stages()))
    }

    /// Claim stages worth enqueueing after text extraction. Stages without a
    /// configured provider are skipped, not failed.
    fn claim_stages(&self) -> Vec<JobKind> {
        let mut kinds = Vec::new();
        if self.providers.structured.is_configured() {
            kinds.push(JobKind::StructuredExtract);
        } else {
            debug!("structured extraction not configured, skipping");
        }
        if self.providers.discovery.is_configured() {
            kinds.push(JobKind::DiscoveryExtract);
        } else {
            debug!("discovery extraction not configured, skipping");
        }
        kinds
    }

    /// Embedded text first; OCR when the file has no usable text layer.
    async fn document_segments(&self, bytes: &[u8]) -> StageResult<Vec<NewSegment>> {
        let embedded_error = match &self.providers.embedded {
            Provider::Configured(extractor) => match extractor.extract_embedded_text(bytes).await {
                Ok(EmbeddedText::Pages(pages)) => {
                    let segments = page_segments(pages, SegmentSource::Embedded);
                    if !segments.is_empty() {
                        return Ok(segments);
                    }
                    None
                }
                Ok(EmbeddedText::Scanned) => None,
                Err(e) if self.providers.ocr.is_configured() => {
                    warn!(error = %e, "embedded text extraction failed, trying OCR");
                    Some(e)
                }
                Err(e) => return Err(e.into()),
            },
            Provider::Unconfigured => None,
        };

        if !self.providers.ocr.is_configured() {
            return Err(match embedded_error {
                Some(e) => e.into(),
                None => StageError::unavailable(
                    "document has no text layer and no OCR is configured",
                    false,
                ),
            });
        }

        let pages = self.run_ocr(bytes, OcrInput::Pdf).await?;
        Ok(page_segments(pages, SegmentSource::Ocr))
    }

    async fn run_ocr(&self, bytes: &[u8], input: OcrInput) -> StageResult<Vec<PageText>> {
        let Provider::Configured(ocr) = &self.providers.ocr else {
            return Err(StageError::unavailable("no OCR engine configured", false));
        };
        Ok(ocr.ocr(bytes, input).await?)
    }
}

fn page_segments(pages: Vec<PageText>, source: SegmentSource) -> Vec<NewSegment> {
    pages
        .into_iter()
        .filter_map(|p| {
            let text = p.text.trim();
            if text.is_empty() {
                return None;
            }
            let segment = NewSegment::new(source, text);
            Some(match p.page {
                Some(page) => segment.with_page(page),
                None => segment,
            })
        })
        .collect()
}

fn timed_segments(timed: Vec<TimedText>) -> Vec<NewSegment> {
    timed
        .into_iter()
        .filter(|t| !t.text.trim().is_empty())
        .map(|t| NewSegment::new(SegmentSource::Transcript, t.text.trim()).with_offset_ms(t.offset_ms))
        .collect()
}

fn note_segments(bytes: &[u8]) -> StageResult<Vec<NewSegment>> {
    let raw = std::str::from_utf8(bytes)
        .map_err(|e| StageError::Validation(format!("note is not UTF-8 text: {e}")))?;
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![NewSegment::new(SegmentSource::Note, text)])
}
