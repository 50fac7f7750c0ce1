use super::{EmbeddedText, PageText, ProviderError, ProviderResult, TextExtractor};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Reads the text layer of PDFs and decodes plain-text documents.
#[derive(Debug, Default)]
pub struct EmbeddedTextExtractor;

impl EmbeddedTextExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl TextExtractor for EmbeddedTextExtractor {
    async fn extract_embedded_text(&self, bytes: &[u8]) -> ProviderResult<EmbeddedText> {
        if bytes.starts_with(PDF_MAGIC) {
            let owned = bytes.to_vec();
            // pdf-extract is synchronous and can panic on broken files
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem_by_pages(&owned)
            })
            .await
            .map_err(|e| ProviderError::Failed(format!("PDF parser crashed: {e}")))?
            .map_err(|e| ProviderError::Failed(format!("PDF extraction failed: {e}")))?;

            return Ok(pages_to_text(pages));
        }

        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(pages_to_text(vec![text.to_string()])),
            Err(_) => Err(ProviderError::Failed(
                "unsupported document format (not PDF or UTF-8 text)".to_string(),
            )),
        }
    }
}

fn pages_to_text(pages: Vec<String>) -> EmbeddedText {
    let numbered = pages.len() > 1;
    let pages: Vec<PageText> = pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let page = numbered.then(|| u32::try_from(i + 1).unwrap_or(u32::MAX));
            Some(PageText::new(page, text))
        })
        .collect();

    if pages.is_empty() {
        EmbeddedText::Scanned
    } else {
        EmbeddedText::Pages(pages)
    }
}
