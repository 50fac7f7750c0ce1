use std::path::Path;

use super::process::run_tool;
use super::{Ocr, OcrInput, PageText, ProviderError, ProviderResult};

const PDF_RENDER_DPI: &str = "220";

/// OCR through the `tesseract` CLI. Scanned PDFs are rasterized with
/// `pdftoppm` first.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    rasterizer: String,
}

impl TesseractOcr {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            rasterizer: "pdftoppm".to_string(),
        }
    }

    #[must_use]
    pub fn with_rasterizer(mut self, rasterizer: impl Into<String>) -> Self {
        self.rasterizer = rasterizer.into();
        self
    }

    async fn ocr_image(&self, bytes: &[u8]) -> ProviderResult<String> {
        let out = run_tool(&self.command, &["stdin", "stdout"], Some(bytes)).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    async fn ocr_file(&self, path: &Path) -> ProviderResult<String> {
        let path = path.to_string_lossy();
        let out = run_tool(&self.command, &[&*path, "stdout"], None).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    async fn ocr_pdf(&self, bytes: &[u8]) -> ProviderResult<Vec<PageText>> {
        let dir = tempfile::tempdir()
            .map_err(|e| ProviderError::Transient(format!("temp dir: {e}")))?;
        let pdf_path = dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, bytes)
            .await
            .map_err(|e| ProviderError::Transient(format!("temp file: {e}")))?;

        let input = pdf_path.to_string_lossy();
        let prefix = dir.path().join("page");
        let prefix = prefix.to_string_lossy();
        run_tool(
            &self.rasterizer,
            &["-r", PDF_RENDER_DPI, "-png", &*input, &*prefix],
            None,
        )
        .await?;

        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path())
            .await
            .map_err(|e| ProviderError::Transient(format!("temp dir: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProviderError::Transient(format!("temp dir: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                images.push(path);
            }
        }
        // pdftoppm zero-pads page numbers, so name order is page order
        images.sort();

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let text = self.ocr_file(image).await?;
            pages.push(PageText::new(
                Some(u32::try_from(i + 1).unwrap_or(u32::MAX)),
                text,
            ));
        }
        Ok(pages)
    }
}

#[async_trait::async_trait]
impl Ocr for TesseractOcr {
    async fn ocr(&self, bytes: &[u8], input: OcrInput) -> ProviderResult<Vec<PageText>> {
        match input {
            OcrInput::Image => Ok(vec![PageText::new(None, self.ocr_image(bytes).await?)]),
            OcrInput::Pdf => self.ocr_pdf(bytes).await,
        }
    }
}
