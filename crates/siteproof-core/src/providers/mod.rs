//! Capability providers: text extraction, OCR, transcription and LLM-backed
//! claim extraction. Each is optional; an absent one is `Provider::Unconfigured`.

mod embedded;
mod llm;
mod ocr;
mod process;
mod transcribe;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use embedded::EmbeddedTextExtractor;
pub use llm::{parse_json_loose, LlamaCppClient};
pub use ocr::TesseractOcr;
pub use transcribe::{parse_whisper_output, WhisperTranscriber};

use crate::config::ProvidersConfig;
use crate::schema::FieldSpec;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The engine or a tool it needs is missing or misconfigured.
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
    /// Timeouts, busy servers, exhausted resources.
    #[error("Transient provider error: {0}")]
    Transient(String),
    /// The engine answered but the output could not be interpreted.
    #[error("Malformed provider output: {0}")]
    Malformed(String),
    #[error("Provider failed: {0}")]
    Failed(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A pluggable capability. Pipeline code matches on this instead of probing
/// for missing engines at call time.
pub enum Provider<P: ?Sized> {
    Configured(Arc<P>),
    Unconfigured,
}

impl<P: ?Sized> Provider<P> {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }
}

impl<P: ?Sized> Clone for Provider<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Configured(p) => Self::Configured(Arc::clone(p)),
            Self::Unconfigured => Self::Unconfigured,
        }
    }
}

impl<P: ?Sized> std::fmt::Debug for Provider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configured(_) => f.write_str("Configured"),
            Self::Unconfigured => f.write_str("Unconfigured"),
        }
    }
}

/// Text recovered from a single page (or the whole file when pages are unknown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: Option<u32>,
    pub text: String,
}

impl PageText {
    #[must_use]
    pub fn new(page: Option<u32>, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedText {
    Pages(Vec<PageText>),
    /// The file has no text layer and needs OCR.
    Scanned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedText {
    pub offset_ms: i64,
    pub text: String,
}

/// What the OCR engine is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrInput {
    Image,
    Pdf,
}

/// A claim as returned by an extraction engine, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClaim {
    #[serde(default, alias = "label")]
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl RawClaim {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>, confidence: f64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            confidence: Some(confidence),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    /// Text layer of a document, or `Scanned` when there is none.
    async fn extract_embedded_text(&self, bytes: &[u8]) -> ProviderResult<EmbeddedText>;
}

#[async_trait::async_trait]
pub trait Ocr: Send + Sync {
    async fn ocr(&self, bytes: &[u8], input: OcrInput) -> ProviderResult<Vec<PageText>>;
}

#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, bytes: &[u8]) -> ProviderResult<Vec<TimedText>>;
}

#[async_trait::async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn structured_extract(
        &self,
        text: &str,
        schema: &[FieldSpec],
    ) -> ProviderResult<Vec<RawClaim>>;
}

#[async_trait::async_trait]
pub trait DiscoveryExtractor: Send + Sync {
    async fn discovery_extract(&self, text: &str, max_facts: usize)
        -> ProviderResult<Vec<RawClaim>>;
}

/// The full set of capabilities handed to the pipeline.
#[derive(Clone, Debug)]
pub struct Providers {
    pub embedded: Provider<dyn TextExtractor>,
    pub ocr: Provider<dyn Ocr>,
    pub transcriber: Provider<dyn Transcriber>,
    pub structured: Provider<dyn StructuredExtractor>,
    pub discovery: Provider<dyn DiscoveryExtractor>,
}

impl Default for Providers {
    fn default() -> Self {
        Self::none()
    }
}

impl Providers {
    /// Nothing configured.
    #[must_use]
    pub fn none() -> Self {
        Self {
            embedded: Provider::Unconfigured,
            ocr: Provider::Unconfigured,
            transcriber: Provider::Unconfigured,
            structured: Provider::Unconfigured,
            discovery: Provider::Unconfigured,
        }
    }

    /// Build the concrete engines named in the config. Embedded PDF/plain-text
    /// extraction is always available.
    pub fn from_config(config: &ProvidersConfig) -> crate::Result<Self> {
        let mut providers = Self::none().with_embedded(Arc::new(EmbeddedTextExtractor::new()));

        if let Some(command) = &config.ocr_command {
            providers = providers.with_ocr(Arc::new(TesseractOcr::new(command)));
        }

        if let Some(whisper) = &config.whisper_command {
            providers = providers.with_transcriber(Arc::new(WhisperTranscriber::new(
                config.ffmpeg_command.clone(),
                whisper,
                config.whisper_model.clone(),
            )));
        }

        if let Some(url) = &config.llm_url {
            let client = Arc::new(LlamaCppClient::new(
                url,
                std::time::Duration::from_secs(config.llm_timeout_secs),
                config.llm_max_tokens,
                config.llm_temperature,
            )?
            .with_model_attempts(config.llm_attempts));
            providers = providers
                .with_structured(client.clone())
                .with_discovery(client);
        }

        Ok(providers)
    }

    #[must_use]
    pub fn with_embedded(mut self, p: Arc<dyn TextExtractor>) -> Self {
        self.embedded = Provider::Configured(p);
        self
    }

    #[must_use]
    pub fn with_ocr(mut self, p: Arc<dyn Ocr>) -> Self {
        self.ocr = Provider::Configured(p);
        self
    }

    #[must_use]
    pub fn with_transcriber(mut self, p: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Provider::Configured(p);
        self
    }

    #[must_use]
    pub fn with_structured(mut self, p: Arc<dyn StructuredExtractor>) -> Self {
        self.structured = Provider::Configured(p);
        self
    }

    #[must_use]
    pub fn with_discovery(mut self, p: Arc<dyn DiscoveryExtractor>) -> Self {
        self.discovery = Provider::Configured(p);
        self
    }

    /// Capability name and whether it is configured.
    #[must_use]
    pub fn describe(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("embedded_text", self.embedded.is_configured()),
            ("ocr", self.ocr.is_configured()),
            ("transcription", self.transcriber.is_configured()),
            ("structured_extract", self.structured.is_configured()),
            ("discovery_extract", self.discovery.is_configured()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_by_default() {
        let providers = Providers::default();
        assert!(providers.describe().iter().all(|(_, on)| !on));
    }

    #[test]
    fn test_from_config_wires_llm_to_both_claim_stages() {
        let config = ProvidersConfig {
            llm_url: Some("http://127.0.0.1:8080".into()),
            ..ProvidersConfig::default()
        };
        let providers = Providers::from_config(&config).unwrap();
        assert!(providers.embedded.is_configured());
        assert!(providers.structured.is_configured());
        assert!(providers.discovery.is_configured());
        assert!(!providers.ocr.is_configured());
        assert!(!providers.transcriber.is_configured());
    }

    #[test]
    fn test_raw_claim_accepts_label_alias() {
        let raw: RawClaim = serde_json::from_str(
            r#"{"label": "Feeder", "value": "12F3", "confidence": 0.8, "category": "power"}"#,
        )
        .unwrap();
        assert_eq!(raw.key, "Feeder");
        assert_eq!(raw.confidence, Some(0.8));
        assert_eq!(raw.category.as_deref(), Some("power"));
    }
}
