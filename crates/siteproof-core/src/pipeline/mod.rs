//! Maps a claimed job onto capability providers and turns their output into
//! validated segments or claims. Nothing here writes job status; the worker
//! hands the resulting `Completion` or `StageError` to the queue.

mod claims;
mod text;

use std::sync::Arc;

use thiserror::Error;

use crate::{
    artifact::Artifact,
    blob::BlobStore,
    config::Config,
    job::{FailureKind, Job, JobFailure, JobKind},
    providers::{ProviderError, Providers},
    queue::Completion,
    storage::Storage,
};

pub use claims::{coerce_value, truncate_chars};

#[derive(Debug, Error)]
pub enum StageError {
    /// A capability the stage needs is missing. `transient` is false when the
    /// setup is clearly wrong and retrying cannot help.
    #[error("Capability unavailable: {message}")]
    CapabilityUnavailable { message: String, transient: bool },
    #[error("Transient provider error: {0}")]
    TransientProvider(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Validation failure: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(#[from] crate::Error),
}

impl StageError {
    pub(crate) fn unavailable(message: impl Into<String>, transient: bool) -> Self {
        Self::CapabilityUnavailable {
            message: message.into(),
            transient,
        }
    }

    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::CapabilityUnavailable {
                transient: false, ..
            } => FailureKind::Permanent,
            _ => FailureKind::Transient,
        }
    }

    #[must_use]
    pub fn to_failure(&self) -> JobFailure {
        JobFailure {
            message: self.to_string(),
            kind: self.failure_kind(),
        }
    }
}

impl From<ProviderError> for StageError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(msg) => Self::unavailable(msg, false),
            ProviderError::Transient(msg) => Self::TransientProvider(msg),
            ProviderError::Malformed(msg) => Self::Validation(msg),
            ProviderError::Failed(msg) => Self::Provider(msg),
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Characters of artifact text handed to claim extractors
    pub llm_max_chars: usize,
    pub discovery_max_facts: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            llm_max_chars: 12_000,
            discovery_max_facts: 40,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm_max_chars: config.providers.llm_max_chars,
            discovery_max_facts: config.extraction.discovery_max_facts,
        }
    }
}

pub struct Pipeline {
    storage: Storage,
    blobs: Arc<dyn BlobStore>,
    providers: Providers,
    settings: PipelineSettings,
}

impl Pipeline {
    #[must_use]
    pub fn new(storage: Storage, blobs: Arc<dyn BlobStore>, providers: Providers) -> Self {
        Self {
            storage,
            blobs,
            providers,
            settings: PipelineSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the stage for `job` and describe what its completion should write.
    pub async fn process(&self, job: &Job) -> StageResult<Completion> {
        let artifact = self.storage.get_artifact(job.artifact_id).await?;
        match job.kind {
            JobKind::TextExtract => self.extract_text(&artifact).await,
            JobKind::StructuredExtract => self.structured_extract(&artifact).await,
            JobKind::DiscoveryExtract => self.discovery_extract(&artifact).await,
        }
    }

    async fn read_bytes(&self, artifact: &Artifact) -> StageResult<Vec<u8>> {
        let Some(locator) = &artifact.locator else {
            return Err(StageError::unavailable(
                format!("artifact {} has no stored bytes yet", artifact.id),
                true,
            ));
        };
        self.blobs.read(locator).await.map_err(|e| {
            StageError::unavailable(format!("blob storage read failed: {e}"), true)
        })
    }
}
