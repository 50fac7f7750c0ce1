use thiserror::Error;

use crate::artifact::ArtifactId;
use crate::job::{JobId, JobKind, JobStatus};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Duplicate in-flight job: {kind} already queued or running for artifact {artifact_id}")]
    DuplicateInFlight {
        artifact_id: ArtifactId,
        kind: JobKind,
    },

    #[error("Invalid transition: cannot {operation} job {job_id} from status {from}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        operation: &'static str,
    },

    #[error("Invalid media kind: {0}")]
    InvalidMediaKind(String),

    #[error("Invalid job kind: {0}")]
    InvalidJobKind(String),

    #[error("Invalid job status: {0}")]
    InvalidJobStatus(String),

    #[error("Invalid segment source: {0}")]
    InvalidSegmentSource(String),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage locator unusable: {0}")]
    Locator(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
