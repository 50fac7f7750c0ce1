//! Artifact registration: record, store bytes, queue text extraction.

use sha2::{Digest, Sha256};
use tracing::info;

use crate::{
    artifact::{Artifact, NewArtifact},
    blob::BlobStore,
    job::{JobId, JobKind},
    queue::{insert_pending_job, JobQueue},
    storage::{insert_artifact_with, set_locator_with},
    Result,
};

/// Register an artifact and queue its first stage. The row, locator and job
/// are written in one transaction that commits only after the bytes are
/// stored, so a failed store leaves no artifact behind.
pub async fn register(
    queue: &JobQueue,
    blobs: &dyn BlobStore,
    new: &NewArtifact,
    bytes: &[u8],
) -> Result<(Artifact, JobId)> {
    let storage = queue.storage();
    let mut tx = storage.pool().begin().await?;

    let artifact = insert_artifact_with(&mut *tx, new).await?;
    let locator = blobs
        .store(bytes, artifact.id, &artifact.original_filename)
        .await?;
    let sha256 = hex_digest(bytes);
    let byte_size = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
    set_locator_with(&mut *tx, artifact.id, &locator, &sha256, byte_size).await?;
    let job_id = insert_pending_job(&mut *tx, artifact.id, JobKind::TextExtract).await?;

    tx.commit().await?;

    info!(
        artifact_id = %artifact.id,
        owner = %artifact.owner,
        media_kind = %artifact.media_kind,
        bytes = bytes.len(),
        "artifact registered"
    );

    let artifact = storage.get_artifact(artifact.id).await?;
    Ok((artifact, job_id))
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
