//! Claim export as JSON lines, one claim per line with its owning site.

use std::io::Write;

use serde::Serialize;
use tracing::debug;

use crate::{artifact::Owner, claim::Claim, storage::Storage, Result};

#[derive(Debug, Serialize)]
pub struct ClaimRecord<'a> {
    pub owner: Owner,
    pub filename: &'a str,
    #[serde(flatten)]
    pub claim: &'a Claim,
}

/// Write every claim in `scope` (all sites when `None`), ordered by artifact
/// then key. Returns the number of lines written.
pub async fn export_claims<W: Write>(
    storage: &Storage,
    scope: Option<Owner>,
    mut out: W,
) -> Result<usize> {
    let mut artifacts = storage.list_artifacts(scope).await?;
    artifacts.sort_by_key(|a| a.id);

    let mut count = 0;
    for artifact in &artifacts {
        for claim in storage.claims(artifact.id).await? {
            let record = ClaimRecord {
                owner: artifact.owner,
                filename: &artifact.original_filename,
                claim: &claim,
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
            count += 1;
        }
    }

    debug!(scope = ?scope, claims = count, "claims exported");
    Ok(count)
}
