use std::path::Path;

use anyhow::{bail, Context, Result};
use siteproof_core::{intake, Config, MediaKind, NewArtifact};

use super::{App, OwnerArgs};

pub async fn run_add(
    config: Config,
    path: &Path,
    owner: &OwnerArgs,
    kind: Option<&str>,
    mime: Option<&str>,
) -> Result<()> {
    let owner = owner.owner()?;
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("path has no file name")?;

    let media_kind = match kind {
        Some(kind) => kind.parse::<MediaKind>()?,
        None => MediaKind::infer(&filename, mime),
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut new = NewArtifact::new(owner, filename, media_kind);
    if let Some(mime) = mime {
        new = new.with_mime_type(mime);
    }

    let app = App::open(config).await?;
    let (artifact, job_id) = intake::register(&app.queue, app.blobs.as_ref(), &new, &bytes).await?;

    eprintln!(
        "Added: {} -> artifact {} ({}, {})",
        path.display(),
        artifact.id,
        artifact.media_kind,
        artifact.owner
    );
    eprintln!("  Queued: {} job {job_id}", siteproof_core::JobKind::TextExtract);
    println!("{}", artifact.id);
    Ok(())
}

pub async fn run_note(config: Config, owner: &OwnerArgs, text: &str, name: &str) -> Result<()> {
    let owner = owner.owner()?;
    if text.trim().is_empty() {
        bail!("note text is empty");
    }

    let new = NewArtifact::new(owner, name, MediaKind::Note).with_mime_type("text/plain");
    let app = App::open(config).await?;
    let (artifact, job_id) =
        intake::register(&app.queue, app.blobs.as_ref(), &new, text.as_bytes()).await?;

    eprintln!("Added note: artifact {} ({})", artifact.id, artifact.owner);
    eprintln!("  Queued: {} job {job_id}", siteproof_core::JobKind::TextExtract);
    println!("{}", artifact.id);
    Ok(())
}
