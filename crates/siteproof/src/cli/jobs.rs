use anyhow::Result;
use siteproof_core::{ArtifactId, Config, Error, JobFilter, JobId, JobKind, JobStatus};

use super::{clip, App};

pub async fn run_list(
    config: Config,
    artifact: Option<ArtifactId>,
    status: Option<&str>,
    kind: Option<&str>,
) -> Result<()> {
    let filter = JobFilter {
        artifact_id: artifact,
        status: status.map(str::parse::<JobStatus>).transpose()?,
        kind: kind.map(str::parse::<JobKind>).transpose()?,
    };

    let app = App::open(config).await?;
    let jobs = app.storage().list_jobs(filter).await?;
    if jobs.is_empty() {
        eprintln!("No jobs");
        return Ok(());
    }

    println!("id\tartifact\tkind\tstatus\tattempts\tsummary\tlast_error");
    for job in jobs {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            job.id,
            job.artifact_id,
            job.kind,
            job.status,
            job.attempt_count,
            job.result_summary.as_deref().unwrap_or("-"),
            job.last_error.as_deref().map_or_else(|| "-".to_string(), |e| clip(e, 80)),
        );
    }
    Ok(())
}

pub async fn run_retry(config: Config, job_id: JobId) -> Result<()> {
    let app = App::open(config).await?;
    let job = app.queue.retry(job_id).await?;
    eprintln!(
        "Requeued: job {} ({}, {} attempts so far)",
        job.id, job.kind, job.attempt_count
    );
    Ok(())
}

pub async fn run_rerun(config: Config, artifact_id: ArtifactId, kind: &str) -> Result<()> {
    let kind: JobKind = kind.parse()?;
    let app = App::open(config).await?;

    match app.queue.enqueue(artifact_id, kind).await {
        Ok(job_id) => {
            eprintln!("Queued: {kind} job {job_id} for artifact {artifact_id}");
            println!("{job_id}");
            Ok(())
        }
        Err(Error::DuplicateInFlight { .. }) => {
            eprintln!("Already queued: {kind} for artifact {artifact_id}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_reprocess(config: Config) -> Result<()> {
    let app = App::open(config).await?;
    let mut queued = 0usize;
    let mut skipped = 0usize;

    for artifact in app.storage().list_artifacts(None).await? {
        match app.queue.enqueue(artifact.id, JobKind::TextExtract).await {
            Ok(_) => queued += 1,
            Err(Error::DuplicateInFlight { .. }) => skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    eprintln!("Queued {queued} artifacts for text extraction ({skipped} already queued)");
    Ok(())
}
