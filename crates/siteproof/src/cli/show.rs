use anyhow::Result;
use serde_json::json;
use siteproof_core::{ArtifactId, Config, JobFilter};

use super::{clip, App};

pub async fn run(config: Config, artifact_id: ArtifactId, as_json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let storage = app.storage();

    let artifact = storage.get_artifact(artifact_id).await?;
    let jobs = storage
        .list_jobs(JobFilter {
            artifact_id: Some(artifact_id),
            ..JobFilter::default()
        })
        .await?;
    let segments = storage.segments(artifact_id).await?;
    let claims = storage.claims(artifact_id).await?;

    if as_json {
        let doc = json!({
            "artifact": artifact,
            "jobs": jobs,
            "segments": segments,
            "claims": claims,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Artifact {}: {}", artifact.id, artifact.original_filename);
    println!("  Owner: {}", artifact.owner);
    println!("  Kind: {}", artifact.media_kind);
    if let Some(sha) = &artifact.sha256 {
        println!("  SHA-256: {sha}");
    }
    println!("  Created: {}", artifact.created_at.to_rfc3339());

    println!("Jobs:");
    for job in &jobs {
        let detail = job
            .last_error
            .as_deref()
            .or(job.result_summary.as_deref())
            .unwrap_or("");
        println!(
            "  #{} {} {} (attempts {}) {}",
            job.id,
            job.kind,
            job.status,
            job.attempt_count,
            clip(detail, 100)
        );
    }

    println!("Text ({} segments):", segments.len());
    for segment in &segments {
        let position = match (segment.page, segment.offset_ms) {
            (Some(page), _) => format!(" p{page}"),
            (None, Some(ms)) => format!(" @{}s", ms / 1000),
            (None, None) => String::new(),
        };
        println!(
            "  [{}] {}{}: {}",
            segment.seq,
            segment.source,
            position,
            clip(&segment.text, 120)
        );
    }

    println!("Claims ({}):", claims.len());
    for claim in &claims {
        let unit = claim.unit.as_deref().map(|u| format!(" {u}")).unwrap_or_default();
        println!(
            "  {} = {}{} (confidence {:.2}, job {})",
            claim.key, claim.value, unit, claim.confidence, claim.job_id
        );
    }
    Ok(())
}
