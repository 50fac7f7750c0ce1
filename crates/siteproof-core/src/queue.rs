//! Durable job queue over the `jobs` table.
//!
//! Every status change goes through this module. Transitions are written as
//! compare-and-set updates on the current status so a stale caller gets
//! `InvalidTransition` instead of clobbering someone else's state.

use chrono::Utc;
use sqlx::{Executor, Sqlite, Transaction};
use tracing::{debug, info, warn};

use crate::{
    artifact::ArtifactId,
    claim::{producing_kind, NewClaim, DISCOVERY_PREFIX},
    job::{FailureKind, Job, JobFailure, JobId, JobKind, JobStatus, RetryPolicy},
    segment::NewSegment,
    storage::{format_ts, now, parse_job_row, JobRow, Storage, JOB_COLUMNS},
    Error, Result,
};

/// Output a stage hands back on success. It replaces the previous output of
/// the same stage for the artifact.
#[derive(Debug, Clone, Default)]
pub enum StageOutput {
    #[default]
    Nothing,
    Segments(Vec<NewSegment>),
    Claims(Vec<NewClaim>),
}

/// Everything written when a job is marked `done`.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub summary: Option<String>,
    pub output: StageOutput,
    /// Downstream stages to enqueue in the same transaction
    pub follow_ups: Vec<JobKind>,
}

impl Completion {
    #[must_use]
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: StageOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_follow_ups(mut self, follow_ups: Vec<JobKind>) -> Self {
        self.follow_ups = follow_ups;
        self
    }
}

#[derive(Clone)]
pub struct JobQueue {
    storage: Storage,
    policy: RetryPolicy,
}

impl JobQueue {
    #[must_use]
    pub fn new(storage: Storage, policy: RetryPolicy) -> Self {
        Self { storage, policy }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Create a `pending` job. Rejected with `DuplicateInFlight` while another
    /// job of the same kind for the artifact is pending, processing or awaiting
    /// an automatic retry.
    pub async fn enqueue(&self, artifact_id: ArtifactId, kind: JobKind) -> Result<JobId> {
        insert_pending_job(self.storage.pool(), artifact_id, kind).await
    }

    /// Take the oldest pending job (creation time, then id) and mark it
    /// `processing`. Selection and transition are a single statement.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let ts = format_ts(now());
        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET status = 'processing', claimed_at = ?1, updated_at = ?1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending'
                ORDER BY created_at, id
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&ts)
        .fetch_optional(self.storage.pool())
        .await?;

        row.map(parse_job_row).transpose()
    }

    /// Mark a `processing` job `done`, replacing the stage's previous output and
    /// enqueueing follow-ups in one transaction. Returns the ids of follow-up
    /// jobs actually created; kinds already in flight are skipped.
    pub async fn complete(&self, job_id: JobId, completion: Completion) -> Result<Vec<JobId>> {
        let mut tx = self.storage.pool().begin().await?;

        let job = fetch_job(&mut tx, job_id).await?;
        if job.status != JobStatus::Processing {
            return Err(Error::InvalidTransition {
                job_id,
                from: job.status,
                operation: "complete",
            });
        }

        let ts = format_ts(now());
        let written = match &completion.output {
            StageOutput::Nothing => 0,
            StageOutput::Segments(segments) => {
                replace_segments(&mut tx, &job, segments, &ts).await?
            }
            StageOutput::Claims(claims) => replace_claims(&mut tx, &job, claims, &ts).await?,
        };

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done',
                attempt_count = attempt_count + 1,
                result_summary = ?,
                next_attempt_at = NULL,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(&completion.summary)
        .bind(&ts)
        .bind(job_id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current = fetch_job(&mut tx, job_id).await?;
            return Err(Error::InvalidTransition {
                job_id,
                from: current.status,
                operation: "complete",
            });
        }

        let mut enqueued = Vec::new();
        for kind in &completion.follow_ups {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO jobs (artifact_id, kind, status, attempt_count, created_at, updated_at)
                VALUES (?, ?, 'pending', 0, ?, ?)
                "#,
            )
            .bind(job.artifact_id.0)
            .bind(kind.as_str())
            .bind(&ts)
            .bind(&ts)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                debug!(artifact_id = %job.artifact_id, kind = %kind, "follow-up already in flight");
            } else {
                enqueued.push(JobId(result.last_insert_rowid()));
            }
        }

        tx.commit().await?;

        info!(
            job_id = %job_id,
            artifact_id = %job.artifact_id,
            kind = %job.kind,
            records = written,
            follow_ups = enqueued.len(),
            "job done"
        );
        Ok(enqueued)
    }

    /// Record a failed attempt. The job becomes `failed_retryable` with a
    /// backoff deadline while attempts remain, otherwise `failed_terminal`.
    pub async fn fail(&self, job_id: JobId, failure: &JobFailure) -> Result<Job> {
        let job = self.storage.get_job(job_id).await?;
        if job.status != JobStatus::Processing {
            return Err(Error::InvalidTransition {
                job_id,
                from: job.status,
                operation: "fail",
            });
        }

        let attempt_count = job.attempt_count + 1;
        let status = self.policy.status_after_failure(attempt_count, failure.kind);
        let now_ts = now();
        let next_attempt_at = (status == JobStatus::FailedRetryable).then(|| {
            let delay = chrono::Duration::from_std(self.policy.backoff(attempt_count))
                .unwrap_or_else(|_| chrono::Duration::zero());
            format_ts(now_ts + delay)
        });

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?,
                attempt_count = ?,
                last_error = ?,
                next_attempt_at = ?,
                updated_at = ?
            WHERE id = ? AND status = 'processing' AND attempt_count = ?
            "#,
        )
        .bind(status.as_str())
        .bind(i64::from(attempt_count))
        .bind(&failure.message)
        .bind(&next_attempt_at)
        .bind(format_ts(now_ts))
        .bind(job_id.0)
        .bind(i64::from(job.attempt_count))
        .execute(self.storage.pool())
        .await?;

        if result.rows_affected() == 0 {
            let current = self.storage.get_job(job_id).await?;
            return Err(Error::InvalidTransition {
                job_id,
                from: current.status,
                operation: "fail",
            });
        }

        match status {
            JobStatus::FailedTerminal => warn!(
                job_id = %job_id,
                kind = %job.kind,
                attempt = attempt_count,
                permanent = failure.kind == FailureKind::Permanent,
                error = %failure.message,
                "job failed terminally"
            ),
            _ => info!(
                job_id = %job_id,
                kind = %job.kind,
                attempt = attempt_count,
                error = %failure.message,
                "job failed, will retry"
            ),
        }

        self.storage.get_job(job_id).await
    }

    /// Manual retry: `failed_retryable` or `failed_terminal` back to `pending`.
    /// Attempt history is kept.
    pub async fn retry(&self, job_id: JobId) -> Result<Job> {
        let job = self.storage.get_job(job_id).await?;
        if !job.status.is_retryable_manually() {
            return Err(Error::InvalidTransition {
                job_id,
                from: job.status,
                operation: "retry",
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', next_attempt_at = NULL, claimed_at = NULL, updated_at = ?
            WHERE id = ? AND status IN ('failed_retryable', 'failed_terminal')
            "#,
        )
        .bind(format_ts(now()))
        .bind(job_id.0)
        .execute(self.storage.pool())
        .await
        .map_err(|e| map_insert_error(e, job.artifact_id, job.kind))?;

        if result.rows_affected() == 0 {
            let current = self.storage.get_job(job_id).await?;
            return Err(Error::InvalidTransition {
                job_id,
                from: current.status,
                operation: "retry",
            });
        }

        info!(job_id = %job_id, kind = %job.kind, attempts = job.attempt_count, "job requeued manually");
        self.storage.get_job(job_id).await
    }

    /// Move `failed_retryable` jobs whose backoff has elapsed back to `pending`.
    pub async fn requeue_due(&self) -> Result<u64> {
        let ts = format_ts(now());
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', next_attempt_at = NULL, updated_at = ?1
            WHERE status = 'failed_retryable'
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
            "#,
        )
        .bind(&ts)
        .execute(self.storage.pool())
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            debug!(count, "requeued jobs after backoff");
        }
        Ok(count)
    }

    /// Boot sweep: any job left `processing` has no live owner once the worker
    /// restarts, so it goes back to `pending` with its attempt count untouched.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', claimed_at = NULL, updated_at = ?
            WHERE status = 'processing'
            "#,
        )
        .bind(format_ts(now()))
        .execute(self.storage.pool())
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            warn!(count, "recovered interrupted jobs");
        }
        Ok(count)
    }

    /// Time until the earliest backoff deadline, if any job is waiting on one.
    pub async fn next_retry_in(&self) -> Result<Option<std::time::Duration>> {
        let next: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT next_attempt_at FROM jobs
            WHERE status = 'failed_retryable' AND next_attempt_at IS NOT NULL
            ORDER BY next_attempt_at
            LIMIT 1
            "#,
        )
        .fetch_optional(self.storage.pool())
        .await?;

        let Some((raw,)) = next else {
            return Ok(None);
        };
        let at = crate::storage::parse_ts(&raw)?;
        Ok(Some((at - Utc::now()).to_std().unwrap_or_default()))
    }
}

pub(crate) async fn insert_pending_job<'e, E>(
    executor: E,
    artifact_id: ArtifactId,
    kind: JobKind,
) -> Result<JobId>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ts = format_ts(now());
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (artifact_id, kind, status, attempt_count, created_at, updated_at)
        VALUES (?, ?, 'pending', 0, ?, ?)
        "#,
    )
    .bind(artifact_id.0)
    .bind(kind.as_str())
    .bind(&ts)
    .bind(&ts)
    .execute(executor)
    .await
    .map_err(|e| map_insert_error(e, artifact_id, kind))?;

    let job_id = JobId(result.last_insert_rowid());
    debug!(job_id = %job_id, artifact_id = %artifact_id, kind = %kind, "job enqueued");
    Ok(job_id)
}

async fn fetch_job(tx: &mut Transaction<'_, Sqlite>, job_id: JobId) -> Result<Job> {
    let row: JobRow = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
        .bind(job_id.0)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(Error::JobNotFound(job_id))?;

    parse_job_row(row)
}

async fn replace_segments(
    tx: &mut Transaction<'_, Sqlite>,
    job: &Job,
    segments: &[NewSegment],
    ts: &str,
) -> Result<usize> {
    sqlx::query("DELETE FROM text_segments WHERE artifact_id = ?")
        .bind(job.artifact_id.0)
        .execute(&mut **tx)
        .await?;

    for (seq, segment) in segments.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO text_segments (artifact_id, job_id, seq, source, text, page, offset_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.artifact_id.0)
        .bind(job.id.0)
        .bind(i64::try_from(seq).unwrap_or(i64::MAX))
        .bind(segment.source.as_str())
        .bind(&segment.text)
        .bind(segment.page.map(i64::from))
        .bind(segment.offset_ms)
        .bind(ts)
        .execute(&mut **tx)
        .await?;
    }

    Ok(segments.len())
}

async fn replace_claims(
    tx: &mut Transaction<'_, Sqlite>,
    job: &Job,
    claims: &[NewClaim],
    ts: &str,
) -> Result<usize> {
    // Each claim stage owns its half of the key namespace.
    let delete = match job.kind {
        JobKind::DiscoveryExtract => {
            "DELETE FROM claims WHERE artifact_id = ? AND substr(key, 1, length(?)) = ?"
        }
        JobKind::StructuredExtract | JobKind::TextExtract => {
            "DELETE FROM claims WHERE artifact_id = ? AND substr(key, 1, length(?)) != ?"
        }
    };
    sqlx::query(delete)
        .bind(job.artifact_id.0)
        .bind(DISCOVERY_PREFIX)
        .bind(DISCOVERY_PREFIX)
        .execute(&mut **tx)
        .await?;

    let mut written = 0;
    for claim in claims {
        if producing_kind(&claim.key) != job.kind {
            warn!(job_id = %job.id, kind = %job.kind, key = %claim.key, "claim outside stage namespace skipped");
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO claims (artifact_id, job_id, key, value, unit, confidence, evidence, category, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.artifact_id.0)
        .bind(job.id.0)
        .bind(&claim.key)
        .bind(&claim.value)
        .bind(&claim.unit)
        .bind(claim.confidence)
        .bind(&claim.evidence)
        .bind(&claim.category)
        .bind(ts)
        .execute(&mut **tx)
        .await?;
        written += 1;
    }

    Ok(written)
}

fn map_insert_error(e: sqlx::Error, artifact_id: ArtifactId, kind: JobKind) -> Error {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return Error::DuplicateInFlight { artifact_id, kind };
        }
        if db_err.is_foreign_key_violation() {
            return Error::ArtifactNotFound(artifact_id);
        }
    }
    Error::Database(e)
}
