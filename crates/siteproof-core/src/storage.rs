use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Executor, Pool, Sqlite};

use crate::{
    artifact::{Artifact, ArtifactId, MediaKind, NewArtifact, Owner},
    claim::Claim,
    job::{Job, JobId, JobKind, JobStatus},
    segment::TextSegment,
    Error, Result,
};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_type TEXT NOT NULL CHECK (owner_type IN ('building', 'industrial_park')),
    owner_id INTEGER NOT NULL,
    original_filename TEXT NOT NULL,
    media_kind TEXT NOT NULL CHECK (media_kind IN ('document', 'image', 'audio', 'video', 'note')),
    mime_type TEXT,
    locator TEXT,
    sha256 TEXT,
    byte_size INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_owner ON artifacts(owner_type, owner_id);

CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
    kind TEXT NOT NULL CHECK (kind IN ('extract_text', 'structured_extract', 'discovery_extract')),
    status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'done', 'failed_retryable', 'failed_terminal')),
    attempt_count INTEGER NOT NULL DEFAULT 0 CHECK (attempt_count >= 0),
    last_error TEXT,
    result_summary TEXT,
    claimed_at TEXT,
    next_attempt_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_queue ON jobs(status, created_at, id);
CREATE INDEX IF NOT EXISTS idx_jobs_artifact ON jobs(artifact_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_in_flight ON jobs(artifact_id, kind)
    WHERE status IN ('pending', 'processing', 'failed_retryable');

CREATE TABLE IF NOT EXISTS text_segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    seq INTEGER NOT NULL CHECK (seq >= 0),
    source TEXT NOT NULL CHECK (source IN ('embedded', 'ocr', 'transcript', 'note')),
    text TEXT NOT NULL CHECK (length(text) > 0),
    page INTEGER,
    offset_ms INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE (artifact_id, seq)
);

CREATE TABLE IF NOT EXISTS claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    key TEXT NOT NULL CHECK (length(key) > 0),
    value TEXT NOT NULL CHECK (length(value) > 0),
    unit TEXT,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    evidence TEXT,
    category TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_claims_artifact ON claims(artifact_id);
CREATE INDEX IF NOT EXISTS idx_claims_key ON claims(key);
"#;

pub(crate) const JOB_COLUMNS: &str = "id, artifact_id, kind, status, attempt_count, last_error, \
     result_summary, claimed_at, next_attempt_at, created_at, updated_at";

pub(crate) type JobRow = (
    i64,
    i64,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

const ARTIFACT_COLUMNS: &str = "id, owner_type, owner_id, original_filename, media_kind, \
     mime_type, locator, sha256, byte_size, created_at";

type ArtifactRow = (
    i64,
    String,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    String,
);

type SegmentRow = (
    i64,
    i64,
    i64,
    String,
    String,
    Option<i64>,
    Option<i64>,
    String,
);

type ClaimRow = (
    i64,
    i64,
    String,
    String,
    Option<String>,
    f64,
    Option<String>,
    Option<String>,
    String,
);

/// Optional filters for listing jobs. `None` matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    pub artifact_id: Option<ArtifactId>,
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
}

/// Handle over the four record tables. Cloning shares the pool.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // Artifact operations

    pub async fn insert_artifact(&self, new: &NewArtifact) -> Result<Artifact> {
        insert_artifact_with(&self.pool, new).await
    }

    /// Record where the bytes live. Allowed once per artifact.
    pub async fn finalize_locator(
        &self,
        id: ArtifactId,
        locator: &str,
        sha256: &str,
        byte_size: i64,
    ) -> Result<()> {
        let updated = set_locator_with(&self.pool, id, locator, sha256, byte_size).await?;
        if updated == 0 {
            // Distinguish a missing artifact from one that is already finalized
            self.get_artifact(id).await?;
            return Err(Error::Locator(format!(
                "artifact {id} already has a storage locator"
            )));
        }
        Ok(())
    }

    pub async fn get_artifact(&self, id: ArtifactId) -> Result<Artifact> {
        let row: ArtifactRow = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::ArtifactNotFound(id))?;

        parse_artifact_row(row)
    }

    /// Newest first, limited to one building or park when `scope` is set.
    pub async fn list_artifacts(&self, scope: Option<Owner>) -> Result<Vec<Artifact>> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ARTIFACT_COLUMNS} FROM artifacts
            WHERE ?1 IS NULL OR (owner_type = ?1 AND owner_id = ?2)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(scope.map(|o| o.type_str()))
        .bind(scope.map(|o| o.id()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_artifact_row).collect()
    }

    pub(crate) async fn artifacts_by_ids(&self, ids: &[ArtifactId]) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::with_capacity(ids.len());
        for id in ids {
            artifacts.push(self.get_artifact(*id).await?);
        }
        Ok(artifacts)
    }

    // Job reads. Job status is only ever written through `JobQueue`.

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        let row: JobRow = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::JobNotFound(id))?;

        parse_job_row(row)
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE (?1 IS NULL OR artifact_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR kind = ?3)
            ORDER BY created_at, id
            "#
        ))
        .bind(filter.artifact_id.map(|id| id.0))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_job_row).collect()
    }

    // Stage output reads

    pub async fn segments(&self, artifact_id: ArtifactId) -> Result<Vec<TextSegment>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            r#"
            SELECT artifact_id, job_id, seq, source, text, page, offset_ms, created_at
            FROM text_segments WHERE artifact_id = ?
            ORDER BY seq
            "#,
        )
        .bind(artifact_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_segment_row).collect()
    }

    pub async fn claims(&self, artifact_id: ArtifactId) -> Result<Vec<Claim>> {
        let rows: Vec<ClaimRow> = sqlx::query_as(
            r#"
            SELECT artifact_id, job_id, key, value, unit, confidence, evidence, category, created_at
            FROM claims WHERE artifact_id = ?
            ORDER BY key, id
            "#,
        )
        .bind(artifact_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_claim_row).collect()
    }
}

pub(crate) async fn insert_artifact_with<'e, E>(executor: E, new: &NewArtifact) -> Result<Artifact>
where
    E: Executor<'e, Database = Sqlite>,
{
    let created_at = now();
    let result = sqlx::query(
        r#"
        INSERT INTO artifacts (owner_type, owner_id, original_filename, media_kind, mime_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.owner.type_str())
    .bind(new.owner.id())
    .bind(&new.original_filename)
    .bind(new.media_kind.as_str())
    .bind(&new.mime_type)
    .bind(format_ts(created_at))
    .execute(executor)
    .await?;

    Ok(Artifact {
        id: ArtifactId(result.last_insert_rowid()),
        owner: new.owner,
        original_filename: new.original_filename.clone(),
        media_kind: new.media_kind,
        mime_type: new.mime_type.clone(),
        locator: None,
        sha256: None,
        byte_size: None,
        created_at,
    })
}

/// Rows updated; zero when the artifact is missing or already has a locator.
pub(crate) async fn set_locator_with<'e, E>(
    executor: E,
    id: ArtifactId,
    locator: &str,
    sha256: &str,
    byte_size: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE artifacts SET locator = ?, sha256 = ?, byte_size = ? WHERE id = ? AND locator IS NULL",
    )
    .bind(locator)
    .bind(sha256)
    .bind(byte_size)
    .bind(id.0)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Current time at the fixed precision used for stored timestamps.
pub(crate) fn now() -> DateTime<Utc> {
    let ts = Utc::now();
    parse_ts(&format_ts(ts)).unwrap_or(ts)
}

/// Fixed-width RFC 3339 so lexical order equals chronological order.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|_| Error::InvalidTimestamp(raw.to_string()))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_artifact_row(row: ArtifactRow) -> Result<Artifact> {
    let (
        id,
        owner_type,
        owner_id,
        original_filename,
        media_kind,
        mime_type,
        locator,
        sha256,
        byte_size,
        created_at,
    ) = row;

    Ok(Artifact {
        id: ArtifactId(id),
        owner: Owner::from_parts(&owner_type, owner_id)?,
        original_filename,
        media_kind: media_kind.parse::<MediaKind>()?,
        mime_type,
        locator,
        sha256,
        byte_size,
        created_at: parse_ts(&created_at)?,
    })
}

pub(crate) fn parse_job_row(row: JobRow) -> Result<Job> {
    let (
        id,
        artifact_id,
        kind,
        status,
        attempt_count,
        last_error,
        result_summary,
        claimed_at,
        next_attempt_at,
        created_at,
        updated_at,
    ) = row;

    Ok(Job {
        id: JobId(id),
        artifact_id: ArtifactId(artifact_id),
        kind: kind.parse()?,
        status: status.parse()?,
        attempt_count: u32::try_from(attempt_count).unwrap_or_default(),
        last_error,
        result_summary,
        claimed_at: parse_opt_ts(claimed_at)?,
        next_attempt_at: parse_opt_ts(next_attempt_at)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn parse_segment_row(row: SegmentRow) -> Result<TextSegment> {
    let (artifact_id, job_id, seq, source, text, page, offset_ms, created_at) = row;

    Ok(TextSegment {
        artifact_id: ArtifactId(artifact_id),
        job_id: JobId(job_id),
        seq: u32::try_from(seq).unwrap_or_default(),
        source: source.parse()?,
        text,
        page: page.and_then(|n| u32::try_from(n).ok()),
        offset_ms,
        created_at: parse_ts(&created_at)?,
    })
}

fn parse_claim_row(row: ClaimRow) -> Result<Claim> {
    let (artifact_id, job_id, key, value, unit, confidence, evidence, category, created_at) = row;

    Ok(Claim {
        artifact_id: ArtifactId(artifact_id),
        job_id: JobId(job_id),
        key,
        value,
        unit,
        confidence,
        evidence,
        category,
        created_at: parse_ts(&created_at)?,
    })
}
