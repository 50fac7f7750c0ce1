pub mod add;
pub mod export;
pub mod init;
pub mod jobs;
pub mod search;
pub mod show;
pub mod status;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use siteproof_core::{ArtifactId, Config, JobId, JobQueue, LocalBlobStore, Owner, Storage};

#[derive(Parser)]
#[command(
    name = "siteproof",
    about = "Evidence extraction pipeline for site readiness artifacts",
    version
)]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "SITEPROOF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and blob storage directory
    Init,
    /// Show queue counts and configured capabilities
    Status,
    /// Register a file as an artifact and queue text extraction
    Add {
        /// File to register
        path: PathBuf,
        #[command(flatten)]
        owner: OwnerArgs,
        /// Media kind (document, image, audio, video, note); inferred when omitted
        #[arg(long)]
        kind: Option<String>,
        /// MIME type, used for kind inference
        #[arg(long)]
        mime: Option<String>,
    },
    /// Register a typed note as an artifact
    Note {
        #[command(flatten)]
        owner: OwnerArgs,
        /// Note text
        text: String,
        /// Filename recorded for the note
        #[arg(long, default_value = "note.txt")]
        name: String,
    },
    /// Process queued jobs
    Worker {
        /// Drain the queue and exit instead of polling forever
        #[arg(long)]
        once: bool,
    },
    /// List jobs
    Jobs {
        /// Only jobs for this artifact
        #[arg(long)]
        artifact: Option<ArtifactId>,
        /// Only jobs in this status
        #[arg(long)]
        status: Option<String>,
        /// Only jobs of this kind
        #[arg(long)]
        kind: Option<String>,
    },
    /// Requeue a failed job
    Retry {
        /// Job id
        job: JobId,
    },
    /// Queue a stage for an artifact again
    Rerun {
        /// Artifact id
        artifact: ArtifactId,
        /// Stage (extract_text, structured_extract, discovery_extract)
        kind: String,
    },
    /// Queue text extraction for every artifact
    Reprocess,
    /// Show an artifact with its jobs, text and claims
    Show {
        /// Artifact id
        artifact: ArtifactId,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Keyword search over filenames, claims and text
    Search {
        /// Case-insensitive substring
        query: String,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Print JSON lines instead of text
        #[arg(long)]
        json: bool,
    },
    /// Export claims as JSON lines
    Export {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Exactly one owning entity.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct OwnerArgs {
    /// Owning building id
    #[arg(long)]
    pub building: Option<i64>,
    /// Owning industrial park id
    #[arg(long)]
    pub park: Option<i64>,
}

impl OwnerArgs {
    pub fn owner(&self) -> Result<Owner> {
        match (self.building, self.park) {
            (Some(id), None) => Ok(Owner::Building(id)),
            (None, Some(id)) => Ok(Owner::IndustrialPark(id)),
            _ => bail!("exactly one of --building or --park is required"),
        }
    }
}

/// Optional restriction to one building or park.
#[derive(Args)]
#[group(required = false, multiple = false)]
pub struct ScopeArgs {
    /// Only artifacts of this building
    #[arg(long)]
    pub building: Option<i64>,
    /// Only artifacts of this industrial park
    #[arg(long)]
    pub park: Option<i64>,
}

impl ScopeArgs {
    pub fn scope(&self) -> Option<Owner> {
        self.building
            .map(Owner::Building)
            .or_else(|| self.park.map(Owner::IndustrialPark))
    }
}

/// Opened store handles shared by the commands.
pub struct App {
    pub config: Config,
    pub queue: JobQueue,
    pub blobs: Arc<LocalBlobStore>,
}

impl App {
    pub async fn open(config: Config) -> Result<Self> {
        ensure_parent(&config.store.db_path)?;
        let db_path = config.store.db_path.to_string_lossy().to_string();
        let storage = Storage::open(&db_path)
            .await
            .with_context(|| format!("failed to open database {db_path}"))?;

        let queue = JobQueue::new(storage, config.worker.retry_policy());
        let blobs = Arc::new(LocalBlobStore::new(config.store.blob_root.clone()));
        Ok(Self {
            config,
            queue,
            blobs,
        })
    }

    pub fn storage(&self) -> &Storage {
        self.queue.storage()
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}

/// First `max` characters, with an ellipsis when cut.
pub fn clip(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
