pub mod artifact;
pub mod blob;
pub mod claim;
pub mod config;
pub mod error;
pub mod export;
pub mod intake;
pub mod job;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod schema;
pub mod search;
pub mod segment;
pub mod storage;
pub mod worker;

pub use artifact::{Artifact, ArtifactId, MediaKind, NewArtifact, Owner};
pub use blob::{BlobStore, LocalBlobStore};
pub use claim::{Claim, NewClaim};
pub use config::Config;
pub use error::{Error, Result};
pub use job::{FailureKind, Job, JobFailure, JobId, JobKind, JobStatus, RetryPolicy};
pub use pipeline::{Pipeline, PipelineSettings, StageError};
pub use providers::{Provider, ProviderError, Providers};
pub use queue::{Completion, JobQueue, StageOutput};
pub use search::{ArtifactMatch, MatchTier, ScanIndex, SearchIndex};
pub use segment::{NewSegment, SegmentSource, TextSegment};
pub use storage::{JobFilter, Storage};
pub use worker::Worker;
