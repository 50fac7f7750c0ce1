//! Single-process worker loop.
//!
//! Each cycle moves due retries back to `pending`, claims the oldest pending
//! job, runs its stage and records the outcome. Jobs run strictly one at a
//! time; when nothing is pending the loop sleeps until the poll interval or
//! the next backoff deadline, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

use crate::{
    job::{Job, JobFailure},
    pipeline::Pipeline,
    queue::JobQueue,
    Result,
};

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct Worker {
    queue: JobQueue,
    pipeline: Arc<Pipeline>,
    poll_interval: Duration,
}

impl Worker {
    #[must_use]
    pub fn new(queue: JobQueue, pipeline: Arc<Pipeline>, poll_interval: Duration) -> Self {
        Self {
            queue,
            pipeline,
            poll_interval,
        }
    }

    /// Run until `shutdown` is cancelled. Cancellation is observed between
    /// jobs; a stage already running is allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let recovered = self.queue.recover_interrupted().await?;
        info!(
            recovered,
            poll_ms = self.poll_interval.as_millis(),
            "worker starting"
        );

        while !shutdown.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => self.idle_delay().await,
                Err(e) => {
                    error!(error = %e, "worker cycle failed");
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(idle) => {}
            }
        }

        info!("worker stopped");
        Ok(())
    }

    /// Process jobs until none is pending, then return how many ran. Jobs left
    /// `processing` by an earlier run are recovered first, as in `run`.
    /// Retries still waiting on backoff are left for a later run.
    pub async fn drain(&self) -> Result<usize> {
        let recovered = self.queue.recover_interrupted().await?;
        debug!(recovered, "draining queue");

        let mut processed = 0;
        while self.run_once().await? {
            processed += 1;
        }
        Ok(processed)
    }

    /// One cycle. Returns `true` when a job was claimed and processed.
    pub async fn run_once(&self) -> Result<bool> {
        self.queue.requeue_due().await?;

        let Some(job) = self.queue.claim_next().await? else {
            return Ok(false);
        };

        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            artifact_id = %job.artifact_id,
            kind = %job.kind,
            attempt = job.attempt_count + 1,
        );
        self.handle(job).instrument(span).await?;
        Ok(true)
    }

    async fn handle(&self, job: Job) -> Result<()> {
        debug!("job claimed");

        // Spawned so a panicking stage surfaces as a JoinError
        let pipeline = Arc::clone(&self.pipeline);
        let claimed = job.clone();
        let outcome = tokio::spawn(async move { pipeline.process(&claimed).await }).await;

        let failure = match outcome {
            Ok(Ok(completion)) => match self.queue.complete(job.id, completion).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "could not record completion");
                    JobFailure::transient(format!("could not record completion: {e}"))
                }
            },
            Ok(Err(stage_error)) => stage_error.to_failure(),
            Err(join_error) => {
                error!(error = %join_error, "stage panicked");
                JobFailure::transient(format!("stage panicked: {join_error}"))
            }
        };

        self.queue.fail(job.id, &failure).await?;
        Ok(())
    }

    async fn idle_delay(&self) -> Duration {
        match self.queue.next_retry_in().await {
            Ok(Some(wait)) => wait.min(self.poll_interval),
            Ok(None) => self.poll_interval,
            Err(e) => {
                error!(error = %e, "could not read retry schedule");
                self.poll_interval
            }
        }
    }
}
