use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use siteproof_core::providers::{
    DiscoveryExtractor, EmbeddedText, EmbeddedTextExtractor, Ocr, OcrInput, PageText,
    ProviderError, ProviderResult, RawClaim, StructuredExtractor, TextExtractor,
};
use siteproof_core::schema::FieldSpec;
use siteproof_core::{
    intake, ArtifactId, JobFilter, JobKind, JobQueue, JobStatus, LocalBlobStore, MediaKind,
    NewArtifact, Owner, Pipeline, Providers, RetryPolicy, ScanIndex, SearchIndex, SegmentSource,
    Storage, Worker,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SUBSTATION_TEXT: &str = "Site substation capacity: 40MVA";

struct Harness {
    _dir: TempDir,
    queue: JobQueue,
    blobs: Arc<LocalBlobStore>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_policy(RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
        })
        .await
    }

    async fn with_policy(policy: RetryPolicy) -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(LocalBlobStore::new(dir.path()));
        let storage = Storage::open_memory().await.unwrap();
        Self {
            _dir: dir,
            queue: JobQueue::new(storage, policy),
            blobs,
        }
    }

    fn storage(&self) -> &Storage {
        self.queue.storage()
    }

    fn worker(&self, providers: Providers) -> Worker {
        let pipeline = Pipeline::new(self.storage().clone(), self.blobs.clone(), providers);
        Worker::new(self.queue.clone(), Arc::new(pipeline), Duration::from_millis(10))
    }

    async fn add(&self, filename: &str, kind: MediaKind, bytes: &[u8]) -> ArtifactId {
        self.add_for(Owner::Building(1), filename, kind, bytes).await
    }

    async fn add_for(
        &self,
        owner: Owner,
        filename: &str,
        kind: MediaKind,
        bytes: &[u8],
    ) -> ArtifactId {
        let new = NewArtifact::new(owner, filename, kind);
        let (artifact, _) = intake::register(&self.queue, self.blobs.as_ref(), &new, bytes)
            .await
            .unwrap();
        artifact.id
    }

    async fn jobs(&self, artifact_id: ArtifactId, kind: JobKind) -> Vec<siteproof_core::Job> {
        self.storage()
            .list_jobs(JobFilter {
                artifact_id: Some(artifact_id),
                kind: Some(kind),
                ..JobFilter::default()
            })
            .await
            .unwrap()
    }
}

async fn drain(worker: &Worker) -> usize {
    worker.drain().await.unwrap()
}

/// Returns a fixed claim list, failing transiently for the first `failures` calls.
struct ScriptedExtractor {
    claims: Vec<RawClaim>,
    failures: usize,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn new(claims: Vec<RawClaim>) -> Self {
        Self {
            claims,
            failures: 0,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    fn respond(&self) -> ProviderResult<Vec<RawClaim>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ProviderError::Transient(format!("model busy (call {})", call + 1)));
        }
        Ok(self.claims.clone())
    }
}

#[async_trait::async_trait]
impl StructuredExtractor for ScriptedExtractor {
    async fn structured_extract(
        &self,
        _text: &str,
        _schema: &[FieldSpec],
    ) -> ProviderResult<Vec<RawClaim>> {
        self.respond()
    }
}

#[async_trait::async_trait]
impl DiscoveryExtractor for ScriptedExtractor {
    async fn discovery_extract(
        &self,
        _text: &str,
        _max_facts: usize,
    ) -> ProviderResult<Vec<RawClaim>> {
        self.respond()
    }
}

struct PanickingExtractor;

#[async_trait::async_trait]
impl StructuredExtractor for PanickingExtractor {
    async fn structured_extract(
        &self,
        _text: &str,
        _schema: &[FieldSpec],
    ) -> ProviderResult<Vec<RawClaim>> {
        panic!("extractor bug")
    }
}

/// Text layer stub: a fixed answer for every document.
struct FixedTextLayer(fn() -> ProviderResult<EmbeddedText>);

#[async_trait::async_trait]
impl TextExtractor for FixedTextLayer {
    async fn extract_embedded_text(&self, _bytes: &[u8]) -> ProviderResult<EmbeddedText> {
        (self.0)()
    }
}

/// OCR stub returning fixed pages and remembering what it was shown.
struct FixedOcr {
    pages: Vec<PageText>,
    inputs: Mutex<Vec<OcrInput>>,
}

impl FixedOcr {
    fn new(pages: Vec<PageText>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn inputs(&self) -> Vec<OcrInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Ocr for FixedOcr {
    async fn ocr(&self, _bytes: &[u8], input: OcrInput) -> ProviderResult<Vec<PageText>> {
        self.inputs.lock().unwrap().push(input);
        Ok(self.pages.clone())
    }
}

fn ocr_pages() -> Vec<PageText> {
    vec![
        PageText::new(Some(1), "Feeder 12F3 at 12.47 kV"),
        PageText::new(Some(2), "   "),
    ]
}

fn embedded_only() -> Providers {
    Providers::none().with_embedded(Arc::new(EmbeddedTextExtractor::new()))
}

#[tokio::test]
async fn text_extraction_persists_segment_and_enqueues_claim_stages() {
    let h = Harness::new().await;
    let providers = embedded_only()
        .with_structured(Arc::new(ScriptedExtractor::new(Vec::new())))
        .with_discovery(Arc::new(ScriptedExtractor::new(Vec::new())));
    let worker = h.worker(providers);

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    assert!(worker.run_once().await.unwrap());

    let text_job = &h.jobs(id, JobKind::TextExtract).await[0];
    assert_eq!(text_job.status, JobStatus::Done);
    assert_eq!(text_job.attempt_count, 1);

    let segments = h.storage().segments(id).await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, SUBSTATION_TEXT);
    assert_eq!(segments[0].seq, 0);

    for kind in [JobKind::StructuredExtract, JobKind::DiscoveryExtract] {
        let jobs = h.jobs(id, kind).await;
        assert_eq!(jobs.len(), 1, "{kind}");
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }
}

#[tokio::test]
async fn claim_stages_without_provider_are_not_enqueued() {
    let h = Harness::new().await;
    let worker = h.worker(embedded_only());

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    assert_eq!(drain(&worker).await, 1);

    assert!(h.jobs(id, JobKind::StructuredExtract).await.is_empty());
    assert!(h.jobs(id, JobKind::DiscoveryExtract).await.is_empty());
    assert_eq!(h.jobs(id, JobKind::TextExtract).await[0].status, JobStatus::Done);
}

#[tokio::test]
async fn transient_failures_then_success_end_done_with_three_attempts() {
    let h = Harness::new().await;
    let extractor = ScriptedExtractor::new(vec![RawClaim::new("available_capacity", "40", 0.9)])
        .failing_first(2);
    let worker = h.worker(embedded_only().with_structured(Arc::new(extractor)));

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    // text extraction, then three structured attempts
    assert_eq!(drain(&worker).await, 4);

    let job = &h.jobs(id, JobKind::StructuredExtract).await[0];
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempt_count, 3);
    assert!(job
        .last_error
        .as_deref()
        .unwrap()
        .contains("model busy (call 2)"));

    let claims = h.storage().claims(id).await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].value, "40");
    assert_eq!(claims[0].unit.as_deref(), Some("MW"));
    assert_eq!(claims[0].job_id, job.id);
}

#[tokio::test]
async fn exhausted_retries_become_terminal_and_keep_segments() {
    let h = Harness::new().await;
    let extractor = ScriptedExtractor::new(Vec::new()).failing_first(10);
    let worker = h.worker(embedded_only().with_structured(Arc::new(extractor)));

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    drain(&worker).await;

    let job = &h.jobs(id, JobKind::StructuredExtract).await[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempt_count, 3);
    assert_eq!(h.storage().segments(id).await.unwrap().len(), 1);

    // manual retry keeps history and runs once more
    let retried = h.queue.retry(job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempt_count, 3);
    drain(&worker).await;
    let job = h.storage().get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempt_count, 4);
}

#[tokio::test]
async fn out_of_range_confidence_is_discarded() {
    let h = Harness::new().await;
    let extractor = ScriptedExtractor::new(vec![
        RawClaim::new("substation_name", "Elm", 1.5),
        RawClaim::new("utility_name", "Valley Power", 0.8),
        RawClaim::new("site_name", "North Lot", -0.2),
    ]);
    let worker = h.worker(embedded_only().with_structured(Arc::new(extractor)));

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    drain(&worker).await;

    let claims = h.storage().claims(id).await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].key, "utility_name");
    assert!(claims.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));

    let job = &h.jobs(id, JobKind::StructuredExtract).await[0];
    assert_eq!(job.result_summary.as_deref(), Some("1 claims (2 discarded)"));
}

#[tokio::test]
async fn all_invalid_claims_fail_the_job() {
    let h = Harness::new().await;
    let extractor = ScriptedExtractor::new(vec![RawClaim::new("favorite_color", "blue", 0.9)]);
    let worker = h.worker(embedded_only().with_structured(Arc::new(extractor)));

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    drain(&worker).await;

    let job = &h.jobs(id, JobKind::StructuredExtract).await[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert!(job.last_error.as_deref().unwrap().contains("Validation failure"));
    assert!(h.storage().claims(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn discovery_rerun_replaces_only_discovery_claims() {
    let h = Harness::new().await;
    let providers = embedded_only()
        .with_structured(Arc::new(ScriptedExtractor::new(vec![RawClaim::new(
            "available_capacity",
            40,
            0.9,
        )])))
        .with_discovery(Arc::new(ScriptedExtractor::new(vec![
            RawClaim::new("Feeder ID", "12F3", 0.7).with_category("power"),
        ])));
    let worker = h.worker(providers);

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    drain(&worker).await;

    let keys = |claims: &[siteproof_core::Claim]| -> Vec<String> {
        claims.iter().map(|c| c.key.clone()).collect()
    };
    let claims = h.storage().claims(id).await.unwrap();
    assert_eq!(keys(&claims), vec!["available_capacity", "disc:feeder_id"]);
    assert_eq!(claims[1].category.as_deref(), Some("power"));

    h.queue.enqueue(id, JobKind::DiscoveryExtract).await.unwrap();
    drain(&worker).await;

    let claims = h.storage().claims(id).await.unwrap();
    assert_eq!(keys(&claims), vec!["available_capacity", "disc:feeder_id"]);
    let jobs = h.jobs(id, JobKind::DiscoveryExtract).await;
    assert_eq!(jobs.len(), 2);
    assert!(claims.iter().any(|c| c.job_id == jobs.iter().map(|j| j.id).max().unwrap()));
}

#[tokio::test]
async fn panicking_stage_is_recorded_as_failure() {
    let h = Harness::new().await;
    let worker = h.worker(embedded_only().with_structured(Arc::new(PanickingExtractor)));

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    drain(&worker).await;

    let job = &h.jobs(id, JobKind::StructuredExtract).await[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert!(job.last_error.as_deref().unwrap().contains("panicked"));
}

#[tokio::test]
async fn audio_without_transcriber_fails_terminally_at_once() {
    let h = Harness::new().await;
    let worker = h.worker(embedded_only());

    let id = h.add("walkthrough.m4a", MediaKind::Audio, b"not really audio").await;
    drain(&worker).await;

    let job = &h.jobs(id, JobKind::TextExtract).await[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempt_count, 1);
    assert!(job.last_error.as_deref().unwrap().contains("no transcriber"));
}

#[tokio::test]
async fn retryable_failure_waits_for_backoff() {
    let h = Harness::with_policy(RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_secs(60),
        backoff_cap: Duration::from_secs(60),
    })
    .await;
    let extractor = ScriptedExtractor::new(Vec::new()).failing_first(1);
    let worker = h.worker(embedded_only().with_structured(Arc::new(extractor)));

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    assert_eq!(drain(&worker).await, 2);

    let job = &h.jobs(id, JobKind::StructuredExtract).await[0];
    assert_eq!(job.status, JobStatus::FailedRetryable);
    assert!(job.next_attempt_at.is_some());
    assert!(!worker.run_once().await.unwrap());
    assert!(h.queue.next_retry_in().await.unwrap().is_some());
}

#[tokio::test]
async fn worker_start_recovers_interrupted_jobs() {
    let h = Harness::new().await;
    let worker = h.worker(embedded_only());

    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    let claimed = h.queue.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Processing);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    worker.run(shutdown).await.unwrap();

    let job = h.storage().get_job(claimed.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 0);

    assert_eq!(drain(&worker).await, 1);
    assert_eq!(h.jobs(id, JobKind::TextExtract).await[0].status, JobStatus::Done);
}

#[tokio::test]
async fn worker_run_stops_on_cancel() {
    let h = Harness::new().await;
    let worker = Arc::new(h.worker(embedded_only()));
    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;

    let shutdown = CancellationToken::new();
    let handle = {
        let worker = Arc::clone(&worker);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    for _ in 0..100 {
        if h.jobs(id, JobKind::TextExtract).await[0].status == JobStatus::Done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(h.jobs(id, JobKind::TextExtract).await[0].status, JobStatus::Done);
}

#[tokio::test]
async fn search_ranks_filename_over_claim_over_text() {
    let h = Harness::new().await;
    let extractor = ScriptedExtractor::new(vec![RawClaim::new("substation_name", "Elm", 0.8)]);
    let with_claims = h.worker(embedded_only().with_structured(Arc::new(extractor)));
    let text_only = h.worker(embedded_only());

    // oldest: filename match only
    let by_name = h.add("substation-map.txt", MediaKind::Note, b"north fence").await;
    drain(&text_only).await;
    // claim key match only
    let by_claim = h.add("report.txt", MediaKind::Document, b"capacity notes").await;
    drain(&with_claims).await;
    // newest: text match only
    let by_text = h.add("memo.txt", MediaKind::Note, b"call the Substation crew").await;
    drain(&text_only).await;

    let index = ScanIndex::new(h.storage().clone());
    let results = index.search("SubStation", None).await.unwrap();
    let ids: Vec<ArtifactId> = results.iter().map(|m| m.artifact.id).collect();
    assert_eq!(ids, vec![by_name, by_claim, by_text]);

    assert_eq!(results[0].snippet, "substation-map.txt");
    assert_eq!(results[1].snippet, "substation_name: Elm");
    assert_eq!(results[2].snippet, "call the Substation crew");

    assert!(index.search("nowhere to be found", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_trims_and_folds_query_case() {
    let h = Harness::new().await;
    let worker = h.worker(embedded_only());
    let id = h.add("memo.txt", MediaKind::Note, b"ring main unit").await;
    drain(&worker).await;

    let index = ScanIndex::new(h.storage().clone());
    let results = index.search("  MAIN ", None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].artifact.id, id);
}

#[tokio::test]
async fn search_is_scoped_to_one_owner() {
    let h = Harness::new().await;
    let worker = h.worker(embedded_only());
    let building = h
        .add_for(Owner::Building(4), "a.txt", MediaKind::Note, b"transformer pad")
        .await;
    let park = h
        .add_for(Owner::IndustrialPark(4), "b.txt", MediaKind::Note, b"transformer yard")
        .await;
    drain(&worker).await;

    let index = ScanIndex::new(h.storage().clone());
    let ids = |results: Vec<siteproof_core::ArtifactMatch>| -> Vec<ArtifactId> {
        results.into_iter().map(|m| m.artifact.id).collect()
    };

    assert_eq!(ids(index.search("transformer", None).await.unwrap()), vec![park, building]);
    assert_eq!(
        ids(index.search("transformer", Some(Owner::Building(4))).await.unwrap()),
        vec![building]
    );
    assert_eq!(
        ids(index.search("transformer", Some(Owner::IndustrialPark(4))).await.unwrap()),
        vec![park]
    );
    assert!(index
        .search("transformer", Some(Owner::Building(9)))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn text_search_spans_segments_in_reading_order() {
    let h = Harness::new().await;
    let ocr = FixedOcr::new(vec![
        PageText::new(Some(1), "ring main"),
        PageText::new(Some(2), "unit near gate"),
    ]);
    let worker = h.worker(Providers::none().with_ocr(ocr));
    let id = h.add("rmu.jpg", MediaKind::Image, b"jpeg").await;
    drain(&worker).await;

    let index = ScanIndex::new(h.storage().clone());
    let results = index.search("main\nunit", None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].artifact.id, id);
    assert_eq!(results[0].tier, siteproof_core::MatchTier::Text);
    assert!(index.search("gate\nring", None).await.unwrap().is_empty());
}

async fn assert_ocr_text(h: &Harness, id: ArtifactId) {
    let segments = h.storage().segments(id).await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].source, SegmentSource::Ocr);
    assert_eq!(segments[0].page, Some(1));
    assert_eq!(segments[0].text, "Feeder 12F3 at 12.47 kV");

    let job = &h.jobs(id, JobKind::TextExtract).await[0];
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.result_summary.as_deref(), Some("1 segments (ocr)"));

    let follow_ups = h.jobs(id, JobKind::StructuredExtract).await;
    assert_eq!(follow_ups.len(), 1);
    assert_eq!(follow_ups[0].status, JobStatus::Pending);
}

#[tokio::test]
async fn scanned_document_falls_back_to_ocr() {
    let h = Harness::new().await;
    let ocr = FixedOcr::new(ocr_pages());
    let providers = Providers::none()
        .with_embedded(Arc::new(FixedTextLayer(|| Ok(EmbeddedText::Scanned))))
        .with_ocr(ocr.clone())
        .with_structured(Arc::new(ScriptedExtractor::new(Vec::new())));
    let worker = h.worker(providers);

    let id = h.add("oneline.pdf", MediaKind::Document, b"%PDF").await;
    assert!(worker.run_once().await.unwrap());

    assert_ocr_text(&h, id).await;
    assert_eq!(ocr.inputs(), vec![OcrInput::Pdf]);
}

#[tokio::test]
async fn blank_text_layer_falls_back_to_ocr() {
    let h = Harness::new().await;
    let ocr = FixedOcr::new(ocr_pages());
    let providers = Providers::none()
        .with_embedded(Arc::new(FixedTextLayer(|| {
            Ok(EmbeddedText::Pages(vec![PageText::new(Some(1), " \n ")]))
        })))
        .with_ocr(ocr.clone())
        .with_structured(Arc::new(ScriptedExtractor::new(Vec::new())));
    let worker = h.worker(providers);

    let id = h.add("oneline.pdf", MediaKind::Document, b"%PDF").await;
    assert!(worker.run_once().await.unwrap());

    assert_ocr_text(&h, id).await;
    assert_eq!(ocr.inputs(), vec![OcrInput::Pdf]);
}

#[tokio::test]
async fn text_layer_error_falls_back_to_ocr() {
    let h = Harness::new().await;
    let ocr = FixedOcr::new(ocr_pages());
    let providers = Providers::none()
        .with_embedded(Arc::new(FixedTextLayer(|| {
            Err(ProviderError::Failed("broken xref table".into()))
        })))
        .with_ocr(ocr.clone())
        .with_structured(Arc::new(ScriptedExtractor::new(Vec::new())));
    let worker = h.worker(providers);

    let id = h.add("oneline.pdf", MediaKind::Document, b"%PDF").await;
    assert!(worker.run_once().await.unwrap());

    assert_ocr_text(&h, id).await;
    assert_eq!(ocr.inputs(), vec![OcrInput::Pdf]);
}

#[tokio::test]
async fn text_layer_error_without_ocr_fails_the_job() {
    let h = Harness::new().await;
    let providers = Providers::none().with_embedded(Arc::new(FixedTextLayer(|| {
        Err(ProviderError::Failed("broken xref table".into()))
    })));
    let worker = h.worker(providers);

    let id = h.add("oneline.pdf", MediaKind::Document, b"%PDF").await;
    drain(&worker).await;

    let job = &h.jobs(id, JobKind::TextExtract).await[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempt_count, 3);
    assert!(job.last_error.as_deref().unwrap().contains("broken xref table"));
}

#[tokio::test]
async fn image_goes_to_ocr() {
    let h = Harness::new().await;
    let ocr = FixedOcr::new(ocr_pages());
    let providers = embedded_only()
        .with_ocr(ocr.clone())
        .with_structured(Arc::new(ScriptedExtractor::new(Vec::new())));
    let worker = h.worker(providers);

    let id = h.add("nameplate.jpg", MediaKind::Image, b"jpeg bytes").await;
    assert!(worker.run_once().await.unwrap());

    assert_ocr_text(&h, id).await;
    assert_eq!(ocr.inputs(), vec![OcrInput::Image]);
}

#[tokio::test]
async fn image_without_text_completes_with_nothing_to_follow() {
    let h = Harness::new().await;
    let providers = Providers::none()
        .with_ocr(FixedOcr::new(vec![PageText::new(None, "  ")]))
        .with_structured(Arc::new(ScriptedExtractor::new(Vec::new())));
    let worker = h.worker(providers);

    let id = h.add("blank.jpg", MediaKind::Image, b"jpeg bytes").await;
    assert_eq!(drain(&worker).await, 1);

    let job = &h.jobs(id, JobKind::TextExtract).await[0];
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.result_summary.as_deref(), Some("no text found"));
    assert!(h.storage().segments(id).await.unwrap().is_empty());
    assert!(h.jobs(id, JobKind::StructuredExtract).await.is_empty());
}

#[tokio::test]
async fn empty_reextraction_keeps_existing_text_and_claims() {
    let h = Harness::new().await;
    let first = h.worker(embedded_only().with_structured(Arc::new(ScriptedExtractor::new(vec![
        RawClaim::new("available_capacity", "40", 0.9),
    ]))));
    let id = h.add("capacity.txt", MediaKind::Document, SUBSTATION_TEXT.as_bytes()).await;
    drain(&first).await;
    assert_eq!(h.storage().segments(id).await.unwrap().len(), 1);
    assert_eq!(h.storage().claims(id).await.unwrap().len(), 1);

    // A later run whose engines see nothing at all
    let blind = h.worker(
        Providers::none()
            .with_embedded(Arc::new(FixedTextLayer(|| Ok(EmbeddedText::Scanned))))
            .with_ocr(FixedOcr::new(vec![PageText::new(Some(1), "\n")])),
    );
    h.queue.enqueue(id, JobKind::TextExtract).await.unwrap();
    drain(&blind).await;

    let rerun = h
        .jobs(id, JobKind::TextExtract)
        .await
        .into_iter()
        .max_by_key(|j| j.id)
        .unwrap();
    assert_eq!(rerun.status, JobStatus::FailedTerminal);
    assert!(rerun
        .last_error
        .as_deref()
        .unwrap()
        .contains("refusing to replace 1 existing segments"));

    let segments = h.storage().segments(id).await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, SUBSTATION_TEXT);
    assert_eq!(h.storage().claims(id).await.unwrap().len(), 1);
}
