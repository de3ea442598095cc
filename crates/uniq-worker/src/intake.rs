//! Inbound file handling around the processor.
//!
//! Enforces the size limit and the subscription check, materializes the
//! file locally, runs it through the processor, charges a credit and hands
//! the output back. Local copies are always removed afterwards.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use uniq_media::{remove_if_exists, source_extension};
use uniq_models::MediaKind;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::processor::MediaProcessor;

/// Plan that pays per file instead of by subscription.
pub const TRIAL_PLAN: &str = "trial";

/// Downloads an inbound file to a local path.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, file_id: &str, destination: &Path) -> io::Result<()>;
}

/// Subscription state of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionStatus {
    /// Whether the user may process files right now
    pub is_active: bool,
    /// Plan name; `None` means no paid plan
    pub plan: Option<String>,
}

impl SubscriptionStatus {
    /// Whether a successful job costs a credit.
    pub fn charges_credit(&self) -> bool {
        match self.plan.as_deref() {
            None => true,
            Some(plan) => plan == TRIAL_PLAN,
        }
    }
}

/// Subscription and credit bookkeeping.
#[async_trait]
pub trait SubscriptionGate: Send + Sync {
    async fn check(&self, user_id: i64) -> io::Result<SubscriptionStatus>;

    async fn consume_credit(&self, user_id: i64) -> io::Result<()>;
}

/// Sends a finished file back to the user.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, user_id: i64, kind: MediaKind, path: &Path) -> io::Result<()>;
}

/// One inbound file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeRequest {
    pub user_id: i64,
    /// Opaque handle understood by the [`FileFetcher`]
    pub file_id: String,
    pub kind: MediaKind,
    /// Extension for the local copy, with leading dot
    pub extension: String,
    /// Declared size in bytes, when known
    pub size: Option<u64>,
}

impl IntakeRequest {
    pub fn photo(user_id: i64, file_id: impl Into<String>, size: Option<u64>) -> Self {
        Self::with_default_extension(user_id, file_id, MediaKind::Image, size)
    }

    pub fn video(user_id: i64, file_id: impl Into<String>, size: Option<u64>) -> Self {
        Self::with_default_extension(user_id, file_id, MediaKind::Video, size)
    }

    /// A generic attachment: the kind comes from the MIME type, the
    /// extension from the file name with a per-kind fallback.
    pub fn from_document(
        user_id: i64,
        file_id: impl Into<String>,
        mime: Option<&str>,
        file_name: Option<&str>,
        size: Option<u64>,
    ) -> Self {
        let kind = MediaKind::from_mime(mime);
        let extension = file_name
            .and_then(|name| source_extension(name))
            .unwrap_or_else(|| kind.default_extension().to_string());

        Self {
            user_id,
            file_id: file_id.into(),
            kind,
            extension,
            size,
        }
    }

    fn with_default_extension(
        user_id: i64,
        file_id: impl Into<String>,
        kind: MediaKind,
        size: Option<u64>,
    ) -> Self {
        Self {
            user_id,
            file_id: file_id.into(),
            kind,
            extension: kind.default_extension().to_string(),
            size,
        }
    }
}

/// Why a request was refused before any processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooLarge { size: u64, limit: u64 },
    NoCredits,
}

/// Result of handling one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Rejected(RejectReason),
    /// Output produced and handed to the sink
    Delivered,
    /// Processing failed; the message is fit for the user
    Failed(String),
}

/// Drives one inbound file through the processor.
pub struct MediaIntake {
    processor: Arc<MediaProcessor>,
    fetcher: Arc<dyn FileFetcher>,
    gate: Arc<dyn SubscriptionGate>,
    sink: Arc<dyn ResultSink>,
    temp_dir: PathBuf,
    processed_dir: PathBuf,
    max_video_bytes: u64,
}

impl MediaIntake {
    pub fn new(
        processor: Arc<MediaProcessor>,
        config: &WorkerConfig,
        fetcher: Arc<dyn FileFetcher>,
        gate: Arc<dyn SubscriptionGate>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            processor,
            fetcher,
            gate,
            sink,
            temp_dir: config.temp_dir.clone(),
            processed_dir: config.processed_dir.clone(),
            max_video_bytes: config.max_video_bytes,
        }
    }

    /// Handle one request end to end.
    ///
    /// Processing failures are reported as [`IntakeOutcome::Failed`];
    /// collaborator I/O failures are returned as errors. The local input
    /// and output files are removed in every case.
    pub async fn handle(&self, request: IntakeRequest) -> WorkerResult<IntakeOutcome> {
        if let Some(reason) = self.size_rejection(&request) {
            info!(user_id = request.user_id, ?reason, "Rejecting oversized video");
            return Ok(IntakeOutcome::Rejected(reason));
        }

        let status = self.gate.check(request.user_id).await?;
        if !status.is_active {
            info!(user_id = request.user_id, "Rejecting request without credits");
            return Ok(IntakeOutcome::Rejected(RejectReason::NoCredits));
        }

        let input_path = self
            .temp_dir
            .join(format!("input_{}{}", Uuid::new_v4().simple(), request.extension));
        let mut output_path = None;

        let result = self.process(&request, &status, &input_path, &mut output_path).await;

        remove_if_exists(&input_path).await;
        if let Some(path) = &output_path {
            remove_if_exists(path).await;
        }

        result
    }

    async fn process(
        &self,
        request: &IntakeRequest,
        status: &SubscriptionStatus,
        input_path: &Path,
        output_path: &mut Option<PathBuf>,
    ) -> WorkerResult<IntakeOutcome> {
        self.fetcher.fetch(&request.file_id, input_path).await?;

        let output = match self
            .processor
            .submit(request.kind, input_path, &self.processed_dir)
            .await
        {
            Ok(path) => output_path.insert(path).clone(),
            Err(e) => {
                warn!(user_id = request.user_id, "Processing failed: {}", e);
                return Ok(IntakeOutcome::Failed(e.to_string()));
            }
        };

        if status.charges_credit() {
            if let Err(e) = self.gate.consume_credit(request.user_id).await {
                warn!(user_id = request.user_id, "Failed to consume credit: {}", e);
            }
        }

        self.sink.deliver(request.user_id, request.kind, &output).await?;
        Ok(IntakeOutcome::Delivered)
    }

    fn size_rejection(&self, request: &IntakeRequest) -> Option<RejectReason> {
        match (request.kind, request.size) {
            (MediaKind::Video, Some(size)) if size > self.max_video_bytes => {
                Some(RejectReason::TooLarge {
                    size,
                    limit: self.max_video_bytes,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tempfile::TempDir;
    use tokio::sync::watch;
    use uniq_media::{MediaError, MediaResult, MediaTransform, TransformRegistry, TransformRequest};

    /// Copies the input into the destination, or fails for `bad` content.
    struct CopyTransform(MediaKind);

    #[async_trait]
    impl MediaTransform for CopyTransform {
        fn name(&self) -> &'static str {
            "copy"
        }

        fn kind(&self) -> MediaKind {
            self.0
        }

        async fn transform(
            &self,
            request: &TransformRequest,
            _cancel: watch::Receiver<bool>,
        ) -> MediaResult<PathBuf> {
            let data = tokio::fs::read(&request.source).await?;
            if data == b"bad" {
                return Err(MediaError::tool_failed("ffmpeg", Some(1), "moov atom not found", ""));
            }
            tokio::fs::create_dir_all(&request.destination_dir).await?;
            let output = request.destination_dir.join("out.bin");
            tokio::fs::write(&output, &data).await?;
            Ok(output)
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        body: &'static [u8],
        fetched: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl FileFetcher for FakeFetcher {
        async fn fetch(&self, _file_id: &str, destination: &Path) -> io::Result<()> {
            self.fetched.lock().unwrap().push(destination.to_path_buf());
            tokio::fs::write(destination, self.body).await
        }
    }

    struct FakeGate {
        status: SubscriptionStatus,
        consumed: AtomicUsize,
    }

    #[async_trait]
    impl SubscriptionGate for FakeGate {
        async fn check(&self, _user_id: i64) -> io::Result<SubscriptionStatus> {
            Ok(self.status.clone())
        }

        async fn consume_credit(&self, _user_id: i64) -> io::Result<()> {
            self.consumed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        delivered: Mutex<Vec<(MediaKind, Vec<u8>)>>,
    }

    #[async_trait]
    impl ResultSink for FakeSink {
        async fn deliver(&self, _user_id: i64, kind: MediaKind, path: &Path) -> io::Result<()> {
            let data = tokio::fs::read(path).await?;
            self.delivered.lock().unwrap().push((kind, data));
            Ok(())
        }
    }

    struct Harness {
        dir: TempDir,
        intake: MediaIntake,
        processor: Arc<MediaProcessor>,
        fetcher: Arc<FakeFetcher>,
        gate: Arc<FakeGate>,
        sink: Arc<FakeSink>,
    }

    impl Harness {
        async fn new(body: &'static [u8], active: bool, plan: Option<&str>) -> Self {
            let dir = TempDir::new().unwrap();
            let config = WorkerConfig {
                temp_dir: dir.path().join("tmp"),
                processed_dir: dir.path().join("tmp").join("processed"),
                max_video_bytes: 1000,
                ..WorkerConfig::default()
            };
            config.ensure_dirs().await.unwrap();

            let mut registry = TransformRegistry::new();
            registry.register(Arc::new(CopyTransform(MediaKind::Image)));
            registry.register(Arc::new(CopyTransform(MediaKind::Video)));
            let processor = Arc::new(MediaProcessor::new(1, registry));
            processor.start().await;

            let fetcher = Arc::new(FakeFetcher { body, ..Default::default() });
            let gate = Arc::new(FakeGate {
                status: SubscriptionStatus {
                    is_active: active,
                    plan: plan.map(String::from),
                },
                consumed: AtomicUsize::new(0),
            });
            let sink = Arc::new(FakeSink::default());
            let intake = MediaIntake::new(
                Arc::clone(&processor),
                &config,
                fetcher.clone(),
                gate.clone(),
                sink.clone(),
            );

            Self { dir, intake, processor, fetcher, gate, sink }
        }

        fn leftover_files(&self) -> usize {
            walk(self.dir.path())
        }
    }

    fn walk(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path)
                } else {
                    1
                }
            })
            .sum()
    }

    #[tokio::test]
    async fn test_trial_user_is_charged_and_files_cleaned() {
        let h = Harness::new(b"pixels", true, Some("trial")).await;

        let outcome = h.intake.handle(IntakeRequest::photo(7, "file-1", Some(6))).await.unwrap();

        assert_eq!(outcome, IntakeOutcome::Delivered);
        assert_eq!(h.gate.consumed.load(Ordering::SeqCst), 1);
        assert_eq!(
            *h.sink.delivered.lock().unwrap(),
            vec![(MediaKind::Image, b"pixels".to_vec())]
        );

        let fetched = h.fetcher.fetched.lock().unwrap().clone();
        let name = fetched[0].file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("input_") && name.ends_with(".jpg"));
        assert_eq!(h.leftover_files(), 0);
        h.processor.stop().await;
    }

    #[tokio::test]
    async fn test_no_plan_is_charged_paid_plan_is_not() {
        let free = Harness::new(b"frames", true, None).await;
        free.intake.handle(IntakeRequest::video(1, "v", Some(6))).await.unwrap();
        assert_eq!(free.gate.consumed.load(Ordering::SeqCst), 1);
        free.processor.stop().await;

        let paid = Harness::new(b"frames", true, Some("pro")).await;
        let outcome = paid.intake.handle(IntakeRequest::video(1, "v", Some(6))).await.unwrap();
        assert_eq!(outcome, IntakeOutcome::Delivered);
        assert_eq!(paid.gate.consumed.load(Ordering::SeqCst), 0);
        paid.processor.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_video_rejected_before_fetch() {
        let h = Harness::new(b"frames", true, None).await;

        let outcome = h.intake.handle(IntakeRequest::video(1, "big", Some(1001))).await.unwrap();

        assert_eq!(
            outcome,
            IntakeOutcome::Rejected(RejectReason::TooLarge { size: 1001, limit: 1000 })
        );
        assert!(h.fetcher.fetched.lock().unwrap().is_empty());

        // The limit applies to videos only
        let outcome = h.intake.handle(IntakeRequest::photo(1, "big", Some(5000))).await.unwrap();
        assert_eq!(outcome, IntakeOutcome::Delivered);
        h.processor.stop().await;
    }

    #[tokio::test]
    async fn test_inactive_user_rejected() {
        let h = Harness::new(b"pixels", false, Some("trial")).await;

        let outcome = h.intake.handle(IntakeRequest::photo(1, "f", None)).await.unwrap();

        assert_eq!(outcome, IntakeOutcome::Rejected(RejectReason::NoCredits));
        assert!(h.fetcher.fetched.lock().unwrap().is_empty());
        assert_eq!(h.gate.consumed.load(Ordering::SeqCst), 0);
        h.processor.stop().await;
    }

    #[tokio::test]
    async fn test_processing_failure_reported_without_charge() {
        let h = Harness::new(b"bad", true, None).await;

        let outcome = h.intake.handle(IntakeRequest::video(1, "v", None)).await.unwrap();

        assert_eq!(
            outcome,
            IntakeOutcome::Failed(
                "External tool failed: ffmpeg exited with 1: moov atom not found".to_string()
            )
        );
        assert_eq!(h.gate.consumed.load(Ordering::SeqCst), 0);
        assert!(h.sink.delivered.lock().unwrap().is_empty());
        assert_eq!(h.leftover_files(), 0);
        h.processor.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_processor_fails_request() {
        let h = Harness::new(b"pixels", true, None).await;
        h.processor.stop().await;

        let outcome = h.intake.handle(IntakeRequest::photo(1, "f", None)).await.unwrap();

        assert!(matches!(outcome, IntakeOutcome::Failed(msg) if msg.starts_with("Job cancelled")));
        assert_eq!(h.leftover_files(), 0);
    }

    #[test]
    fn test_request_from_document() {
        let mime = Some("video/quicktime");
        let req = IntakeRequest::from_document(1, "d", mime, Some("Clip.MOV"), Some(10));
        assert_eq!(req.kind, MediaKind::Video);
        assert_eq!(req.extension, ".mov");

        let req = IntakeRequest::from_document(1, "d", Some("video/mp4"), None, None);
        assert_eq!(req.extension, ".mp4");

        let req = IntakeRequest::from_document(1, "d", Some("image/png"), Some("scan.png"), None);
        assert_eq!((req.kind, req.extension.as_str()), (MediaKind::Image, ".png"));

        let req = IntakeRequest::from_document(1, "d", None, Some("noext"), None);
        assert_eq!((req.kind, req.extension.as_str()), (MediaKind::Image, ".jpg"));
    }

    #[test]
    fn test_charges_credit() {
        let status = |plan: Option<&str>| SubscriptionStatus {
            is_active: true,
            plan: plan.map(String::from),
        };
        assert!(status(None).charges_credit());
        assert!(status(Some("trial")).charges_credit());
        assert!(!status(Some("monthly")).charges_credit());
    }
}
