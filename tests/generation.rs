//! End-to-end generation against an in-memory operation client.

use async_trait::async_trait;
use chrono::TimeZone;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use veogen::{
    ArtifactWriter, GenerationOptions, GenerationRequest, ManualClock, OperationClient,
    OperationHandle, OperationStatus, PollPolicy, RetryPolicy, VeoGenError, VideoGenerator,
    VideoPayload,
};

#[derive(Default)]
struct StubClient {
    statuses: Mutex<VecDeque<OperationStatus>>,
    requests: Mutex<Vec<GenerationRequest>>,
    polls: AtomicU32,
}

impl StubClient {
    fn new(statuses: Vec<OperationStatus>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            ..Self::default()
        })
    }

    /// RUNNING `n` times, then SUCCEEDED with inline bytes.
    fn succeeding_after(n: usize) -> Arc<Self> {
        let mut statuses = vec![OperationStatus::running(); n];
        statuses.push(OperationStatus::succeeded(VideoPayload::Inline(
            b"\x00\x00\x00\x18ftypmp42".to_vec(),
        )));
        Self::new(statuses)
    }

    fn submissions(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl OperationClient for StubClient {
    async fn submit(&self, request: &GenerationRequest) -> veogen::Result<OperationHandle> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(OperationHandle::new("projects/p/locations/l/operations/42"))
    }

    async fn status(&self, _handle: &OperationHandle) -> veogen::Result<OperationStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(OperationStatus::running))
    }

    async fn download(&self, _uri: &str) -> veogen::Result<Vec<u8>> {
        Ok(b"remote".to_vec())
    }

    async fn cancel(&self, _handle: &OperationHandle) -> veogen::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> veogen::Result<()> {
        Ok(())
    }

    fn model_id(&self) -> &str {
        "veo-stub"
    }
}

fn generator(client: Arc<StubClient>, dir: &Path) -> VideoGenerator {
    let start = chrono::Local.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap();
    VideoGenerator::from_arc(client)
        .with_clock(Arc::new(ManualClock::starting_at(start)))
        .with_poll_policy(
            PollPolicy::default()
                .with_interval(Duration::from_secs(15))
                .with_max_wait(Duration::from_secs(90))
                .with_retry(RetryPolicy::default().with_jitter(false)),
        )
        .with_writer(ArtifactWriter::new(dir))
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// `<prefix>_<YYYYMMDD>_<HHMMSS>.mp4`
fn matches_output_pattern(name: &str, prefix: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('_'))
        .and_then(|r| r.strip_suffix(".mp4"))
    else {
        return false;
    };
    let bytes = rest.as_bytes();
    bytes.len() == 15
        && bytes[8] == b'_'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}

#[tokio::test]
async fn test_out_of_range_duration_submits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::succeeding_after(0);
    let generator = generator(client.clone(), dir.path());

    for secs in [0, 4, 9, 30] {
        let err = generator
            .generate(&GenerationOptions::new("A fox").with_duration(secs))
            .await
            .unwrap_err();
        assert!(matches!(err, VeoGenError::Validation(_)), "{secs}: {err}");
        assert_eq!(err.exit_code(), 2);
    }
    let err = generator
        .generate(&GenerationOptions::new("A fox").with_aspect_ratio("1:1"))
        .await
        .unwrap_err();
    assert!(matches!(err, VeoGenError::Validation(_)));

    assert_eq!(client.submissions(), 0);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_success_after_polls_writes_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::succeeding_after(3);

    let video = generator(client.clone(), dir.path())
        .generate(&GenerationOptions::new("A fox running through snow"))
        .await
        .unwrap();

    let files = files_in(dir.path());
    assert_eq!(files.len(), 1);
    assert!(
        matches_output_pattern(&files[0], "A_fox_running_through_snow"),
        "unexpected name {}",
        files[0]
    );
    // Four polls of 15 s from 14:30:00.
    assert_eq!(files[0], "A_fox_running_through_snow_20250601_143100.mp4");
    assert_eq!(video.path, dir.path().join(&files[0]));
    assert_eq!(video.size_bytes, 12);
    assert_eq!(video.mime_type, "video/mp4");
    assert_eq!(client.polls.load(Ordering::SeqCst), 4);
    assert_eq!(client.submissions(), 1);
}

#[tokio::test]
async fn test_never_terminal_times_out_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::new(Vec::new());

    let err = generator(client.clone(), dir.path())
        .generate(&GenerationOptions::new("A fox"))
        .await
        .unwrap_err();

    match &err {
        VeoGenError::Timeout { operation, waited } => {
            assert_eq!(operation, "projects/p/locations/l/operations/42");
            assert_eq!(*waited, Duration::from_secs(90));
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 6);
    assert_eq!(client.polls.load(Ordering::SeqCst), 6);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_remote_failure_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::new(vec![
        OperationStatus::running(),
        OperationStatus::failed("quota exceeded"),
    ]);

    let err = generator(client, dir.path())
        .generate(&GenerationOptions::new("A fox"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "video generation failed: quota exceeded");
    assert_eq!(err.exit_code(), 5);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_same_prompt_same_second_gets_distinct_files() {
    let dir = tempfile::tempdir().unwrap();

    let first = generator(StubClient::succeeding_after(0), dir.path())
        .generate(&GenerationOptions::new("Rain on glass"))
        .await
        .unwrap();
    let second = generator(StubClient::succeeding_after(0), dir.path())
        .generate(&GenerationOptions::new("Rain on glass"))
        .await
        .unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(
        files_in(dir.path()),
        vec![
            "Rain_on_glass_20250601_143015.mp4".to_string(),
            "Rain_on_glass_20250601_143015_1.mp4".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_storage_bucket_and_remote_payload() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::new(vec![OperationStatus::succeeded(VideoPayload::Remote(
        "gs://my-bucket/videos/123/sample_0.mp4".into(),
    ))]);

    let video = generator(client.clone(), dir.path())
        .with_storage_bucket(Some("my-bucket".into()))
        .generate(&GenerationOptions::new("Neon city").with_duration(8))
        .await
        .unwrap();

    let requests = client.requests.lock().unwrap();
    assert_eq!(requests[0].storage_uri(), Some("gs://my-bucket/videos/"));
    assert_eq!(requests[0].duration_secs(), 8);
    assert_eq!(std::fs::read(&video.path).unwrap(), b"remote");
    assert_eq!(
        video.metadata.source_uri.as_deref(),
        Some("gs://my-bucket/videos/123/sample_0.mp4")
    );
}
