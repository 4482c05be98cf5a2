use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Weekday;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storybot::error::UploadError;
use storybot::instagram::GraphApi;
use storybot::upload::{ImageGenerator, UploadSettings, Uploader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create(String),
    Status(String),
    Publish(String),
}

#[derive(Clone, Default)]
struct RecordingGraph {
    container: Arc<Mutex<Option<Result<String, UploadError>>>>,
    statuses: Arc<Mutex<VecDeque<String>>>,
    published: Arc<Mutex<Option<Result<String, UploadError>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingGraph {
    fn with_statuses(container: Result<&str, UploadError>, statuses: &[&str]) -> Self {
        Self {
            container: Arc::new(Mutex::new(Some(container.map(str::to_string)))),
            statuses: Arc::new(Mutex::new(statuses.iter().map(|s| s.to_string()).collect())),
            ..Default::default()
        }
    }

    fn publishing(self, result: Result<&str, UploadError>) -> Self {
        Self {
            published: Arc::new(Mutex::new(Some(result.map(str::to_string)))),
            ..self
        }
    }

    async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    async fn publish_count(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| matches!(c, Call::Publish(_)))
            .count()
    }
}

#[async_trait]
impl GraphApi for RecordingGraph {
    async fn create_container(&self, image_url: &str) -> Result<String, UploadError> {
        self.calls.lock().await.push(Call::Create(image_url.to_string()));
        self.container
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Ok("container-1".into()))
    }

    async fn container_status(&self, container_id: &str) -> Result<String, UploadError> {
        self.calls.lock().await.push(Call::Status(container_id.to_string()));
        Ok(self
            .statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "IN_PROGRESS".into()))
    }

    async fn publish(&self, container_id: &str) -> Result<String, UploadError> {
        self.calls.lock().await.push(Call::Publish(container_id.to_string()));
        self.published
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Ok("media-1".into()))
    }
}

/// Writes a marker file, or fails when told to.
struct FileGenerator {
    fail: bool,
}

#[async_trait]
impl ImageGenerator for FileGenerator {
    async fn generate(&self, output_path: &Path) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("horoscope API down"));
        }
        tokio::fs::write(output_path, b"png").await?;
        Ok(())
    }
}

fn settings(dir: &Path) -> UploadSettings {
    UploadSettings {
        data_dir: PathBuf::from(dir),
        public_base_url: "https://stories.example.com".into(),
        poll_interval: Duration::from_secs(10),
        max_polls: 5,
    }
}

fn uploader(graph: &RecordingGraph, dir: &Path, cancel: CancellationToken) -> Uploader {
    Uploader::new(Arc::new(graph.clone()), settings(dir), cancel)
}

#[tokio::test(start_paused = true)]
async fn publishes_once_after_container_finishes() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-42"), &["IN_PROGRESS", "FINISHED"]);
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let started = tokio::time::Instant::now();
    let published = uploader
        .try_upload_on("horoscope_1", Weekday::Mon, &FileGenerator { fail: false })
        .await
        .unwrap();

    assert_eq!(published.file_name, "horoscope_1_1.png");
    assert_eq!(published.container_id, "c-42");
    assert_eq!(published.media_id, "media-1");
    assert_eq!(published.polls, 2);
    assert!(started.elapsed() >= Duration::from_secs(20));
    assert!(tmp.path().join("horoscope_1_1.png").exists());

    assert_eq!(
        graph.calls().await,
        vec![
            Call::Create("https://stories.example.com/horoscope_1_1.png".into()),
            Call::Status("c-42".into()),
            Call::Status("c-42".into()),
            Call::Publish("c-42".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn uploading_status_keeps_polling() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-7"), &["UPLOADING", "IN_PROGRESS", "FINISHED"]);
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let published = uploader
        .try_upload_on("demotivator", Weekday::Tue, &FileGenerator { fail: false })
        .await
        .unwrap();

    assert_eq!(published.polls, 3);
    assert_eq!(published.file_name, "demotivator_2.png");
    assert_eq!(graph.publish_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_publish_is_terminal() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-9"), &["FINISHED", "FINISHED"])
        .publishing(Err(UploadError::Publish("Media ID is not available".into())));
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let err = uploader
        .try_upload_on("calendar", Weekday::Mon, &FileGenerator { fail: false })
        .await
        .unwrap_err();
    match err {
        UploadError::Publish(msg) => assert_eq!(msg, "Media ID is not available"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        graph.calls().await,
        vec![
            Call::Create("https://stories.example.com/calendar_1.png".into()),
            Call::Status("c-9".into()),
            Call::Publish("c-9".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn upload_logs_publish_failure_and_returns() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-9"), &["FINISHED"])
        .publishing(Err(UploadError::Publish("HTTP 500".into())));
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    uploader.upload("horoscope_2", &FileGenerator { fail: false }).await;

    assert_eq!(graph.publish_count().await, 1);
    assert_eq!(graph.calls().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_container_creation_never_polls() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(
        Err(UploadError::ContainerCreation("Invalid OAuth access token".into())),
        &["FINISHED"],
    );
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let err = uploader
        .try_upload_on("calendar", Weekday::Sun, &FileGenerator { fail: false })
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::ContainerCreation(_)));
    assert_eq!(graph.calls().await.len(), 1);
    assert_eq!(graph.publish_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn processing_error_stops_without_publish() {
    for status in ["ERROR", "EXPIRED"] {
        let tmp = tempfile::tempdir().unwrap();
        let graph = RecordingGraph::with_statuses(Ok("c-1"), &["IN_PROGRESS", status, "FINISHED"]);
        let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

        let err = uploader
            .try_upload_on("demotivator", Weekday::Fri, &FileGenerator { fail: false })
            .await
            .unwrap_err();
        match err {
            UploadError::MediaProcessing { container_id, status: got } => {
                assert_eq!(container_id, "c-1");
                assert_eq!(got, status);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(graph.publish_count().await, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_status_stops_polling() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-1"), &["SOMETHING_NEW", "FINISHED"]);
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let err = uploader
        .try_upload_on("calendar", Weekday::Tue, &FileGenerator { fail: false })
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UnexpectedStatus { ref status, .. } if status == "SOMETHING_NEW"));
    let polls = graph
        .calls()
        .await
        .iter()
        .filter(|c| matches!(c, Call::Status(_)))
        .count();
    assert_eq!(polls, 1);
    assert_eq!(graph.publish_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_polls() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-1"), &[]);
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let err = uploader
        .try_upload_on("calendar", Weekday::Wed, &FileGenerator { fail: false })
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::ExhaustedRetries { polls: 5, .. }));
    assert_eq!(graph.calls().await.len(), 1 + 5);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_polling() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-1"), &["IN_PROGRESS"; 3]);
    let cancel = CancellationToken::new();
    let uploader = uploader(&graph, tmp.path(), cancel.clone());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        cancel.cancel();
    });
    let err = uploader
        .try_upload_on("horoscope_2", Weekday::Thu, &FileGenerator { fail: false })
        .await
        .unwrap_err();
    stopper.await.unwrap();

    assert!(matches!(err, UploadError::Cancelled));
    assert_eq!(graph.publish_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn generation_failure_skips_the_api() {
    let tmp = tempfile::tempdir().unwrap();
    let graph = RecordingGraph::with_statuses(Ok("c-1"), &["FINISHED"]);
    let uploader = uploader(&graph, tmp.path(), CancellationToken::new());

    let err = uploader
        .try_upload_on("horoscope_1", Weekday::Sat, &FileGenerator { fail: true })
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Generation(_)));
    assert!(graph.calls().await.is_empty());

    // the logging wrapper swallows the same failure
    uploader.upload("horoscope_1", &FileGenerator { fail: true }).await;
    assert!(graph.calls().await.is_empty());
}
