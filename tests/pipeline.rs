mod common;

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{response, response_unsized, TestServer};
use ytd_rs::{
    extractor::{AudioStream, ExtractError, Extractor, MediaFormat, StreamInfo, VideoStream},
    ffmpeg::{TranscodeError, Transcoder},
    media::{MediaMetadata, StreamOption},
    notify::NullNotifier,
    pipeline::{DownloadFormat, Pipeline, PipelineError},
    tasks::DownloadStatus,
    util::{DownloadError, HttpClient, DOWNLOAD_USER_AGENT},
    worker::Worker,
};

const MEDIA: &[u8] = &[7u8; 1000];

struct FailingTranscoder;

#[async_trait]
impl Transcoder for FailingTranscoder {
    async fn to_audio(&self, _input: &Path, _output: &Path) -> Result<(), TranscodeError> {
        Err(TranscodeError::Failed(Some(1)))
    }
}

/// Writes a fixed payload instead of running ffmpeg.
struct FakeTranscoder;

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn to_audio(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        assert!(input.exists());
        tokio::fs::write(output, b"ID3 fake mp3").await?;
        Ok(())
    }
}

async fn media_server() -> TestServer {
    TestServer::start(|req| match req.path.as_str() {
        "/video" | "/audio" => response(StatusCode::OK, &[("Content-Type", "video/mp4")], MEDIA),
        "/unsized" => response_unsized(MEDIA),
        "/empty" => response(StatusCode::OK, &[], b""),
        _ => response(StatusCode::FORBIDDEN, &[], b"no"),
    })
    .await
}

fn pipeline(dir: &Path, transcoder: Arc<dyn Transcoder>) -> Pipeline {
    let client = HttpClient::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
    Pipeline::new(client, transcoder, dir.to_path_buf())
}

fn option(url: String) -> StreamOption {
    StreamOption {
        url,
        format: Some("MPEG_4".into()),
        quality: Some("720p".into()),
        bitrate: None,
    }
}

fn metadata(server: &TestServer, video: &str, audio: &str) -> MediaMetadata {
    MediaMetadata {
        id: "dQw4w9WgXcQ".into(),
        title: "My: *Video*   Title".into(),
        uploader: Some("Someone".into()),
        duration: Some(10),
        thumbnail_url: None,
        video_streams: vec![option(server.url(video)), option(server.url("/missing"))],
        audio_streams: vec![option(server.url(audio))],
    }
}

fn assert_monotonic(progress: &[f32]) {
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)), "{:?}", progress);
    assert_eq!(progress.last(), Some(&1.0));
}

#[tokio::test]
async fn downloads_best_video() {
    let server = media_server().await;
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), Arc::new(FailingTranscoder));

    let mut progress = Vec::new();
    let path = p
        .download(&metadata(&server, "/video", "/audio"), DownloadFormat::Video, |f| {
            progress.push(f)
        })
        .await
        .expect("Download failed");

    assert_eq!(path, dir.path().join("My_ _Video_ Title.mp4"));
    assert_eq!(std::fs::read(&path).unwrap(), MEDIA);
    assert_monotonic(&progress);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/video");
    assert_eq!(requests[0].header("user-agent"), Some(DOWNLOAD_USER_AGENT));
}

#[tokio::test]
async fn unknown_length_reports_only_completion() {
    let server = media_server().await;
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), Arc::new(FailingTranscoder));

    let mut progress = Vec::new();
    let path = p
        .download(&metadata(&server, "/unsized", "/audio"), DownloadFormat::Video, |f| {
            progress.push(f)
        })
        .await
        .expect("Download failed");

    assert_eq!(progress, vec![1.0]);
    assert_eq!(std::fs::read(&path).unwrap().len(), MEDIA.len());
}

#[tokio::test]
async fn transcoder_failure_keeps_original_audio() {
    let server = media_server().await;
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), Arc::new(FailingTranscoder));

    let mut progress = Vec::new();
    let path = p
        .download(&metadata(&server, "/video", "/audio"), DownloadFormat::Audio, |f| {
            progress.push(f)
        })
        .await
        .expect("Download failed");

    assert_eq!(path, dir.path().join("My_ _Video_ Title.mp3"));
    assert_eq!(std::fs::read(&path).unwrap(), MEDIA);
    assert!(!dir.path().join("My_ _Video_ Title.temp").exists());

    assert_monotonic(&progress);
    let transfer = &progress[..progress.len() - 2];
    assert!(transfer.iter().all(|p| *p <= 0.8), "{:?}", progress);
    assert_eq!(progress[progress.len() - 2], 0.85);
}

#[tokio::test]
async fn transcoded_audio_replaces_temp_file() {
    let server = media_server().await;
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), Arc::new(FakeTranscoder));

    let mut progress = Vec::new();
    let path = p
        .download(&metadata(&server, "/video", "/audio"), DownloadFormat::Audio, |f| {
            progress.push(f)
        })
        .await
        .expect("Download failed");

    assert_eq!(std::fs::read(&path).unwrap(), b"ID3 fake mp3");
    assert!(!dir.path().join("My_ _Video_ Title.temp").exists());
    assert_monotonic(&progress);
}

#[tokio::test]
async fn http_errors_fail_the_download() {
    let server = media_server().await;
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), Arc::new(FailingTranscoder));

    let res = p
        .download(&metadata(&server, "/forbidden", "/audio"), DownloadFormat::Video, |_| ())
        .await;
    assert!(matches!(
        res,
        Err(PipelineError::Download(DownloadError::Status(403)))
    ));

    let res = p
        .download(&metadata(&server, "/empty", "/audio"), DownloadFormat::Video, |_| ())
        .await;
    assert!(matches!(
        res,
        Err(PipelineError::Download(DownloadError::EmptyBody))
    ));
}

#[tokio::test]
async fn silent_server_times_out() {
    // Accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let client = HttpClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
    let res = tokio::time::timeout(
        Duration::from_secs(8),
        client.download_file(
            &format!("http://{}/video", addr),
            &dir.path().join("out.mp4"),
            |_: f32| (),
        ),
    )
    .await
    .expect("Download still waiting long after the read timeout");

    assert!(matches!(res, Err(DownloadError::Timeout(d)) if d == Duration::from_secs(1)));
}

struct StaticExtractor {
    info: StreamInfo,
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl Extractor for StaticExtractor {
    async fn stream_info(&self, url: &str) -> Result<StreamInfo, ExtractError> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(self.info.clone())
    }
}

fn stream_info(server: &TestServer) -> StreamInfo {
    StreamInfo {
        id: "dQw4w9WgXcQ".into(),
        name: "Worker Test".into(),
        uploader_name: None,
        duration: None,
        thumbnails: Vec::new(),
        video_streams: vec![
            VideoStream {
                content: server.url("/missing"),
                format: Some(MediaFormat::Mpeg4),
                codec: None,
                resolution: Some("360p".into()),
                bitrate: None,
                content_length: None,
            },
            VideoStream {
                content: server.url("/video"),
                format: Some(MediaFormat::Mpeg4),
                codec: None,
                resolution: Some("720p".into()),
                bitrate: None,
                content_length: None,
            },
        ],
        video_only_streams: Vec::new(),
        audio_streams: vec![AudioStream {
            content: server.url("/forbidden"),
            format: Some(MediaFormat::M4a),
            codec: None,
            average_bitrate: 128,
            content_length: None,
        }],
    }
}

#[tokio::test]
async fn worker_runs_tasks_to_completion() {
    let server = media_server().await;
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(StaticExtractor {
        info: stream_info(&server),
        urls: Mutex::new(Vec::new()),
    });
    let worker = Worker::with_parts(
        extractor.clone(),
        pipeline(dir.path(), Arc::new(FailingTranscoder)),
        Arc::new(NullNotifier),
    );

    let metadata = worker
        .fetch("Watch this https://youtu.be/dQw4w9WgXcQ?si=abc now")
        .await
        .expect("Fetch failed");
    assert_eq!(
        extractor.urls.lock().unwrap().as_slice(),
        &["https://www.youtube.com/watch?v=dQw4w9WgXcQ"]
    );
    // Sorted best first, so the working 720p stream is picked
    assert_eq!(metadata.video_streams[0].quality.as_deref(), Some("720p"));

    let video = worker.enqueue(metadata.clone(), DownloadFormat::Video);
    let audio = worker.enqueue(metadata, DownloadFormat::Audio);

    let tasks = tokio::time::timeout(
        Duration::from_secs(10),
        worker.registry().wait_all_terminal(),
    )
    .await
    .expect("Tasks did not finish");
    assert_eq!(tasks.len(), 2);

    let video = tasks.iter().find(|t| t.id == video).unwrap();
    assert_eq!(video.status, DownloadStatus::Completed);
    assert_eq!(video.progress, 1.0);
    assert_eq!(
        video.output.as_deref(),
        Some(dir.path().join("Worker Test.mp4").as_path())
    );

    let audio = tasks.iter().find(|t| t.id == audio).unwrap();
    assert_eq!(audio.status, DownloadStatus::Failed);
    assert_eq!(audio.error.as_deref(), Some("Download failed: HTTP 403"));
}
