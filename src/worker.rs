use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use crate::{
    adapter::ShapingDownloader,
    config::Config,
    extractor::{ExtractError, Extractor, WatchPageExtractor},
    ffmpeg::Ffmpeg,
    media::{self, MediaMetadata},
    notify::Notifier,
    pipeline::{DownloadFormat, Pipeline},
    tasks::TaskRegistry,
    util::HttpClient,
};

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("Could not create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Owns every long-lived component and runs downloads.
///
/// Each enqueued download runs as its own tokio task. There is no limit on
/// how many run at once and a started download cannot be cancelled.
pub struct Worker {
    extractor: Arc<dyn Extractor>,
    pipeline: Arc<Pipeline>,
    registry: TaskRegistry,
    notifier: Arc<dyn Notifier>,
}

impl Worker {
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self, WorkerError> {
        let downloader = ShapingDownloader::new(config.policy.clone(), config.adapter_timeout)?;
        let client = HttpClient::new(config.connect_timeout, config.read_timeout)?;
        let transcoder = Ffmpeg {
            binary: config.ffmpeg.clone(),
            codec: config.audio_codec.clone(),
            quality: config.audio_quality,
        };

        Ok(Self::with_parts(
            Arc::new(WatchPageExtractor::new(downloader)),
            Pipeline::new(client, Arc::new(transcoder), config.output_dir.clone()),
            notifier,
        ))
    }

    pub fn with_parts(
        extractor: Arc<dyn Extractor>,
        pipeline: Pipeline,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            extractor,
            pipeline: Arc::new(pipeline),
            registry: TaskRegistry::new(),
            notifier,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Fetch metadata for a typed URL or for text shared from another app.
    pub async fn fetch(&self, input: &str) -> Result<MediaMetadata, ExtractError> {
        let url = media::extract_shared_url(input).unwrap_or_else(|| input.trim().to_string());
        media::fetch_metadata(self.extractor.as_ref(), &url).await
    }

    /// Queue a download and start it in the background.
    pub fn enqueue(&self, metadata: MediaMetadata, format: DownloadFormat) -> Uuid {
        let task = self.registry.enqueue(&metadata.title, format);
        info!("Queued {} as {} ({})", metadata.title, format, task.id);

        tokio::spawn(run_task(
            self.pipeline.clone(),
            self.registry.clone(),
            self.notifier.clone(),
            task.id,
            metadata,
            format,
        ));

        task.id
    }
}

async fn run_task(
    pipeline: Arc<Pipeline>,
    registry: TaskRegistry,
    notifier: Arc<dyn Notifier>,
    id: Uuid,
    metadata: MediaMetadata,
    format: DownloadFormat,
) {
    if let Err(e) = registry.start(id) {
        warn!("Could not start task {}: {}", id, e);
        return;
    }

    let (tx_progress, rx_progress) = tokio::sync::mpsc::unbounded_channel();

    // The sender lives inside the callback, so the progress stream ends when
    // the pipeline returns
    let download = pipeline.download(&metadata, format, move |p| {
        let _ = tx_progress.send(p);
    });
    let report = async {
        let mut progress = tokio_stream::wrappers::UnboundedReceiverStream::new(rx_progress);
        while let Some(p) = progress.next().await {
            match registry.progress(id, p) {
                Ok(task) => notifier.progress(id, &metadata.title, task.progress),
                Err(e) => debug!("Dropping progress for {}: {}", id, e),
            }
        }
    };
    let (result, ()) = tokio::join!(download, report);

    match result {
        Ok(path) => {
            info!("Finished {} -> {}", metadata.title, path.display());
            if let Err(e) = registry.complete(id, path) {
                warn!("Could not complete task {}: {}", id, e);
            }
            notifier.complete(id, &metadata.title);
        }
        Err(e) => {
            let message = e.to_string();
            error!("Download of {} failed: {}", metadata.title, message);
            if let Err(e) = registry.fail(id, message.as_str()) {
                warn!("Could not fail task {}: {}", id, e);
            }
            notifier.failed(id, &metadata.title, &message);
        }
    }
}
