use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::{
    ffmpeg::Transcoder,
    media::MediaMetadata,
    util::{self, DownloadError, HttpClient},
};

/// Share of the audio path spent downloading; the rest is transcoding.
const AUDIO_DOWNLOAD_SHARE: f32 = 0.8;
const TRANSCODE_STARTED: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    /// Best muxed video, saved as mp4
    Video,
    /// Best audio, converted to mp3
    Audio,
}

impl DownloadFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

impl FromStr for DownloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" | "video" => Ok(Self::Video),
            "mp3" | "audio" => Ok(Self::Audio),
            other => Err(format!("Unknown format {:?}, expected mp4 or mp3", other)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("No video stream available")]
    NoVideoStream,
    #[error("No audio stream available")]
    NoAudioStream,
    #[error("{0}")]
    Download(#[from] DownloadError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Sequential download and convert of one media item.
pub struct Pipeline {
    client: HttpClient,
    transcoder: Arc<dyn Transcoder>,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(client: HttpClient, transcoder: Arc<dyn Transcoder>, output_dir: PathBuf) -> Self {
        Self {
            client,
            transcoder,
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<sanitized title>.<ext>` inside the output directory.
    pub fn output_path(&self, metadata: &MediaMetadata, ext: &str) -> PathBuf {
        let mut name = util::sanitize_filename(&metadata.title);
        if name.is_empty() {
            name = util::sanitize_filename(&metadata.id);
        }
        self.output_dir.join(format!("{}.{}", name, ext))
    }

    /// Download `metadata` in `format`, returning the path of the written
    /// file. Progress is reported as a fraction and ends at `1.0`.
    pub async fn download<F>(
        &self,
        metadata: &MediaMetadata,
        format: DownloadFormat,
        mut on_progress: F,
    ) -> Result<PathBuf, PipelineError>
    where
        F: FnMut(f32) + Send,
    {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        match format {
            DownloadFormat::Video => self.download_video(metadata, &mut on_progress).await,
            DownloadFormat::Audio => self.download_audio(metadata, &mut on_progress).await,
        }
    }

    async fn download_video<F>(
        &self,
        metadata: &MediaMetadata,
        on_progress: &mut F,
    ) -> Result<PathBuf, PipelineError>
    where
        F: FnMut(f32) + Send,
    {
        let stream = metadata
            .video_streams
            .first()
            .ok_or(PipelineError::NoVideoStream)?;

        let output = self.output_path(metadata, DownloadFormat::Video.extension());
        info!(
            "Downloading {} ({}) to {}",
            metadata.title,
            stream.quality.as_deref().unwrap_or("unknown quality"),
            output.display()
        );
        self.client
            .download_file(&stream.url, &output, |p| on_progress(p))
            .await?;

        Ok(output)
    }

    async fn download_audio<F>(
        &self,
        metadata: &MediaMetadata,
        on_progress: &mut F,
    ) -> Result<PathBuf, PipelineError>
    where
        F: FnMut(f32) + Send,
    {
        let stream = metadata
            .audio_streams
            .first()
            .ok_or(PipelineError::NoAudioStream)?;

        let temp = self.output_path(metadata, "temp");
        info!(
            "Downloading audio of {} ({})",
            metadata.title,
            stream.quality.as_deref().unwrap_or("unknown bitrate")
        );
        self.client
            .download_file(&stream.url, &temp, |p| on_progress(p * AUDIO_DOWNLOAD_SHARE))
            .await?;

        let output = self.output_path(metadata, DownloadFormat::Audio.extension());
        on_progress(TRANSCODE_STARTED);

        match self.transcoder.to_audio(&temp, &output).await {
            Ok(()) => tokio::fs::remove_file(&temp).await?,
            Err(e) => {
                // Keep the source container under the final name
                warn!("Transcoding {} failed ({}), keeping original audio", temp.display(), e);
                tokio::fs::rename(&temp, &output).await?;
            }
        }

        on_progress(1.0);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ffmpeg::Ffmpeg;

    fn metadata(title: &str) -> MediaMetadata {
        MediaMetadata {
            id: "dQw4w9WgXcQ".into(),
            title: title.into(),
            uploader: None,
            duration: None,
            thumbnail_url: None,
            video_streams: Vec::new(),
            audio_streams: Vec::new(),
        }
    }

    fn pipeline(dir: &Path) -> Pipeline {
        let client = HttpClient::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        Pipeline::new(client, Arc::new(Ffmpeg::default()), dir.to_path_buf())
    }

    #[test]
    fn formats() {
        assert_eq!("MP3".parse::<DownloadFormat>(), Ok(DownloadFormat::Audio));
        assert_eq!("video".parse::<DownloadFormat>(), Ok(DownloadFormat::Video));
        assert!("flac".parse::<DownloadFormat>().is_err());
        assert_eq!(DownloadFormat::Video.to_string(), "MP4");
    }

    #[test]
    fn output_names() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        assert_eq!(
            p.output_path(&metadata("What: a *title*"), "mp3"),
            dir.path().join("What_ a _title_.mp3")
        );
        assert_eq!(
            p.output_path(&metadata("   "), "mp4"),
            dir.path().join("dQw4w9WgXcQ.mp4")
        );
    }

    #[tokio::test]
    async fn missing_streams() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let md = metadata("nothing");

        let res = p.download(&md, DownloadFormat::Video, |_| ()).await;
        assert!(matches!(res, Err(PipelineError::NoVideoStream)));
        let res = p.download(&md, DownloadFormat::Audio, |_| ()).await;
        assert!(matches!(res, Err(PipelineError::NoAudioStream)));
    }
}
