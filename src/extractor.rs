use async_trait::async_trait;

use crate::{
    adapter::{Downloader, Request, RequestError},
    player_response::{self, InitialPlayerResponse, PlayerResponseError},
};

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Request(#[from] RequestError),
    #[error("Watch page returned HTTP {0}")]
    Status(u16),
    #[error("Could not read player response: {0}")]
    PlayerResponse(#[from] PlayerResponseError),
    #[error("Video is not playable ({status}): {}", .reason.as_deref().unwrap_or("no reason given"))]
    Unplayable {
        status: String,
        reason: Option<String>,
    },
    #[error("Video has no downloadable streams")]
    NoStreams,
}

/// Container format of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Mpeg4,
    WebM,
    M4a,
    WebmAudio,
    ThreeGpp,
}

impl MediaFormat {
    pub fn from_mime(kind: &str, subtype: &str) -> Option<Self> {
        match (kind, subtype) {
            ("video", "mp4") => Some(Self::Mpeg4),
            ("video", "webm") => Some(Self::WebM),
            ("video", "3gpp") => Some(Self::ThreeGpp),
            ("audio", "mp4") => Some(Self::M4a),
            ("audio", "webm") => Some(Self::WebmAudio),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mpeg4 => "MPEG_4",
            Self::WebM => "WEBM",
            Self::M4a => "M4A",
            Self::WebmAudio => "WEBMA",
            Self::ThreeGpp => "3GPP",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    pub content: String,
    pub format: Option<MediaFormat>,
    pub codec: Option<String>,
    /// e.g. `1080p60`
    pub resolution: Option<String>,
    pub bitrate: Option<i64>,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub content: String,
    pub format: Option<MediaFormat>,
    pub codec: Option<String>,
    /// kbit/s
    pub average_bitrate: i64,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Everything the extractor knows about one video.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub id: String,
    pub name: String,
    pub uploader_name: Option<String>,
    /// Seconds
    pub duration: Option<u64>,
    pub thumbnails: Vec<Thumbnail>,
    pub video_streams: Vec<VideoStream>,
    pub video_only_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn stream_info(&self, url: &str) -> Result<StreamInfo, ExtractError>;
}

/// Extractor reading the player response embedded in the watch page.
pub struct WatchPageExtractor<D> {
    downloader: D,
}

fn video_stream(f: &player_response::Format, url: &str) -> VideoStream {
    let (kind, subtype) = f.mime_parts();
    VideoStream {
        content: url.to_string(),
        format: MediaFormat::from_mime(kind, subtype),
        codec: f.codecs().map(String::from),
        resolution: f.quality_label.clone(),
        bitrate: Some(f.bitrate).filter(|b| *b > 0),
        content_length: f.content_length,
    }
}

fn audio_stream(f: &player_response::Format, url: &str) -> AudioStream {
    let (kind, subtype) = f.mime_parts();
    AudioStream {
        content: url.to_string(),
        format: MediaFormat::from_mime(kind, subtype),
        codec: f.codecs().map(String::from),
        average_bitrate: f.average_bitrate.unwrap_or(f.bitrate) / 1000,
        content_length: f.content_length,
    }
}

impl StreamInfo {
    pub fn from_player_response(ipr: &InitialPlayerResponse) -> Result<Self, ExtractError> {
        if !ipr.is_playable() {
            return Err(ExtractError::Unplayable {
                status: format!("{:?}", ipr.playability_status.status),
                reason: ipr.playability_status.reason.clone(),
            });
        }

        let details = ipr.video_details.as_ref().ok_or(ExtractError::NoStreams)?;
        let mut info = StreamInfo {
            id: details.video_id.clone(),
            name: details.title.clone(),
            uploader_name: details.author.clone(),
            duration: details.length_seconds,
            thumbnails: details
                .thumbnail
                .iter()
                .flat_map(|t| t.thumbnails.iter())
                .map(|t| Thumbnail {
                    url: t.url.clone(),
                    width: t.width,
                    height: t.height,
                })
                .collect(),
            video_streams: Vec::new(),
            video_only_streams: Vec::new(),
            audio_streams: Vec::new(),
        };

        if let Some(sd) = &ipr.streaming_data {
            // Ciphered formats carry no url and are skipped
            for f in &sd.formats {
                if let Some(url) = &f.url {
                    info.video_streams.push(video_stream(f, url));
                }
            }
            for f in &sd.adaptive_formats {
                let Some(url) = &f.url else { continue };
                if f.is_audio() {
                    info.audio_streams.push(audio_stream(f, url));
                } else {
                    info.video_only_streams.push(video_stream(f, url));
                }
            }
        }

        if info.video_streams.is_empty()
            && info.video_only_streams.is_empty()
            && info.audio_streams.is_empty()
        {
            return Err(ExtractError::NoStreams);
        }

        Ok(info)
    }
}

impl<D: Downloader> WatchPageExtractor<D> {
    pub fn new(downloader: D) -> Self {
        Self { downloader }
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }
}

#[async_trait]
impl<D: Downloader> Extractor for WatchPageExtractor<D> {
    async fn stream_info(&self, url: &str) -> Result<StreamInfo, ExtractError> {
        let resp = self.downloader.execute(Request::get(url)).await?;
        if !resp.is_success() {
            return Err(ExtractError::Status(resp.status_code));
        }

        let ipr = InitialPlayerResponse::from_html(&resp.body)?;
        let info = StreamInfo::from_player_response(&ipr)?;
        debug!(
            "{}: {} muxed, {} video-only, {} audio streams",
            info.id,
            info.video_streams.len(),
            info.video_only_streams.len(),
            info.audio_streams.len()
        );

        Ok(info)
    }
}
