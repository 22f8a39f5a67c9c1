use std::{cmp::Reverse, sync::OnceLock};

use regex::Regex;

use crate::extractor::{AudioStream, ExtractError, Extractor, StreamInfo, VideoStream};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:v=|youtu\.be/|shorts/)([a-zA-Z0-9_-]{11})").expect("valid video id regex")
    })
}

fn shared_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/|youtube\.com/shorts/)[\w-]+")
            .expect("valid shared url regex")
    })
}

/// A user supplied URL together with the video id found in it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    source: String,
    video_id: Option<String>,
}

impl MediaReference {
    pub fn parse(input: &str) -> Self {
        let video_id = video_id_re()
            .captures(input)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        Self {
            source: input.to_string(),
            video_id,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Canonical watch URL, or the source unchanged when no id was found.
    pub fn canonical_url(&self) -> String {
        match &self.video_id {
            Some(id) => format!("{}{}", WATCH_URL, id),
            None => self.source.clone(),
        }
    }
}

pub fn normalize_url(input: &str) -> String {
    MediaReference::parse(input).canonical_url()
}

/// Pull the first YouTube link out of text shared from another app.
pub fn extract_shared_url(text: &str) -> Option<String> {
    shared_url_re().find(text).map(|m| m.as_str().to_string())
}

/// Numeric height of a quality label: `1080p60` is 1080, anything
/// unparseable is 0.
pub fn resolution_value(resolution: Option<&str>) -> u32 {
    let Some(res) = resolution else { return 0 };
    let digits = res
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    digits.parse().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamOption {
    pub url: String,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub bitrate: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    /// Seconds
    pub duration: Option<u64>,
    pub thumbnail_url: Option<String>,
    /// Muxed streams first, then video-only, each best resolution first.
    pub video_streams: Vec<StreamOption>,
    /// Highest bitrate first.
    pub audio_streams: Vec<StreamOption>,
}

fn sorted_video(mut streams: Vec<VideoStream>) -> Vec<VideoStream> {
    // Stable, so streams without a resolution keep their order at the end
    streams.sort_by_key(|s| Reverse(resolution_value(s.resolution.as_deref())));
    streams
}

fn sorted_audio(mut streams: Vec<AudioStream>) -> Vec<AudioStream> {
    streams.sort_by_key(|s| Reverse(s.average_bitrate));
    streams
}

impl MediaMetadata {
    pub fn from_stream_info(info: StreamInfo) -> Self {
        let muxed = sorted_video(info.video_streams).into_iter().map(|s| StreamOption {
            url: s.content,
            format: s.format.map(|f| f.name().to_string()),
            quality: s.resolution,
            bitrate: s.bitrate,
        });
        let video_only = sorted_video(info.video_only_streams)
            .into_iter()
            .map(|s| StreamOption {
                url: s.content,
                format: s.format.map(|f| f.name().to_string()),
                quality: s.resolution.map(|r| format!("{} (video only)", r)),
                bitrate: s.bitrate,
            });
        let audio_streams = sorted_audio(info.audio_streams)
            .into_iter()
            .map(|s| StreamOption {
                url: s.content,
                format: s.format.map(|f| f.name().to_string()),
                quality: Some(format!("{}kbps", s.average_bitrate)),
                bitrate: Some(s.average_bitrate),
            })
            .collect();

        let thumbnail_url = info
            .thumbnails
            .iter()
            .max_by_key(|t| t.width.unwrap_or(0))
            .map(|t| t.url.clone());

        Self {
            id: info.id,
            title: info.name,
            uploader: info.uploader_name,
            duration: info.duration,
            thumbnail_url,
            video_streams: muxed.chain(video_only).collect(),
            audio_streams,
        }
    }
}

/// Normalize `input`, hand it to the extractor and flatten the result.
pub async fn fetch_metadata<E: Extractor + ?Sized>(
    extractor: &E,
    input: &str,
) -> Result<MediaMetadata, ExtractError> {
    let url = normalize_url(input);
    info!("Fetching metadata for {}", url);
    let info = extractor.stream_info(&url).await?;
    Ok(MediaMetadata::from_stream_info(info))
}
