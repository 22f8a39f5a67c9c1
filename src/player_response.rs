use serde::Deserialize;
use serde_aux::prelude::*;

// Generated with https://transform.tools/json-to-rust-serde, trimmed to the
// fields the extractor reads

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialPlayerResponse {
    pub playability_status: PlayabilityStatus,
    pub streaming_data: Option<StreamingData>,
    pub video_details: Option<VideoDetails>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayabilityStatus {
    pub status: Status,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    LiveStreamOffline,
    Unplayable,
    LoginRequired,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    #[serde(default)]
    pub formats: Vec<Format>,
    #[serde(default)]
    pub adaptive_formats: Vec<Format>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    pub itag: i64,
    /// Absent when the stream is protected by a signature cipher.
    pub url: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub bitrate: i64,
    pub average_bitrate: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub quality_label: Option<String>,
    pub audio_quality: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub content_length: Option<u64>,
}

impl Format {
    /// `video/mp4; codecs="avc1.42001E, mp4a.40.2"` -> `("video", "mp4")`
    pub fn mime_parts(&self) -> (&str, &str) {
        let essence = self.mime_type.split(';').next().unwrap_or_default().trim();
        essence.split_once('/').unwrap_or((essence, ""))
    }

    pub fn codecs(&self) -> Option<&str> {
        let idx = self.mime_type.find("codecs=")? + "codecs=".len();
        Some(self.mime_type[idx..].trim_matches('"'))
    }

    pub fn is_audio(&self) -> bool {
        self.mime_parts().0 == "audio"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub video_id: String,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub length_seconds: Option<u64>,
    pub author: Option<String>,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    pub thumbnails: Vec<ThumbnailURL>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailURL {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(thiserror::Error, Debug)]
pub enum PlayerResponseError {
    #[error("Could not find initial player response")]
    NoInitialPlayerResponse,
    #[error("Could not parse initial player response")]
    ParseInitialPlayerResponse(#[from] serde_json::Error),
}

const IPR_STR: &str = "var ytInitialPlayerResponse =";

fn get_ipr_str(html: &str) -> Option<&str> {
    // Find the start of the initial player response
    let idx_ipr = html.find(IPR_STR)? + IPR_STR.len();

    // Find the start and end of the JSON object
    let idx_start = html[idx_ipr..].find('{')? + idx_ipr;
    let idx_end = html[idx_start..].find("};")? + idx_start + 1;

    // Bounds check
    if idx_start >= idx_end || idx_start >= html.len() || idx_end >= html.len() {
        return None;
    }

    Some(&html[idx_start..idx_end])
}

impl InitialPlayerResponse {
    pub fn from_html(html: &str) -> Result<Self, PlayerResponseError> {
        // Find the initial player response
        let ipr_str = get_ipr_str(html).ok_or(PlayerResponseError::NoInitialPlayerResponse)?;

        // Parse the JSON
        serde_json::from_str(ipr_str).map_err(PlayerResponseError::ParseInitialPlayerResponse)
    }

    pub fn is_playable(&self) -> bool {
        self.playability_status.status == Status::Ok
    }

    /// Muxed formats followed by adaptive ones.
    pub fn all_formats(&self) -> impl Iterator<Item = &Format> {
        self.streaming_data
            .iter()
            .flat_map(|sd| sd.formats.iter().chain(sd.adaptive_formats.iter()))
    }
}
