use std::{path::Path, sync::OnceLock, time::Duration};

use futures::{Stream, StreamExt};
use regex::Regex;
use reqwest::header::USER_AGENT;
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt},
};

/// User agent sent with every media transfer.
pub const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const MAX_FILENAME_LEN: usize = 100;

/// Client used for media transfers, separate from the extractor's adapter.
pub struct HttpClient {
    pub client: reqwest::Client,
    read_timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Download failed: HTTP {0}")]
    Status(u16),
    #[error("Empty response")]
    EmptyBody,
    #[error("No data received for {0:?}")]
    Timeout(Duration),
}

impl HttpClient {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> reqwest::Result<HttpClient> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(HttpClient {
            client,
            read_timeout,
        })
    }

    /// Stream `url` into `path`, reporting progress as a fraction of the
    /// content length. Always ends with a call reporting `1.0`.
    pub async fn download_file<F>(
        &self,
        url: &str,
        path: &Path,
        mut on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(f32) + Send,
    {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, DOWNLOAD_USER_AGENT)
            .send();
        // The read timeout also covers waiting for the response head
        let resp = tokio::time::timeout(self.read_timeout, request)
            .await
            .map_err(|_| DownloadError::Timeout(self.read_timeout))??;
        if !resp.status().is_success() {
            return Err(DownloadError::Status(resp.status().as_u16()));
        }

        let content_length = resp.content_length();
        debug!(
            "Downloading {} ({}) to {}",
            url,
            content_length.map(format_bytes).unwrap_or("unknown size".into()),
            path.display()
        );

        let read_timeout = self.read_timeout;
        let chunks = tokio_stream::StreamExt::timeout(resp.bytes_stream(), read_timeout).map(move |item| {
            item.map_err(|_| DownloadError::Timeout(read_timeout))
                .and_then(|chunk| chunk.map_err(DownloadError::from))
        });

        let mut file = File::create(path).await?;
        let size = write_with_progress(chunks, &mut file, content_length, &mut on_progress).await?;
        if size == 0 {
            return Err(DownloadError::EmptyBody);
        }

        on_progress(1.0);
        Ok(size)
    }
}

/// Copy every chunk of `chunks` into `out`. After each chunk the progress
/// callback receives the fraction written so far, but only when the total
/// length is known and positive.
pub async fn write_with_progress<S, B, W, F>(
    chunks: S,
    out: &mut W,
    content_length: Option<u64>,
    on_progress: &mut F,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, DownloadError>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
    F: FnMut(f32),
{
    let total = content_length.filter(|len| *len > 0);
    let mut written = 0u64;

    futures::pin_mut!(chunks);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        out.write_all(chunk).await?;
        written += chunk.len() as u64;

        if let Some(total) = total {
            on_progress((written as f64 / total as f64).min(1.0) as f32);
        }
    }

    out.flush().await?;
    Ok(written)
}

fn illegal_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid filename regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Make `name` safe to use as a file name on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    let name = illegal_chars_re().replace_all(name, "_");
    let name = whitespace_re().replace_all(&name, " ");
    name.trim().chars().take(MAX_FILENAME_LEN).collect()
}

pub fn format_bytes(bytes: u64) -> String {
    let mut bytes = bytes as f64;
    let mut suffix = "B";

    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "KiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "MiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "GiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "TiB";
    }

    format!("{:.2} {}", bytes, suffix)
}

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
