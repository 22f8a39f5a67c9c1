use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{pipeline::DownloadFormat, policy::HeaderPolicy};

pub const ENV_OUTPUT_DIR: &str = "YTD_OUTPUT_DIR";
pub const ENV_FFMPEG: &str = "YTD_FFMPEG";
pub const ENV_POLICY: &str = "YTD_POLICY";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse header policy: {0}")]
    Policy(#[from] serde_json::Error),
    #[error("Missing value for {0}")]
    MissingValue(String),
    #[error("{0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub format: DownloadFormat,
    /// Connect and request timeout of the extractor's HTTP adapter
    pub adapter_timeout: Duration,
    pub connect_timeout: Duration,
    /// Longest wait for the next chunk of a media transfer
    pub read_timeout: Duration,
    pub ffmpeg: PathBuf,
    pub audio_codec: String,
    pub audio_quality: u8,
    pub policy: HeaderPolicy,
    /// URLs or shared text to download
    pub inputs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            format: DownloadFormat::Video,
            adapter_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            ffmpeg: PathBuf::from("ffmpeg"),
            audio_codec: "libmp3lame".into(),
            audio_quality: 2,
            policy: HeaderPolicy::default(),
            inputs: Vec::new(),
        }
    }
}

pub const USAGE: &str = "Usage: ytd-rs [--audio|--video] [-o DIR] <url-or-shared-text>...";

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = var(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(ffmpeg) = var(ENV_FFMPEG) {
            config.ffmpeg = PathBuf::from(ffmpeg);
        }
        if let Some(path) = var(ENV_POLICY) {
            config.policy = load_policy(Path::new(&path))?;
        }

        Ok(config)
    }

    /// Apply command line arguments, excluding the program name.
    pub fn with_args<I>(mut self, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-a" | "--audio" | "--mp3" => self.format = DownloadFormat::Audio,
                "-v" | "--video" | "--mp4" => self.format = DownloadFormat::Video,
                "-o" | "--output" => {
                    let dir = args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                    self.output_dir = PathBuf::from(dir);
                }
                "-f" | "--format" => {
                    let format = args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                    self.format = format.parse().map_err(ConfigError::InvalidArgument)?;
                }
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return Err(ConfigError::InvalidArgument(format!(
                        "Unknown option {}\n{}",
                        flag, USAGE
                    )))
                }
                _ => self.inputs.push(arg.clone()),
            }
        }

        Ok(self)
    }
}

/// Read a JSON header policy table.
pub fn load_policy(path: &Path) -> Result<HeaderPolicy, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}
