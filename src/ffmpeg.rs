use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error("Transcoder exited with status {0:?}")]
    Failed(Option<i32>),
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Re-encode the audio track of `input` into `output`, overwriting it.
    async fn to_audio(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

pub struct Ffmpeg {
    pub binary: PathBuf,
    pub codec: String,
    pub quality: u8,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            codec: "libmp3lame".into(),
            quality: 2,
        }
    }
}

impl Ffmpeg {
    /// `-i <input> -vn -acodec <codec> -q:a <quality> <output> -y`
    pub fn audio_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-acodec".into(),
            self.codec.as_str().into(),
            "-q:a".into(),
            self.quality.to_string().into(),
            output.into(),
            "-y".into(),
        ]
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn to_audio(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let mut child = tokio::process::Command::new(&self.binary);

        child
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .args(self.audio_args(input, output))
            .stdin(Stdio::null());

        let status = child.spawn()?.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(TranscodeError::Failed(status.code()))
        }
    }
}
