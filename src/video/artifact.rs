//! Writes generated videos to local disk without overwriting.

use crate::error::Result;
use crate::video::types::GenerationMode;
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const MAX_STEM_CHARS: usize = 30;
const MAX_SUFFIX: u32 = 999;

/// Filename prefix for a prompt: `<sanitized-prompt>` truncated to 30 chars.
///
/// Keeps alphanumerics, space, `-` and `_`; trailing spaces are dropped and the
/// rest become `_`. Image-to-video prompts are prefixed with `image_to_video_`.
pub fn filename_stem(prompt: &str, mode: GenerationMode) -> String {
    let source = match mode {
        GenerationMode::TextToVideo => prompt.to_string(),
        GenerationMode::ImageToVideo => format!("image_to_video_{prompt}"),
    };

    let kept: String = source
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let stem: String = kept
        .trim_end()
        .replace(' ', "_")
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();

    if stem.is_empty() {
        "video".to_string()
    } else {
        stem
    }
}

/// Creates `<stem>_<YYYYMMDD_HHMMSS>.mp4` files in an output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ArtifactWriter {
    /// Writes into `output_dir`, creating it if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// The output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `data` to a new file and returns its path.
    ///
    /// Existing files are never touched: on a name collision `_1`, `_2`, ...
    /// are appended before the extension.
    pub async fn write(&self, stem: &str, timestamp: DateTime<Local>, data: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let base = format!("{stem}_{}", timestamp.format("%Y%m%d_%H%M%S"));

        for n in 0..=MAX_SUFFIX {
            let name = if n == 0 {
                format!("{base}.mp4")
            } else {
                format!("{base}_{n}.mp4")
            };
            let path = self.output_dir.join(name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            let written = async {
                file.write_all(data).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }

            tracing::info!(path = %path.display(), bytes = data.len(), "Saved video");
            return Ok(path);
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!(
                "too many existing files named {base}_*.mp4 in {}",
                self.output_dir.display()
            ),
        )
        .into())
    }
}
