//! Core types for video generation.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Output aspect ratios Veo accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 16:9 landscape.
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16 portrait.
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            other => Err(ValidationError::AspectRatio(other.to_string())),
        }
    }
}

/// Whether a reference image accompanies the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Prompt only.
    TextToVideo,
    /// Prompt plus a reference image used as the first frame.
    ImageToVideo,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextToVideo => write!(f, "text-to-video"),
            Self::ImageToVideo => write!(f, "image-to-video"),
        }
    }
}

/// Reference image formats recognised by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// WebP.
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Image bytes sent alongside the prompt.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Detected MIME type.
    pub mime_type: String,
    /// Where the image was read from.
    pub source: PathBuf,
}

impl std::fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("source", &self.source)
            .finish()
    }
}

impl ReferenceImage {
    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// A validated generation request.
///
/// Only [`GenerationOptions::validate`](crate::video::GenerationOptions::validate)
/// produces one, so every instance satisfies the duration, aspect-ratio and
/// image constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub(crate) prompt: String,
    pub(crate) reference_image: Option<ReferenceImage>,
    pub(crate) duration_secs: u32,
    pub(crate) aspect_ratio: AspectRatio,
    pub(crate) negative_prompt: Option<String>,
    pub(crate) enhance_prompt: bool,
    pub(crate) generate_audio: Option<bool>,
    pub(crate) sample_count: u32,
    pub(crate) storage_uri: Option<String>,
}

impl GenerationRequest {
    /// The text prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The reference image, for image-to-video requests.
    pub fn reference_image(&self) -> Option<&ReferenceImage> {
        self.reference_image.as_ref()
    }

    /// Requested clip length in seconds.
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Requested aspect ratio.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// What to steer away from, if anything.
    pub fn negative_prompt(&self) -> Option<&str> {
        self.negative_prompt.as_deref()
    }

    /// Whether the service may rewrite the prompt.
    pub fn enhance_prompt(&self) -> bool {
        self.enhance_prompt
    }

    /// Whether to generate an audio track (Veo 3 only).
    pub fn generate_audio(&self) -> Option<bool> {
        self.generate_audio
    }

    /// Number of videos requested.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Output prefix in Cloud Storage, if outputs go to a bucket.
    pub fn storage_uri(&self) -> Option<&str> {
        self.storage_uri.as_deref()
    }

    /// Text-to-video or image-to-video, decided by the reference image.
    pub fn mode(&self) -> GenerationMode {
        if self.reference_image.is_some() {
            GenerationMode::ImageToVideo
        } else {
            GenerationMode::TextToVideo
        }
    }

    /// Directs outputs to `gs://<bucket>/videos/`.
    pub fn with_storage_bucket(mut self, bucket: &str) -> Self {
        self.storage_uri = Some(format!("gs://{bucket}/videos/"));
        self
    }
}

/// Where the finished video lives.
#[derive(Clone, PartialEq, Eq)]
pub enum VideoPayload {
    /// Bytes returned inline in the operation response.
    Inline(Vec<u8>),
    /// A `gs://` or HTTPS URI to fetch.
    Remote(String),
}

impl std::fmt::Debug for VideoPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline(data) => write!(f, "Inline({} bytes)", data.len()),
            Self::Remote(uri) => f.debug_tuple("Remote").field(uri).finish(),
        }
    }
}

/// Metadata about the video generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Remote operation name.
    pub operation: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Video duration in seconds.
    pub video_duration_secs: Option<u32>,
    /// Remote URI the bytes were fetched from, if not inline.
    pub source_uri: Option<String>,
}

/// A generated video written to local disk.
#[derive(Debug, Clone, Serialize)]
pub struct VideoArtifact {
    /// Path of the written file.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size_bytes: u64,
    /// MIME type (always "video/mp4" for Veo).
    pub mime_type: String,
    /// Text-to-video or image-to-video.
    pub mode: GenerationMode,
    /// Generation metadata.
    pub metadata: VideoMetadata,
}
