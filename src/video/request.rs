//! Turns user input into a validated [`GenerationRequest`].

use crate::error::ValidationError;
use crate::video::types::{AspectRatio, GenerationRequest, ImageFormat, ReferenceImage};
use std::path::{Path, PathBuf};

/// Shortest clip Veo produces, in seconds.
pub const MIN_DURATION_SECS: u32 = 5;
/// Longest clip Veo produces, in seconds.
pub const MAX_DURATION_SECS: u32 = 8;
/// Default clip length, in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 5;
/// Largest reference image accepted for inline upload.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Raw generation parameters as gathered from flags, prompts or code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// The text prompt describing the desired video.
    pub prompt: String,
    /// Path of a reference image (image-to-video mode).
    pub image: Option<PathBuf>,
    /// Desired video duration in seconds.
    pub duration_secs: u32,
    /// Aspect ratio as typed by the user ("16:9" or "9:16").
    pub aspect_ratio: String,
    /// What to avoid in the output.
    pub negative_prompt: Option<String>,
    /// Let the service rewrite the prompt.
    pub enhance_prompt: bool,
    /// Ask for an audio track (Veo 3 models).
    pub generate_audio: Option<bool>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            image: None,
            duration_secs: DEFAULT_DURATION_SECS,
            aspect_ratio: AspectRatio::default().as_str().to_string(),
            negative_prompt: None,
            enhance_prompt: true,
            generate_audio: None,
        }
    }
}

impl GenerationOptions {
    /// Creates options with the given prompt and default parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Sets the desired video duration in seconds.
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = ratio.into();
        self
    }

    /// Sets a reference image for image-to-video generation.
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image = Some(path.into());
        self
    }

    /// Sets the negative prompt.
    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    /// Enables or disables prompt enhancement.
    pub fn with_enhance_prompt(mut self, enhance: bool) -> Self {
        self.enhance_prompt = enhance;
        self
    }

    /// Requests (or suppresses) an audio track.
    pub fn with_generate_audio(mut self, audio: bool) -> Self {
        self.generate_audio = Some(audio);
        self
    }

    /// Checks every constraint and builds the request.
    ///
    /// Reads the reference image from disk; nothing else is touched.
    pub fn validate(&self) -> Result<GenerationRequest, ValidationError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            return Err(ValidationError::Duration {
                got: self.duration_secs,
                min: MIN_DURATION_SECS,
                max: MAX_DURATION_SECS,
            });
        }

        let aspect_ratio: AspectRatio = self.aspect_ratio.parse()?;

        let reference_image = self
            .image
            .as_deref()
            .map(load_reference_image)
            .transpose()?;

        let negative_prompt = self
            .negative_prompt
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            reference_image,
            duration_secs: self.duration_secs,
            aspect_ratio,
            negative_prompt,
            enhance_prompt: self.enhance_prompt,
            generate_audio: self.generate_audio,
            sample_count: 1,
            storage_uri: None,
        })
    }
}

fn load_reference_image(path: &Path) -> Result<ReferenceImage, ValidationError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(ValidationError::ImageNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidationError::ImageNotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ValidationError::ImageUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: MAX_IMAGE_BYTES,
        });
    }

    let data = std::fs::read(path).map_err(|e| ValidationError::ImageUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mime_type = ImageFormat::from_magic_bytes(&data)
        .map(|f| f.mime_type())
        .unwrap_or_else(|| mime_from_extension(path))
        .to_string();

    Ok(ReferenceImage {
        data,
        mime_type,
        source: path.to_path_buf(),
    })
}

fn mime_from_extension(path: &Path) -> &'static str {
    let is_png = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    if is_png {
        "image/png"
    } else {
        "image/jpeg"
    }
}
