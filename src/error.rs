//! Error types for video generation.

use std::path::PathBuf;
use std::time::Duration;

/// Maximum length of a remote error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Input rejected before anything is sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Prompt is empty after trimming.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// Duration outside the supported range.
    #[error("duration must be between {min} and {max} seconds, got {got}")]
    Duration {
        /// Requested duration.
        got: u32,
        /// Shortest supported duration.
        min: u32,
        /// Longest supported duration.
        max: u32,
    },

    /// Aspect ratio other than 16:9 or 9:16.
    #[error("unsupported aspect ratio {0:?} (expected 16:9 or 9:16)")]
    AspectRatio(String),

    /// Reference image path does not exist.
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    /// Reference image exceeds the inline upload limit.
    #[error("image {} is {size} bytes, limit is {limit} bytes", path.display())]
    ImageTooLarge {
        /// Image path.
        path: PathBuf,
        /// File size in bytes.
        size: u64,
        /// Upload limit in bytes.
        limit: u64,
    },

    /// Reference image exists but could not be read.
    #[error("failed to read image {}: {reason}", path.display())]
    ImageUnreadable {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },
}

/// Errors that can occur while generating a video.
#[derive(Debug, thiserror::Error)]
pub enum VeoGenError {
    /// Bad input parameters; no remote call was made.
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Credential resolution failed or the service rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned a non-retryable error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// API returned a server-side error that is worth retrying.
    #[error("service unavailable: {status} - {message}")]
    Transient {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay from the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Network or HTTP transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote operation finished in a failed state.
    #[error("video generation failed: {message}")]
    RemoteFailure {
        /// Operation name.
        operation: String,
        /// Error message as reported by the service.
        message: String,
    },

    /// Polling exceeded the maximum wait. The remote operation may still finish.
    #[error("operation {operation} did not finish within {waited:?}")]
    Timeout {
        /// Operation name, for looking the job up later.
        operation: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The service answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VeoGenError {
    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transient { .. } => true,
            Self::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// Returns the delay the service asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Process exit code for this class of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Config(_) => 2,
            Self::Auth(_) => 3,
            Self::Network(_) | Self::Transient { .. } | Self::RateLimited { .. } => 4,
            Self::RemoteFailure { .. } => 5,
            Self::Timeout { .. } => 6,
            _ => 1,
        }
    }

    /// Classifies a non-success HTTP response.
    pub(crate) fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = sanitize_error_message(body);
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited { retry_after },
            500 | 502 | 503 | 504 => Self::Transient { status, message },
            _ => Self::Api { status, message },
        }
    }
}

/// Result type alias for video generation operations.
pub type Result<T> = std::result::Result<T, VeoGenError>;

/// Reduces a raw error body to something fit for a terminal.
///
/// Google APIs wrap errors as `{"error": {"message": ...}}`; the inner message
/// is preferred when present. API keys in query strings are masked and the
/// result is truncated.
pub(crate) fn sanitize_error_message(body: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    let masked = mask_api_keys(&extracted);
    if masked.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = masked.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{truncated}...")
    } else {
        masked
    }
}

fn mask_api_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("key=") {
        out.push_str(&rest[..pos + 4]);
        rest = &rest[pos + 4..];
        let end = rest
            .find(|c: char| c == '&' || c == '"' || c.is_whitespace())
            .unwrap_or(rest.len());
        if end > 0 {
            out.push_str("***");
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Reads a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
