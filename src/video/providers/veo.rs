//! Veo (Google) long-running operation client.

use crate::auth::{AuthHeader, Credentials};
use crate::config::{Backend, VeoConfig};
use crate::error::{parse_retry_after, Result, VeoGenError};
use crate::video::client::OperationClient;
use crate::video::operation::{OperationHandle, OperationStatus};
use crate::video::types::{GenerationRequest, VideoPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini Developer API root.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Cloud Storage download root for `gs://` URIs.
pub const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Vertex AI regional API root.
pub fn vertex_base_url(location: &str) -> String {
    format!("https://{location}-aiplatform.googleapis.com/v1")
}

/// Builder for [`VeoClient`].
#[derive(Debug)]
pub struct VeoClientBuilder {
    config: VeoConfig,
    base_url: Option<String>,
    storage_base_url: Option<String>,
    request_timeout: Duration,
    http: Option<reqwest::Client>,
}

impl VeoClientBuilder {
    /// Creates a builder for the given configuration.
    pub fn new(config: VeoConfig) -> Self {
        Self {
            config,
            base_url: None,
            storage_base_url: None,
            request_timeout: Duration::from_secs(120),
            http: None,
        }
    }

    /// Overrides the API root (Vertex or Gemini, depending on the backend).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Overrides the Cloud Storage download root.
    pub fn storage_base_url(mut self, url: impl Into<String>) -> Self {
        self.storage_base_url = Some(url.into());
        self
    }

    /// Sets the per-request HTTP timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Uses a pre-built HTTP client. `request_timeout` is then ignored.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<VeoClient> {
        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.request_timeout)
                .build()?,
        };

        let base_url = self
            .base_url
            .unwrap_or_else(|| match self.config.backend() {
                Backend::Vertex { location, .. } => vertex_base_url(location),
                Backend::Gemini => GEMINI_BASE_URL.to_string(),
            })
            .trim_end_matches('/')
            .to_string();
        let storage_base_url = self
            .storage_base_url
            .unwrap_or_else(|| STORAGE_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(VeoClient {
            http,
            credentials: Credentials::new(self.config.credentials().clone()),
            config: self.config,
            base_url,
            storage_base_url,
        })
    }
}

/// Talks to Veo through Vertex AI or the Gemini Developer API.
pub struct VeoClient {
    http: reqwest::Client,
    credentials: Credentials,
    config: VeoConfig,
    base_url: String,
    storage_base_url: String,
}

impl std::fmt::Debug for VeoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VeoClient")
            .field("backend", self.config.backend())
            .field("model", &self.config.model())
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl VeoClient {
    /// Creates a new `VeoClientBuilder`.
    pub fn builder(config: VeoConfig) -> VeoClientBuilder {
        VeoClientBuilder::new(config)
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &VeoConfig {
        &self.config
    }

    fn model_url(&self) -> String {
        let model = self.config.model();
        match self.config.backend() {
            Backend::Vertex { project, location } => format!(
                "{}/projects/{project}/locations/{location}/publishers/google/models/{model}",
                self.base_url
            ),
            Backend::Gemini => format!("{}/models/{model}", self.base_url),
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        Err(self.parse_error(status.as_u16(), &text, &headers))
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> VeoGenError {
        if status == 404 {
            let hint = match self.config.backend() {
                Backend::Vertex { project, location } => format!(
                    "model {} not found in project {project} ({location}). \
                     Check the project ID, location and that the Vertex AI API is enabled.",
                    self.config.model()
                ),
                Backend::Gemini => format!(
                    "model {} not available. Veo requires a paid-tier API key with billing enabled.",
                    self.config.model()
                ),
            };
            return VeoGenError::Api {
                status,
                message: hint,
            };
        }
        VeoGenError::from_status(status, text, parse_retry_after(headers))
    }

    fn storage_url(&self, uri: &str) -> String {
        match uri.strip_prefix("gs://") {
            Some(path) => format!("{}/{path}", self.storage_base_url),
            None => uri.to_string(),
        }
    }
}

#[async_trait]
impl OperationClient for VeoClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle> {
        let url = format!("{}:predictLongRunning", self.model_url());
        let auth = self.credentials.authorize().await?;

        let builder = self.http.post(&url);
        let builder = match self.config.backend() {
            Backend::Vertex { .. } => builder.json(&VertexRequest::from_request(request)),
            Backend::Gemini => {
                let ignored = GeminiRequest::ignored_options(request);
                if !ignored.is_empty() {
                    tracing::warn!(
                        ignored = ?ignored,
                        "The Gemini API backend does not support these options; ignoring them"
                    );
                }
                builder.json(&GeminiRequest::from_request(request))
            }
        };
        let response = self.check(auth.apply(builder).send().await?).await?;

        let operation: VeoOperationResponse = response.json().await?;
        if operation.name.is_empty() {
            return Err(VeoGenError::UnexpectedResponse(
                "submission returned no operation name".into(),
            ));
        }
        Ok(OperationHandle::new(operation.name))
    }

    async fn status(&self, handle: &OperationHandle) -> Result<OperationStatus> {
        let auth = self.credentials.authorize().await?;
        let builder = match self.config.backend() {
            Backend::Vertex { .. } => self
                .http
                .post(format!("{}:fetchPredictOperation", self.model_url()))
                .json(&VertexFetchOperationRequest {
                    operation_name: handle.name().to_string(),
                }),
            Backend::Gemini => self.http.get(format!("{}/{}", self.base_url, handle.name())),
        };
        let response = self.check(auth.apply(builder).send().await?).await?;

        let operation: VeoOperationResponse = response.json().await?;
        operation.into_status()
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        let auth = self.credentials.authorize().await?;
        let url = match &auth {
            AuthHeader::ApiKey(_) if uri.starts_with("gs://") => {
                return Err(VeoGenError::Auth(format!(
                    "{uri} is a Cloud Storage URI and cannot be fetched with an API key. \
                     Use Vertex AI credentials or `gsutil cp`."
                )))
            }
            // File URIs from the Gemini API need the key as a query parameter.
            AuthHeader::ApiKey(key) if uri.contains('?') => format!("{uri}&key={key}"),
            AuthHeader::ApiKey(key) => format!("{uri}?key={key}"),
            AuthHeader::Bearer(_) => self.storage_url(uri),
        };

        tracing::debug!(uri, "downloading video");
        let response = self.check(auth.apply(self.http.get(&url)).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn cancel(&self, handle: &OperationHandle) -> Result<()> {
        let url = format!("{}/{}:cancel", self.base_url, handle.name());
        let auth = self.credentials.authorize().await?;
        self.check(auth.apply(self.http.post(&url).json(&serde_json::json!({}))).send().await?)
            .await?;
        tracing::info!(operation = %handle, "Cancellation requested");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let auth = self.credentials.authorize().await?;
        let response = auth.apply(self.http.get(self.model_url())).send().await?;
        match response.status().as_u16() {
            401 | 403 => Err(VeoGenError::Auth(format!(
                "{} credentials were rejected by {} ({})",
                self.credentials.source().describe(),
                self.config.backend().as_str(),
                response.status()
            ))),
            status => {
                if !response.status().is_success() {
                    tracing::debug!(status, "Model lookup did not succeed; credentials were accepted");
                }
                Ok(())
            }
        }
    }

    fn model_id(&self) -> &str {
        self.config.model()
    }
}

// ── Vertex AI wire format ───────────────────────────────────────────────────

/// Vertex AI media format: flat `bytesBase64Encoded` + `mimeType`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexMediaData {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<VertexMediaData>,
}

/// Vertex AI parameters (uses `sampleCount` instead of `numberOfVideos`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexParameters {
    aspect_ratio: String,
    duration_seconds: u32,
    sample_count: u32,
    enhance_prompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generate_audio: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexRequest {
    instances: Vec<VertexInstance>,
    parameters: VertexParameters,
}

impl VertexRequest {
    fn from_request(req: &GenerationRequest) -> Self {
        Self {
            instances: vec![VertexInstance {
                prompt: req.prompt().to_string(),
                image: req.reference_image().map(|img| VertexMediaData {
                    bytes_base64_encoded: img.to_base64(),
                    mime_type: img.mime_type.clone(),
                }),
            }],
            parameters: VertexParameters {
                aspect_ratio: req.aspect_ratio().as_str().to_string(),
                duration_seconds: req.duration_secs(),
                sample_count: req.sample_count(),
                enhance_prompt: req.enhance_prompt(),
                negative_prompt: req.negative_prompt().map(str::to_string),
                storage_uri: req.storage_uri().map(str::to_string),
                generate_audio: req.generate_audio(),
            },
        }
    }
}

/// Vertex AI poll request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexFetchOperationRequest {
    operation_name: String,
}

// ── Gemini Developer API wire format ────────────────────────────────────────

/// `{"inlineData": {"mimeType": "...", "data": "..."}}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiMediaData {
    inline_data: GeminiInlineData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<GeminiMediaData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiParameters {
    aspect_ratio: String,
    duration_seconds: u32,
    number_of_videos: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    instances: Vec<GeminiInstance>,
    parameters: GeminiParameters,
}

impl GeminiRequest {
    /// Request options with no Gemini API equivalent that differ from the defaults.
    fn ignored_options(req: &GenerationRequest) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if !req.enhance_prompt() {
            ignored.push("enhance_prompt");
        }
        if req.generate_audio().is_some() {
            ignored.push("generate_audio");
        }
        if req.storage_uri().is_some() {
            ignored.push("storage_uri");
        }
        ignored
    }

    fn from_request(req: &GenerationRequest) -> Self {
        Self {
            instances: vec![GeminiInstance {
                prompt: req.prompt().to_string(),
                image: req.reference_image().map(|img| GeminiMediaData {
                    inline_data: GeminiInlineData {
                        mime_type: img.mime_type.clone(),
                        data: img.to_base64(),
                    },
                }),
            }],
            parameters: GeminiParameters {
                aspect_ratio: req.aspect_ratio().as_str().to_string(),
                duration_seconds: req.duration_secs(),
                number_of_videos: req.sample_count(),
                negative_prompt: req.negative_prompt().map(str::to_string),
            },
        }
    }
}

// ── Response types (shared + Vertex-specific fields) ────────────────────────

#[derive(Debug, Deserialize)]
struct VeoOperationResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    response: Option<VeoVideoResponse>,
    #[serde(default)]
    error: Option<VeoError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoVideoResponse {
    /// Gemini: response from predictLongRunning endpoint.
    #[serde(default)]
    generate_video_response: Option<VeoGenerateVideoResponse>,
    /// Vertex AI: videos array in response.
    #[serde(default)]
    videos: Option<Vec<VertexVideo>>,
    /// Vertex AI reports filtering at the top level.
    #[serde(default)]
    rai_media_filtered_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoGenerateVideoResponse {
    #[serde(default)]
    generated_samples: Option<Vec<VeoGeneratedSample>>,
    #[serde(default)]
    rai_media_filtered_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VeoGeneratedSample {
    #[serde(default)]
    video: Option<VeoVideo>,
}

#[derive(Debug, Deserialize)]
struct VeoVideo {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VeoError {
    #[serde(default)]
    message: Option<String>,
}

/// Vertex AI video entry in response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VertexVideo {
    /// Returned when `storageUri` is set.
    #[serde(default)]
    gcs_uri: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    /// Inline base64 video, the default when no bucket is given.
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

impl VeoOperationResponse {
    /// Maps a raw operation document onto a status report.
    fn into_status(self) -> Result<OperationStatus> {
        // An error wins even if `done` is missing.
        if let Some(err) = self.error {
            return Ok(OperationStatus::failed(
                err.message.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        if !self.done.unwrap_or(false) {
            return Ok(OperationStatus::running());
        }

        let Some(resp) = self.response else {
            return Err(VeoGenError::UnexpectedResponse(format!(
                "operation {} completed without a response",
                self.name
            )));
        };

        let filtered = resp.rai_media_filtered_count.unwrap_or(0)
            + resp
                .generate_video_response
                .as_ref()
                .and_then(|g| g.rai_media_filtered_count)
                .unwrap_or(0);

        if let Some(first) = resp.videos.and_then(|v| v.into_iter().next()) {
            if let Some(b64) = first.bytes_base64_encoded {
                use base64::Engine;
                let data = base64::engine::general_purpose::STANDARD
                    .decode(b64.trim())
                    .map_err(|e| {
                        VeoGenError::Decode(format!("failed to decode inline video data: {e}"))
                    })?;
                return Ok(OperationStatus::succeeded(VideoPayload::Inline(data)));
            }
            if let Some(uri) = first.gcs_uri.or(first.uri) {
                return Ok(OperationStatus::succeeded(VideoPayload::Remote(uri)));
            }
        }

        let sample_uri = resp
            .generate_video_response
            .and_then(|g| g.generated_samples)
            .and_then(|s| s.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri);
        if let Some(uri) = sample_uri {
            return Ok(OperationStatus::succeeded(VideoPayload::Remote(uri)));
        }

        if filtered > 0 {
            return Ok(OperationStatus::failed(
                "Video was filtered by Veo safety filters",
            ));
        }
        Err(VeoGenError::UnexpectedResponse(
            "Video generation completed but no video data returned".into(),
        ))
    }
}
