//! Immutable runtime configuration.
//!
//! Everything process-wide (project, location, model, backend, credentials)
//! lives in a [`VeoConfig`] that is built once and handed to the client.

use crate::auth::{credential_file_source, CredentialSource};
use crate::error::{Result, VeoGenError};
use std::path::{Path, PathBuf};

/// Default GCP project when `GOOGLE_CLOUD_PROJECT` is unset.
pub const DEFAULT_PROJECT: &str = "veo-testing";
/// Default GCP region when `GOOGLE_CLOUD_LOCATION` is unset.
pub const DEFAULT_LOCATION: &str = "us-central1";
/// Default Veo model when `VEO_MODEL_ID` is unset.
pub const DEFAULT_MODEL: &str = "veo-3.0-generate-preview";

/// Service-account key picked up from the working directory as a last resort.
const LOCAL_SERVICE_ACCOUNT_KEY: &str = "veo-service-account.json";

/// File name `gcloud auth application-default login` writes.
const ADC_FILE_NAME: &str = "application_default_credentials.json";

/// Which Google API backend serves Veo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Vertex AI (aiplatform.googleapis.com), OAuth bearer auth.
    Vertex {
        /// GCP project ID.
        project: String,
        /// GCP location (e.g. "us-central1").
        location: String,
    },
    /// Gemini Developer API (generativelanguage.googleapis.com), API key auth.
    Gemini,
}

impl Backend {
    /// Short name for logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertex { .. } => "vertex",
            Self::Gemini => "gemini",
        }
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct VeoConfig {
    backend: Backend,
    model: String,
    storage_bucket: Option<String>,
    credentials: CredentialSource,
}

impl VeoConfig {
    /// Creates an empty builder.
    pub fn builder() -> VeoConfigBuilder {
        VeoConfigBuilder::default()
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        VeoConfigBuilder::from_env().build()
    }

    /// The selected backend.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Model identifier sent to the API.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Bucket receiving outputs, without the `gs://` scheme.
    pub fn storage_bucket(&self) -> Option<&str> {
        self.storage_bucket.as_deref()
    }

    /// `gs://<bucket>/videos/` when a bucket is configured.
    pub fn storage_uri(&self) -> Option<String> {
        self.storage_bucket
            .as_ref()
            .map(|bucket| format!("gs://{bucket}/videos/"))
    }

    /// Where credentials come from.
    pub fn credentials(&self) -> &CredentialSource {
        &self.credentials
    }
}

/// Builder for [`VeoConfig`].
///
/// Fields left unset fall back to the defaults above. Credentials that are not
/// set explicitly are resolved from the token, key-file and API-key fields in
/// that order.
#[derive(Debug, Clone, Default)]
pub struct VeoConfigBuilder {
    project: Option<String>,
    location: Option<String>,
    use_vertex: Option<std::result::Result<bool, String>>,
    model: Option<String>,
    storage_bucket: Option<String>,
    credentials: Option<CredentialSource>,
    access_token: Option<String>,
    application_credentials: Option<PathBuf>,
    well_known_adc_file: Option<PathBuf>,
    api_key: Option<String>,
}

impl VeoConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Seeds the builder from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            project: get("GOOGLE_CLOUD_PROJECT"),
            location: get("GOOGLE_CLOUD_LOCATION"),
            use_vertex: get("GOOGLE_GENAI_USE_VERTEXAI").map(|v| parse_flag(&v)),
            model: get("VEO_MODEL_ID"),
            storage_bucket: get("GCS_BUCKET"),
            credentials: None,
            access_token: get("GOOGLE_ACCESS_TOKEN"),
            application_credentials: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            well_known_adc_file: well_known_adc_file(&get),
            api_key: get("GOOGLE_API_KEY"),
        }
    }

    /// Sets the GCP project ID.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the GCP location.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Selects Vertex AI (`true`) or the Gemini Developer API (`false`).
    pub fn use_vertex(mut self, use_vertex: bool) -> Self {
        self.use_vertex = Some(Ok(use_vertex));
        self
    }

    /// Sets the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the output bucket. A `gs://` prefix and trailing slashes are stripped.
    pub fn storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.storage_bucket = Some(bucket.into());
        self
    }

    /// Uses exactly this credential source.
    pub fn credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the API key used by the Gemini backend.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builds the configuration, resolving backend and credentials.
    pub fn build(self) -> Result<VeoConfig> {
        let use_vertex = match &self.use_vertex {
            Some(Ok(flag)) => *flag,
            Some(Err(raw)) => {
                return Err(VeoGenError::Config(format!(
                    "GOOGLE_GENAI_USE_VERTEXAI must be true or false, got {raw:?}"
                )))
            }
            None => true,
        };

        let backend = if use_vertex {
            Backend::Vertex {
                project: self
                    .project
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
                location: self
                    .location
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            }
        } else {
            Backend::Gemini
        };

        let credentials = match self.credentials.clone() {
            Some(explicit) => explicit,
            None => self.resolve_credentials(&backend)?,
        };

        let storage_bucket = match self.storage_bucket {
            Some(raw) => Some(normalize_bucket(&raw)?),
            None => None,
        };

        Ok(VeoConfig {
            backend,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            storage_bucket,
            credentials,
        })
    }

    fn resolve_credentials(&self, backend: &Backend) -> Result<CredentialSource> {
        if *backend == Backend::Gemini {
            return self
                .api_key
                .clone()
                .map(CredentialSource::ApiKey)
                .ok_or_else(|| {
                    VeoGenError::Auth(
                        "GOOGLE_API_KEY not set. The Gemini API backend requires an API key; \
                         set GOOGLE_GENAI_USE_VERTEXAI=true to use Vertex AI instead."
                            .into(),
                    )
                });
        }

        if let Some(token) = &self.access_token {
            return Ok(CredentialSource::AccessToken(token.clone()));
        }

        if let Some(path) = &self.application_credentials {
            if path.exists() {
                return Ok(credential_file_source(path));
            }
            tracing::warn!(
                path = %path.display(),
                "GOOGLE_APPLICATION_CREDENTIALS is set but the file does not exist, falling back"
            );
        }

        let local_key = Path::new(LOCAL_SERVICE_ACCOUNT_KEY);
        if local_key.exists() {
            return Ok(CredentialSource::ServiceAccountFile(local_key.to_path_buf()));
        }

        if let Some(path) = self.well_known_adc_file.as_ref().filter(|p| p.exists()) {
            return Ok(credential_file_source(path));
        }

        Ok(CredentialSource::ApplicationDefault)
    }
}

/// Where gcloud keeps application default credentials for this user.
fn well_known_adc_file(get: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(dir) = get("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(dir).join(ADC_FILE_NAME));
    }
    if cfg!(windows) {
        get("APPDATA").map(|dir| PathBuf::from(dir).join("gcloud").join(ADC_FILE_NAME))
    } else {
        get("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("gcloud")
                .join(ADC_FILE_NAME)
        })
    }
}

fn parse_flag(raw: &str) -> std::result::Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(raw.to_string()),
    }
}

fn normalize_bucket(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let bucket = trimmed
        .strip_prefix("gs://")
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if bucket.is_empty() || bucket.contains('/') {
        return Err(VeoGenError::Config(format!(
            "GCS_BUCKET must be a bucket name, got {raw:?}"
        )));
    }
    Ok(bucket.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn builder_from(vars: &[(&str, &str)]) -> VeoConfigBuilder {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VeoConfigBuilder::from_lookup(move |name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_select_vertex() {
        let config = builder_from(&[("GOOGLE_ACCESS_TOKEN", "tok")])
            .build()
            .unwrap();
        assert_eq!(
            config.backend(),
            &Backend::Vertex {
                project: DEFAULT_PROJECT.into(),
                location: DEFAULT_LOCATION.into(),
            }
        );
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert!(config.storage_uri().is_none());
        assert_eq!(
            config.credentials(),
            &CredentialSource::AccessToken("tok".into())
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = builder_from(&[
            ("GOOGLE_CLOUD_PROJECT", "my-project"),
            ("GOOGLE_CLOUD_LOCATION", "europe-west4"),
            ("VEO_MODEL_ID", "veo-3.0-fast-generate-001"),
            ("GCS_BUCKET", "gs://my-bucket/"),
            ("GOOGLE_ACCESS_TOKEN", "tok"),
        ])
        .build()
        .unwrap();
        match config.backend() {
            Backend::Vertex { project, location } => {
                assert_eq!(project, "my-project");
                assert_eq!(location, "europe-west4");
            }
            other => panic!("Expected Vertex backend, got {other:?}"),
        }
        assert_eq!(config.model(), "veo-3.0-fast-generate-001");
        assert_eq!(config.storage_bucket(), Some("my-bucket"));
        assert_eq!(
            config.storage_uri().as_deref(),
            Some("gs://my-bucket/videos/")
        );
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let err = builder_from(&[("GOOGLE_GENAI_USE_VERTEXAI", "False")])
            .build()
            .unwrap_err();
        assert!(matches!(err, VeoGenError::Auth(_)), "got {err:?}");

        let config = builder_from(&[
            ("GOOGLE_GENAI_USE_VERTEXAI", "false"),
            ("GOOGLE_API_KEY", "AIza-test"),
        ])
        .build()
        .unwrap();
        assert_eq!(config.backend(), &Backend::Gemini);
        assert_eq!(
            config.credentials(),
            &CredentialSource::ApiKey("AIza-test".into())
        );
    }

    #[test]
    fn test_invalid_vertex_flag_is_config_error() {
        let err = builder_from(&[("GOOGLE_GENAI_USE_VERTEXAI", "maybe")])
            .build()
            .unwrap_err();
        assert!(matches!(err, VeoGenError::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_missing_key_file_falls_back_to_application_default() {
        let config = builder_from(&[(
            "GOOGLE_APPLICATION_CREDENTIALS",
            "/nonexistent/service-account.json",
        )])
        .build()
        .unwrap();
        assert_eq!(config.credentials(), &CredentialSource::ApplicationDefault);
    }

    #[test]
    fn test_authorized_user_key_file_is_recognized() {
        let mut key = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut key,
            br#"{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": "r"}"#,
        )
        .unwrap();
        let path = key.path().to_string_lossy().to_string();
        let config = builder_from(&[("GOOGLE_APPLICATION_CREDENTIALS", path.as_str())])
            .build()
            .unwrap();
        assert_eq!(
            config.credentials(),
            &CredentialSource::AuthorizedUserFile(key.path().to_path_buf())
        );
    }

    #[test]
    fn test_well_known_adc_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let adc = dir.path().join(ADC_FILE_NAME);
        std::fs::write(&adc, r#"{"type": "authorized_user"}"#).unwrap();
        let config_dir = dir.path().to_string_lossy().to_string();
        let config = builder_from(&[("CLOUDSDK_CONFIG", config_dir.as_str())])
            .build()
            .unwrap();
        assert_eq!(
            config.credentials(),
            &CredentialSource::AuthorizedUserFile(adc)
        );
    }

    #[test]
    fn test_well_known_adc_path_follows_home() {
        let get = |name: &str| (name == "HOME").then(|| "/home/dev".to_string());
        if !cfg!(windows) {
            assert_eq!(
                well_known_adc_file(&get),
                Some(PathBuf::from(
                    "/home/dev/.config/gcloud/application_default_credentials.json"
                ))
            );
        }
    }

    #[test]
    fn test_existing_key_file_is_used() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let path = key.path().to_string_lossy().to_string();
        let config = builder_from(&[("GOOGLE_APPLICATION_CREDENTIALS", path.as_str())])
            .build()
            .unwrap();
        assert_eq!(
            config.credentials(),
            &CredentialSource::ServiceAccountFile(key.path().to_path_buf())
        );
    }

    #[test]
    fn test_explicit_builder_values_win() {
        let config = VeoConfig::builder()
            .project("explicit")
            .location("asia-northeast1")
            .credentials(CredentialSource::GcloudCli)
            .build()
            .unwrap();
        assert_eq!(
            config.backend(),
            &Backend::Vertex {
                project: "explicit".into(),
                location: "asia-northeast1".into(),
            }
        );
    }

    #[test]
    fn test_bucket_with_path_rejected() {
        let err = VeoConfig::builder()
            .credentials(CredentialSource::GcloudCli)
            .storage_bucket("gs://bucket/nested/dir")
            .build()
            .unwrap_err();
        assert!(matches!(err, VeoGenError::Config(_)));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = builder_from(&[("GOOGLE_CLOUD_PROJECT", "  "), ("GOOGLE_ACCESS_TOKEN", "t")])
            .build()
            .unwrap();
        assert!(matches!(
            config.backend(),
            Backend::Vertex { project, .. } if project == DEFAULT_PROJECT
        ));
    }
}
