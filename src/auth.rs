//! Credential resolution for Google APIs.
//!
//! Token acquisition is delegated to existing tooling: a pre-issued access
//! token, a service-account or authorized-user key file and the GCE metadata
//! server (via `yup-oauth2`), or the `gcloud` CLI.

use crate::error::{Result, VeoGenError};
use std::path::PathBuf;

#[cfg(feature = "service-account")]
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Where credentials come from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A short-lived OAuth access token (`GOOGLE_ACCESS_TOKEN`).
    AccessToken(String),
    /// A service-account JSON key file.
    ServiceAccountFile(PathBuf),
    /// An `authorized_user` file, as written by
    /// `gcloud auth application-default login`.
    AuthorizedUserFile(PathBuf),
    /// The GCE metadata server, falling back to the `gcloud` CLI when no
    /// metadata server answers.
    ApplicationDefault,
    /// `gcloud auth print-access-token`.
    GcloudCli,
    /// A Gemini Developer API key (`GOOGLE_API_KEY`).
    ApiKey(String),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(***)"),
            Self::ServiceAccountFile(path) => {
                f.debug_tuple("ServiceAccountFile").field(path).finish()
            }
            Self::AuthorizedUserFile(path) => {
                f.debug_tuple("AuthorizedUserFile").field(path).finish()
            }
            Self::ApplicationDefault => f.write_str("ApplicationDefault"),
            Self::GcloudCli => f.write_str("GcloudCli"),
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

impl CredentialSource {
    /// Short human-readable description, safe to log.
    pub fn describe(&self) -> String {
        match self {
            Self::AccessToken(_) => "GOOGLE_ACCESS_TOKEN".to_string(),
            Self::ServiceAccountFile(path) => format!("service account {}", path.display()),
            Self::AuthorizedUserFile(path) => format!("authorized user {}", path.display()),
            Self::ApplicationDefault => "metadata server or gcloud CLI".to_string(),
            Self::GcloudCli => "gcloud CLI".to_string(),
            Self::ApiKey(_) => "GOOGLE_API_KEY".to_string(),
        }
    }
}

/// How a single HTTP request is authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// `x-goog-api-key: <key>`.
    ApiKey(String),
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

impl AuthHeader {
    /// Attaches this credential to an outgoing request.
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Bearer(token) => builder.bearer_auth(token),
            Self::ApiKey(key) => builder.header("x-goog-api-key", key),
        }
    }
}

/// Resolves a [`CredentialSource`] into request headers.
pub struct Credentials {
    source: CredentialSource,
    #[cfg(feature = "service-account")]
    authenticator: tokio::sync::OnceCell<yup_oauth2::authenticator::DefaultAuthenticator>,
    /// `None` once the metadata server is known to be unreachable.
    #[cfg(feature = "service-account")]
    metadata: tokio::sync::OnceCell<Option<yup_oauth2::authenticator::DefaultAuthenticator>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("source", &self.source)
            .finish()
    }
}

impl Credentials {
    /// Wraps a credential source.
    pub fn new(source: CredentialSource) -> Self {
        Self {
            source,
            #[cfg(feature = "service-account")]
            authenticator: tokio::sync::OnceCell::new(),
            #[cfg(feature = "service-account")]
            metadata: tokio::sync::OnceCell::new(),
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Produces the header for the next request.
    ///
    /// Called once per request since tokens expire. The `yup-oauth2`
    /// authenticators cache and refresh tokens internally.
    pub async fn authorize(&self) -> Result<AuthHeader> {
        match &self.source {
            CredentialSource::AccessToken(token) => Ok(AuthHeader::Bearer(token.clone())),
            CredentialSource::ApiKey(key) => Ok(AuthHeader::ApiKey(key.clone())),
            CredentialSource::GcloudCli => gcloud_access_token().await.map(AuthHeader::Bearer),
            CredentialSource::ServiceAccountFile(path) => {
                self.service_account_token(path).await.map(AuthHeader::Bearer)
            }
            CredentialSource::AuthorizedUserFile(path) => {
                self.authorized_user_token(path).await.map(AuthHeader::Bearer)
            }
            CredentialSource::ApplicationDefault => {
                self.application_default_token().await.map(AuthHeader::Bearer)
            }
        }
    }

    #[cfg(feature = "service-account")]
    async fn service_account_token(&self, path: &std::path::Path) -> Result<String> {
        let authenticator = self
            .authenticator
            .get_or_try_init(|| async move {
                let key = yup_oauth2::read_service_account_key(path).await.map_err(|e| {
                    VeoGenError::Auth(format!(
                        "failed to read service account key {}: {e}",
                        path.display()
                    ))
                })?;
                yup_oauth2::ServiceAccountAuthenticator::builder(key)
                    .build()
                    .await
                    .map_err(|e| {
                        VeoGenError::Auth(format!("failed to build service account auth: {e}"))
                    })
            })
            .await?;
        bearer_token(authenticator, "service account").await
    }

    #[cfg(feature = "service-account")]
    async fn authorized_user_token(&self, path: &std::path::Path) -> Result<String> {
        let authenticator = self
            .authenticator
            .get_or_try_init(|| async move {
                let secret = yup_oauth2::read_authorized_user_secret(path).await.map_err(|e| {
                    VeoGenError::Auth(format!(
                        "failed to read authorized user credentials {}: {e}. \
                         Run `gcloud auth application-default login`",
                        path.display()
                    ))
                })?;
                yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
                    .build()
                    .await
                    .map_err(|e| {
                        VeoGenError::Auth(format!("failed to build authorized user auth: {e}"))
                    })
            })
            .await?;
        bearer_token(authenticator, "authorized user").await
    }

    #[cfg(feature = "service-account")]
    async fn application_default_token(&self) -> Result<String> {
        use yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes;

        let metadata = self
            .metadata
            .get_or_init(|| async {
                let opts = yup_oauth2::ApplicationDefaultCredentialsFlowOpts::default();
                let built = match yup_oauth2::ApplicationDefaultCredentialsAuthenticator::builder(opts)
                    .await
                {
                    ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => {
                        builder.build().await
                    }
                    ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => {
                        builder.build().await
                    }
                };
                let authenticator = match built {
                    Ok(authenticator) => authenticator,
                    Err(e) => {
                        tracing::debug!("Application default credentials unavailable: {e}");
                        return None;
                    }
                };
                match authenticator.token(&[CLOUD_PLATFORM_SCOPE]).await {
                    Ok(_) => {
                        tracing::debug!("Using the metadata server for credentials");
                        Some(authenticator)
                    }
                    Err(e) => {
                        tracing::debug!("Metadata server unavailable, using gcloud CLI: {e}");
                        None
                    }
                }
            })
            .await;

        match metadata {
            Some(authenticator) => bearer_token(authenticator, "metadata server").await,
            None => gcloud_access_token().await,
        }
    }

    #[cfg(not(feature = "service-account"))]
    async fn service_account_token(&self, path: &std::path::Path) -> Result<String> {
        Err(VeoGenError::Auth(format!(
            "service account key {} given, but veogen was built without the \
             `service-account` feature",
            path.display()
        )))
    }

    #[cfg(not(feature = "service-account"))]
    async fn authorized_user_token(&self, path: &std::path::Path) -> Result<String> {
        Err(VeoGenError::Auth(format!(
            "authorized user credentials {} given, but veogen was built without the \
             `service-account` feature",
            path.display()
        )))
    }

    #[cfg(not(feature = "service-account"))]
    async fn application_default_token(&self) -> Result<String> {
        gcloud_access_token().await
    }
}

#[cfg(feature = "service-account")]
async fn bearer_token(
    authenticator: &yup_oauth2::authenticator::DefaultAuthenticator,
    what: &str,
) -> Result<String> {
    let token = authenticator
        .token(&[CLOUD_PLATFORM_SCOPE])
        .await
        .map_err(|e| VeoGenError::Auth(format!("{what} token request failed: {e}")))?;

    token
        .token()
        .map(str::to_string)
        .ok_or_else(|| VeoGenError::Auth(format!("{what} returned no access token")))
}

/// Which kind of Google credential file `path` holds, from its `"type"` field.
///
/// Files that cannot be read or parsed are treated as service-account keys,
/// so the key loader reports the problem.
pub fn credential_file_source(path: &std::path::Path) -> CredentialSource {
    #[derive(serde::Deserialize)]
    struct CredentialFile {
        #[serde(rename = "type")]
        kind: Option<String>,
    }

    let kind = std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<CredentialFile>(&bytes).ok())
        .and_then(|file| file.kind);
    match kind.as_deref() {
        Some("authorized_user") => CredentialSource::AuthorizedUserFile(path.to_path_buf()),
        _ => CredentialSource::ServiceAccountFile(path.to_path_buf()),
    }
}

/// Get a bearer token by running `gcloud auth print-access-token`.
async fn gcloud_access_token() -> Result<String> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| {
            VeoGenError::Auth(format!(
                "failed to run gcloud CLI: {e}. Install it from \
                 https://cloud.google.com/sdk/docs/install, or set GOOGLE_ACCESS_TOKEN \
                 or GOOGLE_APPLICATION_CREDENTIALS"
            ))
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VeoGenError::Auth(format!(
            "gcloud auth failed: {}. Run `gcloud auth login`",
            stderr.trim()
        )));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(VeoGenError::Auth("gcloud returned an empty access token".into()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_access_token_becomes_bearer() {
        let creds = Credentials::new(CredentialSource::AccessToken("ya29.token".into()));
        assert_eq!(
            creds.authorize().await.unwrap(),
            AuthHeader::Bearer("ya29.token".into())
        );
    }

    #[tokio::test]
    async fn test_api_key_becomes_key_header() {
        let creds = Credentials::new(CredentialSource::ApiKey("AIza-test".into()));
        assert_eq!(
            creds.authorize().await.unwrap(),
            AuthHeader::ApiKey("AIza-test".into())
        );
    }

    #[tokio::test]
    async fn test_missing_service_account_file_is_auth_error() {
        let creds = Credentials::new(CredentialSource::ServiceAccountFile(
            "/nonexistent/veo-sa.json".into(),
        ));
        let err = creds.authorize().await.unwrap_err();
        assert!(matches!(err, VeoGenError::Auth(_)), "got {err:?}");
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let rendered = format!(
            "{:?} {:?}",
            CredentialSource::AccessToken("secret-token".into()),
            AuthHeader::ApiKey("secret-key".into())
        );
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_credential_file_kind_is_read_from_type_field() {
        let mut user = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut user,
            br#"{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": "r"}"#,
        )
        .unwrap();
        assert_eq!(
            credential_file_source(user.path()),
            CredentialSource::AuthorizedUserFile(user.path().to_path_buf())
        );

        let mut sa = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut sa, br#"{"type": "service_account"}"#).unwrap();
        assert_eq!(
            credential_file_source(sa.path()),
            CredentialSource::ServiceAccountFile(sa.path().to_path_buf())
        );

        let garbage = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            credential_file_source(garbage.path()),
            CredentialSource::ServiceAccountFile(garbage.path().to_path_buf())
        );
    }

    #[tokio::test]
    async fn test_missing_authorized_user_file_is_auth_error() {
        let creds = Credentials::new(CredentialSource::AuthorizedUserFile(
            "/nonexistent/application_default_credentials.json".into(),
        ));
        let err = creds.authorize().await.unwrap_err();
        assert!(matches!(err, VeoGenError::Auth(_)), "got {err:?}");
        assert!(err.to_string().contains("application-default login"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(CredentialSource::GcloudCli.describe(), "gcloud CLI");
        assert_eq!(
            CredentialSource::ServiceAccountFile("sa.json".into()).describe(),
            "service account sa.json"
        );
        assert_eq!(
            CredentialSource::AuthorizedUserFile("adc.json".into()).describe(),
            "authorized user adc.json"
        );
        assert_eq!(
            CredentialSource::ApplicationDefault.describe(),
            "metadata server or gcloud CLI"
        );
    }
}
