//! Resolution of the single credential used to talk to the provider.
//!
//! Exactly one source may be configured: a static token, a service-account
//! key file, or (when neither is set) the metadata service of the host the
//! driver runs on.

use std::fmt;
use std::time::Duration;

use camino::Utf8Path;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::files::{expand_tilde, read_to_string_ambient};
use crate::machine::ApiConfig;

/// Default metadata-service URL used to obtain an ambient token.
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token";

const PROBE_TIMEOUT: Duration = Duration::from_millis(50);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while resolving credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialError {
    /// Raised when both a token and a key file are configured.
    #[error("a token and a service account key file cannot both be set; choose one")]
    ConflictingCredentials,
    /// Raised when the key file cannot be read or parsed.
    #[error("invalid service account key file `{path}`: {message}")]
    InvalidCredentialFile {
        /// Expanded path of the key file.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when no source yields a credential.
    #[error(
        "no credentials provided: set YC_TOKEN or YC_SA_KEY_FILE, or run on an instance with a bound service account"
    )]
    NoCredentialsProvided,
    /// Raised when a token cannot be obtained from the IAM or metadata service.
    #[error("failed to obtain IAM token: {message}")]
    TokenExchange {
        /// Underlying error message.
        message: String,
    },
}

/// Parsed service-account authorised key.
#[derive(Clone, Deserialize, Eq, PartialEq)]
pub struct ServiceAccountKey {
    /// Key identifier, sent as the JWT `kid`.
    pub id: String,
    /// Service account the key belongs to.
    pub service_account_id: String,
    /// PEM encoded RSA private key.
    pub private_key: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("id", &self.id)
            .field("service_account_id", &self.service_account_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Authenticated credential. Exactly one variant is produced per backend.
#[derive(Clone, Eq, PartialEq)]
pub enum Credentials {
    /// IAM token usable as a bearer token directly.
    IamToken(String),
    /// OAuth token exchanged for an IAM token before use.
    OAuthToken(String),
    /// Service-account key exchanged for an IAM token through a signed JWT.
    ServiceAccountKey(ServiceAccountKey),
    /// IAM token issued by the metadata service of the current host.
    InstanceIdentity(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IamToken(_) => f.write_str("IamToken(<redacted>)"),
            Self::OAuthToken(_) => f.write_str("OAuthToken(<redacted>)"),
            Self::ServiceAccountKey(key) => f.debug_tuple("ServiceAccountKey").field(key).finish(),
            Self::InstanceIdentity(_) => f.write_str("InstanceIdentity(<redacted>)"),
        }
    }
}

impl Credentials {
    /// Classifies a static token: `t1.` prefixed values with exactly two `.`
    /// separators are IAM tokens, anything else is an OAuth token.
    #[must_use]
    pub fn from_token(raw: &str) -> Self {
        let token = raw.trim();
        if is_iam_token(token) {
            Self::IamToken(token.to_owned())
        } else {
            Self::OAuthToken(token.to_owned())
        }
    }
}

/// Reports whether a token has the shape of an IAM token.
#[must_use]
pub fn is_iam_token(token: &str) -> bool {
    token.starts_with("t1.") && token.matches('.').count() == 2
}

/// Reads and parses a service-account key file.
///
/// # Errors
///
/// Returns [`CredentialError::InvalidCredentialFile`] when the file is missing,
/// unreadable, or not a key document.
pub fn load_service_account_key(path: &Utf8Path) -> Result<ServiceAccountKey, CredentialError> {
    let expanded = expand_tilde(path);
    let invalid = |message: String| CredentialError::InvalidCredentialFile {
        path: expanded.to_string(),
        message,
    };
    let content = read_to_string_ambient(&expanded).map_err(invalid)?;
    let key: ServiceAccountKey =
        serde_json::from_str(&content).map_err(|err| invalid(err.to_string()))?;
    if key.id.trim().is_empty() || key.service_account_id.trim().is_empty() {
        return Err(invalid(String::from(
            "key id and service_account_id must not be empty",
        )));
    }
    if !key.private_key.contains("-----BEGIN") {
        return Err(invalid(String::from("private_key is not a PEM document")));
    }
    Ok(key)
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Resolves [`Credentials`] from the configured sources.
#[derive(Clone, Debug)]
pub struct CredentialResolver {
    metadata_token_url: String,
    probe_timeout: Duration,
    client: reqwest::Client,
}

impl CredentialResolver {
    /// Creates a resolver that falls back to the given metadata token URL.
    #[must_use]
    pub fn new(metadata_token_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            metadata_token_url: metadata_token_url.into(),
            probe_timeout: PROBE_TIMEOUT,
            client,
        }
    }

    /// Resolves the single credential described by `api`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when sources conflict, the key file is
    /// invalid, the metadata service fails after a successful probe, or no
    /// source is available.
    pub async fn resolve(&self, api: &ApiConfig) -> Result<Credentials, CredentialError> {
        let static_token = api
            .token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let key_file = api
            .service_account_key_file
            .as_deref()
            .filter(|candidate| !candidate.as_str().trim().is_empty());

        match (static_token, key_file) {
            (Some(_), Some(_)) => Err(CredentialError::ConflictingCredentials),
            (None, Some(path)) => {
                load_service_account_key(path).map(Credentials::ServiceAccountKey)
            }
            (Some(token), None) => Ok(Credentials::from_token(token)),
            (None, None) => self.ambient_identity().await,
        }
    }

    async fn ambient_identity(&self) -> Result<Credentials, CredentialError> {
        if !self.metadata_reachable().await {
            tracing::debug!(url = %self.metadata_token_url, "metadata service unreachable");
            return Err(CredentialError::NoCredentialsProvided);
        }

        tracing::info!("fetching IAM token from the metadata service");
        let exchange = |err: reqwest::Error| CredentialError::TokenExchange {
            message: err.to_string(),
        };
        let response = self
            .client
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(exchange)?;
        let token: MetadataToken = response.json().await.map_err(exchange)?;
        if token.access_token.trim().is_empty() {
            return Err(CredentialError::TokenExchange {
                message: String::from("metadata service returned an empty access_token"),
            });
        }
        Ok(Credentials::InstanceIdentity(token.access_token))
    }

    async fn metadata_reachable(&self) -> bool {
        let Some(authority) = probe_authority(&self.metadata_token_url) else {
            return false;
        };
        matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect(authority.as_str())).await,
            Ok(Ok(_))
        )
    }
}

fn probe_authority(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UNREACHABLE_URL: &str = "http://127.0.0.1:9/token";

    fn fixture_key_path() -> Utf8PathBuf {
        Utf8PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/service_account_key.json"
        ))
    }

    fn api(token: Option<&str>, key_file: Option<Utf8PathBuf>, url: &str) -> ApiConfig {
        ApiConfig {
            endpoint: None,
            token: token.map(str::to_owned),
            service_account_key_file: key_file,
            metadata_token_url: url.to_owned(),
        }
    }

    #[rstest]
    #[case::iam("t1.abc.def", true)]
    #[case::extra_dot("t1.abc.def.ghi", false)]
    #[case::single_dot("t1.abc", false)]
    #[case::oauth("y0_AgAAAA", false)]
    #[case::wrong_prefix("t2.abc.def", false)]
    fn iam_token_shape(#[case] token: &str, #[case] expected: bool) {
        assert_eq!(is_iam_token(token), expected);
    }

    #[tokio::test]
    async fn conflicting_sources_fail_regardless_of_values() {
        let resolver = CredentialResolver::new(UNREACHABLE_URL);
        let config = api(
            Some("t1.abc.def"),
            Some(Utf8PathBuf::from("/does/not/exist.json")),
            UNREACHABLE_URL,
        );

        let result = resolver.resolve(&config).await;

        assert_eq!(result, Err(CredentialError::ConflictingCredentials));
    }

    #[tokio::test]
    async fn static_tokens_are_classified() {
        let resolver = CredentialResolver::new(UNREACHABLE_URL);

        let iam = resolver
            .resolve(&api(Some("t1.abc.def"), None, UNREACHABLE_URL))
            .await;
        let oauth = resolver
            .resolve(&api(Some("y0_oauth"), None, UNREACHABLE_URL))
            .await;

        assert_eq!(iam, Ok(Credentials::IamToken(String::from("t1.abc.def"))));
        assert_eq!(oauth, Ok(Credentials::OAuthToken(String::from("y0_oauth"))));
    }

    #[tokio::test]
    async fn key_file_is_parsed() {
        let resolver = CredentialResolver::new(UNREACHABLE_URL);

        let credentials = resolver
            .resolve(&api(None, Some(fixture_key_path()), UNREACHABLE_URL))
            .await
            .unwrap_or_else(|err| panic!("key file should resolve: {err}"));

        let Credentials::ServiceAccountKey(key) = credentials else {
            panic!("expected a service account key");
        };
        assert_eq!(key.id, "ajeq0fake0key0id00001");
        assert_eq!(key.service_account_id, "ajefake0service0acc01");
    }

    #[tokio::test]
    async fn malformed_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("temp dir: {err}"));
        let path = Utf8PathBuf::from_path_buf(dir.path().join("key.json"))
            .unwrap_or_else(|_| panic!("temp path should be UTF-8"));
        std::fs::write(&path, "{not json").unwrap_or_else(|err| panic!("write key: {err}"));
        let resolver = CredentialResolver::new(UNREACHABLE_URL);

        let result = resolver
            .resolve(&api(None, Some(path), UNREACHABLE_URL))
            .await;

        assert!(matches!(
            result,
            Err(CredentialError::InvalidCredentialFile { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_metadata_service_means_no_credentials() {
        let resolver = CredentialResolver::new(UNREACHABLE_URL);

        let result = resolver.resolve(&api(None, None, UNREACHABLE_URL)).await;

        assert_eq!(result, Err(CredentialError::NoCredentialsProvided));
    }

    #[tokio::test]
    async fn metadata_token_becomes_instance_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t1.ambient.token",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("{}/token", server.uri());
        let mut resolver = CredentialResolver::new(url.clone());
        resolver.probe_timeout = Duration::from_secs(1);

        let result = resolver.resolve(&api(None, None, &url)).await;

        assert_eq!(
            result,
            Ok(Credentials::InstanceIdentity(String::from("t1.ambient.token")))
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", Credentials::from_token("y0_secret"));
        assert!(!rendered.contains("y0_secret"));
    }
}
