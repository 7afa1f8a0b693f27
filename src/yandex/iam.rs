//! IAM token acquisition for the configured credential.
//!
//! OAuth tokens and service-account keys are exchanged once per backend; the
//! resulting IAM token is cached for the lifetime of the backend only.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Method;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::transport::Transport;
use super::wire::{IamTokenRequest, IamTokenResponse};
use super::YandexApiError;
use crate::credentials::{CredentialError, Credentials, ServiceAccountKey};

const JWT_LIFETIME_SECS: i64 = 3600;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Signs the PS256 JWT presented to the IAM token exchange.
///
/// # Errors
///
/// Returns [`CredentialError::InvalidCredentialFile`] when the private key is
/// not a usable RSA PEM document.
pub fn sign_service_account_jwt(
    key: &ServiceAccountKey,
    audience: &str,
    issued_at: i64,
) -> Result<String, CredentialError> {
    let invalid = |message: String| CredentialError::InvalidCredentialFile {
        path: format!("key {}", key.id),
        message,
    };
    let pem = key
        .private_key
        .find("-----BEGIN")
        .and_then(|start| key.private_key.get(start..))
        .ok_or_else(|| invalid(String::from("private_key is not a PEM document")))?;
    let encoding_key =
        EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|err| invalid(err.to_string()))?;

    let mut header = Header::new(Algorithm::PS256);
    header.kid = Some(key.id.clone());
    let claims = Claims {
        iss: &key.service_account_id,
        aud: audience,
        iat: issued_at,
        exp: issued_at + JWT_LIFETIME_SECS,
    };
    jsonwebtoken::encode(&header, &claims, &encoding_key).map_err(|err| invalid(err.to_string()))
}

/// Produces the bearer token for API calls.
#[derive(Debug)]
pub(crate) struct IamTokenSource {
    credentials: Credentials,
    exchange_url: String,
    cached: OnceCell<String>,
}

impl IamTokenSource {
    pub(crate) fn new(credentials: Credentials, exchange_url: String) -> Self {
        Self {
            credentials,
            exchange_url,
            cached: OnceCell::new(),
        }
    }

    pub(crate) async fn token(&self, transport: &Transport) -> Result<String, YandexApiError> {
        match &self.credentials {
            Credentials::IamToken(token) | Credentials::InstanceIdentity(token) => {
                Ok(token.clone())
            }
            Credentials::OAuthToken(oauth) => self
                .cached
                .get_or_try_init(|| {
                    self.exchange(transport, IamTokenRequest::YandexPassportOauthToken(oauth))
                })
                .await
                .cloned(),
            Credentials::ServiceAccountKey(key) => self
                .cached
                .get_or_try_init(|| async {
                    let now = chrono::Utc::now().timestamp();
                    let jwt = sign_service_account_jwt(key, &self.exchange_url, now)?;
                    self.exchange(transport, IamTokenRequest::Jwt(&jwt)).await
                })
                .await
                .cloned(),
        }
    }

    async fn exchange(
        &self,
        transport: &Transport,
        request: IamTokenRequest<'_>,
    ) -> Result<String, YandexApiError> {
        tracing::info!("exchanging credential for an IAM token");
        let response: IamTokenResponse = transport
            .send(&Method::POST, &self.exchange_url, None, |builder| {
                builder.json(&request)
            })
            .await
            .map_err(|err| {
                YandexApiError::Credentials(CredentialError::TokenExchange {
                    message: err.to_string(),
                })
            })?;
        Ok(response.iam_token)
    }
}
