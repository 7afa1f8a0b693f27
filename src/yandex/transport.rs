//! HTTP transport with a per-call retry policy.
//!
//! Each attempt carries a fresh `X-Request-Id`; retries additionally carry
//! `X-Retry-Attempt`. All attempts of one backend share an
//! `X-Client-Trace-Id`.

use std::sync::LazyLock;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::future::retry_notify;
use reqwest::header::USER_AGENT as USER_AGENT_HEADER;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::YandexApiError;
use super::wire::ErrorBody;

/// User agent sent with every request.
pub const USER_AGENT: &str = "yandex-machine";

/// Header carrying the per-attempt request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Header carrying the per-backend trace id.
pub const CLIENT_TRACE_ID_HEADER: &str = "X-Client-Trace-Id";

/// Header carrying the retry attempt number on retried requests.
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

const SERVICE_UNAVAILABLE: u16 = 503;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Outcome of one failed attempt, before retry classification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttemptFailure {
    /// The connection could not be established.
    Connect(String),
    /// The request failed after connecting (timeout, reset, body read).
    Transport(String),
    /// The server answered with a non-success status.
    Status {
        /// HTTP status.
        status: u16,
        /// Raw response body.
        body: String,
    },
}

/// Returns `true` for the transient-unavailability signals: HTTP 503 or a
/// failed connection.
#[must_use]
pub const fn is_transient(failure: &AttemptFailure) -> bool {
    match failure {
        AttemptFailure::Connect(_) => true,
        AttemptFailure::Status { status, .. } => *status == SERVICE_UNAVAILABLE,
        AttemptFailure::Transport(_) => false,
    }
}

/// Retry policy applied to every remote call.
///
/// Delays grow exponentially from `initial_interval`, doubling per retry, and
/// never exceed `max_interval`. Attempts are bounded by `max_retries` rather
/// than by elapsed time.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Classifies a failure as retryable.
    pub is_retryable: fn(&AttemptFailure) -> bool,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound for any single delay.
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            is_retryable: is_transient,
            initial_interval: BACKOFF_BASE,
            max_interval: BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never retries.
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Replaces the delay bounds.
    #[must_use]
    pub const fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }

    /// Builds the delay schedule for one call.
    #[must_use]
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    fn should_retry(&self, retry: u32, failure: &AttemptFailure) -> bool {
        retry < self.max_retries && (self.is_retryable)(failure)
    }

    fn classify(&self, retry: u32, failure: AttemptFailure) -> backoff::Error<AttemptFailure> {
        if self.should_retry(retry, &failure) {
            backoff::Error::transient(failure)
        } else {
            backoff::Error::permanent(failure)
        }
    }
}

/// HTTP transport shared by all calls of one backend.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    client: reqwest::Client,
    policy: RetryPolicy,
    client_trace_id: String,
}

impl Transport {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            policy,
            client_trace_id: Uuid::new_v4().to_string(),
        }
    }

    pub(crate) const fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Sends a request, retrying per policy, and decodes a JSON response.
    ///
    /// `configure` is applied to a fresh builder on every attempt.
    pub(crate) async fn send<T, F>(
        &self,
        method: &Method,
        url: &str,
        bearer: Option<&str>,
        configure: F,
    ) -> Result<T, YandexApiError>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let policy = self.policy;
        let mut attempts: u32 = 0;
        let outcome = retry_notify(
            policy.schedule(),
            || {
                let retry = attempts;
                attempts += 1;
                let request = configure(self.prepare(method, url, bearer, retry));
                async move {
                    Self::attempt(request)
                        .await
                        .map_err(|failure| policy.classify(retry, failure))
                }
            },
            |failure: AttemptFailure, delay: Duration| {
                tracing::debug!(%url, ?failure, ?delay, "retrying transient failure");
            },
        )
        .await;

        let body = outcome.map_err(|failure| into_error(url, failure, attempts))?;
        serde_json::from_slice(&body).map_err(|err| YandexApiError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })
    }

    fn prepare(
        &self,
        method: &Method,
        url: &str,
        bearer: Option<&str>,
        retry: u32,
    ) -> RequestBuilder {
        let request_id = Uuid::new_v4().to_string();
        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .header(CLIENT_TRACE_ID_HEADER, self.client_trace_id.as_str());
        if retry > 0 {
            builder = builder.header(RETRY_ATTEMPT_HEADER, retry.to_string());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        tracing::debug!(%method, %url, retry, %request_id, "sending request");
        builder
    }

    async fn attempt(builder: RequestBuilder) -> Result<Vec<u8>, AttemptFailure> {
        let response = builder.send().await.map_err(|err| {
            if err.is_connect() {
                AttemptFailure::Connect(err.to_string())
            } else {
                AttemptFailure::Transport(err.to_string())
            }
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| AttemptFailure::Transport(err.to_string()))?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(AttemptFailure::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

fn into_error(url: &str, failure: AttemptFailure, attempts: u32) -> YandexApiError {
    match failure {
        AttemptFailure::Connect(message) | AttemptFailure::Transport(message) => {
            YandexApiError::Transport {
                url: url.to_owned(),
                message,
                attempts,
            }
        }
        AttemptFailure::Status { status, body } => {
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = if parsed.message.is_empty() {
                body
            } else {
                parsed.message
            };
            YandexApiError::Api {
                url: url.to_owned(),
                status,
                code: parsed.code,
                message,
                attempts,
            }
        }
    }
}
