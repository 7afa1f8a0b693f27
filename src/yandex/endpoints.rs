//! Base URLs of the provider services the driver calls.

use super::YandexApiError;

/// API gateway host of the public cloud.
pub const DEFAULT_API_HOST: &str = "api.cloud.yandex.net";

/// Service base URLs, without trailing slashes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoints {
    /// Compute service (`.../compute/v1`).
    pub compute: String,
    /// Operation service (`.../operations`).
    pub operation: String,
    /// Resource manager service (`.../resource-manager/v1`).
    pub resource_manager: String,
    /// VPC service (`.../vpc/v1`).
    pub vpc: String,
    /// IAM token exchange URL, also the JWT audience.
    pub iam_tokens: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::production()
    }
}

impl Endpoints {
    /// Returns the public production endpoints.
    #[must_use]
    pub fn production() -> Self {
        Self::with_api_host(DEFAULT_API_HOST)
    }

    /// Maps every service onto its own subdomain of an API gateway host, for
    /// example `compute.api.cloud.yandex.net` for `api.cloud.yandex.net`.
    #[must_use]
    pub fn with_api_host(host: &str) -> Self {
        Self {
            compute: format!("https://compute.{host}/compute/v1"),
            operation: format!("https://operation.{host}/operations"),
            resource_manager: format!("https://resource-manager.{host}/resource-manager/v1"),
            vpc: format!("https://vpc.{host}/vpc/v1"),
            iam_tokens: format!("https://iam.{host}/iam/v1/tokens"),
        }
    }

    /// Maps every service onto a single gateway `base`.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let root = base.trim().trim_end_matches('/');
        Self {
            compute: format!("{root}/compute/v1"),
            operation: format!("{root}/operations"),
            resource_manager: format!("{root}/resource-manager/v1"),
            vpc: format!("{root}/vpc/v1"),
            iam_tokens: format!("{root}/iam/v1/tokens"),
        }
    }

    /// Resolves the configured override.
    ///
    /// A blank or missing value selects the production endpoints. A URL with
    /// a scheme is a single gateway serving every service. A bare
    /// `api.<domain>[:port]` names an API gateway host (the form the gRPC
    /// tooling uses) and maps onto the per-service HTTPS subdomains; the port
    /// is dropped since the REST services listen on 443. Any other bare host
    /// is a single HTTPS gateway.
    ///
    /// # Errors
    ///
    /// Returns [`YandexApiError::InvalidEndpoint`] when the value is not a
    /// valid URL.
    pub fn from_override(endpoint: Option<&str>) -> Result<Self, YandexApiError> {
        let Some(raw) = endpoint.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(Self::production());
        };
        let has_scheme = raw.contains("://");
        let candidate = if has_scheme {
            raw.to_owned()
        } else {
            format!("https://{raw}")
        };
        let url = reqwest::Url::parse(&candidate).map_err(|err| YandexApiError::InvalidEndpoint {
            endpoint: raw.to_owned(),
            message: err.to_string(),
        })?;
        match url.host_str() {
            Some(host) if !has_scheme && host.starts_with("api.") && url.path() == "/" => {
                Ok(Self::with_api_host(host))
            }
            _ => Ok(Self::with_base(&candidate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::missing(None)]
    #[case::blank(Some("  "))]
    fn blank_override_selects_production(#[case] endpoint: Option<&str>) {
        assert_eq!(Endpoints::from_override(endpoint), Ok(Endpoints::production()));
    }

    #[rstest]
    #[case::grpc_form("api.cloud.yandex.net:443")]
    #[case::bare_host("api.cloud.yandex.net")]
    fn gateway_host_maps_onto_production(#[case] endpoint: &str) {
        assert_eq!(
            Endpoints::from_override(Some(endpoint)),
            Ok(Endpoints::production())
        );
    }

    #[test]
    fn production_uses_service_subdomains() {
        let endpoints = Endpoints::production();

        assert_eq!(
            endpoints.compute,
            "https://compute.api.cloud.yandex.net/compute/v1"
        );
        assert_eq!(
            endpoints.iam_tokens,
            "https://iam.api.cloud.yandex.net/iam/v1/tokens"
        );
    }

    #[test]
    fn other_gateway_hosts_keep_their_domain() {
        let endpoints = Endpoints::from_override(Some("api.yandexcloud.kz:443"))
            .unwrap_or_else(|err| panic!("endpoint should parse: {err}"));

        assert_eq!(endpoints.vpc, "https://vpc.api.yandexcloud.kz/vpc/v1");
    }

    #[test]
    fn plain_host_without_scheme_is_an_https_gateway() {
        let endpoints = Endpoints::from_override(Some("gateway.example.test:8443/"))
            .unwrap_or_else(|err| panic!("endpoint should parse: {err}"));

        assert_eq!(endpoints.compute, "https://gateway.example.test:8443/compute/v1");
        assert_eq!(
            endpoints.iam_tokens,
            "https://gateway.example.test:8443/iam/v1/tokens"
        );
    }

    #[test]
    fn override_with_scheme_is_a_single_gateway() {
        let endpoints = Endpoints::from_override(Some("http://127.0.0.1:8080"))
            .unwrap_or_else(|err| panic!("endpoint should parse: {err}"));

        assert_eq!(endpoints.operation, "http://127.0.0.1:8080/operations");
    }

    #[test]
    fn malformed_override_is_rejected() {
        assert!(matches!(
            Endpoints::from_override(Some("http://[::1")),
            Err(YandexApiError::InvalidEndpoint { .. })
        ));
    }
}
