//! HVS client.
//!
//! This module holds the connection configuration and dispatches
//! authenticated JSON requests to the HVS.

use std::fmt;

use bytes::Bytes;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Method, StatusCode,
};
use tracing::{debug, error, warn};
use url::Url;

use crate::{
    error::{ClientError, ProtocolError},
    host_key::HostKey,
    transport::{self, Transport},
    trust::TrustConfiguration,
};

/// Parameters used to connect and authenticate with the HVS.
#[derive(Clone, derive_builder::Builder)]
#[builder(build_fn(error = "ClientError"))]
pub struct ConnectionConfig {
    /// URL base of the HVS, e.g. `https://hvs.server/v1`.
    #[builder(setter(into))]
    base_url: String,
    /// Username used to authenticate with the HVS.
    #[builder(setter(into))]
    username: String,
    /// Password for `username`.
    #[builder(setter(into))]
    password: String,
    /// How the HVS server certificate is trusted.
    #[builder(default)]
    trust: TrustConfiguration,
}

impl ConnectionConfig {
    /// Creates a new builder for `ConnectionConfig`.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the configured username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the trust configuration.
    pub fn trust(&self) -> &TrustConfiguration {
        &self.trust
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("trust", &self.trust)
            .finish()
    }
}

/// Client that dispatches authenticated requests to the HVS.
///
/// Cloning is cheap and clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct AttestationClient {
    config: ConnectionConfig,
    base_url: Url,
    transport: Transport,
}

impl AttestationClient {
    /// Creates a new client, building its transport from the configured
    /// trust.
    pub fn new(config: ConnectionConfig) -> Result<Self, ClientError> {
        let base_url = parse_base_url(&config.base_url)?;
        let transport = transport::build(&config.trust)?;

        Ok(Self {
            config,
            base_url,
            transport,
        })
    }

    /// Creates a new client using a prebuilt transport.
    ///
    /// The configured trust is not applied to `transport`; the caller is
    /// responsible for its TLS settings.
    pub fn with_transport(config: ConnectionConfig, transport: Transport) -> Result<Self, ClientError> {
        let base_url = parse_base_url(&config.base_url)?;

        Ok(Self {
            config,
            base_url,
            transport,
        })
    }

    /// Returns the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns a sub client that certifies host keys.
    pub fn host_key(&self) -> HostKey<'_> {
        HostKey::new(self)
    }

    /// Returns the full URL of `path` relative to the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        join_url(&self.base_url, path)
    }

    /// Sends an authenticated JSON request and returns the body of a 200
    /// response.
    ///
    /// Any other status is returned as [`ClientError::Application`] carrying
    /// the response body. The response is always fully consumed before
    /// returning.
    pub async fn send(&self, method: Method, path: &str, body: Vec<u8>) -> Result<Bytes, ClientError> {
        let url = self.endpoint(path)?;

        debug!("Sending {method} request to {url}");

        let response = self
            .transport
            .request(method, url.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .basic_auth(&self.config.username, Some(&self.config.password))
            .body(body)
            .send()
            .await
            .map_err(|err| {
                error!("Failed to dispatch request to {url}: {err}");
                ClientError::Network(err)
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = match response.text().await {
                Ok(message) => message,
                Err(err) => {
                    warn!("Failed to read error response body from {url}: {err}");
                    format!("<failed to read response body: {err}>")
                }
            };

            return Err(ProtocolError {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response.bytes().await.map_err(|err| {
            error!("Failed to read response body from {url}: {err}");
            ClientError::Network(err)
        })
    }
}

/// Joins `path` onto the path of `base` segment by segment, so that
/// separators are neither doubled nor lost.
pub fn join_url(base: &Url, path: &str) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::Configuration(format!("base URL cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));

    Ok(url)
}

fn parse_base_url(base_url: &str) -> Result<Url, ClientError> {
    let url = Url::parse(base_url)
        .map_err(|err| ClientError::Configuration(format!("invalid base URL {base_url:?}: {err}")))?;

    match url.scheme() {
        "https" | "http" if !url.cannot_be_a_base() => Ok(url),
        _ => Err(ClientError::Configuration(format!(
            "base URL must be an http(s) URL: {base_url}"
        ))),
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn config(base_url: &str) -> ConnectionConfig {
        ConnectionConfig::builder()
            .base_url(base_url)
            .username("admin")
            .password("secret")
            .build()
            .unwrap()
    }

    #[rstest]
    #[case::trailing_separator("https://h/v1/", "/rpc/x", "https://h/v1/rpc/x")]
    #[case::no_trailing_separator("https://h/v1", "/rpc/x", "https://h/v1/rpc/x")]
    #[case::relative_path("https://h/v1", "rpc/x", "https://h/v1/rpc/x")]
    #[case::doubled_separators("https://h/v1/", "//rpc//x/", "https://h/v1/rpc/x")]
    #[case::root("https://h", "/rpc/x", "https://h/rpc/x")]
    #[case::root_trailing("https://h/", "/rpc/x", "https://h/rpc/x")]
    #[case::with_port(
        "https://h:8443/hvs/v2",
        "/rpc/certify-host-binding-key",
        "https://h:8443/hvs/v2/rpc/certify-host-binding-key"
    )]
    fn test_join_url(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        let base = Url::parse(base).unwrap();

        assert_eq!(join_url(&base, path).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case::not_a_url("hvs.server/v1")]
    #[case::unsupported_scheme("ftp://hvs.server/v1")]
    #[case::cannot_be_a_base("mailto:admin@hvs.server")]
    fn test_invalid_base_url_is_configuration_error(#[case] base_url: &str) {
        assert!(matches!(
            AttestationClient::new(config(base_url)),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_field_is_configuration_error() {
        let result = ConnectionConfig::builder()
            .base_url("https://hvs.server/v1")
            .username("admin")
            .build();

        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", config("https://hvs.server/v1"));

        assert!(debug.contains("admin"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn test_endpoint_joins_base_url() {
        let client = AttestationClient::new(config("https://hvs.server:8443/hvs/v2/")).unwrap();

        assert_eq!(
            client.endpoint("/rpc/certify-host-signing-key").unwrap().as_str(),
            "https://hvs.server:8443/hvs/v2/rpc/certify-host-signing-key"
        );
        assert_eq!(client.config().trust(), &TrustConfiguration::StandardCa);
    }
}
