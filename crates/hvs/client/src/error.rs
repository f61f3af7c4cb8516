//! HVS client errors.
//!
//! [`ClientError`] classifies a single request/response cycle. The
//! certification operations wrap it in a [`CertifyError`] which records
//! which key usage was being certified.

use derive_builder::UninitializedFieldError;

use crate::host_key::KeyUsage;

/// Application-level rejection reported by the HVS, i.e. any response with a
/// status other than 200.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hvs-client: failed (HTTP status code: {status}), message: {message}")]
pub struct ProtocolError {
    /// HTTP status code of the response.
    pub status: u16,
    /// Response body, verbatim.
    pub message: String,
}

/// Error for a request dispatched by [`AttestationClient`](crate::AttestationClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration, e.g. a malformed base URL or a pinned
    /// digest whose length does not match its algorithm.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Transport failure before any HTTP status was obtained (DNS, connect,
    /// TLS, including a rejected certificate pin).
    #[error("failed to reach HVS")]
    Network(#[source] reqwest::Error),
    /// The service answered with a non-200 status.
    #[error(transparent)]
    Application(#[from] ProtocolError),
    /// The service answered 200 but the body did not match the expected
    /// schema.
    #[error("failed to decode HVS response")]
    Decode(#[source] serde_json::Error),
    /// Serializing the request payload failed. Evidence made of plain bytes
    /// and strings always serializes, so this is not expected in practice.
    #[error("failed to serialize request payload")]
    Serialization(#[source] serde_json::Error),
}

impl From<UninitializedFieldError> for ClientError {
    fn from(ufe: UninitializedFieldError) -> Self {
        ClientError::Configuration(ufe.to_string())
    }
}

/// Error returned by the host key certification operations.
#[derive(Debug, thiserror::Error)]
#[error("failed to certify host {usage} key with HVS")]
pub struct CertifyError {
    usage: KeyUsage,
    source: ClientError,
}

impl CertifyError {
    pub(crate) fn new(usage: KeyUsage, source: ClientError) -> Self {
        Self { usage, source }
    }

    /// Returns the usage of the key that was being certified.
    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    /// Returns the underlying error.
    pub fn kind(&self) -> &ClientError {
        &self.source
    }

    /// Consumes the error, returning the underlying error.
    pub fn into_inner(self) -> ClientError {
        self.source
    }

    /// Returns the rejection reported by the service, if the service
    /// rejected the request.
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match &self.source {
            ClientError::Application(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the service accepted the request but returned a body
    /// that could not be decoded.
    pub fn is_decode_error(&self) -> bool {
        matches!(self.source, ClientError::Decode(_))
    }

    /// Returns `true` if the request failed before any HTTP status was
    /// obtained.
    pub fn is_network_error(&self) -> bool {
        matches!(self.source, ClientError::Network(_))
    }
}
