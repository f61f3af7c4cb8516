//! HTTP transport construction.
//!
//! The transport is built once per client from its [`TrustConfiguration`]
//! and reused across requests so that connections are pooled.

use std::sync::Arc;

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tracing::debug;

use crate::{
    error::ClientError,
    trust::{FingerprintVerifier, PinnedCertVerifier, TrustConfiguration},
};

/// HTTP transport used to reach the HVS.
pub type Transport = reqwest::Client;

/// Builds a transport for the given trust configuration.
///
/// With [`TrustConfiguration::Pinned`] the built-in chain validation is
/// skipped and the leaf certificate fingerprint becomes the only acceptance
/// criterion. Otherwise the server chain is validated against the Mozilla
/// root store.
pub fn build(trust: &TrustConfiguration) -> Result<Transport, ClientError> {
    reqwest::Client::builder()
        .use_preconfigured_tls(tls_config(trust))
        .build()
        .map_err(|err| ClientError::Configuration(format!("failed to build HTTP transport: {err}")))
}

/// Returns the TLS client configuration for the given trust configuration.
pub fn tls_config(trust: &TrustConfiguration) -> ClientConfig {
    let builder = ClientConfig::builder().with_safe_defaults();

    let mut config = match FingerprintVerifier::from_trust(trust) {
        Some(verifier) => {
            debug!("Installing pinned certificate verifier");
            builder
                .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier::new(verifier)))
                .with_no_client_auth()
        }
        None => {
            debug!("Using standard certificate validation");
            builder
                .with_root_certificates(default_root_store())
                .with_no_client_auth()
        }
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    config
}

/// Default root store using mozilla certs.
fn default_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject.as_ref(),
            ta.subject_public_key_info.as_ref(),
            ta.name_constraints.as_ref().map(|nc| nc.as_ref()),
        )
    }));

    root_store
}
