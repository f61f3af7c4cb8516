//! Host Verification Service (HVS) client.
//!
//! This crate certifies TPM-resident host keys (binding and signing keys) by
//! submitting their attestation evidence to an HVS and decoding the DER
//! certificates it returns.
//!
//! Connections are secured either by standard certificate authority
//! validation or by pinning the digest of the server's leaf certificate, see
//! [`TrustConfiguration`].

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod host_key;
pub mod transport;
mod trust;

pub use client::{join_url, AttestationClient, ConnectionConfig, ConnectionConfigBuilder};
pub use error::{CertifyError, ClientError, ProtocolError};
pub use host_key::{
    BindingKeyCertificate, HostKey, KeyCertificate, KeyCertificationEvidence, KeyUsage,
    SigningKeyCertificate,
};
pub use trust::{DigestAlgorithm, Fingerprint, FingerprintVerifier, Rejection, TrustConfiguration};

pub use reqwest::Method;
