//! Trust model for connections to the HVS.
//!
//! Either the TLS stack performs standard chain validation against the
//! Mozilla root store, or chain validation is replaced entirely by a pinned
//! digest of the server's leaf certificate.

use std::{fmt, str::FromStr, time::SystemTime};

use rustls::{
    client::{ServerCertVerified, ServerCertVerifier},
    Certificate, CertificateError, ServerName,
};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use tracing::warn;

use crate::error::ClientError;

/// Digest algorithm used to fingerprint the server certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DigestAlgorithm {
    /// SHA-256, 32 byte digests.
    Sha256,
    /// SHA-384, 48 byte digests.
    Sha384,
}

impl DigestAlgorithm {
    /// Returns the digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
        }
    }

    /// Computes the digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => write!(f, "SHA256"),
            DigestAlgorithm::Sha384 => write!(f, "SHA384"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA384" => Ok(DigestAlgorithm::Sha384),
            _ => Err(ClientError::Configuration(format!(
                "unsupported fingerprint algorithm: {s}"
            ))),
        }
    }
}

/// Pinned digest of the expected server leaf certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint {
    algorithm: DigestAlgorithm,
    digest: Vec<u8>,
}

impl Fingerprint {
    /// Creates a new fingerprint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the digest length does not match the
    /// output size of `algorithm`.
    pub fn new(algorithm: DigestAlgorithm, digest: impl Into<Vec<u8>>) -> Result<Self, ClientError> {
        let digest = digest.into();
        if digest.len() != algorithm.output_len() {
            return Err(ClientError::Configuration(format!(
                "{algorithm} fingerprint must be {} bytes, got {}",
                algorithm.output_len(),
                digest.len()
            )));
        }

        Ok(Self { algorithm, digest })
    }

    /// Parses a hex encoded fingerprint. Colons and whitespace between bytes
    /// are ignored, e.g. `AB:CD:...`.
    pub fn from_hex(algorithm: DigestAlgorithm, hex_digest: &str) -> Result<Self, ClientError> {
        let cleaned: String = hex_digest
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect();
        let digest = hex::decode(cleaned).map_err(|err| {
            ClientError::Configuration(format!("invalid hex in certificate fingerprint: {err}"))
        })?;

        Self::new(algorithm, digest)
    }

    /// Computes the fingerprint of a DER encoded certificate.
    pub fn of_certificate(algorithm: DigestAlgorithm, cert_der: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(cert_der),
        }
    }

    /// Returns the digest algorithm.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Returns the pinned digest.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("algorithm", &self.algorithm)
            .field("digest", &hex::encode(&self.digest))
            .finish()
    }
}

/// How the server certificate presented during the TLS handshake is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustConfiguration {
    /// Standard chain-of-trust validation against the Mozilla root store.
    #[default]
    StandardCa,
    /// Accept any chain whose leaf certificate matches the fingerprint.
    Pinned(Fingerprint),
}

impl TrustConfiguration {
    /// Pins the SHA-384 digest of the server leaf certificate.
    pub fn pinned_sha384(digest: [u8; 48]) -> Self {
        TrustConfiguration::Pinned(Fingerprint {
            algorithm: DigestAlgorithm::Sha384,
            digest: digest.to_vec(),
        })
    }

    /// Returns the pinned fingerprint, if any.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            TrustConfiguration::StandardCa => None,
            TrustConfiguration::Pinned(fingerprint) => Some(fingerprint),
        }
    }
}

/// Reason a certificate chain was rejected by [`FingerprintVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The peer presented no certificates.
    #[error("peer presented an empty certificate chain")]
    EmptyChain,
    /// The leaf certificate digest differs from the pinned digest.
    #[error("leaf certificate does not match the pinned fingerprint")]
    FingerprintMismatch,
}

/// Decides whether a peer certificate chain is accepted under a pinned
/// fingerprint.
///
/// Only the leaf (first) certificate is considered. Intermediates and the
/// chain structure are ignored.
#[derive(Debug, Clone)]
pub struct FingerprintVerifier {
    pin: Fingerprint,
}

impl FingerprintVerifier {
    /// Creates a new verifier for the given pin.
    pub fn new(pin: Fingerprint) -> Self {
        Self { pin }
    }

    /// Creates a verifier if `trust` pins a fingerprint.
    pub fn from_trust(trust: &TrustConfiguration) -> Option<Self> {
        trust.fingerprint().cloned().map(Self::new)
    }

    /// Verifies a chain of raw DER certificates, leaf first.
    pub fn verify<C: AsRef<[u8]>>(&self, chain: &[C]) -> Result<(), Rejection> {
        let leaf = chain.first().ok_or(Rejection::EmptyChain)?;
        let digest = self.pin.algorithm.digest(leaf.as_ref());

        if digest.as_slice() == self.pin.digest.as_slice() {
            Ok(())
        } else {
            Err(Rejection::FingerprintMismatch)
        }
    }
}

/// Adapter installing a [`FingerprintVerifier`] as the rustls server
/// certificate verifier.
///
/// Handshake signatures are still checked against the leaf certificate's key
/// by the default rustls implementation.
pub(crate) struct PinnedCertVerifier {
    verifier: FingerprintVerifier,
}

impl PinnedCertVerifier {
    pub(crate) fn new(verifier: FingerprintVerifier) -> Self {
        Self { verifier }
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let chain: Vec<&[u8]> = std::iter::once(end_entity)
            .chain(intermediates)
            .map(|cert| cert.0.as_slice())
            .collect();

        self.verifier
            .verify(chain.as_slice())
            .map(|_| ServerCertVerified::assertion())
            .map_err(|rejection| {
                warn!("Rejected certificate presented by {server_name:?}: {rejection}");
                rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
            })
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    const LEAF: &[u8] = b"leaf certificate bytes";
    const INTERMEDIATE: &[u8] = b"intermediate certificate bytes";

    #[rstest]
    #[case::sha256(DigestAlgorithm::Sha256, 32)]
    #[case::sha384(DigestAlgorithm::Sha384, 48)]
    fn test_fingerprint_length_must_match_algorithm(
        #[case] algorithm: DigestAlgorithm,
        #[case] len: usize,
    ) {
        assert!(Fingerprint::new(algorithm, vec![0u8; len]).is_ok());
        assert!(matches!(
            Fingerprint::new(algorithm, vec![0u8; len - 1]),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            Fingerprint::new(algorithm, vec![0u8; len + 1]),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_fingerprint_from_hex_ignores_separators() {
        let digest = DigestAlgorithm::Sha256.digest(LEAF);
        let colon_separated = digest
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        let fingerprint = Fingerprint::from_hex(DigestAlgorithm::Sha256, &colon_separated).unwrap();

        assert_eq!(fingerprint.digest(), digest.as_slice());
        assert!(Fingerprint::from_hex(DigestAlgorithm::Sha256, "zz").is_err());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("sha-384".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha384);
        assert_eq!("SHA256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert!("md5".parse::<DigestAlgorithm>().is_err());
    }

    #[rstest]
    #[case::sha256(DigestAlgorithm::Sha256)]
    #[case::sha384(DigestAlgorithm::Sha384)]
    fn test_verifier_accepts_matching_leaf(#[case] algorithm: DigestAlgorithm) {
        let verifier = FingerprintVerifier::new(Fingerprint::of_certificate(algorithm, LEAF));

        assert_eq!(verifier.verify(&[LEAF]), Ok(()));
        // Intermediates are not inspected.
        assert_eq!(verifier.verify(&[LEAF, INTERMEDIATE]), Ok(()));
    }

    #[rstest]
    #[case::sha256(DigestAlgorithm::Sha256)]
    #[case::sha384(DigestAlgorithm::Sha384)]
    fn test_verifier_rejects_any_single_bit_mutation(#[case] algorithm: DigestAlgorithm) {
        let digest = algorithm.digest(LEAF);

        for bit in 0..digest.len() * 8 {
            let mut mutated = digest.clone();
            mutated[bit / 8] ^= 1 << (bit % 8);

            let verifier = FingerprintVerifier::new(Fingerprint::new(algorithm, mutated).unwrap());
            assert_eq!(
                verifier.verify(&[LEAF]),
                Err(Rejection::FingerprintMismatch),
                "bit {bit} mutation was accepted"
            );
        }
    }

    #[test]
    fn test_verifier_only_checks_leaf() {
        let verifier = FingerprintVerifier::new(Fingerprint::of_certificate(
            DigestAlgorithm::Sha384,
            INTERMEDIATE,
        ));

        assert_eq!(
            verifier.verify(&[LEAF, INTERMEDIATE]),
            Err(Rejection::FingerprintMismatch)
        );
    }

    #[test]
    fn test_verifier_rejects_empty_chain() {
        let verifier =
            FingerprintVerifier::new(Fingerprint::of_certificate(DigestAlgorithm::Sha384, LEAF));

        assert_eq!(verifier.verify::<&[u8]>(&[]), Err(Rejection::EmptyChain));
    }

    #[test]
    fn test_verifier_installed_only_when_pinned() {
        assert!(FingerprintVerifier::from_trust(&TrustConfiguration::StandardCa).is_none());
        assert!(FingerprintVerifier::from_trust(&TrustConfiguration::pinned_sha384([7u8; 48])).is_some());
    }

    #[test]
    fn test_rustls_adapter_maps_rejection_to_certificate_error() {
        let pinned = PinnedCertVerifier::new(FingerprintVerifier::new(
            Fingerprint::of_certificate(DigestAlgorithm::Sha384, LEAF),
        ));
        let server_name = ServerName::try_from("hvs.example.com").unwrap();

        let accepted = pinned.verify_server_cert(
            &Certificate(LEAF.to_vec()),
            &[Certificate(INTERMEDIATE.to_vec())],
            &server_name,
            &mut std::iter::empty(),
            &[],
            SystemTime::now(),
        );
        assert!(accepted.is_ok());

        let rejected = pinned.verify_server_cert(
            &Certificate(INTERMEDIATE.to_vec()),
            &[],
            &server_name,
            &mut std::iter::empty(),
            &[],
            SystemTime::now(),
        );
        assert!(matches!(
            rejected,
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure
            ))
        ));
    }
}
