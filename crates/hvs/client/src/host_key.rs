//! Host key certification.
//!
//! Submits the TPM evidence of a binding or signing key to the HVS and
//! decodes the DER certificate it issues.

use std::fmt;

use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    client::AttestationClient,
    error::{CertifyError, ClientError},
};

/// Usage of the host key being certified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    /// TPM binding key.
    Binding,
    /// TPM signing key.
    Signing,
}

impl KeyUsage {
    /// Returns the HVS endpoint certifying keys of this usage.
    pub fn endpoint(&self) -> &'static str {
        match self {
            KeyUsage::Binding => "/rpc/certify-host-binding-key",
            KeyUsage::Signing => "/rpc/certify-host-signing-key",
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyUsage::Binding => write!(f, "binding"),
            KeyUsage::Signing => write!(f, "signing"),
        }
    }
}

/// TPM evidence proving the provenance of a host key.
///
/// Empty fields are omitted from the request rather than sent as empty
/// values. Byte fields are encoded as base64 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCertificationEvidence {
    /// Modulus of the key's public part.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub public_key_modulus: Vec<u8>,
    /// TPMS_ATTEST structure produced by TPM2_Certify.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub tpm_certify_key: Vec<u8>,
    /// Signature over `tpm_certify_key` by the AIK.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub tpm_certify_key_signature: Vec<u8>,
    /// DER encoded AIK certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub aik_der_certificate: Vec<u8>,
    /// TPM name digest of the key.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub name_digest: Vec<u8>,
    /// TPM version, e.g. "2.0".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tpm_version: String,
    /// Host operating system, e.g. "linux".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operating_system: String,
}

/// Certificate issued for a host binding key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingKeyCertificate {
    /// DER encoded certificate.
    #[serde(rename = "binding_key_der_certificate", with = "der_certificate")]
    pub der: Vec<u8>,
}

/// Certificate issued for a host signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyCertificate {
    /// DER encoded certificate.
    #[serde(rename = "signing_key_der_certificate", with = "der_certificate")]
    pub der: Vec<u8>,
}

/// Certificate issued by the HVS, tagged with the usage of the certified key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCertificate {
    /// Usage of the certified key.
    pub usage: KeyUsage,
    /// DER encoded certificate.
    pub der: Vec<u8>,
}

/// Sub client certifying host keys, obtained with
/// [`AttestationClient::host_key`].
///
/// Every call is a single request/response cycle and is never retried.
#[derive(Debug, Clone, Copy)]
pub struct HostKey<'a> {
    client: &'a AttestationClient,
}

impl<'a> HostKey<'a> {
    pub(crate) fn new(client: &'a AttestationClient) -> Self {
        Self { client }
    }

    /// Certifies a host key of the given usage.
    pub async fn certify(
        &self,
        evidence: &KeyCertificationEvidence,
        usage: KeyUsage,
    ) -> Result<KeyCertificate, CertifyError> {
        let der = match usage {
            KeyUsage::Binding => self.certify_host_binding_key(evidence).await?.der,
            KeyUsage::Signing => self.certify_host_signing_key(evidence).await?.der,
        };

        Ok(KeyCertificate { usage, der })
    }

    /// Sends a POST to `/rpc/certify-host-binding-key` to certify a binding
    /// key.
    pub async fn certify_host_binding_key(
        &self,
        evidence: &KeyCertificationEvidence,
    ) -> Result<BindingKeyCertificate, CertifyError> {
        self.certify_as(evidence, KeyUsage::Binding).await
    }

    /// Sends a POST to `/rpc/certify-host-signing-key` to certify a signing
    /// key.
    pub async fn certify_host_signing_key(
        &self,
        evidence: &KeyCertificationEvidence,
    ) -> Result<SigningKeyCertificate, CertifyError> {
        self.certify_as(evidence, KeyUsage::Signing).await
    }

    async fn certify_as<T: DeserializeOwned>(
        &self,
        evidence: &KeyCertificationEvidence,
        usage: KeyUsage,
    ) -> Result<T, CertifyError> {
        let payload = serde_json::to_vec(evidence).map_err(|err| {
            error!("Failed to serialize host {usage} key evidence: {err}");
            CertifyError::new(usage, ClientError::Serialization(err))
        })?;

        debug!("Certifying host {usage} key");

        let body = self
            .client
            .send(Method::POST, usage.endpoint(), payload)
            .await
            .map_err(|err| {
                error!("Failed to certify host {usage} key with HVS: {err}");
                CertifyError::new(usage, err)
            })?;

        serde_json::from_slice(&body).map_err(|err| {
            error!("Failed to decode host {usage} key certificate: {err}");
            CertifyError::new(usage, ClientError::Decode(err))
        })
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

mod der_certificate {
    use serde::{de::Error as _, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(der: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        super::base64_bytes::serialize(der, serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let der = super::base64_bytes::deserialize(deserializer)?;
        if der.is_empty() {
            return Err(D::Error::custom("certificate is empty"));
        }

        Ok(der)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn test_evidence_omits_unset_fields() {
        let evidence = KeyCertificationEvidence {
            tpm_version: "2.0".to_string(),
            operating_system: "linux".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&evidence).unwrap();

        assert_eq!(value, json!({ "tpm_version": "2.0", "operating_system": "linux" }));
    }

    #[test]
    fn test_evidence_encodes_bytes_as_base64() {
        let evidence = KeyCertificationEvidence {
            public_key_modulus: vec![0x01, 0x02, 0x03],
            name_digest: vec![0xff],
            ..Default::default()
        };

        let value = serde_json::to_value(&evidence).unwrap();

        assert_eq!(value, json!({ "public_key_modulus": "AQID", "name_digest": "/w==" }));
    }

    #[test]
    fn test_evidence_all_fields() {
        let evidence = KeyCertificationEvidence {
            public_key_modulus: vec![1],
            tpm_certify_key: vec![2],
            tpm_certify_key_signature: vec![3],
            aik_der_certificate: vec![4],
            name_digest: vec![5],
            tpm_version: "2.0".to_string(),
            operating_system: "windows".to_string(),
        };

        let value = serde_json::to_value(&evidence).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(keys.len(), 7);
        for key in [
            "public_key_modulus",
            "tpm_certify_key",
            "tpm_certify_key_signature",
            "aik_der_certificate",
            "name_digest",
            "tpm_version",
            "operating_system",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }

        let parsed: KeyCertificationEvidence = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, evidence);
    }

    #[test]
    fn test_decode_binding_key_certificate() {
        let cert: BindingKeyCertificate =
            serde_json::from_str(r#"{"binding_key_der_certificate":"AQID"}"#).unwrap();

        assert_eq!(cert.der, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_decode_signing_key_certificate() {
        let cert: SigningKeyCertificate =
            serde_json::from_str(r#"{"signing_key_der_certificate":"AQID"}"#).unwrap();

        assert_eq!(cert.der, vec![0x01, 0x02, 0x03]);
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::wrong_usage(r#"{"signing_key_der_certificate":"AQID"}"#)]
    #[case::missing_field("{}")]
    #[case::not_base64(r#"{"binding_key_der_certificate":"***"}"#)]
    #[case::empty_certificate(r#"{"binding_key_der_certificate":""}"#)]
    #[case::wrong_type(r#"{"binding_key_der_certificate":42}"#)]
    fn test_decode_rejects_malformed_binding_certificate(#[case] body: &str) {
        assert!(serde_json::from_str::<BindingKeyCertificate>(body).is_err());
    }

    #[test]
    fn test_endpoint_by_usage() {
        assert_eq!(KeyUsage::Binding.endpoint(), "/rpc/certify-host-binding-key");
        assert_eq!(KeyUsage::Signing.endpoint(), "/rpc/certify-host-signing-key");
        assert_eq!(
            serde_json::to_value(KeyUsage::Signing).unwrap(),
            Value::String("signing".to_string())
        );
    }
}
