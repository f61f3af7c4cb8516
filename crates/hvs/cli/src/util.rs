use eyre::{eyre, Result};
use hvs_client::KeyCertificationEvidence;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Parse a yaml configuration file into a struct
pub fn parse_config_file<T: DeserializeOwned>(location: &str) -> Result<T> {
    let file = std::fs::File::open(location)?;
    let config: T = serde_yaml::from_reader(file)?;
    Ok(config)
}

/// Read key certification evidence from a JSON file
pub async fn read_evidence_file(location: &Path) -> Result<KeyCertificationEvidence> {
    let contents = tokio::fs::read(location)
        .await
        .map_err(|err| eyre!("Failed to read evidence file {}: {err}", location.display()))?;
    let evidence = serde_json::from_slice(&contents)
        .map_err(|err| eyre!("Failed to parse evidence file {}: {err}", location.display()))?;
    Ok(evidence)
}

/// Write a DER certificate to a file
pub async fn write_certificate(location: &Path, der: &[u8]) -> Result<()> {
    tokio::fs::write(location, der)
        .await
        .map_err(|err| eyre!("Failed to write certificate to {}: {err}", location.display()))
}

#[cfg(test)]
mod test {
    use crate::config::HvsCliProperties;

    use super::*;

    #[test]
    fn test_parse_config_file() {
        let location = "fixture/config/config.yaml";
        let config: Result<HvsCliProperties> = parse_config_file(location);
        assert!(
            config.is_ok(),
            "Could not open file or read the file's values."
        );
        assert!(config.unwrap().trust().unwrap().fingerprint().is_some());
    }

    #[tokio::test]
    async fn test_read_evidence_file() {
        let evidence = read_evidence_file(Path::new("fixture/evidence/binding_key.json"))
            .await
            .unwrap();

        assert_eq!(evidence.tpm_version, "2.0");
        assert_eq!(evidence.operating_system, "linux");
        assert!(!evidence.public_key_modulus.is_empty());
        assert!(evidence.aik_der_certificate.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_evidence_file() {
        assert!(read_evidence_file(Path::new("fixture/evidence/missing.json"))
            .await
            .is_err());
    }
}
