use config::{Config, Environment};
use eyre::Result;
use hvs_client::{ConnectionConfig, DigestAlgorithm, Fingerprint, TrustConfiguration};
use serde::{Deserialize, Serialize};

use crate::{util::parse_config_file, CliFields};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HvsCliProperties {
    /// URL base of the HVS, e.g. https://hvs.server:8443/hvs/v2
    pub base_url: String,
    /// Username used to authenticate with the HVS
    pub username: String,
    /// Password for the username
    pub password: String,
    /// Setting for TLS connection between this client and the HVS
    pub tls: TlsProperties,
    /// Setting for logging
    pub log: LogProperties,
}

impl HvsCliProperties {
    pub fn new(cli_fields: &CliFields) -> Result<Self> {
        // Uses config file if given.
        if let Some(config_path) = &cli_fields.config {
            return parse_config_file(config_path);
        }

        let default_config = Config::try_from(&HvsCliProperties::default())?;

        let config = Config::builder()
            .add_source(default_config)
            // Add in settings from environment variables (with a prefix of HVS and '_' as
            // separator). Values are kept as strings so credentials are never reparsed.
            .add_source(
                Environment::with_prefix("HVS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Trust configuration derived from the TLS settings. Standard CA
    /// validation is used unless a fingerprint is set.
    pub fn trust(&self) -> Result<TrustConfiguration> {
        match &self.tls.cert_fingerprint {
            Some(fingerprint) if !fingerprint.trim().is_empty() => Ok(TrustConfiguration::Pinned(
                Fingerprint::from_hex(self.tls.fingerprint_algorithm, fingerprint)?,
            )),
            _ => Ok(TrustConfiguration::StandardCa),
        }
    }

    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let config = ConnectionConfig::builder()
            .base_url(&self.base_url)
            .username(&self.username)
            .password(&self.password)
            .trust(self.trust()?)
            .build()?;

        Ok(config)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsProperties {
    /// Hex encoded digest of the HVS TLS leaf certificate. When set, standard
    /// certificate validation is replaced by this pin
    pub cert_fingerprint: Option<String>,
    /// Digest algorithm of cert_fingerprint, either "SHA256" or "SHA384"
    pub fingerprint_algorithm: DigestAlgorithm,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogProperties {
    /// Log verbosity level of the default filtering logic, which is
    /// hvs_cli=<level>,hvs_client=<level>
    /// Must be either of <https://docs.rs/tracing/latest/tracing/struct.Level.html#implementations>
    pub level: String,
    /// Custom filtering logic, refer to the syntax here https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#example-syntax
    /// This will override the default filtering logic above
    pub filter: Option<String>,
    /// Log format. Available options are "COMPACT" and "JSON"
    pub format: LogFormat,
}

impl Default for HvsCliProperties {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8443/hvs/v2".to_string(),
            username: String::new(),
            password: String::new(),
            tls: Default::default(),
            log: Default::default(),
        }
    }
}

impl Default for TlsProperties {
    fn default() -> Self {
        Self {
            cert_fingerprint: None,
            fingerprint_algorithm: DigestAlgorithm::Sha384,
        }
    }
}

impl Default for LogProperties {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            filter: None,
            format: LogFormat::Compact,
        }
    }
}

impl std::fmt::Display for HvsCliProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "base_url: {}", self.base_url)?;
        writeln!(f, "username: {}", self.username)?;
        writeln!(f, "password: <redacted>")?;
        writeln!(f, "tls: \n{}", self.tls)?;
        write!(f, "log: \n{}", self.log)
    }
}

impl std::fmt::Display for TlsProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   cert_fingerprint: {:?}", self.cert_fingerprint)?;
        write!(f, "   fingerprint_algorithm: {}", self.fingerprint_algorithm)
    }
}

impl std::fmt::Display for LogProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   level: {}", self.level)?;
        writeln!(f, "   filter: {:?}", self.filter)?;
        write!(f, "   format: {:?}", self.format)
    }
}
