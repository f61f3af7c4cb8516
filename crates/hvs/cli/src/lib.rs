//! Command line client certifying TPM host keys with an HVS.

mod cli;
mod client_tracing;
mod config;
mod util;

pub use cli::{CertifyArgs, CliFields, Command};
pub use client_tracing::init_tracing;
pub use config::{HvsCliProperties, LogFormat, LogProperties, TlsProperties};
pub use util::{parse_config_file, read_evidence_file, write_certificate};

use eyre::Result;
use hvs_client::{AttestationClient, KeyCertificate};
use tracing::{debug, info};

/// Certifies the host key named by `command` and writes the issued
/// certificate to the requested output file.
pub async fn certify(config: &HvsCliProperties, command: &Command) -> Result<KeyCertificate> {
    let usage = command.usage();
    let args = command.args();

    let client = AttestationClient::new(config.connection_config()?)?;
    let evidence = read_evidence_file(&args.evidence).await?;

    debug!("Loaded {usage} key evidence from {}", args.evidence.display());

    let certificate = client.host_key().certify(&evidence, usage).await?;
    write_certificate(&args.out, &certificate.der).await?;

    info!(
        "Host {usage} key certificate ({} bytes) written to {}",
        certificate.der.len(),
        args.out.display()
    );

    Ok(certificate)
}
