use std::path::PathBuf;

use hvs_client::KeyUsage;
use structopt::StructOpt;

/// Fields loaded from the command line when launching this client.
#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "HVS Client")]
pub struct CliFields {
    /// Configuration file location. When omitted, settings are read from
    /// HVS_* environment variables.
    #[structopt(long)]
    pub config: Option<String>,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Command {
    /// Certify a TPM binding key with the HVS
    CertifyBindingKey(CertifyArgs),
    /// Certify a TPM signing key with the HVS
    CertifySigningKey(CertifyArgs),
}

impl Command {
    pub fn usage(&self) -> KeyUsage {
        match self {
            Command::CertifyBindingKey(_) => KeyUsage::Binding,
            Command::CertifySigningKey(_) => KeyUsage::Signing,
        }
    }

    pub fn args(&self) -> &CertifyArgs {
        match self {
            Command::CertifyBindingKey(args) | Command::CertifySigningKey(args) => args,
        }
    }
}

#[derive(Clone, Debug, StructOpt)]
pub struct CertifyArgs {
    /// JSON file holding the key certification evidence
    #[structopt(long, parse(from_os_str))]
    pub evidence: PathBuf,

    /// Output file for the DER certificate issued by the HVS
    #[structopt(long, parse(from_os_str))]
    pub out: PathBuf,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_certify_signing_key() {
        let cli_fields = CliFields::from_iter_safe([
            "hvs-cli",
            "--config",
            "config.yaml",
            "certify-signing-key",
            "--evidence",
            "evidence.json",
            "--out",
            "signing.der",
        ])
        .unwrap();

        assert_eq!(cli_fields.config.as_deref(), Some("config.yaml"));
        assert_eq!(cli_fields.command.usage(), KeyUsage::Signing);
        assert_eq!(cli_fields.command.args().out, PathBuf::from("signing.der"));
    }

    #[test]
    fn test_evidence_is_required() {
        assert!(CliFields::from_iter_safe(["hvs-cli", "certify-binding-key", "--out", "b.der"]).is_err());
    }
}
