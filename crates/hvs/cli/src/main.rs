use eyre::{eyre, Result};
use hvs_cli::{certify, init_tracing, CliFields, HvsCliProperties};
use structopt::StructOpt;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Load command line arguments
    let cli_fields: CliFields = CliFields::from_args();

    let config = HvsCliProperties::new(&cli_fields)
        .map_err(|err| eyre!("Failed to load config: {err}"))?;

    // Set up tracing for logging
    init_tracing(&config).map_err(|err| eyre!("Failed to set up tracing: {err}"))?;

    debug!("Client config loaded: \n{}", config);

    certify(&config, &cli_fields.command).await?;

    Ok(())
}
