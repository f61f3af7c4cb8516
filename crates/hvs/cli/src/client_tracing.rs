use eyre::Result;
use std::str::FromStr;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::config::{HvsCliProperties, LogFormat};

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let f = fmt::layer().with_writer(std::io::stderr);
    match format {
        LogFormat::Compact => f.compact().boxed(),
        LogFormat::Json => f.json().boxed(),
    }
}

/// Builds the filter directives from the logging settings.
pub fn filter_directives(config: &HvsCliProperties) -> Result<String> {
    match &config.log.filter {
        // Use custom filter that is provided by user
        Some(filter) => Ok(filter.clone()),
        // Use the default filter when only verbosity level is provided
        None => {
            let level = Level::from_str(&config.log.level)?;
            Ok(format!("hvs_cli={level},hvs_client={level}"))
        }
    }
}

pub fn init_tracing(config: &HvsCliProperties) -> Result<()> {
    let filter_layer = EnvFilter::builder().parse(filter_directives(config)?)?;

    Registry::default()
        .with(filter_layer)
        .with(format_layer(config.log.format))
        .try_init()?;

    Ok(())
}
