use std::io;

use anyhow::{anyhow, Result as AnyResult};
use structopt::StructOpt;
use strum::VariantNames as _;
use strum_macros::{EnumString, EnumVariantNames};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumString, EnumVariantNames)]
#[strum(serialize_all = "lowercase")]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, PartialEq, Eq, Debug, StructOpt)]
pub struct LogOptions {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Apply an env_filter compatible log filter
    #[structopt(long, env = "LOG_FILTER", default_value = "")]
    log_filter: String,

    /// Log format, one of 'text' or 'json'
    #[structopt(
        long,
        env = "LOG_FORMAT",
        possible_values = LogFormat::VARIANTS,
        default_value = "text"
    )]
    log_format: LogFormat,
}

impl LogOptions {
    fn directives(&self) -> String {
        let ours = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let rest = if self.verbose >= 3 { "trace" } else { "warn" };
        let mut directives = format!("{},order_store={},kv_store={}", rest, ours, ours);
        if !self.log_filter.is_empty() {
            directives.push(',');
            directives.push_str(&self.log_filter);
        }
        directives
    }

    /// Install the global subscriber. Logs go to stderr so command output on
    /// stdout stays machine readable.
    pub fn init(&self) -> AnyResult<()> {
        let filter = EnvFilter::try_new(self.directives())?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr);
        match self.log_format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        }
        .map_err(|error| anyhow!(error))?;
        info!(format = ?self.log_format, "Logging initialized");
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_directives() {
        let options = LogOptions::from_iter(&["test", "-vv", "--log-filter", "redb=debug"]);
        assert_eq!(
            options.directives(),
            "warn,order_store=trace,kv_store=trace,redb=debug"
        );
        let options = LogOptions::from_iter(&["test", "--log-format", "json"]);
        assert_eq!(options.log_format, LogFormat::Json);
        assert_eq!(options.directives(), "warn,order_store=info,kv_store=info");
    }
}
