use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigArgs;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new store in the configured directory
    Init,
    /// Record a measurement, or `DNF` when the attempt did not finish
    Append(AppendCommand),
    /// Show current statistics
    Stats,
    /// Write the manifest and every record as one JSON document
    Export(ExportCommand),
    /// Replay every record and report the full window series
    Analyse,
    /// Delete the store directory
    Delete,
}

#[derive(Args, Debug)]
pub struct AppendCommand {
    /// Time in seconds, or `DNF`
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[derive(Args, Debug)]
pub struct ExportCommand {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Tracing filter directives, e.g. `onesec_core=debug`
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl LoggingArgs {
    pub fn effective_level(&self) -> &str {
        match self.verbose {
            0 => &self.log_level,
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Interpret a command-line measurement.
pub fn parse_measurement(value: &str) -> Option<Measurement> {
    if value.trim().eq_ignore_ascii_case("dnf") {
        return Some(Measurement::Dnf);
    }
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(Measurement::Time)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Time(f64),
    Dnf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_measurement() {
        assert_eq!(parse_measurement("0.25"), Some(Measurement::Time(0.25)));
        assert_eq!(parse_measurement("-1.5"), Some(Measurement::Time(-1.5)));
        assert_eq!(parse_measurement("DNF"), Some(Measurement::Dnf));
        assert_eq!(parse_measurement(" dnf "), Some(Measurement::Dnf));
        assert_eq!(parse_measurement("inf"), None);
        assert_eq!(parse_measurement("NaN"), None);
        assert_eq!(parse_measurement("fast"), None);
    }

    #[test]
    fn test_verbosity_overrides_level() {
        let mut logging = LoggingArgs {
            log_level: "warn".to_string(),
            log_filter: None,
            verbose: 0,
        };
        assert_eq!(logging.effective_level(), "warn");
        logging.verbose = 2;
        assert_eq!(logging.effective_level(), "trace");
    }
}
