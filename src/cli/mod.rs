//! Command-line interface

use crate::config::ConfigSources;
use crate::cuj::CujKind;
use crate::logging::{LogFormat, LoggingConfig};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Nearby Connections performance harness
///
/// Runs the selected CUJ test classes against the devices declared in the
/// testbed file and writes JSON-lines records plus bug reports to the
/// output directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "ncperf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Testbed YAML file with `user_params`, `devices` and `access_point`
    #[arg(short, long, value_name = "FILE", env = "NCPERF_TESTBED")]
    pub testbed: Option<PathBuf>,

    /// CUJ class to run (can be used multiple times)
    #[arg(long = "cuj", value_name = "CUJ", action = ArgAction::Append)]
    pub cujs: Vec<CujKind>,

    /// Capability override YAML keyed by device model
    #[arg(long, value_name = "FILE", env = "NCPERF_CAPABILITY_FILE")]
    pub capability_file: Option<PathBuf>,

    /// Directory for records, bug reports and excerpts
    #[arg(short, long, value_name = "DIR", env = "NCPERF_OUTPUT_DIR", default_value = crate::defaults::DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Load NC_* variables from this .env file
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Override a user parameter (can be used multiple times)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param_override, action = ArgAction::Append)]
    pub params: Vec<String>,

    /// Print the resolved parameters and exit
    #[arg(long)]
    pub print_params: bool,

    /// List the available CUJ classes and exit
    #[arg(long)]
    pub list_cujs: bool,

    /// Write an example .env file to this path and exit
    #[arg(long, value_name = "FILE")]
    pub init_env: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Log format: console, json or compact
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_flags(self.verbose, self.debug, !self.use_colors(), self.log_format)
    }

    pub fn config_sources(&self) -> ConfigSources {
        ConfigSources {
            testbed_path: self.testbed.clone(),
            env_file: self.env_file.clone(),
            overrides: self.params.clone(),
        }
    }
}

/// Accept `key=value` with a non-empty key
fn parse_param_override(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(s.to_string()),
        _ => Err(format!("Invalid parameter override '{}', expected KEY=VALUE", s)),
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    cfg!(unix)
}
