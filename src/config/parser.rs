//! Layering of parameter sources: `.env` file and `NC_*` variables, then the
//! testbed file, then `key=value` overrides from the command line.

use super::env::EnvManager;
use super::params::TestParameters;
use super::raw::{merge_user_params, parse_key_value, UserParams};
use super::testbed::Testbed;
use super::validation::{validate_parameters, ValidationWarning};
use crate::error::Result;
use std::path::PathBuf;

/// Where parameters come from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub testbed_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// `key=value` pairs, applied last
    pub overrides: Vec<String>,
}

/// Fully layered configuration of a run
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Merged raw parameters (kept for keys outside [`TestParameters`])
    pub raw: UserParams,
    pub params: TestParameters,
    pub testbed: Testbed,
    pub warnings: Vec<ValidationWarning>,
}

/// Configuration parser that combines every source
pub struct ConfigParser {
    sources: ConfigSources,
}

impl ConfigParser {
    pub fn new(sources: ConfigSources) -> Self {
        Self { sources }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<ResolvedConfig> {
        if let Some(env_file) = &self.sources.env_file {
            EnvManager::load_env_file(env_file)?;
        }
        self.parse_with_env(EnvManager::env_user_params())
    }

    /// Same as [`ConfigParser::parse`] with an explicit environment layer
    pub fn parse_with_env(&self, env_params: UserParams) -> Result<ResolvedConfig> {
        let testbed = match &self.sources.testbed_path {
            Some(path) => Testbed::load(path)?,
            None => Testbed::default(),
        };

        let mut overrides = UserParams::new();
        for pair in &self.sources.overrides {
            let (key, value) = parse_key_value(pair)?;
            overrides.insert(key, value);
        }

        let raw = merge_user_params(
            merge_user_params(env_params, testbed.user_params.clone()),
            overrides,
        );
        let (params, rejected) = TestParameters::from_user_params_checked(&raw);
        let warnings = validate_parameters(&params, &raw, &rejected);

        Ok(ResolvedConfig {
            raw,
            params,
            testbed,
            warnings,
        })
    }
}

/// Render resolved parameters for `--print-params`
pub fn display_parameters(params: &TestParameters) -> Result<String> {
    Ok(serde_yaml::to_string(params)?)
}
