//! Environment variable handling and .env file management
//!
//! Every `NC_<FIELD>` variable becomes the raw user parameter `<field>`
//! (lower-cased), e.g. `NC_WIFI_2G_SSID=lab` sets `wifi_2g_ssid`.

use super::raw::{RawValue, UserParams};
use super::TestParameters;
use crate::error::{AppError, Result};
use std::path::Path;

/// Prefix of environment variables mapped into user parameters
pub const ENV_PREFIX: &str = "NC_";

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists; returns whether a file was loaded
    pub fn load_env_file(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Collect `NC_*` variables from the process environment
    pub fn env_user_params() -> UserParams {
        Self::user_params_from_vars(std::env::vars())
    }

    /// Collect `NC_*` pairs from any iterator of variables
    pub fn user_params_from_vars<I>(vars: I) -> UserParams
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(name, value)| {
                let key = name.strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();
                if key.is_empty() {
                    None
                } else {
                    Some((key, RawValue::Str(value)))
                }
            })
            .collect()
    }

    /// Example .env content listing every configurable parameter
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# Nearby Connections performance harness configuration\n\
             #\n\
             # Each NC_<FIELD> variable sets the user parameter <field>.\n\
             # Values in the testbed file take precedence, and -p key=value on\n\
             # the command line takes precedence over both.\n\n",
        );
        let defaults = serde_json::to_value(TestParameters::default()).unwrap_or_default();
        if let serde_json::Value::Object(map) = defaults {
            for (key, value) in map {
                let shown = match value {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                content.push_str(&format!("# {}{}={}\n", ENV_PREFIX, key.to_ascii_uppercase(), shown));
            }
        }
        content.push_str(&format!("# {}WIFI_CHANNEL=6\n", ENV_PREFIX));
        content
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }
}
