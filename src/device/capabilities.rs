//! Device hardware capabilities and per-model overrides
//!
//! Capabilities start from conservative defaults and are refined by an
//! optional YAML file keyed by device model:
//!
//! ```yaml
//! Pixel 8:
//!   wifi_chipset: wcn6740
//!   supports_dbs_sta_wfd: true
//!   max_num_streams_dbs: 2
//! ```

use crate::error::{AppError, ErrorContext, Result};
use crate::types::DeviceRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Wi-Fi hardware capabilities of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// `ro.build.version.release`
    pub android_version: String,
    /// Empty when the override file does not name the chipset
    pub wifi_chipset: String,
    pub supports_5g: bool,
    pub supports_dbs_sta_wfd: bool,
    pub enable_sta_dfs_channel_for_peer_network: bool,
    pub enable_sta_indoor_channel_for_peer_network: bool,
    pub max_num_streams: u32,
    pub max_num_streams_dbs: u32,
    pub max_phy_rate_2g_mbps: u32,
    pub max_phy_rate_5g_mbps: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            android_version: String::new(),
            wifi_chipset: String::new(),
            supports_5g: true,
            supports_dbs_sta_wfd: false,
            enable_sta_dfs_channel_for_peer_network: false,
            enable_sta_indoor_channel_for_peer_network: false,
            max_num_streams: 2,
            max_num_streams_dbs: 1,
            max_phy_rate_2g_mbps: 144,
            max_phy_rate_5g_mbps: 867,
        }
    }
}

/// Why one override entry was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideIssue {
    UnknownKey(String),
    InvalidValue { key: String, expected: &'static str },
}

impl std::fmt::Display for OverrideIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideIssue::UnknownKey(key) => write!(f, "unknown capability '{}'", key),
            OverrideIssue::InvalidValue { key, expected } => {
                write!(f, "capability '{}' expects {}", key, expected)
            }
        }
    }
}

fn expect_bool(key: &str, value: &serde_yaml::Value) -> std::result::Result<bool, OverrideIssue> {
    match value {
        serde_yaml::Value::Bool(flag) => Ok(*flag),
        serde_yaml::Value::String(text) if text == "true" || text == "True" => Ok(true),
        serde_yaml::Value::String(text) if text == "false" || text == "False" => Ok(false),
        _ => Err(OverrideIssue::InvalidValue {
            key: key.to_string(),
            expected: "a boolean",
        }),
    }
}

fn expect_u32(key: &str, value: &serde_yaml::Value) -> std::result::Result<u32, OverrideIssue> {
    let parsed = match value {
        serde_yaml::Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_yaml::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| OverrideIssue::InvalidValue {
        key: key.to_string(),
        expected: "a non-negative integer",
    })
}

fn expect_string(key: &str, value: &serde_yaml::Value) -> std::result::Result<String, OverrideIssue> {
    match value {
        serde_yaml::Value::String(text) => Ok(text.clone()),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        _ => Err(OverrideIssue::InvalidValue {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

impl DeviceCapabilities {
    /// Apply one override entry
    pub fn apply_override(&mut self, key: &str, value: &serde_yaml::Value) -> std::result::Result<(), OverrideIssue> {
        match key {
            "android_version" => self.android_version = expect_string(key, value)?,
            "wifi_chipset" => self.wifi_chipset = expect_string(key, value)?,
            "supports_5g" => self.supports_5g = expect_bool(key, value)?,
            "supports_dbs_sta_wfd" => self.supports_dbs_sta_wfd = expect_bool(key, value)?,
            "enable_sta_dfs_channel_for_peer_network" => {
                self.enable_sta_dfs_channel_for_peer_network = expect_bool(key, value)?
            }
            "enable_sta_indoor_channel_for_peer_network" => {
                self.enable_sta_indoor_channel_for_peer_network = expect_bool(key, value)?
            }
            "max_num_streams" => self.max_num_streams = expect_u32(key, value)?,
            "max_num_streams_dbs" => self.max_num_streams_dbs = expect_u32(key, value)?,
            "max_phy_rate_2g_mbps" => self.max_phy_rate_2g_mbps = expect_u32(key, value)?,
            "max_phy_rate_5g_mbps" => self.max_phy_rate_5g_mbps = expect_u32(key, value)?,
            other => return Err(OverrideIssue::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Apply every entry of a model's rule; entries that cannot be applied
    /// are returned and leave the current value untouched
    pub fn apply_rule(&mut self, rule: &serde_yaml::Mapping) -> Vec<OverrideIssue> {
        let mut issues = Vec::new();
        for (key, value) in rule {
            let Some(key) = key.as_str() else {
                issues.push(OverrideIssue::UnknownKey(format!("{:?}", key)));
                continue;
            };
            if let Err(issue) = self.apply_override(key, value) {
                issues.push(issue);
            }
        }
        issues
    }

    pub fn flag(&self, flag: CapabilityFlag) -> bool {
        match flag {
            CapabilityFlag::Supports5g => self.supports_5g,
            CapabilityFlag::SupportsDbsStaWfd => self.supports_dbs_sta_wfd,
            CapabilityFlag::EnableStaDfsChannelForPeerNetwork => self.enable_sta_dfs_channel_for_peer_network,
            CapabilityFlag::EnableStaIndoorChannelForPeerNetwork => {
                self.enable_sta_indoor_channel_for_peer_network
            }
        }
    }
}

/// Capability override file contents keyed by model
#[derive(Debug, Clone, Default)]
pub struct CapabilityOverrides {
    rules: BTreeMap<String, serde_yaml::Mapping>,
}

impl CapabilityOverrides {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let rules: Option<BTreeMap<String, serde_yaml::Mapping>> = serde_yaml::from_str(content)?;
        Ok(Self {
            rules: rules.unwrap_or_default(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading capability file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    /// Load when the file exists; a missing file means no overrides
    pub fn load_optional(path: Option<&Path>) -> Result<Option<Self>> {
        match path {
            Some(path) if path.is_file() => Self::load(path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn rule_for(&self, model: &str) -> Option<&serde_yaml::Mapping> {
        self.rules.get(model)
    }
}

/// Boolean capabilities a test class may require
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityFlag {
    Supports5g,
    SupportsDbsStaWfd,
    EnableStaDfsChannelForPeerNetwork,
    EnableStaIndoorChannelForPeerNetwork,
}

impl CapabilityFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityFlag::Supports5g => "supports_5g",
            CapabilityFlag::SupportsDbsStaWfd => "supports_dbs_sta_wfd",
            CapabilityFlag::EnableStaDfsChannelForPeerNetwork => "enable_sta_dfs_channel_for_peer_network",
            CapabilityFlag::EnableStaIndoorChannelForPeerNetwork => {
                "enable_sta_indoor_channel_for_peer_network"
            }
        }
    }
}

/// A capability value one role must have for the class to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRequirement {
    pub role: DeviceRole,
    pub flag: CapabilityFlag,
    pub expected: bool,
}

impl CapabilityRequirement {
    pub fn new(role: DeviceRole, flag: CapabilityFlag, expected: bool) -> Self {
        Self { role, flag, expected }
    }

    /// Skip reason when the capability does not match
    pub fn check(&self, serial: &str, capabilities: &DeviceCapabilities) -> Option<String> {
        let actual = capabilities.flag(self.flag);
        if actual == self.expected {
            return None;
        }
        Some(format!(
            "{} {}.{} is {}",
            serial,
            self.role.as_str(),
            self.flag.as_str(),
            if actual { "enabled" } else { "disabled" }
        ))
    }
}

/// Parse an override file, turning an empty document into no overrides
pub fn parse_override_document(content: &str) -> Result<CapabilityOverrides> {
    CapabilityOverrides::from_yaml_str(content)
        .map_err(|e| AppError::parse(format!("capability overrides: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERRIDES: &str = r#"
Pixel 8:
  wifi_chipset: wcn6740
  supports_dbs_sta_wfd: true
  max_num_streams_dbs: 2
  max_phy_rate_5g_mbps: "1201"
  favourite_colour: blue
  supports_5g: maybe
"#;

    #[test]
    fn test_rule_applies_known_keys_and_reports_the_rest() {
        let overrides = parse_override_document(OVERRIDES).unwrap();
        let rule = overrides.rule_for("Pixel 8").unwrap();

        let mut caps = DeviceCapabilities::default();
        let issues = caps.apply_rule(rule);

        assert_eq!(caps.wifi_chipset, "wcn6740");
        assert!(caps.supports_dbs_sta_wfd);
        assert_eq!(caps.max_num_streams_dbs, 2);
        assert_eq!(caps.max_phy_rate_5g_mbps, 1201);
        assert!(caps.supports_5g);
        assert_eq!(
            issues,
            vec![
                OverrideIssue::UnknownKey("favourite_colour".to_string()),
                OverrideIssue::InvalidValue {
                    key: "supports_5g".to_string(),
                    expected: "a boolean"
                },
            ]
        );
    }

    #[test]
    fn test_missing_model_and_empty_document() {
        let overrides = parse_override_document(OVERRIDES).unwrap();
        assert!(overrides.rule_for("Pixel 7").is_none());
        assert!(parse_override_document("").unwrap().rule_for("Pixel 8").is_none());
    }

    #[test]
    fn test_load_optional_missing_file() {
        let loaded = CapabilityOverrides::load_optional(Some(Path::new("/nonexistent/caps.yaml"))).unwrap();
        assert!(loaded.is_none());
        assert!(CapabilityOverrides::load_optional(None).unwrap().is_none());
    }

    #[test]
    fn test_requirement_check() {
        let caps = DeviceCapabilities {
            supports_5g: false,
            ..Default::default()
        };
        let requirement = CapabilityRequirement::new(DeviceRole::TargetDevice, CapabilityFlag::Supports5g, true);
        assert_eq!(
            requirement.check("4D5E6F", &caps).as_deref(),
            Some("4D5E6F target_device.supports_5g is disabled")
        );
        let relaxed = CapabilityRequirement::new(DeviceRole::TargetDevice, CapabilityFlag::Supports5g, false);
        assert!(relaxed.check("4D5E6F", &caps).is_none());
    }
}
