//! Testbed description files
//!
//! A testbed file is YAML with a `user_params` mapping and an optional
//! `devices` list:
//!
//! ```yaml
//! user_params:
//!   target_cuj_name: quick_share
//!   wifi_2g_ssid: lab-2g
//!   wifi_2g_password: secret
//!   files:
//!     nearby_snippet: [/opt/apks/nearby_snippet.apk]
//! devices:
//!   - serial: 1A2B3C
//!     model: Pixel 8
//!     role: source_device
//!   - serial: 4D5E6F
//!     model: Pixel 7
//!     role: target_device
//! ```

use super::raw::UserParams;
use crate::error::{ErrorContext, Result};
use crate::types::DeviceRole;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One device entry of a testbed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestbedDevice {
    pub serial: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Declared role; absent on every device means positional assignment
    #[serde(default)]
    pub role: Option<DeviceRole>,
    #[serde(default)]
    pub android_version: Option<String>,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub wifi_firmware: Option<String>,
    #[serde(default = "default_rooted")]
    pub rooted: bool,
}

fn default_rooted() -> bool {
    true
}

/// Controlled access point of a simulated testbed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestbedAccessPoint {
    #[serde(default = "default_ap_ssid")]
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

fn default_ap_ssid() -> String {
    "ncperf-ap".to_string()
}

/// Parsed testbed file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Testbed {
    #[serde(default)]
    pub user_params: UserParams,
    #[serde(default)]
    pub devices: Vec<TestbedDevice>,
    #[serde(default)]
    pub access_point: Option<TestbedAccessPoint>,
}

impl Testbed {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading testbed file {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("parsing testbed file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::raw::RawValue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
user_params:
  target_cuj_name: quick_share
  wifi_channel: 6
  files:
    nearby_snippet: [/opt/apks/nearby_snippet.apk]
devices:
  - serial: 1A2B3C
    model: Pixel 8
    role: source_device
  - serial: 4D5E6F
    role: target_device
    rooted: false
"#;

    #[test]
    fn test_parse_sample() {
        let testbed = Testbed::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(testbed.devices.len(), 2);
        assert_eq!(testbed.devices[0].role, Some(DeviceRole::SourceDevice));
        assert_eq!(testbed.devices[0].model.as_deref(), Some("Pixel 8"));
        assert!(testbed.devices[0].rooted);
        assert!(!testbed.devices[1].rooted);
        assert_eq!(testbed.user_params["wifi_channel"], RawValue::Int(6));
        assert!(testbed.access_point.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let testbed = Testbed::load(file.path()).unwrap();
        assert_eq!(testbed.devices[1].serial, "4D5E6F");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let error = Testbed::load(Path::new("/nonexistent/testbed.yaml")).unwrap_err();
        assert_eq!(error.category(), "IO");
        assert!(error.to_string().contains("reading testbed file"));
    }

    #[test]
    fn test_bad_role_is_parse_error() {
        let yaml = "devices:\n  - serial: x\n    role: observer\n";
        assert_eq!(Testbed::from_yaml_str(yaml).unwrap_err().category(), "PARSE");
    }
}
