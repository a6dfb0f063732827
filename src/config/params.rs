//! Typed test parameters
//!
//! [`TestParameters`] is built once per class from the raw user parameters.
//! The set of accepted keys is whatever the struct serializes to, so adding a
//! field here is the only step needed to make a new parameter configurable.

use super::raw::{coerce_user_params, UserParams};
use crate::defaults;
use crate::types::{NearbyMedium, PayloadType, WifiBand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resolved configuration shared read-only by every trial of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParameters {
    /// Customer journey the run is attributed to
    pub target_cuj_name: String,
    /// Establish a prior BT connection over the secondary agent
    pub requires_bt_multiplex: bool,
    /// Also load the third-party API agent
    pub requires_3p_api_test: bool,
    pub run_function_tests_with_performance_tests: bool,
    pub abort_all_tests_on_function_tests_fail: bool,
    /// Stop a class after its first failed iteration
    pub fast_fail_on_any_error: bool,
    /// Bring up the controlled access point during class setup
    pub use_auto_controlled_wifi_ap: bool,
    pub wifi_2g_ssid: String,
    pub wifi_2g_password: String,
    pub wifi_5g_ssid: String,
    pub wifi_5g_password: String,
    pub wifi_dfs_5g_ssid: String,
    pub wifi_dfs_5g_password: String,
    /// Generic network for classes that do not care about the band
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub advertising_discovery_medium: NearbyMedium,
    pub toggle_airplane_mode_target_side: bool,
    pub reset_wifi_connection: bool,
    pub disconnect_bt_after_test: bool,
    pub disconnect_wifi_after_test: bool,
    pub payload_type: PayloadType,
    pub allow_unrooted_device: bool,
    pub keep_alive_timeout_ms: u32,
    pub keep_alive_interval_ms: u32,
    /// Skip the class when no device reports a Wi-Fi chipset
    pub skip_test_if_wifi_chipset_is_empty: bool,
    pub skip_bug_report: bool,
    pub enable_2g_ble_scan_throttling: bool,
    /// Force the country code through telephony instead of Wi-Fi only
    pub force_telephony_cc: bool,
    pub bypass_airplane_mode_toggling: bool,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            target_cuj_name: "unspecified".to_string(),
            requires_bt_multiplex: false,
            requires_3p_api_test: false,
            run_function_tests_with_performance_tests: false,
            abort_all_tests_on_function_tests_fail: true,
            fast_fail_on_any_error: false,
            use_auto_controlled_wifi_ap: false,
            wifi_2g_ssid: String::new(),
            wifi_2g_password: String::new(),
            wifi_5g_ssid: String::new(),
            wifi_5g_password: String::new(),
            wifi_dfs_5g_ssid: String::new(),
            wifi_dfs_5g_password: String::new(),
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            advertising_discovery_medium: NearbyMedium::BleOnly,
            toggle_airplane_mode_target_side: false,
            reset_wifi_connection: true,
            disconnect_bt_after_test: false,
            disconnect_wifi_after_test: false,
            payload_type: PayloadType::File,
            allow_unrooted_device: false,
            keep_alive_timeout_ms: defaults::KEEP_ALIVE_TIMEOUT_WIFI_MS,
            keep_alive_interval_ms: defaults::KEEP_ALIVE_INTERVAL_WIFI_MS,
            skip_test_if_wifi_chipset_is_empty: false,
            skip_bug_report: false,
            enable_2g_ble_scan_throttling: false,
            force_telephony_cc: false,
            bypass_airplane_mode_toggling: false,
        }
    }
}

/// A declared parameter whose value could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedParam {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl TestParameters {
    /// Names of every declared parameter
    pub fn declared_keys() -> BTreeSet<String> {
        match serde_json::to_value(TestParameters::default()) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().map(|(key, _)| key).collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Build typed parameters from raw user parameters; rejected values are
    /// dropped silently. See [`TestParameters::from_user_params_checked`].
    pub fn from_user_params(raw: &UserParams) -> Self {
        Self::from_user_params_checked(raw).0
    }

    /// Build typed parameters and report every declared key whose value had
    /// the wrong type. Such keys keep their default; unknown keys are ignored.
    pub fn from_user_params_checked(raw: &UserParams) -> (Self, Vec<RejectedParam>) {
        let coerced = coerce_user_params(raw);
        let mut accepted = match serde_json::to_value(TestParameters::default()) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let mut rejected = Vec::new();

        for (key, value) in &coerced {
            if !accepted.contains_key(key) {
                continue;
            }

            // A numeric-looking SSID must still be accepted as a string
            let mut candidates = vec![value.clone()];
            if let Some(original) = raw.get(key) {
                if original != value {
                    candidates.push(original.clone());
                }
            }

            let mut last_error = String::new();
            let mut applied = false;
            for candidate in candidates {
                let json = match serde_json::to_value(&candidate) {
                    Ok(json) => json,
                    Err(e) => {
                        last_error = e.to_string();
                        continue;
                    }
                };
                let mut trial = accepted.clone();
                trial.insert(key.clone(), json.clone());
                match serde_json::from_value::<TestParameters>(serde_json::Value::Object(trial)) {
                    Ok(_) => {
                        accepted.insert(key.clone(), json);
                        applied = true;
                        break;
                    }
                    Err(e) => last_error = e.to_string(),
                }
            }

            if !applied {
                rejected.push(RejectedParam {
                    key: key.clone(),
                    value: value.to_string(),
                    reason: last_error,
                });
            }
        }

        let mut params = serde_json::from_value::<TestParameters>(serde_json::Value::Object(accepted))
            .unwrap_or_default();
        if params.target_cuj_name == defaults::CUJ_QUICK_START {
            params.requires_bt_multiplex = true;
        }
        (params, rejected)
    }

    /// SSID and password configured for a band; `None` selects the generic pair
    pub fn wifi_credentials(&self, band: Option<WifiBand>) -> (&str, &str) {
        match band {
            Some(WifiBand::TwoG) => (&self.wifi_2g_ssid, &self.wifi_2g_password),
            Some(WifiBand::FiveG) => (&self.wifi_5g_ssid, &self.wifi_5g_password),
            Some(WifiBand::FiveGDfs) => (&self.wifi_dfs_5g_ssid, &self.wifi_dfs_5g_password),
            None => (&self.wifi_ssid, &self.wifi_password),
        }
    }

    /// Station credentials for `band`, falling back to the generic ones
    /// when the band has no SSID
    pub fn sta_credentials(&self, band: WifiBand) -> (&str, &str) {
        let credentials = self.wifi_credentials(Some(band));
        if credentials.0.is_empty() {
            self.wifi_credentials(None)
        } else {
            credentials
        }
    }

    /// Overwrite the credentials of a band (used by the access point setup)
    pub fn set_wifi_credentials(&mut self, band: Option<WifiBand>, ssid: String, password: String) {
        let (ssid_field, password_field) = match band {
            Some(WifiBand::TwoG) => (&mut self.wifi_2g_ssid, &mut self.wifi_2g_password),
            Some(WifiBand::FiveG) => (&mut self.wifi_5g_ssid, &mut self.wifi_5g_password),
            Some(WifiBand::FiveGDfs) => (&mut self.wifi_dfs_5g_ssid, &mut self.wifi_dfs_5g_password),
            None => (&mut self.wifi_ssid, &mut self.wifi_password),
        };
        *ssid_field = ssid;
        *password_field = password;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::raw::RawValue;

    fn params(pairs: &[(&str, RawValue)]) -> UserParams {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let p = TestParameters::default();
        assert_eq!(p.target_cuj_name, "unspecified");
        assert_eq!(p.advertising_discovery_medium, NearbyMedium::BleOnly);
        assert_eq!(p.payload_type, PayloadType::File);
        assert!(p.reset_wifi_connection);
        assert!(p.abort_all_tests_on_function_tests_fail);
        assert_eq!(p.keep_alive_timeout_ms, 10_000);
        assert_eq!(p.keep_alive_interval_ms, 3_000);
    }

    #[test]
    fn test_declared_keys_follow_struct() {
        let keys = TestParameters::declared_keys();
        assert!(keys.contains("wifi_dfs_5g_password"));
        assert!(keys.contains("keep_alive_interval_ms"));
        assert!(!keys.contains("wifi_channel"));
        assert_eq!(keys.len(), 29);
    }

    #[test]
    fn test_string_values_are_coerced() {
        let raw = params(&[
            ("allow_unrooted_device", RawValue::from("True")),
            ("reset_wifi_connection", RawValue::from("false")),
            ("keep_alive_timeout_ms", RawValue::from("5000")),
            ("advertising_discovery_medium", RawValue::from("1")),
            ("wifi_2g_ssid", RawValue::from("lab-2g")),
        ]);
        let p = TestParameters::from_user_params(&raw);
        assert!(p.allow_unrooted_device);
        assert!(!p.reset_wifi_connection);
        assert_eq!(p.keep_alive_timeout_ms, 5000);
        assert_eq!(p.advertising_discovery_medium, NearbyMedium::BtOnly);
        assert_eq!(p.wifi_2g_ssid, "lab-2g");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let raw = params(&[
            ("not_a_parameter", RawValue::from("x")),
            ("wifi_channel", RawValue::Int(6)),
        ]);
        let (p, rejected) = TestParameters::from_user_params_checked(&raw);
        assert_eq!(p, TestParameters::default());
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_wrong_type_falls_back_to_default() {
        let raw = params(&[
            ("keep_alive_timeout_ms", RawValue::from("soon")),
            ("skip_bug_report", RawValue::from("yes")),
            ("fast_fail_on_any_error", RawValue::from("true")),
        ]);
        let (p, rejected) = TestParameters::from_user_params_checked(&raw);
        assert_eq!(p.keep_alive_timeout_ms, 10_000);
        assert!(!p.skip_bug_report);
        assert!(p.fast_fail_on_any_error);

        let keys: Vec<&str> = rejected.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["keep_alive_timeout_ms", "skip_bug_report"]);
    }

    #[test]
    fn test_numeric_ssid_stays_a_string() {
        let raw = params(&[("wifi_ssid", RawValue::from("12345"))]);
        let (p, rejected) = TestParameters::from_user_params_checked(&raw);
        assert_eq!(p.wifi_ssid, "12345");
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_quick_start_forces_bt_multiplex() {
        let raw = params(&[
            ("target_cuj_name", RawValue::from("quick_start")),
            ("requires_bt_multiplex", RawValue::from("false")),
        ]);
        assert!(TestParameters::from_user_params(&raw).requires_bt_multiplex);

        let raw = params(&[("target_cuj_name", RawValue::from("quick_share"))]);
        assert!(!TestParameters::from_user_params(&raw).requires_bt_multiplex);
    }

    #[test]
    fn test_wifi_credentials_by_band() {
        let mut p = TestParameters::default();
        p.set_wifi_credentials(Some(WifiBand::FiveGDfs), "dfs".into(), "pw".into());
        p.set_wifi_credentials(None, "any".into(), "pw2".into());
        assert_eq!(p.wifi_credentials(Some(WifiBand::FiveGDfs)), ("dfs", "pw"));
        assert_eq!(p.wifi_credentials(None), ("any", "pw2"));
        assert_eq!(p.wifi_credentials(Some(WifiBand::TwoG)), ("", ""));
        assert_eq!(p.sta_credentials(WifiBand::TwoG), ("any", "pw2"));
        assert_eq!(p.sta_credentials(WifiBand::FiveGDfs), ("dfs", "pw"));
    }
}
