//! Non-fatal checks on resolved parameters

use super::params::{RejectedParam, TestParameters};
use super::raw::{file_entry, UserParams};
use crate::types::{AgentSlot, PayloadType};
use colored::Colorize;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Collect every warning for a parameter set
    pub fn validate(
        params: &TestParameters,
        raw: &UserParams,
        rejected: &[RejectedParam],
    ) -> Vec<ValidationWarning> {
        let mut warnings: Vec<ValidationWarning> = rejected
            .iter()
            .map(|r| {
                ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("Ignoring {}='{}', using the default instead: {}", r.key, r.value, r.reason),
                )
            })
            .collect();

        warnings.extend(Self::validate_keep_alive(params));
        warnings.extend(Self::validate_access_point(params, raw));
        warnings.extend(Self::validate_agent_files(params, raw));

        if params.payload_type == PayloadType::Stream {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Payload type STREAM selected; throughput benchmarks assume FILE payloads".to_string(),
            ));
        }
        if params.allow_unrooted_device {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Unrooted devices are allowed; some device settings may not apply".to_string(),
            ));
        }

        warnings
    }

    fn validate_keep_alive(params: &TestParameters) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if params.keep_alive_timeout_ms == 0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "keep_alive_timeout_ms is 0; the connection stack default will be used".to_string(),
            ));
        } else if params.keep_alive_interval_ms >= params.keep_alive_timeout_ms {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "keep_alive_interval_ms ({}) is not shorter than keep_alive_timeout_ms ({}); connections may drop between keep-alives",
                    params.keep_alive_interval_ms, params.keep_alive_timeout_ms
                ),
            ));
        }
        warnings
    }

    fn validate_access_point(params: &TestParameters, raw: &UserParams) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let has_credentials = [
            &params.wifi_2g_ssid,
            &params.wifi_5g_ssid,
            &params.wifi_dfs_5g_ssid,
            &params.wifi_ssid,
        ]
        .iter()
        .any(|ssid| !ssid.is_empty());

        if params.use_auto_controlled_wifi_ap && has_credentials {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Controlled AP requested; the credentials of the selected band will be overwritten".to_string(),
            ));
        }
        if !params.use_auto_controlled_wifi_ap && raw.contains_key("wifi_channel") {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "wifi_channel is ignored unless use_auto_controlled_wifi_ap is true".to_string(),
            ));
        }
        warnings
    }

    fn validate_agent_files(params: &TestParameters, raw: &UserParams) -> Vec<ValidationWarning> {
        let mut required = vec![AgentSlot::Primary];
        if params.requires_bt_multiplex {
            required.push(AgentSlot::Secondary);
        }
        if params.requires_3p_api_test {
            required.push(AgentSlot::ThirdParty);
        }

        required
            .into_iter()
            .filter(|slot| file_entry(raw, slot.apk_file_key()).is_none())
            .map(|slot| {
                ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!(
                        "No '{}' apk path under files/mh_files; {} must already be installed",
                        slot.apk_file_key(),
                        slot.package_name()
                    ),
                )
            })
            .collect()
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        let tag = if use_color {
            match self.level {
                ValidationLevel::Info => tag.blue().to_string(),
                ValidationLevel::Warning => tag.yellow().to_string(),
                ValidationLevel::Error => tag.red().to_string(),
            }
        } else {
            tag
        };
        format!("{} {}", tag, self.message)
    }
}

/// Convenience wrapper around [`ConfigValidator::validate`]
pub fn validate_parameters(
    params: &TestParameters,
    raw: &UserParams,
    rejected: &[RejectedParam],
) -> Vec<ValidationWarning> {
    ConfigValidator::validate(params, raw, rejected)
}
