//! Connection setup timeouts and quality measurements

use crate::defaults::{self, UNSET_LATENCY};
use crate::types::NearbyConnectionMedium;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Latencies serialize as seconds; the unset sentinel serializes as `null`
pub mod latency_secs {
    use super::UNSET_LATENCY;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if *latency == UNSET_LATENCY {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(&latency.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(match secs {
            Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
            _ => UNSET_LATENCY,
        })
    }
}

/// Round to the reporting precision (one decimal digit)
pub fn round_precision(value: f64) -> f64 {
    let factor = 10f64.powi(defaults::LATENCY_PRECISION_DIGITS);
    (value * factor).round() / factor
}

/// Render a latency the way reports show it: `"2.5s"`, or `"N/A"` when unset
pub fn format_latency(latency: Duration) -> String {
    if latency == UNSET_LATENCY {
        "N/A".to_string()
    } else {
        format!("{:.1}s", round_precision(latency.as_secs_f64()))
    }
}

/// Per-phase deadlines of one connection attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSetupTimeouts {
    pub discovery_timeout: Option<Duration>,
    pub connection_init_timeout: Option<Duration>,
    pub connection_result_timeout: Option<Duration>,
}

impl ConnectionSetupTimeouts {
    /// Deadlines for the first connection of a trial
    pub fn first() -> Self {
        Self {
            discovery_timeout: Some(defaults::FIRST_DISCOVERY_TIMEOUT),
            connection_init_timeout: Some(defaults::FIRST_CONNECTION_INIT_TIMEOUT),
            connection_result_timeout: Some(defaults::FIRST_CONNECTION_RESULT_TIMEOUT),
        }
    }

    /// Deadlines for a connection set up while a prior BT connection is alive
    pub fn second() -> Self {
        Self {
            discovery_timeout: Some(defaults::SECOND_DISCOVERY_TIMEOUT),
            connection_init_timeout: Some(defaults::SECOND_CONNECTION_INIT_TIMEOUT),
            connection_result_timeout: Some(defaults::SECOND_CONNECTION_RESULT_TIMEOUT),
        }
    }

    pub fn discovery(&self) -> Duration {
        self.discovery_timeout.unwrap_or(defaults::FIRST_DISCOVERY_TIMEOUT)
    }

    pub fn connection_init(&self) -> Duration {
        self.connection_init_timeout
            .unwrap_or(defaults::FIRST_CONNECTION_INIT_TIMEOUT)
    }

    pub fn connection_result(&self) -> Duration {
        self.connection_result_timeout
            .unwrap_or(defaults::FIRST_CONNECTION_RESULT_TIMEOUT)
    }
}

/// Quality measurements of one connection setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSetupQualityInfo {
    #[serde(with = "latency_secs")]
    pub discovery_latency: Duration,
    #[serde(with = "latency_secs")]
    pub connection_latency: Duration,
    #[serde(with = "latency_secs")]
    pub medium_upgrade_latency: Duration,
    pub medium_upgrade_expected: bool,
    /// Medium the stack actually upgraded to
    pub upgrade_medium: Option<NearbyConnectionMedium>,
}

impl Default for ConnectionSetupQualityInfo {
    fn default() -> Self {
        Self {
            discovery_latency: UNSET_LATENCY,
            connection_latency: UNSET_LATENCY,
            medium_upgrade_latency: UNSET_LATENCY,
            medium_upgrade_expected: false,
            upgrade_medium: None,
        }
    }
}

impl ConnectionSetupQualityInfo {
    /// Report form: `discovery`, `connection`, then `upgrade` only when an
    /// upgrade was expected and `medium` only when one was negotiated
    pub fn summary(&self) -> BTreeMap<&'static str, String> {
        let mut summary = BTreeMap::new();
        summary.insert("discovery", format_latency(self.discovery_latency));
        summary.insert("connection", format_latency(self.connection_latency));
        if self.medium_upgrade_expected {
            summary.insert("upgrade", format_latency(self.medium_upgrade_latency));
        }
        if let Some(medium) = self.upgrade_medium {
            summary.insert("medium", medium.name().to_string());
        }
        summary
    }

    /// One-line rendering of [`ConnectionSetupQualityInfo::summary`]
    pub fn summary_line(&self) -> String {
        let order = ["discovery", "connection", "upgrade", "medium"];
        let summary = self.summary();
        let parts: Vec<String> = order
            .iter()
            .filter_map(|key| summary.get(key).map(|value| format!("'{}': '{}'", key, value)))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_resolve_to_first_defaults() {
        let timeouts = ConnectionSetupTimeouts::default();
        assert_eq!(timeouts.discovery(), Duration::from_secs(30));
        assert_eq!(timeouts.connection_init(), Duration::from_secs(30));
        assert_eq!(timeouts.connection_result(), Duration::from_secs(35));

        let partial = ConnectionSetupTimeouts {
            discovery_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert_eq!(partial.discovery(), Duration::from_secs(5));
        assert_eq!(partial.connection_result(), Duration::from_secs(35));

        assert_eq!(ConnectionSetupTimeouts::second().connection_init(), Duration::from_secs(10));
    }

    #[test]
    fn test_summary_without_upgrade() {
        let info = ConnectionSetupQualityInfo {
            discovery_latency: Duration::from_millis(2_340),
            connection_latency: Duration::from_millis(1_060),
            ..Default::default()
        };
        let summary = info.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary["discovery"], "2.3s");
        assert_eq!(summary["connection"], "1.1s");
    }

    #[test]
    fn test_summary_with_upgrade_and_medium() {
        let info = ConnectionSetupQualityInfo {
            discovery_latency: Duration::from_secs(2),
            connection_latency: Duration::from_secs(1),
            medium_upgrade_latency: Duration::from_millis(3_460),
            medium_upgrade_expected: true,
            upgrade_medium: Some(NearbyConnectionMedium::WifiDirect),
        };
        assert_eq!(
            info.summary_line(),
            "{'discovery': '2.0s', 'connection': '1.0s', 'upgrade': '3.5s', 'medium': 'WIFI_DIRECT'}"
        );
    }

    #[test]
    fn test_unset_latency_renders_as_na() {
        let info = ConnectionSetupQualityInfo {
            medium_upgrade_expected: true,
            ..Default::default()
        };
        let summary = info.summary();
        assert_eq!(summary["discovery"], "N/A");
        assert_eq!(summary["upgrade"], "N/A");
        assert!(!summary.contains_key("medium"));
    }

    #[test]
    fn test_latency_serialization() {
        let info = ConnectionSetupQualityInfo {
            discovery_latency: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["discovery_latency"], serde_json::json!(1.5));
        assert!(json["connection_latency"].is_null());

        let back: ConnectionSetupQualityInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back.connection_latency, UNSET_LATENCY);
        assert_eq!(back.discovery_latency, Duration::from_millis(1500));
    }
}
