//! Per-iteration results and the metric series collected from them

use super::quality::{latency_secs, round_precision, ConnectionSetupQualityInfo};
use crate::defaults::{UNSET_LATENCY, UNSET_THROUGHPUT_KBPS};
use crate::types::{NearbyConnectionMedium, SingleTestFailureReason};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one iteration; frozen once appended to the class history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTestResult {
    /// Zero-based index among finished iterations
    pub iteration: u32,
    /// The prior BT connection failed, so `failure_reason` is its reason
    pub is_failed_with_prior_bt: bool,
    pub failure_reason: SingleTestFailureReason,
    pub result_message: String,
    pub prior_bt_quality_info: ConnectionSetupQualityInfo,
    pub file_transfer_quality_info: ConnectionSetupQualityInfo,
    /// KB per second, or the unset sentinel when no transfer completed
    pub file_transfer_throughput_kbps: f64,
    #[serde(with = "latency_secs")]
    pub discoverer_sta_latency: Duration,
    #[serde(with = "latency_secs")]
    pub advertiser_sta_latency: Duration,
    pub discoverer_sta_expected: bool,
    pub advertiser_sta_expected: bool,
}

impl SingleTestResult {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            is_failed_with_prior_bt: false,
            failure_reason: SingleTestFailureReason::Uninitialized,
            result_message: String::new(),
            prior_bt_quality_info: ConnectionSetupQualityInfo::default(),
            file_transfer_quality_info: ConnectionSetupQualityInfo::default(),
            file_transfer_throughput_kbps: UNSET_THROUGHPUT_KBPS,
            discoverer_sta_latency: UNSET_LATENCY,
            advertiser_sta_latency: UNSET_LATENCY,
            discoverer_sta_expected: false,
            advertiser_sta_expected: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_success()
    }

    /// Throughput in MB per second at reporting precision
    pub fn throughput_mbps(&self) -> Option<f64> {
        if self.file_transfer_throughput_kbps == UNSET_THROUGHPUT_KBPS {
            None
        } else {
            Some(round_precision(self.file_transfer_throughput_kbps / 1024.0))
        }
    }

    /// The `quality_info` lines of the per-iteration report
    pub fn quality_info_lines(&self, use_prior_bt: bool) -> Vec<String> {
        let mut lines = Vec::new();
        if use_prior_bt {
            lines.push(format!("prior_bt_connection:{}", self.prior_bt_quality_info.summary_line()));
        }
        lines.push(format!(
            "file_transfer_connection_quality_info:{}",
            self.file_transfer_quality_info.summary_line()
        ));
        lines.push(match self.throughput_mbps() {
            Some(mbps) => format!("file_transfer_speed: {:.1}MBps", mbps),
            None => "file_transfer_speed: N/A".to_string(),
        });
        if self.discoverer_sta_expected {
            lines.push(format!("src_wifi_connection: {}", whole_seconds(self.discoverer_sta_latency)));
        }
        if self.advertiser_sta_expected {
            lines.push(format!("tgt_wifi_connection: {}", whole_seconds(self.advertiser_sta_latency)));
        }
        lines
    }

    /// Per-iteration report as written to the test record
    pub fn iteration_report(&self, use_prior_bt: bool) -> IterationReport {
        IterationReport {
            result: self.result_message.clone(),
            quality_info: self.quality_info_lines(use_prior_bt),
        }
    }
}

fn whole_seconds(latency: Duration) -> String {
    if latency == UNSET_LATENCY {
        "N/A".to_string()
    } else {
        format!("{}s", latency.as_secs_f64().round())
    }
}

/// `{result, quality_info}` pair recorded for every iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub result: String,
    pub quality_info: Vec<String>,
}

/// Metric series of a class, one entry per finished iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NcPerformanceTestMetrics {
    pub prior_bt_discovery_latencies: Vec<Duration>,
    pub prior_bt_connection_latencies: Vec<Duration>,
    pub discoverer_wifi_sta_latencies: Vec<Duration>,
    pub advertiser_wifi_sta_latencies: Vec<Duration>,
    pub file_transfer_discovery_latencies: Vec<Duration>,
    pub file_transfer_connection_latencies: Vec<Duration>,
    /// Only iterations that expected an upgrade contribute
    pub medium_upgrade_latencies: Vec<Duration>,
    pub file_transfer_throughputs_kbps: Vec<f64>,
    pub upgraded_wifi_transfer_mediums: Vec<Option<NearbyConnectionMedium>>,
}

impl NcPerformanceTestMetrics {
    /// Append the measurements of a finished iteration
    pub fn collect(&mut self, result: &SingleTestResult, use_prior_bt: bool) {
        if use_prior_bt {
            self.prior_bt_discovery_latencies
                .push(result.prior_bt_quality_info.discovery_latency);
            self.prior_bt_connection_latencies
                .push(result.prior_bt_quality_info.connection_latency);
        }

        let transfer = &result.file_transfer_quality_info;
        self.file_transfer_discovery_latencies.push(transfer.discovery_latency);
        self.file_transfer_connection_latencies.push(transfer.connection_latency);
        self.upgraded_wifi_transfer_mediums.push(transfer.upgrade_medium);
        self.file_transfer_throughputs_kbps
            .push(result.file_transfer_throughput_kbps);
        self.discoverer_wifi_sta_latencies.push(result.discoverer_sta_latency);
        self.advertiser_wifi_sta_latencies.push(result.advertiser_sta_latency);
        if transfer.medium_upgrade_expected {
            self.medium_upgrade_latencies.push(transfer.medium_upgrade_latency);
        }
    }
}

/// `(success_count, min, median, max)` over the samples that reached a phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResultStats {
    pub success_count: usize,
    pub min_val: f64,
    pub median_val: f64,
    pub max_val: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgraded_result() -> SingleTestResult {
        let mut result = SingleTestResult::new(0);
        result.failure_reason = SingleTestFailureReason::Success;
        result.result_message = "PASS".to_string();
        result.file_transfer_quality_info = ConnectionSetupQualityInfo {
            discovery_latency: Duration::from_secs(2),
            connection_latency: Duration::from_secs(1),
            medium_upgrade_latency: Duration::from_secs(3),
            medium_upgrade_expected: true,
            upgrade_medium: Some(NearbyConnectionMedium::WifiLan),
        };
        result.file_transfer_throughput_kbps = 5120.0;
        result.discoverer_sta_expected = true;
        result.discoverer_sta_latency = Duration::from_millis(2_600);
        result
    }

    #[test]
    fn test_new_result_is_unset() {
        let result = SingleTestResult::new(3);
        assert_eq!(result.failure_reason, SingleTestFailureReason::Uninitialized);
        assert!(!result.is_success());
        assert_eq!(result.throughput_mbps(), None);
        assert_eq!(result.discoverer_sta_latency, UNSET_LATENCY);
    }

    #[test]
    fn test_quality_info_lines() {
        let lines = upgraded_result().quality_info_lines(false);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("file_transfer_connection_quality_info:{'discovery': '2.0s'"));
        assert_eq!(lines[1], "file_transfer_speed: 5.0MBps");
        assert_eq!(lines[2], "src_wifi_connection: 3s");

        let with_bt = upgraded_result().quality_info_lines(true);
        assert!(with_bt[0].starts_with("prior_bt_connection:{'discovery': 'N/A'"));
    }

    #[test]
    fn test_collect_upgrade_latency_only_when_expected() {
        let mut metrics = NcPerformanceTestMetrics::default();
        metrics.collect(&upgraded_result(), false);

        let mut failed = SingleTestResult::new(1);
        failed.failure_reason = SingleTestFailureReason::SourceStartDiscovery;
        metrics.collect(&failed, false);

        assert_eq!(metrics.file_transfer_discovery_latencies.len(), 2);
        assert_eq!(metrics.medium_upgrade_latencies, vec![Duration::from_secs(3)]);
        assert_eq!(
            metrics.upgraded_wifi_transfer_mediums,
            vec![Some(NearbyConnectionMedium::WifiLan), None]
        );
        assert!(metrics.prior_bt_discovery_latencies.is_empty());
    }

    #[test]
    fn test_result_serializes_with_names() {
        let json = serde_json::to_value(upgraded_result()).unwrap();
        assert_eq!(json["failure_reason"], "SUCCESS");
        assert_eq!(json["file_transfer_quality_info"]["upgrade_medium"], "WIFI_LAN");
        assert!(json["advertiser_sta_latency"].is_null());
    }
}
