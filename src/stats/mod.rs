//! Statistics over the metric series of a test class
//!
//! Every series holds one entry per finished iteration. Iterations that never
//! reached a phase carry the unset sentinel and are excluded, so
//! `success_count` is the number of iterations that did reach it.

use crate::defaults::{PERCENTILE_50_FACTOR, UNSET_LATENCY, UNSET_THROUGHPUT_KBPS};
use crate::models::{round_precision, NcPerformanceTestMetrics, TestResultStats};
use crate::types::NearbyConnectionMedium;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn median_index(len: usize) -> usize {
    ((len as f64 * PERCENTILE_50_FACTOR) as usize).min(len.saturating_sub(1))
}

/// Latency statistics in seconds
pub fn latency_stats(latencies: &[Duration]) -> TestResultStats {
    let mut reached: Vec<f64> = latencies
        .iter()
        .filter(|latency| **latency != UNSET_LATENCY)
        .map(Duration::as_secs_f64)
        .collect();
    if reached.is_empty() {
        return TestResultStats::default();
    }
    reached.sort_by(f64::total_cmp);

    TestResultStats {
        success_count: reached.len(),
        min_val: round_precision(reached[0]),
        median_val: round_precision(reached[median_index(reached.len())]),
        max_val: round_precision(reached[reached.len() - 1]),
    }
}

/// Throughput statistics in MB/s from KB/s samples
pub fn throughput_stats(throughputs_kbps: &[f64]) -> TestResultStats {
    let mut reached: Vec<f64> = throughputs_kbps
        .iter()
        .copied()
        .filter(|kbps| *kbps != UNSET_THROUGHPUT_KBPS)
        .collect();
    if reached.is_empty() {
        return TestResultStats::default();
    }
    // Descending: the median index is taken from the fast end
    reached.sort_by(|a, b| b.total_cmp(a));

    let mbps = |kbps: f64| round_precision(kbps / 1024.0);
    TestResultStats {
        success_count: reached.len(),
        min_val: mbps(reached[reached.len() - 1]),
        median_val: mbps(reached[median_index(reached.len())]),
        max_val: mbps(reached[0]),
    }
}

/// Count of iterations per negotiated upgrade medium
pub fn medium_histogram(mediums: &[Option<NearbyConnectionMedium>]) -> BTreeMap<NearbyConnectionMedium, usize> {
    let mut histogram = BTreeMap::new();
    for medium in mediums.iter().flatten() {
        *histogram.entry(*medium).or_insert(0) += 1;
    }
    histogram
}

/// All statistics the class summary reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub prior_bt_discovery: TestResultStats,
    pub prior_bt_connection: TestResultStats,
    pub discoverer_wifi_sta: TestResultStats,
    pub advertiser_wifi_sta: TestResultStats,
    pub file_transfer_discovery: TestResultStats,
    pub file_transfer_connection: TestResultStats,
    pub medium_upgrade: TestResultStats,
    pub file_transfer_throughput: TestResultStats,
    /// Keyed by medium name
    pub upgrade_mediums: BTreeMap<String, usize>,
}

impl ClassStatistics {
    pub fn from_metrics(metrics: &NcPerformanceTestMetrics) -> Self {
        Self {
            prior_bt_discovery: latency_stats(&metrics.prior_bt_discovery_latencies),
            prior_bt_connection: latency_stats(&metrics.prior_bt_connection_latencies),
            discoverer_wifi_sta: latency_stats(&metrics.discoverer_wifi_sta_latencies),
            advertiser_wifi_sta: latency_stats(&metrics.advertiser_wifi_sta_latencies),
            file_transfer_discovery: latency_stats(&metrics.file_transfer_discovery_latencies),
            file_transfer_connection: latency_stats(&metrics.file_transfer_connection_latencies),
            medium_upgrade: latency_stats(&metrics.medium_upgrade_latencies),
            file_transfer_throughput: throughput_stats(&metrics.file_transfer_throughputs_kbps),
            upgrade_mediums: medium_histogram(&metrics.upgraded_wifi_transfer_mediums)
                .into_iter()
                .map(|(medium, count)| (medium.name().to_string(), count))
                .collect(),
        }
    }
}
