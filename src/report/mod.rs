//! Structured test records
//!
//! Records are appended as JSON lines to `records.jsonl` in the output
//! directory. Each line is a property set at run, class or test granularity.

use crate::defaults;
use crate::device::DeviceHandle;
use crate::error::Result;
use crate::executor::RepeatPolicy;
use crate::models::{IterationReport, NcPerformanceTestMetrics, SingleTestResult, TestResultStats};
use crate::stats::ClassStatistics;
use crate::types::NearbyMedium;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// State shared by every class of one run
#[derive(Debug)]
pub struct RunContext {
    token: Uuid,
    run_identifier_recorded: AtomicBool,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4(),
            run_identifier_recorded: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// True exactly once per run
    pub fn claim_run_identifier(&self) -> bool {
        !self.run_identifier_recorded.swap(true, Ordering::SeqCst)
    }

    pub fn run_identifier_recorded(&self) -> bool {
        self.run_identifier_recorded.load(Ordering::SeqCst)
    }
}

/// `{test_version:<version>, target_cuj:<name>}`
pub fn run_identifier(target_cuj_name: &str) -> String {
    format!(
        "{{test_version:{}, target_cuj:{}}}",
        crate::TEST_SCRIPT_VERSION,
        target_cuj_name
    )
}

/// One line of `records.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub run_token: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    pub properties: BTreeMap<String, Value>,
}

/// Appends the records of one test class
pub struct ResultRecorder {
    path: PathBuf,
    output_dir: PathBuf,
    class_tag: String,
    run_token: Uuid,
    records: Vec<Record>,
}

impl ResultRecorder {
    /// Create the output directory; records are appended to an existing file
    pub async fn create(output_dir: &Path, class_tag: &str, run: &RunContext) -> Result<Self> {
        tokio::fs::create_dir_all(output_dir).await?;
        Ok(Self {
            path: output_dir.join(defaults::RECORDS_FILE_NAME),
            output_dir: output_dir.to_path_buf(),
            class_tag: class_tag.to_string(),
            run_token: run.token(),
            records: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory for per-test artifacts such as bug reports
    pub fn test_output_dir(&self, test_name: &str) -> PathBuf {
        self.output_dir.join(&self.class_tag).join(test_name)
    }

    /// Records written by this recorder, in order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Record the run identifier unless another class already did
    pub async fn record_run_identifier(&mut self, run: &RunContext, target_cuj_name: &str) -> Result<bool> {
        if !run.claim_run_identifier() {
            return Ok(false);
        }
        let mut properties = BTreeMap::new();
        properties.insert("run_identifier".to_string(), Value::String(run_identifier(target_cuj_name)));
        self.append(None, None, properties).await?;
        Ok(true)
    }

    /// Properties attached to one test of the class
    pub async fn record_test_properties(&mut self, test_name: &str, properties: &[(&str, &str)]) -> Result<()> {
        let properties = properties
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        self.append(Some(self.class_tag.clone()), Some(test_name.to_string()), properties)
            .await
    }

    /// `{result, quality_info}` of a finished iteration
    pub async fn record_iteration(&mut self, test_name: &str, report: &IterationReport) -> Result<()> {
        let mut properties = BTreeMap::new();
        properties.insert("result".to_string(), Value::String(report.result.clone()));
        properties.insert("quality_info".to_string(), serde_json::to_value(&report.quality_info)?);
        self.append(Some(self.class_tag.clone()), Some(test_name.to_string()), properties)
            .await
    }

    pub async fn record_class_summary(&mut self, summary: &ClassSummary) -> Result<()> {
        let properties = summary
            .properties()
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        self.append(Some(self.class_tag.clone()), None, properties).await
    }

    pub async fn record_skip(&mut self, reason: &str) -> Result<()> {
        let mut properties = BTreeMap::new();
        properties.insert("skip_reason".to_string(), Value::String(reason.to_string()));
        self.append(Some(self.class_tag.clone()), None, properties).await
    }

    async fn append(
        &mut self,
        test_class: Option<String>,
        test_name: Option<String>,
        properties: BTreeMap<String, Value>,
    ) -> Result<()> {
        let record = Record {
            timestamp: Utc::now(),
            run_token: self.run_token,
            test_class,
            test_name,
            properties,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.records.push(record);
        Ok(())
    }
}

/// Inputs of the class summary
pub struct SummaryInput<'a> {
    pub class_tag: &'a str,
    pub policy: RepeatPolicy,
    pub results: &'a [SingleTestResult],
    pub metrics: &'a NcPerformanceTestMetrics,
    pub use_prior_bt: bool,
    pub upgrade_medium: NearbyMedium,
    pub discoverer: &'a DeviceHandle,
    pub advertiser: &'a DeviceHandle,
}

/// Verdict and statistics of a finished class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class_tag: String,
    pub required_iterations: u32,
    pub finished_iterations: usize,
    pub success_count: usize,
    pub passed: bool,
    pub verdict: String,
    pub detailed_stats: Vec<String>,
    pub source_device: Vec<String>,
    pub target_device: Vec<String>,
    pub target_build_id: String,
    pub target_model: String,
    pub target_wifi_chipset: String,
    pub statistics: ClassStatistics,
}

fn latency_line(label: &str, unit: &str, stats: &TestResultStats) -> String {
    format!(
        "  - Min / Median / Max {} ({} {}): {:.1} / {:.1} / {:.1}s",
        label, stats.success_count, unit, stats.min_val, stats.median_val, stats.max_val
    )
}

fn device_lines(handle: &DeviceHandle) -> Vec<String> {
    handle
        .summary_attributes()
        .into_iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect()
}

impl ClassSummary {
    pub fn build(input: &SummaryInput<'_>) -> Self {
        let success_count = input.results.iter().filter(|r| r.is_success()).count();
        let passed = success_count >= input.policy.required_successes();
        let verdict = if passed {
            "PASS".to_string()
        } else {
            format!("FAIL: low successes - {}", success_count)
        };
        let statistics = ClassStatistics::from_metrics(input.metrics);

        let mut detailed_stats = vec![
            format!("Required Iterations: {}", input.policy.count),
            format!("Finished Iterations: {}", input.results.len()),
            "Failed Iterations:".to_string(),
        ];
        let failed: Vec<String> = input
            .results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| format!("  - {}: {}", r.iteration, r.result_message))
            .collect();
        if failed.is_empty() {
            detailed_stats.push("  - NA".to_string());
        } else {
            detailed_stats.extend(failed);
        }

        detailed_stats.push("File Transfer Connection Stats:".to_string());
        detailed_stats.push(latency_line(
            "Discovery Latency",
            "discovery",
            &statistics.file_transfer_discovery,
        ));
        detailed_stats.push(latency_line(
            "Connection Latency",
            "connections",
            &statistics.file_transfer_connection,
        ));
        let speed = &statistics.file_transfer_throughput;
        detailed_stats.push(format!(
            "  - Min / Median / Max Speed ({} transfer): {:.1} / {:.1} / {:.1} MBps",
            speed.success_count, speed.min_val, speed.median_val, speed.max_val
        ));
        if input.upgrade_medium.is_high_quality() {
            detailed_stats.push(latency_line("Upgrade Latency", "upgrade", &statistics.medium_upgrade));
            detailed_stats.push("  - Upgrade Medium Stats:".to_string());
            for (name, count) in &statistics.upgrade_mediums {
                detailed_stats.push(format!("    - {}: {}", name, count));
            }
        }

        if input.use_prior_bt {
            detailed_stats.push("Prior BT Connection Stats:".to_string());
            detailed_stats.push(latency_line("Discovery Latency", "discovery", &statistics.prior_bt_discovery));
            detailed_stats.push(latency_line(
                "Connection Latency",
                "connections",
                &statistics.prior_bt_connection,
            ));
        }

        Self {
            class_tag: input.class_tag.to_string(),
            required_iterations: input.policy.count,
            finished_iterations: input.results.len(),
            success_count,
            passed,
            verdict,
            detailed_stats,
            source_device: device_lines(input.discoverer),
            target_device: device_lines(input.advertiser),
            target_build_id: input.advertiser.build_id.clone(),
            target_model: input.advertiser.model.clone(),
            target_wifi_chipset: input.advertiser.capabilities.wifi_chipset.clone(),
            statistics,
        }
    }

    /// Class-level properties in report order
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("00_test_script_verion".to_string(), crate::TEST_SCRIPT_VERSION.to_string());
        properties.insert("01_test_result".to_string(), self.verdict.clone());
        properties.insert("02_source_device".to_string(), self.source_device.join("\n"));
        properties.insert("03_target_device".to_string(), self.target_device.join("\n"));
        properties.insert("04_detailed_stats".to_string(), self.detailed_stats.join("\n"));
        properties.insert("05_target_build_id".to_string(), self.target_build_id.clone());
        properties.insert("06_target_model".to_string(), self.target_model.clone());
        properties.insert("07_target_wifi_chipset".to_string(), self.target_wifi_chipset.clone());
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{SimDeviceSpec, SimulatedDevice};
    use crate::models::ConnectionSetupQualityInfo;
    use crate::types::{DeviceRole, NearbyConnectionMedium, SingleTestFailureReason};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn handle(serial: &str, role: DeviceRole) -> DeviceHandle {
        let device = SimulatedDevice::new(SimDeviceSpec::new(serial, "Pixel 8"));
        let mut handle = DeviceHandle::new(Arc::new(device), role);
        handle.model = "Pixel 8".to_string();
        handle.build_id = "AP2A".to_string();
        handle.wifi_firmware = format!("FW-{}", serial);
        handle.capabilities.wifi_chipset = "wcn6740".to_string();
        handle
    }

    fn result(iteration: u32, reason: SingleTestFailureReason, message: &str) -> SingleTestResult {
        let mut result = SingleTestResult::new(iteration);
        result.failure_reason = reason;
        result.result_message = message.to_string();
        if reason.is_success() {
            result.file_transfer_quality_info = ConnectionSetupQualityInfo {
                discovery_latency: Duration::from_secs(2),
                connection_latency: Duration::from_secs(1),
                medium_upgrade_latency: Duration::from_secs(3),
                medium_upgrade_expected: true,
                upgrade_medium: Some(NearbyConnectionMedium::WifiLan),
            };
            result.file_transfer_throughput_kbps = 4096.0;
        }
        result
    }

    fn summary(results: &[SingleTestResult], policy: RepeatPolicy, use_prior_bt: bool) -> ClassSummary {
        let mut metrics = NcPerformanceTestMetrics::default();
        for r in results {
            metrics.collect(r, use_prior_bt);
        }
        let discoverer = handle("SRC", DeviceRole::SourceDevice);
        let advertiser = handle("TGT", DeviceRole::TargetDevice);
        ClassSummary::build(&SummaryInput {
            class_tag: "Scc2gAllWifiStaTest",
            policy,
            results,
            metrics: &metrics,
            use_prior_bt,
            upgrade_medium: NearbyMedium::UpgradeToAllWifi,
            discoverer: &discoverer,
            advertiser: &advertiser,
        })
    }

    #[test]
    fn test_run_identifier_claimed_once() {
        let run = RunContext::new();
        assert!(!run.run_identifier_recorded());
        assert!(run.claim_run_identifier());
        assert!(!run.claim_run_identifier());
        assert!(run.run_identifier_recorded());
        assert_eq!(
            run_identifier("quick_start"),
            format!("{{test_version:{}, target_cuj:quick_start}}", crate::TEST_SCRIPT_VERSION)
        );
    }

    #[test]
    fn test_summary_all_passed() {
        let results: Vec<_> = (0..10)
            .map(|i| result(i, SingleTestFailureReason::Success, "PASS"))
            .collect();
        let summary = summary(&results, RepeatPolicy::new(10, 2), false);
        assert!(summary.passed);
        assert_eq!(summary.verdict, "PASS");
        assert_eq!(
            summary.detailed_stats[..4],
            [
                "Required Iterations: 10".to_string(),
                "Finished Iterations: 10".to_string(),
                "Failed Iterations:".to_string(),
                "  - NA".to_string(),
            ]
        );
        assert!(summary
            .detailed_stats
            .contains(&"  - Min / Median / Max Speed (10 transfer): 4.0 / 4.0 / 4.0 MBps".to_string()));
        assert!(summary.detailed_stats.contains(&"    - WIFI_LAN: 10".to_string()));
        assert!(!summary.detailed_stats.contains(&"Prior BT Connection Stats:".to_string()));
    }

    #[test]
    fn test_summary_low_successes() {
        let results = vec![
            result(0, SingleTestFailureReason::Success, "PASS"),
            result(1, SingleTestFailureReason::SourceStartDiscovery, "SOURCE_START_DISCOVERY - tip"),
            result(2, SingleTestFailureReason::SourceStartDiscovery, "SOURCE_START_DISCOVERY - tip"),
        ];
        let summary = summary(&results, RepeatPolicy::new(10, 2), true);
        assert!(!summary.passed);
        assert_eq!(summary.verdict, "FAIL: low successes - 1");
        assert!(summary
            .detailed_stats
            .contains(&"  - 1: SOURCE_START_DISCOVERY - tip".to_string()));
        assert!(summary.detailed_stats.contains(&"Prior BT Connection Stats:".to_string()));

        let properties = summary.properties();
        assert_eq!(properties["01_test_result"], "FAIL: low successes - 1");
        let source: Vec<&str> = properties["02_source_device"].lines().collect();
        assert_eq!(
            &source[..5],
            ["serial: SRC", "model: Pixel 8", "build_info: AP2A", "wifi_chipset: wcn6740", "wifi_fw: FW-SRC"]
        );
        assert!(properties["03_target_device"].contains("wifi_fw: FW-TGT"));
        assert!(properties["03_target_device"].contains("build_info: AP2A"));
        assert_eq!(properties["07_target_wifi_chipset"], "wcn6740");
        assert_eq!(properties["05_target_build_id"], "AP2A");
        assert_eq!(properties.len(), 8);
    }

    #[tokio::test]
    async fn test_recorder_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let run = RunContext::new();
        let mut first = ResultRecorder::create(dir.path(), "Scc2gAllWifiStaTest", &run).await.unwrap();
        let mut second = ResultRecorder::create(dir.path(), "BtPerformanceTest", &run).await.unwrap();

        assert!(first.record_run_identifier(&run, "unspecified").await.unwrap());
        assert!(!second.record_run_identifier(&run, "unspecified").await.unwrap());
        first
            .record_iteration(
                "test_scc_2g_all_wifi_sta",
                &IterationReport {
                    result: "PASS".to_string(),
                    quality_info: vec!["file_transfer_speed: 4.0MBps".to_string()],
                },
            )
            .await
            .unwrap();
        second.record_skip("Wifi AP is not ready for this test.").await.unwrap();

        let content = tokio::fs::read_to_string(first.path()).await.unwrap();
        let records: Vec<Record> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.run_token == run.token()));
        assert!(records[0].test_class.is_none());
        assert_eq!(records[1].properties["result"], "PASS");
        assert_eq!(records[2].test_class.as_deref(), Some("BtPerformanceTest"));
        assert_eq!(first.records().len(), 2);
    }
}
