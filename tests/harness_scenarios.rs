//! End-to-end class runs against the simulated testbed
//!
//! Every test runs on a paused tokio clock, so phase delays and timeouts
//! elapse instantly while keeping their ordering.

use nearby_perf_harness::access_point::AccessPointController;
use nearby_perf_harness::config::{RawValue, TestParameters, TestbedAccessPoint, UserParams};
use nearby_perf_harness::cuj::{BtPerformance, CujTestCase, Scc2gAllWifiSta};
use nearby_perf_harness::defaults::UNSET_LATENCY;
use nearby_perf_harness::device::sim::{SimDeviceSpec, SimFault, SimTimings, SimulatedAccessPoint, SimulatedDevice};
use nearby_perf_harness::device::DeviceController;
use nearby_perf_harness::harness::{run_suite, ClassStatus, NcTestClass, TestbedResources};
use nearby_perf_harness::logging::{Logger, LoggingConfig};
use nearby_perf_harness::report::RunContext;
use nearby_perf_harness::types::{DeviceRole, WifiBand};
use nearby_perf_harness::{AppError, ClassOutcome, Result, SingleTestFailureReason};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn quiet() -> Logger {
    Logger::with_config("TEST", &LoggingConfig::quiet())
}

fn raw(pairs: &[(&str, &str)]) -> UserParams {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), RawValue::from(*value)))
        .collect()
}

fn device(serial: &str) -> SimDeviceSpec {
    SimDeviceSpec::new(serial, "Pixel 8")
}

/// Testbed with two devices in the given order
fn testbed(
    devices: &[(&SimulatedDevice, Option<DeviceRole>)],
    raw: UserParams,
    access_point: Option<Arc<SimulatedAccessPoint>>,
    output_dir: &Path,
) -> TestbedResources {
    TestbedResources {
        params: TestParameters::from_user_params(&raw),
        raw,
        devices: devices
            .iter()
            .map(|(device, role)| (Arc::new((*device).clone()) as Arc<dyn DeviceController>, *role))
            .collect(),
        access_point: access_point.map(|ap| ap as Arc<dyn AccessPointController>),
        capability_overrides: None,
        output_dir: output_dir.to_path_buf(),
    }
}

fn lab_access_point() -> Arc<SimulatedAccessPoint> {
    Arc::new(SimulatedAccessPoint::new(TestbedAccessPoint {
        ssid: "ncperf-lab".to_string(),
        password: "lab-secret".to_string(),
    }))
}

fn read_records(output_dir: &Path) -> Vec<Value> {
    std::fs::read_to_string(output_dir.join("records.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn run_class(cuj: Box<dyn CujTestCase>, resources: &TestbedResources) -> Result<ClassOutcome> {
    NcTestClass::new(cuj, resources, &quiet()).run(&RunContext::new()).await
}

#[tokio::test(start_paused = true)]
async fn test_bt_class_passes_on_a_healthy_pair() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        UserParams::new(),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert_eq!(outcome.status, ClassStatus::Passed);
    assert_eq!(outcome.results.len(), 100);
    assert!(!outcome.breaker_tripped);
    assert!(outcome.bug_reports.is_empty());
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.verdict, "PASS");
    assert_eq!(summary.success_count, 100);
    assert_eq!(summary.statistics.file_transfer_discovery.success_count, 100);
    // BT only: no upgrade section
    assert!(!summary.detailed_stats.iter().any(|line| line.contains("Upgrade Latency")));
    assert_eq!(advertiser.excerpt_count(), 100);
    // Agents are unloaded at teardown
    assert!(advertiser.loaded_slots().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_latency_statistics_follow_device_timings() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB").with_timings(SimTimings {
        discovery: Duration::from_secs(7),
        ..SimTimings::default()
    }));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        UserParams::new(),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(BtPerformance), &resources).await.unwrap();

    let discovery = outcome.summary.unwrap().statistics.file_transfer_discovery;
    assert_eq!(discovery.success_count, 100);
    assert_eq!(discovery.min_val, 7.0);
    assert_eq!(discovery.max_val, 7.0);
}

#[tokio::test(start_paused = true)]
async fn test_positional_roles_advertise_from_first_device() {
    let dir = TempDir::new().unwrap();
    let first = SimulatedDevice::new(device("AAA"));
    let second = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&first, None), (&second, None)],
        raw(&[("fast_fail_on_any_error", "true")]),
        None,
        dir.path(),
    );

    run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert!(first.calls().iter().any(|call| call.starts_with("nearby.start_advertising")));
    assert!(second.calls().iter().any(|call| call.starts_with("nearby.request_connection")));
    assert!(!first.calls().iter().any(|call| call.starts_with("nearby.request_connection")));
}

#[tokio::test(start_paused = true)]
async fn test_declared_roles_override_device_order() {
    let dir = TempDir::new().unwrap();
    let source = SimulatedDevice::new(device("AAA"));
    let target = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[
            (&source, Some(DeviceRole::SourceDevice)),
            (&target, Some(DeviceRole::TargetDevice)),
        ],
        raw(&[("fast_fail_on_any_error", "true")]),
        None,
        dir.path(),
    );

    run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert!(target.calls().iter().any(|call| call.starts_with("nearby.start_advertising")));
    assert!(source.calls().iter().any(|call| call.starts_with("nearby.request_connection")));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_stops_after_consecutive_failures() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB").with_fault_always(SimFault::DiscoveryTimeout));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        UserParams::new(),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert_eq!(outcome.status, ClassStatus::Failed);
    assert!(outcome.breaker_tripped);
    // BT classes allow five consecutive errors; the rest are never run
    assert_eq!(outcome.results.len(), 5);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.failure_reason == SingleTestFailureReason::SourceStartDiscovery));
    assert!(outcome.results[0].result_message.starts_with("SOURCE_START_DISCOVERY - "));

    // One report per device for each of the five failures
    assert_eq!(outcome.bug_reports.len(), 10);
    assert_eq!(advertiser.bug_report_count(), 5);
    assert_eq!(discoverer.bug_report_count(), 5);

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.verdict, "FAIL: low successes - 0");
    assert_eq!(summary.finished_iterations, 5);
    assert!(summary.detailed_stats.contains(&"Required Iterations: 100".to_string()));
    assert!(summary.detailed_stats.contains(&"Finished Iterations: 5".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_fast_fail_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA").with_fault_always(SimFault::AdvertisingError));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("fast_fail_on_any_error", "true"), ("skip_bug_report", "true")]),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(
        outcome.results[0].failure_reason,
        SingleTestFailureReason::TargetStartAdvertising
    );
    assert!(outcome.bug_reports.is_empty());
    assert_eq!(advertiser.bug_report_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_access_point_feeds_sta_credentials() {
    let dir = TempDir::new().unwrap();
    let ap = lab_access_point();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("use_auto_controlled_wifi_ap", "true")]),
        Some(Arc::clone(&ap)),
        dir.path(),
    );

    let outcome = run_class(Box::new(Scc2gAllWifiSta), &resources).await.unwrap();

    assert_eq!(outcome.status, ClassStatus::Passed);
    assert_eq!(outcome.results.len(), 10);
    let requests = ap.start_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].channel, Some(WifiBand::TwoG.channel()));
    assert_eq!(requests[0].country_code, "US");
    assert_eq!(ap.stop_count(), 1);

    for device in [&advertiser, &discoverer] {
        assert!(device.calls().contains(&"wifi_connect(ncperf-lab)".to_string()));
    }
    let first = &outcome.results[0];
    assert!(first.discoverer_sta_expected && first.advertiser_sta_expected);
    assert_ne!(first.discoverer_sta_latency, UNSET_LATENCY);
    assert!(first.file_transfer_quality_info.medium_upgrade_expected);

    let summary = outcome.summary.unwrap();
    assert!(summary.detailed_stats.iter().any(|line| line.contains("Upgrade Latency")));
    assert_eq!(summary.statistics.upgrade_mediums.get("WIFI_LAN"), Some(&10));
}

#[tokio::test(start_paused = true)]
async fn test_slow_transfer_is_a_throughput_failure() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    // 20 MB at 2 MBps completes in 10 s, under the 3 MBps 2G benchmark
    let discoverer = SimulatedDevice::new(device("BBB").with_fault(0, SimFault::SlowTransfer(2048.0)));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("use_auto_controlled_wifi_ap", "true")]),
        Some(lab_access_point()),
        dir.path(),
    );

    let outcome = run_class(Box::new(Scc2gAllWifiSta), &resources).await.unwrap();

    let first = &outcome.results[0];
    assert_eq!(first.failure_reason, SingleTestFailureReason::FileTransferThroughputLow);
    assert!(first.file_transfer_throughput_kbps > 0.0);
    assert!(first
        .result_message
        .starts_with("FILE_TRANSFER_THROUGHPUT_LOW - The measured throughput"));
    assert!(first.result_message.contains("is lower than the expected 3072.0 KBps"));
    assert!(first.result_message.contains("The upgraded medium is WIFI_LAN"));

    // Nine of ten meets floor(10 * 0.95)
    assert_eq!(outcome.results.len(), 10);
    assert_eq!(outcome.status, ClassStatus::Passed);
    assert_eq!(outcome.bug_reports.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_prior_bt_connection_runs_before_the_measured_one() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("use_auto_controlled_wifi_ap", "true"), ("requires_bt_multiplex", "true")]),
        Some(lab_access_point()),
        dir.path(),
    );

    let outcome = run_class(Box::new(Scc2gAllWifiSta), &resources).await.unwrap();

    assert_eq!(outcome.status, ClassStatus::Passed);
    let first = &outcome.results[0];
    assert!(!first.is_failed_with_prior_bt);
    assert_ne!(first.prior_bt_quality_info.discovery_latency, UNSET_LATENCY);
    assert!(discoverer
        .calls()
        .iter()
        .any(|call| call.starts_with("nearby2.request_connection")));
    let summary = outcome.summary.unwrap();
    assert!(summary
        .detailed_stats
        .contains(&"Prior BT Connection Stats:".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_source_sta_failure_is_reported_before_prior_bt() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB").with_fault(0, SimFault::StaConnectTimeout));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("use_auto_controlled_wifi_ap", "true"), ("requires_bt_multiplex", "true")]),
        Some(lab_access_point()),
        dir.path(),
    );

    let outcome = run_class(Box::new(Scc2gAllWifiSta), &resources).await.unwrap();

    let first = &outcome.results[0];
    assert_eq!(first.failure_reason, SingleTestFailureReason::SourceWifiConnection);
    assert!(!first.is_failed_with_prior_bt);
    assert!(first.result_message.starts_with("FAIL: SOURCE_WIFI_CONNECTION"));
    assert_eq!(first.prior_bt_quality_info.discovery_latency, UNSET_LATENCY);
    assert!(outcome.results[1].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_bt_class_never_opens_a_prior_connection() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("requires_bt_multiplex", "true"), ("fast_fail_on_any_error", "true")]),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert_eq!(outcome.results[0].prior_bt_quality_info.discovery_latency, UNSET_LATENCY);
    assert!(!discoverer
        .calls()
        .iter()
        .any(|call| call.starts_with("nearby2.request_connection")));
}

#[tokio::test(start_paused = true)]
async fn test_class_without_ap_credentials_is_skipped() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        UserParams::new(),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(Scc2gAllWifiSta), &resources).await.unwrap();

    assert_eq!(
        outcome.status,
        ClassStatus::Skipped {
            reason: "Wifi AP is not ready for this test.".to_string()
        }
    );
    assert!(outcome.results.is_empty());
    assert!(advertiser.loaded_slots().is_empty());
    assert!(!advertiser.calls().iter().any(|call| call.starts_with("install_apk")));

    let records = read_records(dir.path());
    assert!(records
        .iter()
        .any(|record| record["properties"]["skip_reason"] == "Wifi AP is not ready for this test."));
}

#[tokio::test(start_paused = true)]
async fn test_empty_chipset_skips_the_class() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("skip_test_if_wifi_chipset_is_empty", "true")]),
        None,
        dir.path(),
    );

    let outcome = run_class(Box::new(BtPerformance), &resources).await.unwrap();

    assert_eq!(
        outcome.status,
        ClassStatus::Skipped {
            reason: "wifi_chipset is empty in the config file".to_string()
        }
    );
    assert_eq!(advertiser.bug_report_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrooted_device_aborts_the_suite() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA").unrooted());
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        UserParams::new(),
        None,
        dir.path(),
    );
    let suite: Vec<Box<dyn CujTestCase>> = vec![Box::new(BtPerformance), Box::new(BtPerformance)];

    let error = run_suite(suite, &resources, &RunContext::new(), &quiet())
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::Aborted(_)));
    assert!(discoverer.calls().iter().all(|call| !call.contains("start_discovery")));
}

#[tokio::test(start_paused = true)]
async fn test_suite_records_run_identifier_once() {
    let dir = TempDir::new().unwrap();
    let advertiser = SimulatedDevice::new(device("AAA"));
    let discoverer = SimulatedDevice::new(device("BBB"));
    let resources = testbed(
        &[(&advertiser, None), (&discoverer, None)],
        raw(&[("fast_fail_on_any_error", "true"), ("target_cuj_name", "quick_share")]),
        None,
        dir.path(),
    );
    let suite: Vec<Box<dyn CujTestCase>> = vec![Box::new(Scc2gAllWifiSta), Box::new(BtPerformance)];
    let run = RunContext::new();

    let outcomes = run_suite(suite, &resources, &run, &quiet()).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0].status, ClassStatus::Skipped { .. }));
    assert_eq!(outcomes[1].status, ClassStatus::Passed);
    assert!(run.run_identifier_recorded());

    let records = read_records(dir.path());
    let identifiers: Vec<&Value> = records
        .iter()
        .filter_map(|record| record["properties"].get("run_identifier"))
        .collect();
    assert_eq!(identifiers.len(), 1);
    let identifier = identifiers[0].as_str().unwrap();
    assert!(identifier.starts_with("{test_version:"));
    assert!(identifier.ends_with(", target_cuj:quick_share}"));
    assert!(records
        .iter()
        .all(|record| record["run_token"] == run.token().to_string()));

    let summary = records
        .iter()
        .find(|record| record["properties"].get("01_test_result").is_some())
        .unwrap();
    assert_eq!(summary["test_class"], "BtPerformanceTest");
    assert_eq!(summary["properties"]["01_test_result"], "PASS");
}
