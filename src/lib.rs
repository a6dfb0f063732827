//! Nearby Connections Performance Harness
//!
//! A hardware-in-the-loop harness that drives a pair of Android devices and an
//! optional controlled Wi-Fi access point to measure Nearby Connections
//! discovery, connection, medium upgrade and payload transfer performance.

pub mod access_point;
pub mod app;
pub mod cli;
pub mod config;
pub mod connection;
pub mod cuj;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod harness;
pub mod logging;
pub mod models;
pub mod output;
pub mod report;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use config::TestParameters;
pub use error::{AppError, Result};
pub use harness::{run_suite, ClassOutcome, NcTestClass};
pub use models::{ConnectionSetupQualityInfo, ConnectionSetupTimeouts, SingleTestResult, TestResultStats};
pub use report::RunContext;
pub use types::{
    MediumUpgradeType, NearbyConnectionMedium, NearbyMedium, PayloadType, SingleTestFailureReason,
    WifiD2DType,
};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string recorded in every run identifier
pub const TEST_SCRIPT_VERSION: &str = env!("TEST_SCRIPT_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Fraction of required iterations that must succeed
    pub const SUCCESS_RATE_TARGET: f64 = 0.95;

    pub const SCC_PERFORMANCE_TEST_COUNT: u32 = 10;
    pub const SCC_PERFORMANCE_TEST_MAX_CONSECUTIVE_ERROR: u32 = 2;
    pub const MCC_PERFORMANCE_TEST_COUNT: u32 = 100;
    pub const MCC_PERFORMANCE_TEST_MAX_CONSECUTIVE_ERROR: u32 = 5;
    pub const BT_PERFORMANCE_TEST_COUNT: u32 = 100;
    pub const BT_PERFORMANCE_TEST_MAX_CONSECUTIVE_ERROR: u32 = 5;

    pub const NEARBY_RESET_WAIT_TIME: Duration = Duration::from_secs(5);
    pub const WIFI_DISCONNECTION_DELAY: Duration = Duration::from_secs(3);
    pub const DELAY_BETWEEN_TEST_CYCLES: Duration = Duration::from_secs(5);

    pub const FIRST_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
    pub const FIRST_CONNECTION_INIT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const FIRST_CONNECTION_RESULT_TIMEOUT: Duration = Duration::from_secs(35);
    pub const SECOND_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(35);
    pub const SECOND_CONNECTION_INIT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const SECOND_CONNECTION_RESULT_TIMEOUT: Duration = Duration::from_secs(25);
    pub const CONNECTION_BANDWIDTH_CHANGED_TIMEOUT: Duration = Duration::from_secs(25);
    pub const WIFI_STA_CONNECTING_TIME_OUT: Duration = Duration::from_secs(25);

    pub const WIFI_2G_20M_PAYLOAD_TRANSFER_TIMEOUT: Duration = Duration::from_secs(20);
    pub const WIFI_500M_PAYLOAD_TRANSFER_TIMEOUT: Duration = Duration::from_secs(250);
    pub const BT_1M_PAYLOAD_TRANSFER_TIMEOUT: Duration = Duration::from_secs(50);

    pub const TRANSFER_FILE_SIZE_500MB_KB: u64 = 500 * 1024;
    pub const TRANSFER_FILE_SIZE_20MB_KB: u64 = 20 * 1024;
    pub const TRANSFER_FILE_SIZE_1MB_KB: u64 = 1024;

    /// Per-stream PHY rates used for the throughput benchmark (Mbps)
    pub const MAX_PHY_RATE_PER_STREAM_AC_80_MBPS: u32 = 433;
    pub const MAX_PHY_RATE_PER_STREAM_AC_40_MBPS: u32 = 200;
    pub const MAX_PHY_RATE_PER_STREAM_N_20_MBPS: u32 = 72;

    pub const MCC_THROUGHPUT_MULTIPLIER: f64 = 0.25;
    pub const MAX_PHY_RATE_TO_MIN_THROUGHPUT_RATIO_5G: f64 = 0.2;
    pub const MAX_PHY_RATE_TO_MIN_THROUGHPUT_RATIO_2G: f64 = 0.2;
    pub const WIFI_HOTSPOT_THROUGHPUT_MULTIPLIER: f64 = 0.8;
    pub const WIFI_LAN_MAX_THROUGHPUT_MBPS: u64 = 20;
    pub const CLASSIC_BT_MEDIUM_THROUGHPUT_BENCHMARK_KBPS: f64 = 20.0;
    pub const BLE_MEDIUM_THROUGHPUT_BENCHMARK_KBPS: f64 = 20.0;

    pub const KEEP_ALIVE_TIMEOUT_WIFI_MS: u32 = 10_000;
    pub const KEEP_ALIVE_INTERVAL_WIFI_MS: u32 = 3_000;

    /// Index factor of the median sample
    pub const PERCENTILE_50_FACTOR: f64 = 0.5;
    pub const LATENCY_PRECISION_DIGITS: i32 = 1;

    /// Latency value of a phase that was never reached
    pub const UNSET_LATENCY: Duration = Duration::MAX;
    /// Throughput value of a transfer that never completed
    pub const UNSET_THROUGHPUT_KBPS: f64 = -1.0;

    pub const MAX_NUM_BUG_REPORT: usize = 5;

    pub const CHANNEL_2G: u32 = 6;
    pub const CHANNEL_5G: u32 = 36;
    pub const CHANNEL_5G_DFS: u32 = 52;

    pub const DEFAULT_COUNTRY_CODE: &str = "US";
    pub const DEFAULT_OUTPUT_DIR: &str = "ncperf_output";
    pub const RECORDS_FILE_NAME: &str = "records.jsonl";

    pub const CUJ_QUICK_START: &str = "quick_start";
}
