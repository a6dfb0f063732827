//! Data models for connection quality and iteration results

pub mod metrics;
pub mod quality;

// Re-export main model types
pub use metrics::{IterationReport, NcPerformanceTestMetrics, SingleTestResult, TestResultStats};
pub use quality::{format_latency, round_precision, ConnectionSetupQualityInfo, ConnectionSetupTimeouts};
