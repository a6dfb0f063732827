//! Failure diagnostics
//!
//! Every failed iteration asks for a bug report from both devices. Capture is
//! bounded per class and disabled by `skip_bug_report`.

use crate::defaults;
use crate::device::{DevicePair, DeviceHandle};
use crate::logging::{ErrorEventLogger, Logger};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Why a capture request did or did not produce bug reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureDecision {
    Capture { ordinal: usize },
    SkippedByParameter,
    QuotaExhausted { requested: usize },
}

/// Bounded, concurrent bug report capture for one test class
pub struct BugReportCollector {
    max_reports: usize,
    requested: usize,
    skip_bug_report: bool,
    logger: Logger,
    errors: ErrorEventLogger,
}

impl BugReportCollector {
    pub fn new(skip_bug_report: bool, logger: &Logger) -> Self {
        Self::with_limit(defaults::MAX_NUM_BUG_REPORT, skip_bug_report, logger)
    }

    pub fn with_limit(max_reports: usize, skip_bug_report: bool, logger: &Logger) -> Self {
        let logger = logger.named("DIAG");
        Self {
            max_reports,
            requested: 0,
            skip_bug_report,
            errors: ErrorEventLogger::new(&logger),
            logger,
        }
    }

    /// Failures that asked for a capture so far, including refused ones
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Count a failure and decide whether to capture for it
    pub fn decide(&mut self) -> CaptureDecision {
        if self.skip_bug_report {
            return CaptureDecision::SkippedByParameter;
        }
        self.requested += 1;
        if self.requested <= self.max_reports {
            CaptureDecision::Capture {
                ordinal: self.requested,
            }
        } else {
            CaptureDecision::QuotaExhausted {
                requested: self.requested,
            }
        }
    }

    /// Capture bug reports from both devices for a failed iteration.
    ///
    /// Capture failures are logged; the paths that were written are returned.
    pub async fn on_failure(&mut self, pair: &DevicePair, dest_dir: &Path, name: &str) -> Vec<PathBuf> {
        match self.decide() {
            CaptureDecision::Capture { ordinal } => {
                crate::log_info!(self.logger, "take bug report for failure ({}/{})", ordinal, self.max_reports);
                self.capture(pair, dest_dir, name).await
            }
            CaptureDecision::QuotaExhausted { requested } => {
                crate::log_debug!(
                    self.logger,
                    "Bug report quota of {} reached, not capturing for failure {}",
                    self.max_reports,
                    requested
                );
                Vec::new()
            }
            CaptureDecision::SkippedByParameter => {
                self.logger.info("Skipping bug report.").log().await;
                Vec::new()
            }
        }
    }

    async fn capture(&self, pair: &DevicePair, dest_dir: &Path, name: &str) -> Vec<PathBuf> {
        let captures = pair.handles().into_iter().map(|handle: &DeviceHandle| {
            let controller = Arc::clone(&handle.controller);
            let serial = handle.serial().to_string();
            async move { (serial, controller.take_bug_report(dest_dir, name).await) }
        });

        let mut paths = Vec::new();
        for (serial, outcome) in join_all(captures).await {
            match outcome {
                Ok(path) => paths.push(path),
                Err(error) => {
                    self.errors
                        .log_error(&error, Some(&format!("bug report from {}", serial)))
                        .await
                }
            }
        }
        paths
    }
}
