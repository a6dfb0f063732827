//! Test class execution
//!
//! A class brings up the access point, provisions the device pair, repeats
//! its trial until the repeat policy or the consecutive-failure breaker stops
//! it, then reports and tears everything down. A suite runs several classes
//! in sequence on the same devices.

use crate::access_point::{AccessPointController, ApManager};
use crate::config::{TestParameters, UserParams};
use crate::connection::benchmark::BenchmarkInputs;
use crate::connection::{
    connect_to_wifi_sta, reset_nearby_connection, reset_wifi_connection, ConnectionOptions, NearbyConnection,
    PhaseFailure,
};
use crate::cuj::{negotiated_medium_name, throughput_low_string, CujTestCase};
use crate::defaults;
use crate::device::{
    CapabilityOverrides, DeviceController, DevicePair, DeviceSetting, KeepAlive, ProvisionOutcome, Provisioner,
};
use crate::diagnostics::BugReportCollector;
use crate::error::Result;
use crate::executor::{ConsecutiveFailureBreaker, LoopControl};
use crate::logging::{ErrorEventLogger, Logger, TrialLogger};
use crate::models::{ConnectionSetupTimeouts, NcPerformanceTestMetrics, SingleTestResult};
use crate::report::{ClassSummary, ResultRecorder, RunContext, SummaryInput};
use crate::types::{
    medium_upgrade_fail_tip, AgentSlot, DeviceRole, MediumUpgradeType, NearbyMedium, SingleTestFailureReason,
};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;

const TEST_PROPERTIES: [(&str, &str); 2] = [
    ("beto_team", "Nearby Connections"),
    ("beto_feature", "Nearby Connections"),
];

/// Everything a class needs from the testbed
#[derive(Clone)]
pub struct TestbedResources {
    pub params: TestParameters,
    pub raw: UserParams,
    pub devices: Vec<(Arc<dyn DeviceController>, Option<DeviceRole>)>,
    pub access_point: Option<Arc<dyn AccessPointController>>,
    pub capability_overrides: Option<Arc<CapabilityOverrides>>,
    pub output_dir: PathBuf,
}

/// How a class ended
#[derive(Debug, Clone, PartialEq)]
pub enum ClassStatus {
    Passed,
    Failed,
    Skipped { reason: String },
    /// Setup or teardown failed; the run continued with the next class
    Errored { message: String },
}

/// Result of one class
#[derive(Debug, Clone)]
pub struct ClassOutcome {
    pub class_tag: String,
    pub test_name: String,
    pub status: ClassStatus,
    pub summary: Option<ClassSummary>,
    pub results: Vec<SingleTestResult>,
    pub bug_reports: Vec<PathBuf>,
    pub breaker_tripped: bool,
}

impl ClassOutcome {
    fn without_trials(cuj: &dyn CujTestCase, status: ClassStatus) -> Self {
        Self {
            class_tag: cuj.tag().to_string(),
            test_name: cuj.test_name().to_string(),
            status,
            summary: None,
            results: Vec::new(),
            bug_reports: Vec::new(),
            breaker_tripped: false,
        }
    }
}

/// Reason codes of the two connections a trial may open
#[derive(Debug, Clone)]
struct TrialReasons {
    prior_bt: SingleTestFailureReason,
    active: SingleTestFailureReason,
    /// Set when the transfer completed below the benchmark
    throughput_low: Option<String>,
}

/// Per-class trial bookkeeping
struct TrialLoop {
    results: Vec<SingleTestResult>,
    metrics: NcPerformanceTestMetrics,
    bug_reports: Vec<PathBuf>,
    breaker_tripped: bool,
}

/// One CUJ test class bound to a testbed
pub struct NcTestClass {
    cuj: Box<dyn CujTestCase>,
    resources: TestbedResources,
    logger: Logger,
}

impl NcTestClass {
    pub fn new(cuj: Box<dyn CujTestCase>, resources: &TestbedResources, logger: &Logger) -> Self {
        let logger = logger.named(cuj.tag());
        Self {
            cuj,
            resources: resources.clone(),
            logger,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.cuj.tag()
    }

    /// Run setup, the trial loop and teardown
    pub async fn run(self, run: &RunContext) -> Result<ClassOutcome> {
        let cuj = self.cuj.as_ref();
        let mut params = self.resources.params.clone();
        let mut recorder = ResultRecorder::create(&self.resources.output_dir, cuj.tag(), run).await?;
        recorder.record_run_identifier(run, &params.target_cuj_name).await?;

        let mut ap = ApManager::new(self.resources.access_point.clone(), &self.logger);
        ap.setup(&mut params, &self.resources.raw, cuj.country_code(), cuj.sta_band())
            .await?;
        let params = Arc::new(params);

        let provisioner = Provisioner::new(
            Arc::clone(&params),
            &self.resources.raw,
            self.resources.capability_overrides.clone(),
            cuj.country_code(),
            &self.logger,
        );
        let outcome = provisioner
            .provision(
                self.resources.devices.clone(),
                &cuj.capability_requirements(),
                cuj.skip_reason(&params),
            )
            .await;

        let pair = match outcome {
            Ok(ProvisionOutcome::Ready(pair)) => pair,
            Ok(ProvisionOutcome::Skipped { reason, .. }) => {
                recorder.record_skip(&reason).await?;
                ap.teardown().await?;
                return Ok(ClassOutcome::without_trials(cuj, ClassStatus::Skipped { reason }));
            }
            Err(error) => {
                if let Err(stop_error) = ap.teardown().await {
                    ErrorEventLogger::new(&self.logger)
                        .log_error(&stop_error, Some("stopping the access point"))
                        .await;
                }
                return Err(error);
            }
        };

        let use_prior_bt = params.requires_bt_multiplex && !cuj.force_disable_bt_multiplex();
        let trials = self.run_trials(&params, &pair, &mut recorder, use_prior_bt).await;

        // Teardown runs even when the trial loop hit an infrastructure error
        let finished = match trials {
            Ok(state) => {
                let summary = ClassSummary::build(&SummaryInput {
                    class_tag: cuj.tag(),
                    policy: cuj.repeat_policy(),
                    results: &state.results,
                    metrics: &state.metrics,
                    use_prior_bt,
                    upgrade_medium: cuj.upgrade_medium(),
                    discoverer: &pair.discoverer,
                    advertiser: &pair.advertiser,
                });
                crate::log_info!(self.logger, "{}: {}", cuj.tag(), summary.verdict);
                let recorded = recorder.record_class_summary(&summary).await;
                recorded.map(|()| (state, summary))
            }
            Err(error) => Err(error),
        };

        provisioner.teardown(pair).await?;
        ap.teardown().await?;

        let (state, summary) = finished?;
        Ok(ClassOutcome {
            class_tag: cuj.tag().to_string(),
            test_name: cuj.test_name().to_string(),
            status: if summary.passed { ClassStatus::Passed } else { ClassStatus::Failed },
            summary: Some(summary),
            results: state.results,
            bug_reports: state.bug_reports,
            breaker_tripped: state.breaker_tripped,
        })
    }

    async fn run_trials(
        &self,
        params: &TestParameters,
        pair: &DevicePair,
        recorder: &mut ResultRecorder,
        use_prior_bt: bool,
    ) -> Result<TrialLoop> {
        let cuj = self.cuj.as_ref();
        let policy = cuj.repeat_policy();
        let test_name = cuj.test_name();
        let mut breaker = ConsecutiveFailureBreaker::new(policy, params.fast_fail_on_any_error);
        let mut collector = BugReportCollector::new(params.skip_bug_report, &self.logger);
        let mut trial_logger = TrialLogger::new(&self.logger);
        let mut state = TrialLoop {
            results: Vec::new(),
            metrics: NcPerformanceTestMetrics::default(),
            bug_reports: Vec::new(),
            breaker_tripped: false,
        };

        while breaker.should_run() {
            let iteration = breaker.finished();
            trial_logger.start_trial(iteration + 1, policy.count).await;

            recorder.record_test_properties(test_name, &TEST_PROPERTIES).await?;
            reset_nearby_connection(pair).await?;

            let mut result = SingleTestResult::new(iteration);
            let reasons = self
                .run_trial(params, pair, &mut result, use_prior_bt, &trial_logger)
                .await?;

            // prior BT stays uninitialized when the source STA association failed first
            let prior_bt_failed = !matches!(
                reasons.prior_bt,
                SingleTestFailureReason::Success | SingleTestFailureReason::Uninitialized
            );
            if use_prior_bt && prior_bt_failed {
                result.is_failed_with_prior_bt = true;
                result.failure_reason = reasons.prior_bt;
            } else {
                result.failure_reason = reasons.active;
            }
            result.result_message = self.result_message(&result, reasons.throughput_low.as_deref());

            recorder
                .record_iteration(test_name, &result.iteration_report(use_prior_bt))
                .await?;
            state.metrics.collect(&result, use_prior_bt);
            trial_logger.end_trial(&result).await;
            self.create_output_excerpts(pair, recorder.test_output_dir(test_name)).await;
            tokio::time::sleep(defaults::DELAY_BETWEEN_TEST_CYCLES).await;

            let success = result.is_success();
            if !success {
                let name = format!("{}_{}", test_name, iteration);
                let paths = collector
                    .on_failure(pair, &recorder.test_output_dir(test_name), &name)
                    .await;
                state.bug_reports.extend(paths);
            }
            state.results.push(result);

            if let LoopControl::Tripped { consecutive_failures } = breaker.record(success) {
                trial_logger
                    .log_breaker_tripped(consecutive_failures, breaker.finished())
                    .await;
                state.breaker_tripped = true;
            }
        }
        Ok(state)
    }

    /// Trial body; phase failures end up in the returned reasons, device
    /// errors outside a phase propagate
    async fn run_trial(
        &self,
        params: &TestParameters,
        pair: &DevicePair,
        result: &mut SingleTestResult,
        use_prior_bt: bool,
        trial_logger: &TrialLogger,
    ) -> Result<TrialReasons> {
        use SingleTestFailureReason as Reason;

        let cuj = self.cuj.as_ref();
        let mut reasons = TrialReasons {
            prior_bt: Reason::Uninitialized,
            active: Reason::Uninitialized,
            throughput_low: None,
        };

        if params.toggle_airplane_mode_target_side {
            pair.advertiser
                .controller
                .apply_setting(&DeviceSetting::ToggleAirplaneMode)
                .await?;
        }
        if params.reset_wifi_connection {
            reset_wifi_connection(pair).await?;
        }

        let credentials = cuj.wifi_credentials(params).filter(|(ssid, _)| !ssid.is_empty());

        if let Some((ssid, password)) = credentials {
            result.discoverer_sta_expected = true;
            match connect_to_wifi_sta(
                pair.discoverer.controller.as_ref(),
                ssid,
                password,
                Reason::SourceWifiConnection,
            )
            .await
            {
                Ok(latency) => {
                    result.discoverer_sta_latency = latency;
                    trial_logger.log_phase("source STA connection", latency).await;
                }
                Err(failure) => {
                    self.log_phase_failure(&failure).await;
                    reasons.active = failure.reason;
                    return Ok(reasons);
                }
            }
        }
        reasons.active = Reason::Success;

        let mut prior_bt = None;
        if use_prior_bt {
            let mut connection = NearbyConnection::new(
                pair.discoverer.agent(AgentSlot::Secondary)?,
                pair.advertiser.agent(AgentSlot::Secondary)?,
                ConnectionOptions::prior_bt(NearbyMedium::BleOnly),
            );
            let outcome = connection
                .start_nearby_connection(&ConnectionSetupTimeouts::first())
                .await;
            result.prior_bt_quality_info = connection.quality_info.clone();
            reasons.prior_bt = connection.failure_reason();
            if let Err(failure) = outcome {
                self.log_phase_failure(&failure).await;
                self.disconnect(&mut connection).await;
                return Ok(reasons);
            }
            trial_logger
                .log_phase("prior BT connection", result.prior_bt_quality_info.connection_latency)
                .await;
            prior_bt = Some(connection);
        }

        if let Some((ssid, password)) = credentials {
            result.advertiser_sta_expected = true;
            match connect_to_wifi_sta(
                pair.advertiser.controller.as_ref(),
                ssid,
                password,
                Reason::TargetWifiConnection,
            )
            .await
            {
                Ok(latency) => {
                    result.advertiser_sta_latency = latency;
                    trial_logger.log_phase("target STA connection", latency).await;
                }
                Err(failure) => {
                    self.log_phase_failure(&failure).await;
                    reasons.active = failure.reason;
                    if let Some(connection) = prior_bt.as_mut() {
                        self.disconnect(connection).await;
                    }
                    return Ok(reasons);
                }
            }
        }

        let options = ConnectionOptions {
            advertising_discovery_medium: params.advertising_discovery_medium,
            connection_medium: cuj.connection_medium(),
            upgrade_medium: cuj.upgrade_medium(),
            upgrade_type: MediumUpgradeType::Disruptive,
            keep_alive: Some(KeepAlive {
                timeout_ms: params.keep_alive_timeout_ms,
                interval_ms: params.keep_alive_interval_ms,
            }),
        };
        let timeouts = if prior_bt.is_some() {
            ConnectionSetupTimeouts::second()
        } else {
            ConnectionSetupTimeouts::first()
        };
        let mut active = NearbyConnection::new(
            pair.discoverer.agent(AgentSlot::Primary)?,
            pair.advertiser.agent(AgentSlot::Primary)?,
            options,
        );

        let setup = active.start_nearby_connection(&timeouts).await;
        result.file_transfer_quality_info = active.quality_info.clone();
        reasons.active = active.failure_reason();
        match setup {
            Ok(()) => {
                let quality = &result.file_transfer_quality_info;
                trial_logger.log_phase("discovery", quality.discovery_latency).await;
                trial_logger.log_phase("connection", quality.connection_latency).await;
                if quality.medium_upgrade_expected {
                    trial_logger.log_phase("medium upgrade", quality.medium_upgrade_latency).await;
                }
                let (reason, throughput_low) = self.transfer(params, pair, &mut active, result).await;
                reasons.active = reason;
                reasons.throughput_low = throughput_low;
            }
            Err(failure) => self.log_phase_failure(&failure).await,
        }

        if let Some(connection) = prior_bt.as_mut() {
            self.disconnect(connection).await;
        }
        self.disconnect(&mut active).await;
        Ok(reasons)
    }

    /// Send the CUJ payload and compare the throughput with the benchmark
    async fn transfer(
        &self,
        params: &TestParameters,
        pair: &DevicePair,
        connection: &mut NearbyConnection,
        result: &mut SingleTestResult,
    ) -> (SingleTestFailureReason, Option<String>) {
        let cuj = self.cuj.as_ref();
        let throughput_kbps = match connection
            .transfer_file(cuj.transfer_file_size_kb(), cuj.transfer_timeout(), params.payload_type)
            .await
        {
            Ok(kbps) => kbps,
            Err(failure) => {
                self.log_phase_failure(&failure).await;
                return (failure.reason, None);
            }
        };
        result.file_transfer_throughput_kbps = throughput_kbps;

        let profile = cuj.throughput_profile();
        let advertiser_sta = if profile.needs_sta_info() {
            match pair.advertiser.controller.wifi_connection_info().await {
                Ok(info) => info,
                Err(error) => {
                    ErrorEventLogger::new(&self.logger)
                        .log_error(&error, Some("reading the target STA link"))
                        .await;
                    Default::default()
                }
            }
        } else {
            Default::default()
        };
        let benchmark_kbps = profile.benchmark_kbps(&BenchmarkInputs {
            discoverer: &pair.discoverer.capabilities,
            advertiser: &pair.advertiser.capabilities,
            advertiser_sta,
            negotiated_medium: result.file_transfer_quality_info.upgrade_medium,
        });

        self.logger
            .info(&format!(
                "Transferred {}KB at {:.1} KBps (benchmark {:.1} KBps)",
                cuj.transfer_file_size_kb(),
                throughput_kbps,
                benchmark_kbps
            ))
            .field("throughput_kbps", throughput_kbps)
            .field("benchmark_kbps", benchmark_kbps)
            .field(
                "upgrade_medium",
                negotiated_medium_name(result.file_transfer_quality_info.upgrade_medium),
            )
            .log()
            .await;

        if throughput_kbps < benchmark_kbps {
            (
                SingleTestFailureReason::FileTransferThroughputLow,
                Some(throughput_low_string(throughput_kbps, benchmark_kbps)),
            )
        } else {
            (SingleTestFailureReason::Success, None)
        }
    }

    /// Message recorded for a finished iteration
    fn result_message(&self, result: &SingleTestResult, throughput_low: Option<&str>) -> String {
        use SingleTestFailureReason as Reason;

        let cuj = self.cuj.as_ref();
        let reason = result.failure_reason;
        let common_tip = || reason.common_triage_tip().unwrap_or_default();
        if result.is_failed_with_prior_bt {
            return format!("FAIL (The prior BT connection): {} - {}", reason.name(), common_tip());
        }

        let negotiated = result.file_transfer_quality_info.upgrade_medium;
        match reason {
            Reason::Success => "PASS".to_string(),
            Reason::SourceWifiConnection => format!("FAIL: {} - {}", reason.name(), common_tip()),
            Reason::WifiMediumUpgrade => format!(
                "FAIL: {} - {}",
                reason.name(),
                medium_upgrade_fail_tip(cuj.upgrade_medium()).trim_start()
            ),
            Reason::FileTransferFail => {
                let low_string = format!(
                    "The file transfer did not complete within {}s",
                    cuj.transfer_timeout().as_secs()
                );
                format!(
                    "{} - {}",
                    reason.name(),
                    cuj.file_transfer_failure_tip(negotiated, &low_string)
                )
            }
            Reason::FileTransferThroughputLow => format!(
                "{} - {}",
                reason.name(),
                cuj.throughput_low_tip(negotiated, throughput_low.unwrap_or_default())
            ),
            _ => format!("{} - {}", reason.name(), common_tip()),
        }
    }

    async fn log_phase_failure(&self, failure: &PhaseFailure) {
        self.logger
            .warn(&failure.to_string())
            .field("failure_reason", failure.reason.name())
            .log()
            .await;
    }

    async fn disconnect(&self, connection: &mut NearbyConnection) {
        if let Err(error) = connection.disconnect_endpoint().await {
            ErrorEventLogger::new(&self.logger)
                .log_error(&error, Some("disconnecting the endpoint"))
                .await;
        }
    }

    async fn create_output_excerpts(&self, pair: &DevicePair, dest_dir: PathBuf) {
        let excerpts = pair.handles().into_iter().map(|handle| {
            let controller = Arc::clone(&handle.controller);
            let dest_dir = dest_dir.clone();
            async move { controller.create_output_excerpts(&dest_dir).await }
        });
        for outcome in join_all(excerpts).await {
            if let Err(error) = outcome {
                ErrorEventLogger::new(&self.logger)
                    .log_error(&error, Some("creating output excerpts"))
                    .await;
            }
        }
    }
}

/// Run classes in order on one testbed.
///
/// A class error that is fatal for the run stops the suite; other class
/// errors are reported and the next class runs.
pub async fn run_suite(
    cujs: Vec<Box<dyn CujTestCase>>,
    resources: &TestbedResources,
    run: &RunContext,
    logger: &Logger,
) -> Result<Vec<ClassOutcome>> {
    let errors = ErrorEventLogger::new(logger);
    let mut outcomes = Vec::with_capacity(cujs.len());
    for cuj in cujs {
        let fallback = ClassOutcome::without_trials(cuj.as_ref(), ClassStatus::Passed);
        let class = NcTestClass::new(cuj, resources, logger);
        match class.run(run).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(error) if error.is_fatal_for_run() => {
                errors.log_error(&error, Some(&fallback.class_tag)).await;
                return Err(error);
            }
            Err(error) => {
                errors.log_error(&error, Some(&fallback.class_tag)).await;
                outcomes.push(ClassOutcome {
                    status: ClassStatus::Errored {
                        message: error.to_string(),
                    },
                    ..fallback
                });
            }
        }
    }
    Ok(outcomes)
}
