//! Main application orchestration and execution

use crate::access_point::AccessPointController;
use crate::cli::Cli;
use crate::config::{display_parameters, ConfigParser, EnvManager, ResolvedConfig};
use crate::cuj::{select_suite, CujKind};
use crate::device::sim::SimulatedTestbed;
use crate::device::CapabilityOverrides;
use crate::error::{AppError, Result};
use crate::harness::{run_suite, ClassOutcome, ClassStatus, TestbedResources};
use crate::logging::{Logger, LoggerFactory};
use crate::output::{OutputFormatter, OutputFormatterFactory};
use crate::report::RunContext;
use std::sync::Arc;

/// How the process should end after a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    /// Nothing failed (classes may have been skipped)
    Clean,
    /// At least one class failed or errored
    Failures,
}

impl RunVerdict {
    pub fn from_outcomes(outcomes: &[ClassOutcome]) -> Self {
        let failed = outcomes
            .iter()
            .any(|outcome| matches!(outcome.status, ClassStatus::Failed | ClassStatus::Errored { .. }));
        if failed {
            RunVerdict::Failures
        } else {
            RunVerdict::Clean
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            RunVerdict::Clean => 0,
            RunVerdict::Failures => 1,
        }
    }
}

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
    formatter: Box<dyn OutputFormatter>,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Self {
        let formatter = OutputFormatterFactory::create_formatter(cli.use_colors(), cli.verbose);
        Self { cli, formatter }
    }

    /// Run the application
    pub async fn run(self) -> Result<RunVerdict> {
        if let Some(path) = &self.cli.init_env {
            EnvManager::save_example_env_file(path)?;
            println!("Wrote example environment file to {}", path.display());
            return Ok(RunVerdict::Clean);
        }
        if self.cli.list_cujs {
            for kind in CujKind::ALL {
                println!("{:<18} {}", kind.as_str(), kind.build().tag());
            }
            return Ok(RunVerdict::Clean);
        }

        let resolved = ConfigParser::new(self.cli.config_sources()).parse()?;
        for warning in &resolved.warnings {
            eprintln!("{}", warning.format(self.cli.use_colors()));
        }
        if self.cli.print_params {
            print!("{}", display_parameters(&resolved.params)?);
            return Ok(RunVerdict::Clean);
        }

        let run = RunContext::new();
        let factory = LoggerFactory::new(self.cli.logging_config(), run.token().to_string());
        let logger = factory.create_logger("NCPERF").await;

        let resources = self.testbed_resources(&resolved)?;
        let cujs = select_suite(&self.cli.cujs, &resources.params);
        if cujs.is_empty() {
            return Err(AppError::config("No CUJ class selected"));
        }

        println!("{}", self.formatter.format_header(&format!("ncperf {}", crate::VERSION))?);
        log_run_start(&logger, &resolved, cujs.len()).await;

        let outcomes = run_suite(cujs, &resources, &run, &logger).await?;
        for outcome in &outcomes {
            println!("{}", self.formatter.format_class_outcome(outcome)?);
        }
        println!("{}", self.formatter.format_suite_summary(&outcomes)?);

        Ok(RunVerdict::from_outcomes(&outcomes))
    }

    /// Devices and access point come from the simulated backend built from the
    /// testbed file
    fn testbed_resources(&self, resolved: &ResolvedConfig) -> Result<TestbedResources> {
        let testbed = SimulatedTestbed::from_testbed(&resolved.testbed);
        if testbed.devices.len() < 2 {
            return Err(AppError::config(format!(
                "The testbed declares {} device(s); at least 2 are required",
                testbed.devices.len()
            )));
        }

        let capability_overrides = CapabilityOverrides::load_optional(self.cli.capability_file.as_deref())?.map(Arc::new);
        let access_point: Option<Arc<dyn AccessPointController>> = testbed.access_point_controller();

        Ok(TestbedResources {
            params: resolved.params.clone(),
            raw: resolved.raw.clone(),
            devices: testbed.controllers(),
            access_point,
            capability_overrides,
            output_dir: self.cli.output_dir.clone(),
        })
    }
}

async fn log_run_start(logger: &Logger, resolved: &ResolvedConfig, classes: usize) {
    logger
        .info("Starting run")
        .field("target_cuj_name", &resolved.params.target_cuj_name)
        .field("classes", classes)
        .field("devices", resolved.testbed.devices.len())
        .log()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: ClassStatus) -> ClassOutcome {
        ClassOutcome {
            class_tag: "BtPerformanceTest".to_string(),
            test_name: "test_bt_performance".to_string(),
            status,
            summary: None,
            results: Vec::new(),
            bug_reports: Vec::new(),
            breaker_tripped: false,
        }
    }

    #[test]
    fn test_skips_do_not_fail_the_run() {
        let outcomes = vec![
            outcome(ClassStatus::Passed),
            outcome(ClassStatus::Skipped { reason: "not ready".to_string() }),
        ];
        assert_eq!(RunVerdict::from_outcomes(&outcomes), RunVerdict::Clean);
        assert_eq!(RunVerdict::from_outcomes(&[]).exit_code(), 0);
    }

    #[test]
    fn test_errored_class_fails_the_run() {
        let outcomes = vec![
            outcome(ClassStatus::Passed),
            outcome(ClassStatus::Errored { message: "ap".to_string() }),
        ];
        assert_eq!(RunVerdict::from_outcomes(&outcomes).exit_code(), 1);
    }
}
