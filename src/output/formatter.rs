//! Core formatting trait and the plain text implementation

use crate::error::{AppError, Result};
use crate::harness::{ClassOutcome, ClassStatus};
use std::fmt::Write as _;

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format the outcome of one test class
    fn format_class_outcome(&self, outcome: &ClassOutcome) -> Result<String>;

    /// Format the closing summary over every class of the run
    fn format_suite_summary(&self, outcomes: &[ClassOutcome]) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// List every iteration, not only the failed ones
    pub show_iterations: bool,
    /// Include the summary's detailed stats block
    pub show_detailed_stats: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            show_iterations: false,
            show_detailed_stats: true,
        }
    }
}

/// Short label of a class status
pub fn status_label(status: &ClassStatus) -> &'static str {
    match status {
        ClassStatus::Passed => "PASS",
        ClassStatus::Failed => "FAIL",
        ClassStatus::Skipped { .. } => "SKIP",
        ClassStatus::Errored { .. } => "ERROR",
    }
}

pub(crate) fn fmt_error(e: std::fmt::Error) -> AppError {
    AppError::io(format!("Failed to format output: {}", e))
}

/// Lines below the class heading, shared by both formatters
pub(crate) fn outcome_body(outcome: &ClassOutcome, options: &FormattingOptions) -> Vec<String> {
    let mut lines = Vec::new();
    match &outcome.status {
        ClassStatus::Skipped { reason } => lines.push(format!("Skipped: {}", reason)),
        ClassStatus::Errored { message } => lines.push(format!("Error: {}", message)),
        ClassStatus::Passed | ClassStatus::Failed => {}
    }

    if let Some(summary) = &outcome.summary {
        lines.push(format!(
            "Result: {} ({}/{} succeeded, {} required)",
            summary.verdict,
            summary.success_count,
            summary.finished_iterations,
            summary.required_iterations
        ));
        if options.show_detailed_stats {
            lines.extend(summary.detailed_stats.iter().cloned());
        }
    }

    if options.show_iterations {
        for result in &outcome.results {
            lines.push(format!("Iteration {}: {}", result.iteration, result.result_message));
        }
    }

    if outcome.breaker_tripped {
        lines.push("Stopped early: too many consecutive failures".to_string());
    }
    if !outcome.bug_reports.is_empty() {
        lines.push(format!("Bug reports: {}", outcome.bug_reports.len()));
        for path in &outcome.bug_reports {
            lines.push(format!("  {}", path.display()));
        }
    }
    lines
}

/// Counts per status, in label order PASS, FAIL, SKIP, ERROR
pub(crate) fn status_counts(outcomes: &[ClassOutcome]) -> [usize; 4] {
    let mut counts = [0; 4];
    for outcome in outcomes {
        let slot = match outcome.status {
            ClassStatus::Passed => 0,
            ClassStatus::Failed => 1,
            ClassStatus::Skipped { .. } => 2,
            ClassStatus::Errored { .. } => 3,
        };
        counts[slot] += 1;
    }
    counts
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    /// Create a new plain formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.len() + 4);

        writeln!(output, "{}", border).map_err(fmt_error)?;
        writeln!(output, "  {}  ", title).map_err(fmt_error)?;
        write!(output, "{}", border).map_err(fmt_error)?;

        Ok(output)
    }

    fn format_class_outcome(&self, outcome: &ClassOutcome) -> Result<String> {
        let mut output = String::new();
        write!(
            output,
            "[{}] {}: {}",
            outcome.class_tag,
            outcome.test_name,
            status_label(&outcome.status)
        )
        .map_err(fmt_error)?;
        for line in outcome_body(outcome, &self.options) {
            write!(output, "\n  {}", line).map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_suite_summary(&self, outcomes: &[ClassOutcome]) -> Result<String> {
        let [passed, failed, skipped, errored] = status_counts(outcomes);
        let mut output = String::new();
        write!(
            output,
            "Classes: {} | Passed: {} | Failed: {} | Skipped: {} | Errored: {}",
            outcomes.len(),
            passed,
            failed,
            skipped,
            errored
        )
        .map_err(fmt_error)?;
        Ok(output)
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SingleTestResult;
    use crate::types::SingleTestFailureReason;
    use std::path::PathBuf;

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
    fn test_header_is_boxed() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        let header = formatter.format_header("ncperf").unwrap();
        assert_eq!(header, "==========\n  ncperf  \n==========");
    }

    #[test]
    fn test_skipped_class_shows_reason() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        let text = formatter
            .format_class_outcome(&outcome(ClassStatus::Skipped {
                reason: "Wifi AP is not ready for this test.".to_string(),
            }))
            .unwrap();
        assert!(text.starts_with("[BtPerformanceTest] test_bt_performance: SKIP"));
        assert!(text.contains("Skipped: Wifi AP is not ready for this test."));
    }

    #[test]
    fn test_iterations_listed_only_when_verbose() {
        let mut failed = outcome(ClassStatus::Failed);
        let mut result = SingleTestResult::new(0);
        result.failure_reason = SingleTestFailureReason::SourceStartDiscovery;
        result.result_message = "SOURCE_START_DISCOVERY - check the radio".to_string();
        failed.results.push(result);
        failed.breaker_tripped = true;
        failed.bug_reports.push(PathBuf::from("/tmp/br.zip"));

        let quiet = PlainFormatter::new(FormattingOptions::default());
        let text = quiet.format_class_outcome(&failed).unwrap();
        assert!(!text.contains("Iteration 0"));
        assert!(text.contains("Stopped early"));
        assert!(text.contains("Bug reports: 1"));

        let verbose = PlainFormatter::new(FormattingOptions {
            show_iterations: true,
            ..FormattingOptions::default()
        });
        let text = verbose.format_class_outcome(&failed).unwrap();
        assert!(text.contains("Iteration 0: SOURCE_START_DISCOVERY - check the radio"));
    }

    #[test]
    fn test_suite_summary_counts_statuses() {
        let outcomes = vec![
            outcome(ClassStatus::Passed),
            outcome(ClassStatus::Failed),
            outcome(ClassStatus::Skipped { reason: "x".to_string() }),
            outcome(ClassStatus::Passed),
        ];
        let formatter = PlainFormatter::new(FormattingOptions::default());
        assert_eq!(
            formatter.format_suite_summary(&outcomes).unwrap(),
            "Classes: 4 | Passed: 2 | Failed: 1 | Skipped: 1 | Errored: 0"
        );
    }
}
