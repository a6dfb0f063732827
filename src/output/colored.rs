//! Colored formatter implementation with terminal color support

use super::formatter::{fmt_error, outcome_body, status_counts, status_label, FormattingOptions, OutputFormatter};
use crate::error::Result;
use crate::harness::{ClassOutcome, ClassStatus};
use colored::*;
use std::fmt::Write as _;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    /// Create a new colored formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self {
            options,
            color_scheme: ColorScheme::default(),
        }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.options.enable_color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.options.enable_color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn status_color(&self, status: &ClassStatus) -> Color {
        match status {
            ClassStatus::Passed => self.color_scheme.success,
            ClassStatus::Failed | ClassStatus::Errored { .. } => self.color_scheme.error,
            ClassStatus::Skipped { .. } => self.color_scheme.warning,
        }
    }

    fn body_line(&self, line: &str) -> String {
        if line.starts_with("  ") {
            self.colorize(line, self.color_scheme.muted)
        } else if line.starts_with("Result: FAIL") || line.starts_with("Error:") {
            self.colorize(line, self.color_scheme.error)
        } else if line.starts_with("Stopped early") || line.starts_with("Skipped:") {
            self.colorize(line, self.color_scheme.warning)
        } else {
            line.to_string()
        }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "═".repeat(title.chars().count() + 4);

        writeln!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_error)?;
        writeln!(output, "  {}  ", self.bold(&self.colorize(title, self.color_scheme.header))).map_err(fmt_error)?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_error)?;

        Ok(output)
    }

    fn format_class_outcome(&self, outcome: &ClassOutcome) -> Result<String> {
        let mut output = String::new();
        let label = self.colorize(status_label(&outcome.status), self.status_color(&outcome.status));
        write!(
            output,
            "{} {}: {}",
            self.colorize(&format!("[{}]", outcome.class_tag), self.color_scheme.info),
            outcome.test_name,
            self.bold(&label)
        )
        .map_err(fmt_error)?;
        for line in outcome_body(outcome, &self.options) {
            write!(output, "\n  {}", self.body_line(&line)).map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_suite_summary(&self, outcomes: &[ClassOutcome]) -> Result<String> {
        let [passed, failed, skipped, errored] = status_counts(outcomes);
        let mut output = String::new();
        write!(
            output,
            "Classes: {} | {} | {} | {} | {}",
            outcomes.len(),
            self.colorize(&format!("Passed: {}", passed), self.color_scheme.success),
            self.colorize(&format!("Failed: {}", failed), self.color_scheme.error),
            self.colorize(&format!("Skipped: {}", skipped), self.color_scheme.warning),
            self.colorize(&format!("Errored: {}", errored), self.color_scheme.error)
        )
        .map_err(fmt_error)?;
        Ok(output)
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("⚠️  {}", self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("❌ {}", self.colorize(error, self.color_scheme.error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncolored_output_matches_plain_text() {
        let formatter = ColoredFormatter::new(FormattingOptions {
            enable_color: false,
            ..FormattingOptions::default()
        });
        let outcome = ClassOutcome {
            class_tag: "Scc2gAllWifiStaTest".to_string(),
            test_name: "test_scc_2g_all_wifi_sta".to_string(),
            status: ClassStatus::Errored {
                message: "Access point error: no controller".to_string(),
            },
            summary: None,
            results: Vec::new(),
            bug_reports: Vec::new(),
            breaker_tripped: false,
        };
        let text = formatter.format_class_outcome(&outcome).unwrap();
        assert!(text.starts_with("[Scc2gAllWifiStaTest] test_scc_2g_all_wifi_sta: ERROR"));
        assert!(text.contains("Error: Access point error: no controller"));
        assert_eq!(formatter.format_warning("careful").unwrap(), "⚠️  careful");
    }

    #[test]
    fn test_header_border_counts_characters() {
        let formatter = ColoredFormatter::new(FormattingOptions {
            enable_color: false,
            ..FormattingOptions::default()
        });
        let header = formatter.format_header("ncperf").unwrap();
        assert!(header.starts_with(&"═".repeat(10)));
    }
}
