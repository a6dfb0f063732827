//! Structured logging for the harness
//!
//! This module provides:
//! - Structured logging with levels, shared context and correlation IDs
//! - Console, JSON and compact output formats
//! - A trial logger that correlates every phase of one iteration
//! - A device logger for provisioning and teardown steps
//! - Error event logging with category and exit code fields

use crate::error::{AppError, Result};
use crate::models::SingleTestResult;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug level - phase timings and raw values
    Debug = 0,
    /// Info level - trial and class progress
    Info = 1,
    /// Warning level - fallbacks and recoverable problems
    Warn = 2,
    /// Error level - failed trials and setup steps
    Error = 3,
    /// Fatal level - the run cannot continue
    Fatal = 4,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    fn colorize(&self, text: &str) -> String {
        match self {
            LogLevel::Debug => text.cyan().to_string(),
            LogLevel::Info => text.green().to_string(),
            LogLevel::Warn => text.yellow().to_string(),
            LogLevel::Error => text.red().to_string(),
            LogLevel::Fatal => text.magenta().bold().to_string(),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: HashMap<String, serde_json::Value>,
    /// File and line information
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(AppError::parse(format!("Invalid log format: {}", s))),
        }
    }
}

/// Logger settings resolved from the command line
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub min_level: LogLevel,
    pub format: LogFormat,
    pub use_color: bool,
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            format: LogFormat::Console,
            use_color: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Build from the `--verbose` / `--debug` / `--no-color` switches
    pub fn from_flags(verbose: bool, debug: bool, no_color: bool, format: Option<LogFormat>) -> Self {
        let min_level = if debug {
            LogLevel::Debug
        } else if verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            format: format.unwrap_or(LogFormat::Console),
            use_color: !no_color,
            include_location: debug,
        }
    }

    /// Only fatal events are written
    pub fn quiet() -> Self {
        Self {
            min_level: LogLevel::Fatal,
            use_color: false,
            ..Self::default()
        }
    }
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    /// Run token of the current session
    session_id: Option<String>,
    /// Current trial correlation ID
    current_correlation_id: Option<String>,
}

/// Logger implementation with multiple output formats
///
/// Cloning is cheap; clones share the same context.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new logger
    pub fn new(name: &str) -> Self {
        Self::with_config(name, &LoggingConfig::default())
    }

    /// Create a logger with specific configuration
    pub fn with_config(name: &str, config: &LoggingConfig) -> Self {
        Self {
            min_level: config.min_level,
            use_color: config.use_color,
            include_location: config.include_location,
            format: config.format,
            name: name.to_string(),
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// A logger with the same settings and shared context under another name
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.debug(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.debug(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry
                .fields
                .insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Compact => self.format_compact(&entry),
        };

        // Warnings and above go to stderr so stdout stays clean for summaries
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = format!("{:>5}", entry.level.as_str());
        let formatted_level = if self.use_color {
            entry.level.colorize(&level_str)
        } else {
            level_str
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry
                .fields
                .iter()
                .filter(|(k, _)| k.as_str() != "session_id")
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            fields.sort();
            if !fields.is_empty() {
                output.push_str(&format!(" {{{}}}", fields.join(", ")));
            }
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!(
                "{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}",
                entry.message
            ),
        }
    }

    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
                location: None,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add a latency field in seconds, omitted when unset
    pub fn latency(self, key: &str, latency: Duration) -> Self {
        if latency == crate::defaults::UNSET_LATENCY {
            self
        } else {
            self.field(key, latency.as_secs_f64())
        }
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_fatal", error.is_fatal_for_run())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for the iterations of one test class
pub struct TrialLogger {
    logger: Logger,
    active: Option<(u32, String)>,
}

impl TrialLogger {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.named("TRIAL"),
            active: None,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Start correlating entries for an iteration
    pub async fn start_trial(&mut self, iteration: u32, required: u32) {
        let correlation_id = self.logger.start_operation(&format!("iteration {}", iteration)).await;
        self.logger
            .info(&format!("Starting iteration {}/{}", iteration, required))
            .field("iteration", iteration)
            .log()
            .await;
        self.active = Some((iteration, correlation_id));
    }

    /// Log a completed phase with its latency
    pub async fn log_phase(&self, phase: &str, latency: Duration) {
        self.logger
            .debug(&format!("Phase {} completed", phase))
            .field("phase", phase)
            .latency("latency_s", latency)
            .log()
            .await;
    }

    /// Log the frozen result and close the correlation
    pub async fn end_trial(&mut self, result: &SingleTestResult) {
        let success = result.is_success();
        let level = if success { LogLevel::Info } else { LogLevel::Error };
        self.logger
            .log(level, &format!("Iteration {}: {}", result.iteration, result.result_message))
            .field("iteration", result.iteration)
            .field("failure_reason", result.failure_reason.name())
            .field("file_transfer_throughput_kbps", result.file_transfer_throughput_kbps)
            .log()
            .await;

        if let Some((iteration, correlation_id)) = self.active.take() {
            self.logger
                .end_operation(&correlation_id, &format!("iteration {}", iteration), success)
                .await;
        }
    }

    /// Log that the breaker stopped the loop
    pub async fn log_breaker_tripped(&self, consecutive_failures: u32, finished: u32) {
        self.logger
            .warn(&format!(
                "Stopping after {} consecutive failed iterations",
                consecutive_failures
            ))
            .field("consecutive_failures", consecutive_failures)
            .field("finished_iterations", finished)
            .log()
            .await;
    }
}

/// Logger for provisioning and teardown steps on one device
#[derive(Clone)]
pub struct DeviceLogger {
    logger: Logger,
}

impl DeviceLogger {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.named("DEVICE"),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Log one setup or teardown step
    pub async fn log_step(&self, serial: &str, step: &str, outcome: std::result::Result<(), &AppError>) {
        match outcome {
            Ok(()) => {
                self.logger
                    .debug(&format!("[{}] {}", serial, step))
                    .field("serial", serial)
                    .field("step", step)
                    .field("success", true)
                    .log()
                    .await
            }
            Err(error) => {
                self.logger
                    .warn(&format!("[{}] {} failed: {}", serial, step, error))
                    .field("serial", serial)
                    .field("step", step)
                    .field("success", false)
                    .error_info(error)
                    .log()
                    .await
            }
        }
    }

    /// Log the capabilities resolved for a device
    pub async fn log_capabilities<T: Serialize>(&self, serial: &str, model: &str, capabilities: &T) {
        self.logger
            .info(&format!("[{}] capabilities resolved for model {}", serial, model))
            .field("serial", serial)
            .field("model", model)
            .field("capabilities", capabilities)
            .log()
            .await;
    }
}

/// Error event logger with enhanced context
pub struct ErrorEventLogger {
    logger: Logger,
}

impl ErrorEventLogger {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.named("ERR"),
        }
    }

    /// Log an application error with full context
    pub async fn log_error(&self, error: &AppError, context: Option<&str>) {
        let message = match context {
            Some(ctx) => format!("{}: {}", ctx, error),
            None => error.to_string(),
        };
        let level = if error.is_fatal_for_run() {
            LogLevel::Fatal
        } else {
            LogLevel::Error
        };

        let mut builder = self.logger.log(level, &message).error_info(error);
        if let Some(ctx) = context {
            builder = builder.field("context", ctx);
        }
        builder.log().await;
    }
}

/// Creates loggers that share one session id
pub struct LoggerFactory {
    config: LoggingConfig,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: LoggingConfig, session_id: String) -> Self {
        Self { config, session_id }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name, &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Convenience macros for logging with location information
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}
