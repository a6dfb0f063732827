//! Error handling for the Nearby Connections harness
//!
//! Only class-level failures travel through [`AppError`]. A failed phase
//! inside a trial is a [`crate::connection::PhaseFailure`] value that ends
//! that trial and nothing else.

use thiserror::Error;

/// Custom error types for the harness
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing configuration (params, testbed, channel selection)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A device controller or agent call failed outside of a trial
    #[error("Device error: {0}")]
    Device(String),

    /// The controlled access point could not be brought up or torn down
    #[error("Access point error: {0}")]
    AccessPoint(String),

    /// The whole run must stop (e.g. unrooted device without override)
    #[error("Run aborted: {0}")]
    Aborted(String),

    /// A device-level operation exceeded its deadline during setup
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// I/O errors (output directory, capability file, bug reports)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (YAML, JSON, numeric values)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        Self::Device(message.into())
    }

    /// Create a new access point error
    pub fn access_point<S: Into<String>>(message: S) -> Self {
        Self::AccessPoint(message.into())
    }

    /// Create a new run-abort error
    pub fn aborted<S: Into<String>>(message: S) -> Self {
        Self::Aborted(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Device(_) => "DEVICE",
            Self::AccessPoint(_) => "AP",
            Self::Aborted(_) => "ABORT",
            Self::Timeout(_) => "TIMEOUT",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the error must stop the entire run rather than one class
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check the testbed user_params and NC_* environment variables.", msg)
            }
            Self::Device(msg) => {
                format!("Device operation failed: {}\n\nSuggestion: Check that both devices are reachable over adb and the snippet apks are installed.", msg)
            }
            Self::AccessPoint(msg) => {
                format!("Access point problem: {}\n\nSuggestion: Check the AP controller connection and the requested channel.", msg)
            }
            Self::Aborted(msg) => {
                format!("Run aborted: {}\n\nSuggestion: Use rooted devices or set allow_unrooted_device to true.", msg)
            }
            Self::Timeout(msg) => {
                format!("Operation timed out: {}\n\nSuggestion: The device may be unresponsive; reboot it and retry.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of the testbed or capability files.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => 1,
            Self::Device(_) | Self::AccessPoint(_) => 2,
            Self::Timeout(_) => 3,
            Self::Aborted(_) => 4,
            Self::Io(_) => 5,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Device(_) | Self::AccessPoint(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Aborted(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::parse(format!("YAML parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::internal(format!("Device task failed: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
                AppError::Device(msg) => AppError::Device(format!("{}: {}", context, msg)),
                AppError::AccessPoint(msg) => AppError::AccessPoint(format!("{}: {}", context, msg)),
                AppError::Aborted(msg) => AppError::Aborted(format!("{}: {}", context, msg)),
                AppError::Timeout(msg) => AppError::Timeout(format!("{}: {}", context, msg)),
                AppError::Io(msg) => AppError::Io(format!("{}: {}", context, msg)),
                AppError::Parse(msg) => AppError::Parse(format!("{}: {}", context, msg)),
                AppError::Internal(msg) => AppError::Internal(format!("{}: {}", context, msg)),
            }
        })
    }
}
