//! Configuration management module

pub mod env;
pub mod params;
pub mod parser;
pub mod raw;
pub mod testbed;
pub mod validation;

// Re-export main functionality
pub use env::EnvManager;
pub use params::{RejectedParam, TestParameters};
pub use parser::{display_parameters, ConfigParser, ConfigSources, ResolvedConfig};
pub use raw::{RawValue, UserParams};
pub use testbed::{Testbed, TestbedAccessPoint, TestbedDevice};
pub use validation::{validate_parameters, ConfigValidator, ValidationLevel, ValidationWarning};
