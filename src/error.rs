//! Error types for `Memoria`
//!
//! The hierarchy separates failures that end the process (configuration,
//! I/O, CLI usage) from failures the round engine absorbs. Device and
//! predictor errors never reach the player: the driver turns them into
//! engine events or log lines and the session keeps running.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `Memoria` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Device error (device unreachable, bad response)
    pub const DEVICE_ERROR: i32 = 4;

    /// Engine error (driver stopped unexpectedly)
    pub const ENGINE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `Memoria` operations.
///
/// Aggregates the domain errors and maps each to a process exit code.
#[derive(Debug, Error)]
pub enum MemoriaError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Device or predictor communication error
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Round engine / driver error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MemoriaError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Device(_) => ExitCode::DEVICE_ERROR,
            Self::Engine(_) => ExitCode::ENGINE_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "timing.memorize[2]")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Device Errors
// ============================================================================

/// Failures talking to the game device or the difficulty predictor.
///
/// Every variant is transient from the engine's point of view: the poll
/// or command is simply retried on its next natural cycle.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Connection could not be established or was interrupted
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status code
    #[error("HTTP status {status} from {endpoint}")]
    HttpStatus {
        /// Endpoint path (e.g. `"status"`)
        endpoint: &'static str,
        /// Status code returned
        status: u16,
    },

    /// The response body could not be decoded
    #[error("invalid response from {endpoint}: {message}")]
    Decode {
        /// Endpoint path
        endpoint: &'static str,
        /// Decoder message
        message: String,
    },

    /// The request did not complete in time
    #[error("timeout calling {0}")]
    Timeout(&'static str),

    /// The base URL could not be parsed or joined
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

impl DeviceError {
    /// Short category label used for metrics and logs.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::HttpStatus { .. } => "http_status",
            Self::Decode { .. } => "decode",
            Self::Timeout(_) => "timeout",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }
}

// ============================================================================
// Engine Errors
// ============================================================================

/// Round engine driver errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The driver's event loop has stopped and can no longer accept commands
    #[error("session driver stopped")]
    DriverStopped,

    /// The driver task panicked or was aborted
    #[error("session driver failed: {0}")]
    DriverFailed(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `Memoria` operations.
pub type Result<T> = std::result::Result<T, MemoriaError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::DEVICE_ERROR, 4);
        assert_eq!(ExitCode::ENGINE_ERROR, 5);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_device_error_exit_code() {
        let err: MemoriaError = DeviceError::Timeout("status").into();
        assert_eq!(err.exit_code(), ExitCode::DEVICE_ERROR);
    }

    #[test]
    fn test_engine_error_exit_code() {
        let err: MemoriaError = EngineError::DriverStopped.into();
        assert_eq!(err.exit_code(), ExitCode::ENGINE_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: MemoriaError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = MemoriaError::Usage("bad level".to_string());
        assert_eq!(err.exit_code(), ExitCode::USAGE_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: MemoriaError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_device_error_categories() {
        assert_eq!(DeviceError::Network("x".into()).category(), "network");
        assert_eq!(
            DeviceError::HttpStatus {
                endpoint: "status",
                status: 500
            }
            .category(),
            "http_status"
        );
        assert_eq!(DeviceError::Timeout("status").category(), "timeout");
    }

    #[test]
    fn test_http_status_display() {
        let err = DeviceError::HttpStatus {
            endpoint: "start_game",
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP status 503 from start_game");
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "timing.memorize".to_string(),
            message: "needs five entries".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: needs five entries at timing.memorize"
        );
    }

    #[test]
    fn test_config_error_env_var_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "DEVICE_URL".to_string(),
            location: "device.base_url".to_string(),
        };
        assert!(err.to_string().contains("DEVICE_URL"));
        assert!(err.to_string().contains("device.base_url"));
    }
}
