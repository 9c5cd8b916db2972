use std::time::Duration;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Audit log '{path}' could not be written: {source}")]
    Audit {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Application error: {0}")]
    Application(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Config file parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Errors raised while running the deployment script
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Deployment script '{command}' could not be started: {source}")]
    StartFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Deployment script '{command}' failed with exit code {code}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Deployment script '{command}' was terminated by a signal")]
    Killed { command: String, stderr: String },

    #[error(
        "Deployment script '{command}' timed out after {}",
        format_timeout(.timeout)
    )]
    Timeout { command: String, timeout: Duration },
}

/// Whole seconds as `Ns`, anything finer as `Nms`
fn format_timeout(timeout: &Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

impl ExecutionError {
    /// Diagnostic text reported back to the caller.
    ///
    /// Prefers whatever the script wrote to stderr and falls back to the
    /// error message when stderr is empty or was never captured.
    pub fn details(&self) -> String {
        match self {
            ExecutionError::NonZeroExit { stderr, .. } | ExecutionError::Killed { stderr, .. }
                if !stderr.trim().is_empty() =>
            {
                stderr.trim_end().to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Type alias for Results
pub type Result<T> = std::result::Result<T, Error>;
