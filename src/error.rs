//! Unified error type hierarchy for BigLinux Settings
//!
//! Provides structured error handling with ScriptError, RegistryError,
//! ConfigError and AppError.
//!
//! Script failures are normally carried as data (`ProcessResult`,
//! `ProbeOutcome`, `MutationOutcome`); `ScriptError` is the diagnostic
//! attached to those values, not something the engine returns through `?`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why an external script call did not produce a usable answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script not found: {0}")]
    NotFound(PathBuf),

    #[error("Script {path} timed out after {}s", .timeout.as_secs())]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("Script {path} failed with exit code: {code}")]
    NonZeroExit { path: PathBuf, code: i32 },

    #[error("Script {path} returned invalid output: {output:?}")]
    MalformedOutput { path: PathBuf, output: String },

    #[error("Failed to run script {path}: {reason}")]
    LaunchFault { path: PathBuf, reason: String },

    #[error("Script {0} was terminated by a signal")]
    TerminatedBySignal(PathBuf),
}

impl ScriptError {
    /// Short user-facing reason, used as the tooltip of an unavailable row.
    pub fn unavailable_message(&self) -> &'static str {
        match self {
            ScriptError::NotFound(_) => "Unavailable: script not found.",
            ScriptError::MalformedOutput { .. } => "Unavailable: script returned invalid output.",
            ScriptError::NonZeroExit { .. } => "Unavailable: script returned an error.",
            ScriptError::Timeout { .. }
            | ScriptError::LaunchFault { .. }
            | ScriptError::TerminatedBySignal(_) => "Unavailable: failed to run script.",
        }
    }
}

/// Toggle registry contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown toggle handle: {0}")]
    UnknownHandle(usize),

    #[error("Unknown script group: {0}")]
    UnknownGroup(usize),

    #[error("Parent toggle not registered: {0}")]
    UnknownParent(String),

    #[error("Script already registered on this page: {0}")]
    DuplicateScript(PathBuf),
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid page manifest: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Global error type surfaced to the interactive layer.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// A toggle script could not be run or reported failure
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Registry lookup or registration failed
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Settings persist or deserialize error
    #[error("Settings error: {0}")]
    Settings(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Background event channel closed
    #[error("Event channel closed: {0}")]
    ChannelClosed(String),
}

impl AppError {
    /// Get a user-facing error message suitable for a transient notice
    pub fn user_message(&self) -> String {
        match self {
            AppError::Script(e) => e.unavailable_message().to_string(),
            AppError::Registry(e) => format!("Internal error: {}", e),
            AppError::Settings(msg) => format!("Settings error: {}", msg),
            AppError::Io(msg) => format!("File operation failed: {}", msg),
            AppError::ChannelClosed(msg) => format!("Background task stopped: {}", msg),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Registry(r) => AppError::Registry(r),
            other => AppError::Settings(other.to_string()),
        }
    }
}

/// Top-level result type for setup code that may fail.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
