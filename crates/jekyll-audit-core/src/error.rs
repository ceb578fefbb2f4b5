//! Error types for jekyll-audit.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, serving or auditing a site.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Configuration file or merged options are invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file explicitly requested but absent
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Build command could not be split into words or was empty
    #[error("Invalid build command '{command}': {reason}")]
    InvalidBuildCommand { command: String, reason: String },

    /// Build command could not be started
    #[error("Failed to start build command '{command}': {source}")]
    BuildSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Build command exited unsuccessfully
    #[error("Build command '{command}' failed: {status}")]
    BuildFailed { command: String, status: String },

    /// Build output directory is missing when serving is required
    #[error("Build output directory not found: {0}")]
    BuildDirMissing(PathBuf),

    /// Static server could not bind its address
    #[error("Failed to bind static server on {addr}: {source}")]
    ServerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Audit tool could not be started
    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Audit tool exceeded its hard timeout
    #[error("{tool} timed out after {secs} seconds")]
    ToolTimeout { tool: String, secs: u64 },

    /// Audit tool reported a failure
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// Audit tool produced output that could not be parsed
    #[error("{tool} produced unreadable output: {source}")]
    ToolOutput {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AuditError {
    /// Build failure from a process exit code (`None` when killed by a signal).
    pub fn build_failed(command: impl Into<String>, code: Option<i32>) -> Self {
        let status = match code {
            Some(c) => format!("exit code {}", c),
            None => "terminated by signal".to_string(),
        };
        AuditError::BuildFailed {
            command: command.into(),
            status,
        }
    }

    /// Whether this error aborts the run before any audit starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::InvalidBuildCommand { .. }
                | AuditError::BuildSpawn { .. }
                | AuditError::BuildFailed { .. }
                | AuditError::BuildDirMissing(_)
                | AuditError::ServerBind { .. }
        )
    }
}

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        AuditError::Http(err.to_string())
    }
}

/// Result type for jekyll-audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
