//! Error handling module for rrun
//!
//! Every failure of the validate -> render -> dispatch pipeline is a `RunError`.
//! Each variant maps to its own process exit code so scripts wrapping `rrun`
//! can tell a typo in a parameter from an unreachable target.

use thiserror::Error;

/// Main error type for the run pipeline
#[derive(Error, Debug)]
pub enum RunError {
    /// Configuration file could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A parameter token did not match `NAME=VALUE`
    #[error("Invalid script parameter: \"{param}\" (expected NAME=VALUE)")]
    InvalidParameterFormat { param: String },

    /// The same parameter name was given more than once
    #[error("Parameter \"{name}\" defined twice")]
    DuplicateParameter { name: String },

    /// The script is not defined in the configuration file
    #[error("Script \"{name}\" is not defined in the configuration file (available: {})", display_list(.available))]
    UnknownScript { name: String, available: Vec<String> },

    /// Explicit session name contains characters tmux does not accept
    #[error("Invalid session name \"{name}\": only letters, digits, '_' and '-' are allowed")]
    InvalidSessionName { name: String },

    /// Strict rendering found a placeholder without a parameter
    #[error("Template placeholder \"{{{{{name}}}}}\" has no matching parameter")]
    MissingParameter { name: String },

    /// Unbalanced or unrecognised mustache syntax left after substitution
    #[error("Malformed template for script \"{script}\" near byte {offset}")]
    MalformedTemplate { script: String, offset: usize },

    /// Readiness probe reported the target is not accepting commands
    #[error("Target \"{target}\" is not running")]
    TargetNotRunning { target: String },

    /// Sync collaborator failure, surfaced unchanged
    #[error(transparent)]
    SyncFailed(anyhow::Error),

    /// Remote session layer failure, surfaced unchanged
    #[error(transparent)]
    DispatchFailed(anyhow::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RunError>;

impl RunError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Process exit code for this error kind. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::InvalidParameterFormat { .. } => 10,
            Self::DuplicateParameter { .. } => 11,
            Self::UnknownScript { .. } => 12,
            Self::InvalidSessionName { .. } => 13,
            Self::MissingParameter { .. } => 14,
            Self::MalformedTemplate { .. } => 15,
            Self::TargetNotRunning { .. } => 20,
            Self::SyncFailed(_) => 21,
            Self::DispatchFailed(_) => 22,
        }
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
