use std::fmt;

use thiserror::Error;

/// High-level error type shared across schedman components.
#[derive(Debug, Error)]
pub enum SchedmanError {
    /// A template document, per-kind spec, or process-argument payload failed
    /// schema validation. Fatal for the load that produced it.
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error("duplicate template name '{0}'")]
    DuplicateName(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("kind '{0}' has no registered worker")]
    NoWorker(String),
    /// A rule references an invocation target whose logical name cannot be
    /// resolved to a live identifier.
    #[error("invalid invocation target: {0}")]
    InvalidTarget(String),
    #[error("deploy error: {0}")]
    Deploy(String),
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SchedmanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SchedmanError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SchedmanError {
    /// Prefixes message-bearing variants with additional context, typically a
    /// source-file path.
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            SchedmanError::SchemaViolation(msg) => {
                SchedmanError::SchemaViolation(format!("{ctx}: {msg}"))
            }
            SchedmanError::DuplicateName(msg) => {
                SchedmanError::DuplicateName(format!("{msg} ({ctx})"))
            }
            SchedmanError::NotFound(msg) => SchedmanError::NotFound(format!("{ctx}: {msg}")),
            SchedmanError::Deploy(msg) => SchedmanError::Deploy(format!("{ctx}: {msg}")),
            SchedmanError::Snapshot(msg) => SchedmanError::Snapshot(format!("{ctx}: {msg}")),
            SchedmanError::Serialization(msg) => {
                SchedmanError::Serialization(format!("{ctx}: {msg}"))
            }
            other => other,
        }
    }
}
