//! Error type for funnel operations.
//! Task failures inside the queue stay generic; this enum covers what funnel itself can fail on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Main error type for funnel operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunnelError {
    /// Invalid capacity, malformed config file, bad setting value
    Config {
        operation: String,
        field: Option<String>,
        source: String,
    },
    /// I/O related errors
    Io {
        operation: String,
        path: Option<String>,
        source: String,
    },
    /// A queued task (command, digest job) failed
    Task {
        operation: String,
        index: Option<usize>,
        source: String,
    },
    /// Input closed while prompting (Ctrl-C / Ctrl-D)
    Interrupted { operation: String },
}

impl FunnelError {
    /// The underlying message without operation context.
    pub fn source_message(&self) -> &str {
        match self {
            FunnelError::Config { source, .. }
            | FunnelError::Io { source, .. }
            | FunnelError::Task { source, .. } => source,
            FunnelError::Interrupted { .. } => "interrupted",
        }
    }

    /// Submission index of the failed task, if this is a task error that carries one.
    pub fn task_index(&self) -> Option<usize> {
        match self {
            FunnelError::Task { index, .. } => *index,
            _ => None,
        }
    }
}

impl fmt::Display for FunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunnelError::Config { operation, field, source } => {
                write!(f, "Configuration error in {}: {}", operation, source)?;
                if let Some(field) = field {
                    write!(f, " (field: {})", field)?;
                }
                Ok(())
            }
            FunnelError::Io { operation, path, source } => {
                write!(f, "I/O error in {}: {}", operation, source)?;
                if let Some(path) = path {
                    write!(f, " (path: {})", path)?;
                }
                Ok(())
            }
            FunnelError::Task { operation, index, source } => {
                write!(f, "Task error in {}: {}", operation, source)?;
                if let Some(index) = index {
                    write!(f, " (task: #{})", index + 1)?;
                }
                Ok(())
            }
            FunnelError::Interrupted { operation } => {
                write!(f, "Interrupted during {}", operation)
            }
        }
    }
}

impl std::error::Error for FunnelError {}

impl From<std::io::Error> for FunnelError {
    fn from(source: std::io::Error) -> Self {
        utils::io_error("io", None, source)
    }
}

impl From<serde_json::Error> for FunnelError {
    fn from(source: serde_json::Error) -> Self {
        FunnelError::Config {
            operation: "parse_json".to_string(),
            field: None,
            source: source.to_string(),
        }
    }
}

/// Utility functions for common error patterns
pub mod utils {
    use super::*;

    /// Convert std::io::Error to FunnelError
    pub fn io_error(operation: &str, path: Option<&str>, source: std::io::Error) -> FunnelError {
        FunnelError::Io {
            operation: operation.to_string(),
            path: path.map(String::from),
            source: source.to_string(),
        }
    }

    /// Create a configuration error for a specific field
    pub fn config_error(operation: &str, field: Option<&str>, source: &str) -> FunnelError {
        FunnelError::Config {
            operation: operation.to_string(),
            field: field.map(String::from),
            source: source.to_string(),
        }
    }

    /// Create a task error, optionally tagged with the task's submission index
    pub fn task_error(operation: &str, index: Option<usize>, source: &str) -> FunnelError {
        FunnelError::Task {
            operation: operation.to_string(),
            index,
            source: source.to_string(),
        }
    }
}
