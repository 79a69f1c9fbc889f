//! Error types for the `datagen` library.

use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Errors produced by the `datagen` library.
#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A task's configuration failed validation before it could run.
    #[error("task validation failed: {0}")]
    Validation(String),

    /// The task's `json_schema` field is not valid JSON, or not an object at the top level.
    #[error("failed to parse JSON schema")]
    SchemaParse(#[from] serde_json::Error),

    /// Failed to introspect a data source's table structure.
    #[error("failed to introspect table {table}: {source}")]
    Introspection {
        /// Name of the table that could not be introspected.
        table: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A field rule could not produce a value.
    #[error("failed to generate field '{field}': {reason}")]
    Generation {
        /// Dotted/bracketed path of the offending field.
        field: String,
        /// Human-readable cause.
        reason: String,
    },

    /// A sink failed to write a batch of records.
    #[error("failed to write to sink: {0}")]
    Sink(String),

    /// A unique field could not find a non-colliding value within the retry budget.
    #[error("could not generate a unique value for field '{field}' after {attempts} attempts")]
    UniquenessExhausted {
        /// Dotted/bracketed path of the offending field.
        field: String,
        /// Number of retries attempted before giving up.
        attempts: u32,
    },

    /// A second `execute` was requested while the task was still running.
    #[error("task {0} is already running")]
    AlreadyRunning(String),

    /// Generic I/O error, tagged with the action and path that failed.
    #[error("failed to {action} at {}", path.display())]
    Io {
        /// Action causing the error (e.g. `"create file"`).
        action: &'static str,
        /// File path causing the I/O error.
        path: PathBuf,
        /// Source of error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid regular expression pattern.
    #[error("invalid regex pattern '{pattern}'")]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// Underlying parse error.
        #[source]
        source: regex_syntax::Error,
    },
}

impl Error {
    /// Builds a [`Error::Generation`] for the given field path.
    pub fn generation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Generation { field: field.into(), reason: reason.into() }
    }

    /// Builds a [`Error::Io`] tagging the action and path.
    pub fn io(action: &'static str, path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io { action, path: path.as_ref().to_path_buf(), source }
    }
}
