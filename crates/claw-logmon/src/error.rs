//! Error types for the log monitor.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring, tailing, or persisting log monitors.
#[derive(Debug, Error)]
pub enum LogMonError {
    /// The configuration push payload was malformed or failed validation.
    #[error("invalid configuration: {0}")]
    ConfigParse(String),

    /// A rule template did not compile into a regular expression.
    #[error("rule pattern {regular:?} failed to compile: {source}")]
    PatternCompile {
        /// The rule template as configured.
        regular: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The watched file could not be opened or read.
    #[error("I/O error on {}: {source}", path.display())]
    TailerIo {
        /// The watched path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A captured fragment was not a well-formed JSON object.
    #[error("malformed fragment: {0}")]
    FragmentParse(String),

    /// The persisted state could not be written, read, or decoded.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl LogMonError {
    /// Returns true if the error was caused by the caller's configuration.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigParse(_) | Self::PatternCompile { .. })
    }

    pub(crate) fn tailer_io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::TailerIo { path, source }
    }
}

impl From<serde_json::Error> for LogMonError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

/// Result type alias for log monitor operations.
pub type Result<T> = std::result::Result<T, LogMonError>;
