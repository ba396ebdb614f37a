use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompleterError {
    #[error("Unable to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid catalog {path}: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid variable path: {0}")]
    InvalidPath(String),

    #[error("{path}: unknown name '{segment}'")]
    NotFound { path: String, segment: String },

    #[error("{path}: '{segment}' is ambiguous ({})", candidates.join(", "))]
    Ambiguous {
        path: String,
        segment: String,
        candidates: Vec<String>,
    },

    #[error("{path}: '{segment}' does not take an index")]
    UnexpectedIndex { path: String, segment: String },
}
