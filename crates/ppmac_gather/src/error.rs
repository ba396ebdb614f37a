use ppmac_comm::{CommError, GpasciiError};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatherError {
    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Gpascii(#[from] GpasciiError),

    #[error("gather.addr: Unable to read addresses from settings file ({0})")]
    MissingAddresses(String),

    #[error("Unable to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Script file does not exist: {0}")]
    ScriptNotFound(String),

    #[error("{script}: unknown placeholder {{{name}}}")]
    UnknownPlaceholder { script: String, name: String },

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("No data gathered")]
    NoData,

    #[error("Address not gathered: {0}")]
    ColumnNotFound(String),

    #[error("Invalid gather request: {0}")]
    InvalidRequest(String),

    #[error("Interrupted")]
    Interrupted,
}
