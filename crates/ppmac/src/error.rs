use ppmac_comm::{CommError, GpasciiError};
use ppmac_completer::CompleterError;
use ppmac_gather::GatherError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    /// Argument parsing failed; the message is clap's usage text.
    #[error("{0}")]
    Usage(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Completer not enabled")]
    CompleterDisabled,

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Gpascii(#[from] GpasciiError),

    #[error(transparent)]
    Gather(#[from] GatherError),

    #[error(transparent)]
    Completer(#[from] CompleterError),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl CommandError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        CommandError::Io {
            path: path.into(),
            source,
        }
    }
}
