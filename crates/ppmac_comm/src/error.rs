use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH Error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Authentication failed for user {0}")]
    Auth(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Channel closed")]
    Closed,

    #[error("Remote command `{command}` exited with status {status}")]
    Remote {
        command: String,
        status: u32,
        output: Vec<String>,
    },
}

impl CommError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommError::Timeout(_))
    }
}

/// Failure of a single gpascii request.
#[derive(Error, Debug)]
pub enum GpasciiError {
    #[error(transparent)]
    Comm(#[from] CommError),

    /// The controller rejected the request
    #[error("error #{code}: {message}")]
    Device { code: u32, message: String },

    #[error("No response for {0}")]
    NoResponse(String),

    #[error("Unexpected value for {variable}: {value}")]
    InvalidValue { variable: String, value: String },
}

impl GpasciiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GpasciiError::Comm(e) if e.is_timeout())
    }
}
