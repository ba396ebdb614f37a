//! Connection to the controller: an SSH transport, the gpascii line
//! protocol spoken over it, and shell/file helpers.

pub mod comm;
pub mod error;
pub mod gpascii;
pub mod mock;
pub mod ssh;
pub mod transport;

pub use comm::{Comm, CommSettings};
pub use error::{CommError, GpasciiError};
pub use gpascii::{Gpascii, ProgramAction, parse_f64, parse_i64};
pub use mock::MockTransport;
pub use ssh::SshTransport;
pub use transport::{ExecOutput, LineChannel, Transport};
