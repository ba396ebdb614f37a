//! Operator console for Power PMAC motion controllers: ad-hoc variable
//! access, status displays, data gathering and servo tuning over SSH.

pub mod cli;
pub mod error;
pub mod monitor;
pub mod output;
pub mod plot;
pub mod session;
pub mod status;
pub mod telemetry;
pub mod util;

pub use cli::commands::get_all_commands;
pub use cli::{CommandMessage, CommandProcessor, InterruptController};
pub use error::CommandError;
pub use output::Output;
pub use session::{Connector, Session, SshConnector, TransportConnector};
