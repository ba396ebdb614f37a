//! Interactive command processing.

pub mod command;
pub mod commands;
pub mod format;
pub mod interrupt;

pub use command::{CommandMessage, CommandProcessor};
pub use interrupt::InterruptController;
