pub mod build;
pub mod completer;
pub mod connection;
pub mod gather;
pub mod logging;
pub mod monitor;
pub mod ppmac;
pub mod tune;
