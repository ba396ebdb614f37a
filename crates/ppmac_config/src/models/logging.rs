use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
    pub use_color: bool,
    pub show_timestamp: bool,
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            show_timestamp: false,
            show_target: false,
        }
    }
}

/// Value of the `log_type` field attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogType {
    Console,
    Comm,
    Gpascii,
    Gather,
    Completer,
    Tune,
    Config,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Console => "console",
            LogType::Comm => "comm",
            LogType::Gpascii => "gpascii",
            LogType::Gather => "gather",
            LogType::Completer => "completer",
            LogType::Tune => "tune",
            LogType::Config => "config",
        }
    }
}
