pub mod error;
pub mod models;
pub mod provider;

pub use error::ConfigError;
pub use models::build::BuildConfig;
pub use models::completer::CompleterConfig;
pub use models::connection::{ConnectionConfig, ConnectionOverrides};
pub use models::gather::GatherConfig;
pub use models::logging::{LogType, LoggingConfig};
pub use models::monitor::MonitorConfig;
pub use models::ppmac::PpmacConfig;
pub use models::tune::TuneConfig;
pub use provider::file::FileProvider;
