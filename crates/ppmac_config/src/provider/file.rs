use std::{fs, io};

use tracing::{debug, warn};

use crate::{ConfigError, LogType, PpmacConfig};

pub const DEFAULT_CONFIG_PATH: &str = "ppmac.yaml";

pub struct FileProvider;

impl FileProvider {
    /// Loads the YAML configuration at `path` (or `ppmac.yaml`).
    ///
    /// A missing file is not an error: the defaults are returned and a
    /// warning is logged. Sections absent from the file keep their defaults.
    pub fn try_load_config(path: Option<&str>) -> Result<PpmacConfig, ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    log_type = LogType::Config.as_str(),
                    "Configuration file {} not found, using defaults", path
                );
                return Ok(PpmacConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_string(),
                    source,
                });
            }
        };

        let config = Self::parse(&content, path)?;
        debug!(
            log_type = LogType::Config.as_str(),
            "Loaded configuration from {}", path
        );
        Ok(config)
    }

    fn parse(content: &str, path: &str) -> Result<PpmacConfig, ConfigError> {
        if content.trim().is_empty() {
            return Ok(PpmacConfig::default());
        }

        let config: PpmacConfig =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &PpmacConfig) -> Result<(), ConfigError> {
        if config.connection.host.is_empty() {
            return Err(ConfigError::Invalid {
                field: "connection.host",
                reason: "must not be empty".to_string(),
            });
        }

        if config.gather.default_servo_period <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "gather.default_servo_period",
                reason: format!("{} is not positive", config.gather.default_servo_period),
            });
        }

        if config.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
