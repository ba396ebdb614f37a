use serde::{Deserialize, Serialize};

use super::{
    build::BuildConfig, completer::CompleterConfig, connection::ConnectionConfig,
    connection::ConnectionOverrides, gather::GatherConfig, logging::LoggingConfig,
    monitor::MonitorConfig, tune::TuneConfig,
};

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct PpmacConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub gather: GatherConfig,

    #[serde(default)]
    pub completer: CompleterConfig,

    #[serde(default)]
    pub tune: TuneConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PpmacConfig {
    /// Applies command-line overrides on top of the file configuration.
    pub fn merge(&mut self, overrides: &ConnectionOverrides, auto_connect: Option<bool>, debug: bool) {
        self.connection.apply(overrides);

        if let Some(auto_connect) = auto_connect {
            self.connection.auto_connect = auto_connect;
        }

        if debug {
            self.logging.debug = true;
        }
    }

    /// Copy safe to print: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.connection.password.is_empty() {
            config.connection.password = "********".to_string();
        }
        config
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides() {
        let mut config = PpmacConfig::default();
        config.merge(
            &ConnectionOverrides {
                user: Some("operator".to_string()),
                ..Default::default()
            },
            Some(false),
            true,
        );

        assert_eq!(config.connection.user, "operator");
        assert!(!config.connection.auto_connect);
        assert!(config.logging.debug);
    }

    #[test]
    fn test_redacted_masks_password() {
        let config = PpmacConfig::default();
        let yaml = config.redacted().to_yaml().unwrap();
        assert!(!yaml.contains("deltatau"));
        assert!(yaml.contains("********"));
        assert!(yaml.contains("10.0.0.98"));
    }
}
