use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use ppmac_comm::{Comm, CommError, CommSettings, Transport};
use ppmac_completer::{Catalog, CompleterError};
use ppmac_config::{ConnectionConfig, ConnectionOverrides, LogType, PpmacConfig};
use ppmac_gather::GatherFiles;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cli::format as fmt;
use crate::cli::interrupt::InterruptController;
use crate::error::CommandError;
use crate::output::Output;

/// Opens connections to the controller.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Comm, CommError>;
}

pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Comm, CommError> {
        Comm::connect(config).await
    }
}

/// Connects over an already established transport.
pub struct TransportConnector {
    transport: Arc<dyn Transport>,
}

impl TransportConnector {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Comm, CommError> {
        Comm::open(self.transport.clone(), CommSettings::from(config)).await
    }
}

/// Console state shared by every command: the connection, the variable
/// catalog and the configuration.
pub struct Session {
    config: PpmacConfig,
    connector: Arc<dyn Connector>,
    comm: Mutex<Option<Arc<Comm>>>,
    catalog: RwLock<Option<Arc<Catalog>>>,
    output: Output,
    interrupt: Arc<InterruptController>,
}

impl Session {
    pub fn new(
        config: PpmacConfig,
        connector: Arc<dyn Connector>,
        output: Output,
        interrupt: Arc<InterruptController>,
    ) -> Self {
        Self {
            config,
            connector,
            comm: Mutex::new(None),
            catalog: RwLock::new(None),
            output,
            interrupt,
        }
    }

    pub fn config(&self) -> &PpmacConfig {
        &self.config
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn interrupt(&self) -> &Arc<InterruptController> {
        &self.interrupt
    }

    pub fn gather_files(&self) -> GatherFiles {
        GatherFiles::from(&self.config.gather)
    }

    pub fn comm(&self) -> Option<Arc<Comm>> {
        self.comm.lock().clone()
    }

    /// Connects using the configured settings with `overrides` applied,
    /// replacing any previous connection, then reloads the catalog.
    pub async fn connect(&self, overrides: &ConnectionOverrides) -> Result<Arc<Comm>, CommandError> {
        let mut config = self.config.connection.clone();
        config.apply(overrides);

        info!(
            log_type = LogType::Console.as_str(),
            "Connecting to {}@{}:{}", config.user, config.host, config.port
        );
        let comm = Arc::new(self.connector.connect(&config).await?);

        let previous = self.comm.lock().replace(comm.clone());
        if let Some(previous) = previous
            && let Err(e) = previous.close().await
        {
            debug!(
                log_type = LogType::Console.as_str(),
                "Closing previous connection failed: {}", e
            );
        }

        self.load_catalog();
        Ok(comm)
    }

    /// The current connection, connecting first when `auto_connect` is set.
    pub async fn check_comm(&self) -> Result<Arc<Comm>, CommandError> {
        if let Some(comm) = self.comm() {
            return Ok(comm);
        }

        if self.config.connection.auto_connect {
            return self.connect(&ConnectionOverrides::default()).await;
        }

        error!(log_type = LogType::Console.as_str(), "Not connected");
        Err(CommandError::NotConnected)
    }

    pub async fn disconnect(&self) {
        let comm = self.comm.lock().take();
        if let Some(comm) = comm
            && let Err(e) = comm.close().await
        {
            warn!(
                log_type = LogType::Console.as_str(),
                "Error while disconnecting: {}", e
            );
        }
    }

    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.catalog.read().clone()
    }

    pub fn require_catalog(&self) -> Result<Arc<Catalog>, CommandError> {
        self.catalog().ok_or(CommandError::CompleterDisabled)
    }

    pub fn set_catalog(&self, catalog: Option<Catalog>) {
        *self.catalog.write() = catalog.map(Arc::new);
    }

    /// (Re)loads the catalog file. Problems are reported on the console
    /// and leave the completer disabled.
    pub fn load_catalog(&self) {
        let settings = &self.config.completer;
        if !settings.enabled {
            return;
        }

        if !Path::new(&settings.db_file).exists() {
            self.output.line(fmt::secondary(&format!(
                "Completer database not found ({}); completion disabled",
                settings.db_file
            )));
            self.set_catalog(None);
            return;
        }

        match Catalog::load(&settings.db_file) {
            Ok(catalog) => {
                info!(
                    log_type = LogType::Completer.as_str(),
                    "Completer loaded with {} variables",
                    catalog.len()
                );
                self.set_catalog(Some(catalog));
            }
            Err(e) => {
                self.output.line(fmt::error(&format!(
                    "Unable to load completer database: {}",
                    e
                )));
                self.set_catalog(None);
            }
        }
    }

    /// Canonical spelling of `variable` when a catalog is loaded; the name
    /// as given otherwise.
    pub fn canonical(&self, variable: &str) -> Result<String, CompleterError> {
        match self.catalog() {
            Some(catalog) => catalog.canonical(variable),
            None => Ok(variable.to_string()),
        }
    }

    pub async fn servo_period(&self, comm: &Comm) -> f64 {
        ppmac_gather::servo_period(comm, self.config.gather.default_servo_period).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppmac_comm::MockTransport;

    fn session(config: PpmacConfig, mock: &MockTransport) -> Session {
        Session::new(
            config,
            Arc::new(TransportConnector::new(Arc::new(mock.clone()))),
            Output::buffer(),
            InterruptController::new(),
        )
    }

    fn offline_config() -> PpmacConfig {
        let mut config = PpmacConfig::default();
        config.completer.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_auto_connect() {
        let session = session(offline_config(), &MockTransport::new());
        assert!(session.comm().is_none());
        session.check_comm().await.unwrap();
        assert!(session.comm().is_some());
    }

    #[tokio::test]
    async fn test_not_connected_without_auto_connect() {
        let mut config = offline_config();
        config.connection.auto_connect = false;
        let session = session(config, &MockTransport::new());

        assert!(matches!(
            session.check_comm().await,
            Err(CommandError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_missing_catalog_disables_completer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PpmacConfig::default();
        config.completer.db_file = dir.path().join("none.json").display().to_string();

        let session = session(config, &MockTransport::new());
        session.check_comm().await.unwrap();

        assert!(session.catalog().is_none());
        assert!(session.output().take().contains("not found"));
        assert_eq!(session.canonical("motor[1].actpos").unwrap(), "motor[1].actpos");
    }

    #[tokio::test]
    async fn test_connect_loads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("ppmac.json");
        std::fs::write(&db, r#"[{"path": "Motor[].ActPos", "Comments": "Actual position"}]"#)
            .unwrap();

        let mut config = PpmacConfig::default();
        config.completer.db_file = db.display().to_string();
        let session = session(config, &MockTransport::new());

        session.connect(&ConnectionOverrides::default()).await.unwrap();
        assert_eq!(session.canonical("motor[1].actpos").unwrap(), "Motor[1].ActPos");
    }
}
