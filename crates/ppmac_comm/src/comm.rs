use ppmac_config::{ConnectionConfig, LogType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::CommError;
use crate::gpascii::Gpascii;
use crate::ssh::SshTransport;
use crate::transport::{ExecOutput, Transport};

#[derive(Debug, Clone)]
pub struct CommSettings {
    pub gpascii_program: String,
    pub gpascii_timeout: Duration,
    /// Applied to shell commands unless the caller gives its own
    pub shell_timeout: Option<Duration>,
}

impl Default for CommSettings {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for CommSettings {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            gpascii_program: config.gpascii_program.clone(),
            gpascii_timeout: config.gpascii_timeout(),
            shell_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Connection handle: the transport plus one shared gpascii session.
pub struct Comm {
    transport: Arc<dyn Transport>,
    gpascii: Mutex<Gpascii>,
    settings: CommSettings,
}

impl Comm {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, CommError> {
        let transport = SshTransport::connect(config).await?;
        Self::open(Arc::new(transport), CommSettings::from(config)).await
    }

    pub async fn open(
        transport: Arc<dyn Transport>,
        settings: CommSettings,
    ) -> Result<Self, CommError> {
        let gpascii = Self::start_gpascii(transport.as_ref(), &settings).await?;
        Ok(Self {
            transport,
            gpascii: Mutex::new(gpascii),
            settings,
        })
    }

    async fn start_gpascii(
        transport: &dyn Transport,
        settings: &CommSettings,
    ) -> Result<Gpascii, CommError> {
        let channel = transport.open_channel(&settings.gpascii_program).await?;
        Gpascii::start(channel, settings.gpascii_timeout).await
    }

    /// The shared gpascii session.
    pub async fn gpascii(&self) -> MutexGuard<'_, Gpascii> {
        self.gpascii.lock().await
    }

    /// A new, independent gpascii session.
    pub async fn gpascii_channel(&self) -> Result<Gpascii, CommError> {
        Self::start_gpascii(self.transport.as_ref(), &self.settings).await
    }

    pub fn settings(&self) -> &CommSettings {
        &self.settings
    }

    /// Runs a shell command regardless of its exit status.
    pub async fn shell_output(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, CommError> {
        debug!(log_type = LogType::Comm.as_str(), "shell: {}", command);
        self.transport
            .exec(command, None, timeout.or(self.settings.shell_timeout))
            .await
    }

    /// Runs a shell command; a non-zero exit status is an error.
    pub async fn shell_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, CommError> {
        let output = self.shell_output(command, timeout).await?;
        check_status(command, output)
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<String>, CommError> {
        self.shell_command(&format!("cat {}", quote(path)), None).await
    }

    pub async fn send_file(&self, path: &str, contents: &str) -> Result<(), CommError> {
        let command = format!("cat > {}", quote(path));
        debug!(
            log_type = LogType::Comm.as_str(),
            "Sending {} bytes to {}",
            contents.len(),
            path
        );
        let output = self
            .transport
            .exec(&command, Some(contents.as_bytes()), self.settings.shell_timeout)
            .await?;
        check_status(&command, output).map(|_| ())
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), CommError> {
        self.shell_command(&format!("rm -f {}", quote(path)), None)
            .await
            .map(|_| ())
    }

    pub async fn close(&self) -> Result<(), CommError> {
        info!(log_type = LogType::Comm.as_str(), "Closing connection");
        self.transport.close().await
    }
}

fn check_status(command: &str, output: ExecOutput) -> Result<Vec<String>, CommError> {
    if output.success() {
        Ok(output.lines)
    } else {
        Err(CommError::Remote {
            command: command.to_string(),
            status: output.exit_status.unwrap_or_default(),
            output: output.lines,
        })
    }
}

/// Single-quotes a path for the remote shell.
fn quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}
