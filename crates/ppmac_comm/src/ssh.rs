use async_trait::async_trait;
use ppmac_config::{ConnectionConfig, LogType};
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CommError;
use crate::transport::{ExecOutput, LineBuffer, LineChannel, Transport};

struct SshHandler;

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    // Controllers on the bench are re-imaged often; host keys are not pinned.
    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// SSH session to the controller, authenticated with a password.
pub struct SshTransport {
    session: Mutex<Handle<SshHandler>>,
    host: String,
}

impl SshTransport {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, CommError> {
        let target = format!("{}:{}", config.host, config.port);
        debug!(
            log_type = LogType::Comm.as_str(),
            "Connecting to {} as {}", target, config.user
        );

        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let connect = client::connect(ssh_config, (config.host.as_str(), config.port), SshHandler);
        let mut session = tokio::time::timeout(config.connect_timeout(), connect)
            .await
            .map_err(|_| CommError::Timeout(format!("connection to {}", target)))??;

        let authenticated = session
            .authenticate_password(config.user.clone(), config.password.clone())
            .await?;
        if !authenticated {
            return Err(CommError::Auth(config.user.clone()));
        }

        info!(log_type = LogType::Comm.as_str(), "Connected to {}", target);
        Ok(Self {
            session: Mutex::new(session),
            host: target,
        })
    }

    async fn open_session(&self) -> Result<Channel<Msg>, CommError> {
        let session = self.session.lock().await;
        Ok(session.channel_open_session().await?)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn exec(
        &self,
        command: &str,
        input: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, CommError> {
        debug!(log_type = LogType::Comm.as_str(), "exec: {}", command);
        let mut channel = self.open_session().await?;
        channel.exec(true, command).await?;

        if let Some(input) = input {
            channel.data(input).await?;
            channel.eof().await?;
        }

        let mut stdout = Vec::new();
        let mut exit_status = None;

        loop {
            let msg = match timeout {
                Some(limit) => tokio::time::timeout(limit, channel.wait())
                    .await
                    .map_err(|_| CommError::Timeout(format!("`{}`", command)))?,
                None => channel.wait().await,
            };

            match msg {
                Some(ChannelMsg::Data { ref data }) => stdout.extend_from_slice(data),
                Some(ChannelMsg::ExtendedData { ref data, .. }) => stdout.extend_from_slice(data),
                Some(ChannelMsg::ExitStatus { exit_status: status }) => exit_status = Some(status),
                Some(_) => {}
                None => break,
            }
        }

        Ok(ExecOutput::from_bytes(&stdout, exit_status))
    }

    async fn open_channel(&self, command: &str) -> Result<Box<dyn LineChannel>, CommError> {
        debug!(
            log_type = LogType::Comm.as_str(),
            "Opening line channel on {}: {}", self.host, command
        );
        let channel = self.open_session().await?;
        channel.exec(true, command).await?;

        Ok(Box::new(SshLineChannel {
            channel,
            buffer: LineBuffer::default(),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), CommError> {
        let session = self.session.lock().await;
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!(
                log_type = LogType::Comm.as_str(),
                "Disconnect from {} failed: {}", self.host, e
            );
        }
        Ok(())
    }
}

struct SshLineChannel {
    channel: Channel<Msg>,
    buffer: LineBuffer,
    closed: bool,
}

#[async_trait]
impl LineChannel for SshLineChannel {
    async fn send_line(&mut self, line: &str) -> Result<(), CommError> {
        if self.closed {
            return Err(CommError::Closed);
        }
        let data = format!("{}\n", line);
        self.channel.data(data.as_bytes()).await?;
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, CommError> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);

        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(line);
            }

            if self.closed {
                return self.buffer.take_rest().ok_or(CommError::Closed);
            }

            let msg = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.channel.wait())
                    .await
                    .map_err(|_| CommError::Timeout("gpascii response".to_string()))?,
                None => self.channel.wait().await,
            };

            match msg {
                Some(ChannelMsg::Data { ref data }) => self.buffer.extend(data),
                Some(ChannelMsg::ExtendedData { ref data, .. }) => self.buffer.extend(data),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => self.closed = true,
                Some(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), CommError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.eof().await?;
        self.channel.close().await?;
        Ok(())
    }
}
