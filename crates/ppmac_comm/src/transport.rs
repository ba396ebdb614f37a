use async_trait::async_trait;
use std::time::Duration;

use crate::error::CommError;

/// Output of a one-shot remote command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub lines: Vec<String>,
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status.unwrap_or(0) == 0
    }

    pub(crate) fn from_bytes(bytes: &[u8], exit_status: Option<u32>) -> Self {
        let text = String::from_utf8_lossy(bytes);
        Self {
            lines: text.lines().map(|l| l.trim_end().to_string()).collect(),
            exit_status,
        }
    }
}

/// A way of running commands on the controller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs `command`, feeding `input` to its stdin when given.
    async fn exec(
        &self,
        command: &str,
        input: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, CommError>;

    /// Starts `command` and keeps a line-oriented channel to it open.
    async fn open_channel(&self, command: &str) -> Result<Box<dyn LineChannel>, CommError>;

    async fn close(&self) -> Result<(), CommError> {
        Ok(())
    }
}

/// Bidirectional line channel to a long-running remote program.
#[async_trait]
pub trait LineChannel: Send {
    async fn send_line(&mut self, line: &str) -> Result<(), CommError>;

    /// Next line without its terminator. `CommError::Timeout` when nothing
    /// arrives in time, `CommError::Closed` at end of stream.
    async fn read_line(&mut self, timeout: Duration) -> Result<String, CommError>;

    /// Ends the remote program and releases the channel.
    async fn close(&mut self) -> Result<(), CommError> {
        Ok(())
    }
}

const ACK_BYTE: u8 = 0x06;

/// Splits complete lines out of a byte buffer that is filled incrementally.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Lines end at LF, or right after an ACK, which gpascii may send
    /// without a newline. The ACK itself is kept.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n' || b == ACK_BYTE)?;
        let line: Vec<u8> = self.buf.drain(..=end).collect();
        let line = match line.last() {
            Some(b'\n') => &line[..line.len() - 1],
            _ => &line[..],
        };
        let text = String::from_utf8_lossy(line);
        Some(text.trim_end_matches('\r').to_string())
    }

    /// Whatever is left once the stream has ended.
    pub(crate) fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}
