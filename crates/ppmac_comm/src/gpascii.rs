//! Client side of the gpascii line protocol.
//!
//! Every request is a single line. The controller answers with zero or more
//! lines, the last of which carries an ACK (`0x06`). Rejected requests are
//! answered with a line of the form `stdin:1:1: error #20: ILLEGAL CMD: ...`.

use once_cell::sync::Lazy;
use ppmac_config::LogType;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::{CommError, GpasciiError};
use crate::transport::LineChannel;

pub const ACK: char = '\x06';
pub const READY_BANNER: &str = "STDIN Open for ASCII Input";

static DEVICE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)error\s*#\s*(\d+)\s*:\s*(.*)$").expect("device error pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramAction {
    Start,
    Stop,
}

pub struct Gpascii {
    channel: Box<dyn LineChannel>,
    timeout: Duration,
    /// A response timed out before its ACK; the rest of it is still in flight.
    pending_ack: bool,
}

impl Gpascii {
    /// Waits for the ready banner on a freshly opened channel.
    pub async fn start(
        mut channel: Box<dyn LineChannel>,
        timeout: Duration,
    ) -> Result<Self, CommError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CommError::Timeout("gpascii ready banner".to_string()));
            }

            let line = channel.read_line(remaining).await?;
            trace!(log_type = LogType::Gpascii.as_str(), "startup: {}", line);
            if line.contains(READY_BANNER) {
                break;
            }
        }

        debug!(log_type = LogType::Gpascii.as_str(), "gpascii channel ready");
        Ok(Self {
            channel,
            timeout,
            pending_ack: false,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sends one request and collects its response lines.
    ///
    /// The whole response is drained before a device error is reported so
    /// that the next request starts on a clean line.
    pub async fn command(&mut self, line: &str) -> Result<Vec<String>, GpasciiError> {
        self.discard_late_response().await?;

        trace!(log_type = LogType::Gpascii.as_str(), "-> {}", line);
        self.channel.send_line(line).await?;

        let mut lines = Vec::new();
        let mut device_error = None;

        loop {
            let raw = match self.channel.read_line(self.timeout).await {
                Ok(raw) => raw,
                Err(e) => {
                    self.pending_ack = e.is_timeout();
                    return Err(e.into());
                }
            };
            let done = raw.contains(ACK);
            let cleaned = strip_control(&raw);
            trace!(log_type = LogType::Gpascii.as_str(), "<- {}", cleaned);

            if !cleaned.is_empty() && !cleaned.eq_ignore_ascii_case(line.trim()) {
                if device_error.is_none() {
                    device_error = parse_device_error(&cleaned);
                }
                lines.push(cleaned);
            }

            if done {
                break;
            }
        }

        match device_error {
            Some(err) => Err(err),
            None => Ok(lines),
        }
    }

    /// Reads up to the ACK of a response that timed out earlier, so it is
    /// not taken as the answer to the next request.
    async fn discard_late_response(&mut self) -> Result<(), CommError> {
        while self.pending_ack {
            let raw = self.channel.read_line(self.timeout).await?;
            debug!(
                log_type = LogType::Gpascii.as_str(),
                "discarding late response: {}",
                strip_control(&raw)
            );
            if raw.contains(ACK) {
                self.pending_ack = false;
            }
        }
        Ok(())
    }

    /// Ends the remote gpascii process and its channel.
    pub async fn close(mut self) -> Result<(), CommError> {
        debug!(log_type = LogType::Gpascii.as_str(), "closing gpascii channel");
        self.channel.close().await
    }

    pub async fn get_variable(&mut self, variable: &str) -> Result<String, GpasciiError> {
        let lines = self.command(variable).await?;
        let first = lines
            .iter()
            .find(|l| l.contains('='))
            .or_else(|| lines.first())
            .ok_or_else(|| GpasciiError::NoResponse(variable.to_string()))?;

        let value = match first.split_once('=') {
            Some((_, value)) => value,
            None => first.as_str(),
        };

        Ok(value.trim().to_string())
    }

    pub async fn get_f64(&mut self, variable: &str) -> Result<f64, GpasciiError> {
        let value = self.get_variable(variable).await?;
        parse_f64(&value).ok_or_else(|| GpasciiError::InvalidValue {
            variable: variable.to_string(),
            value,
        })
    }

    pub async fn get_i64(&mut self, variable: &str) -> Result<i64, GpasciiError> {
        let value = self.get_variable(variable).await?;
        parse_i64(&value).ok_or_else(|| GpasciiError::InvalidValue {
            variable: variable.to_string(),
            value,
        })
    }

    /// Sets `variable` and returns the value read back from the controller.
    pub async fn set_variable(
        &mut self,
        variable: &str,
        value: impl std::fmt::Display,
    ) -> Result<String, GpasciiError> {
        let request = format!("{}={}", variable, value);
        debug!(log_type = LogType::Gpascii.as_str(), "set {}", request);
        self.command(&request).await?;
        self.get_variable(variable).await
    }

    pub async fn program(
        &mut self,
        coord: u32,
        program: u32,
        action: ProgramAction,
    ) -> Result<Vec<String>, GpasciiError> {
        let request = match action {
            ProgramAction::Start => format!("&{}b{}r", coord, program),
            ProgramAction::Stop => format!("&{}a", coord),
        };
        self.command(&request).await
    }

    /// Raw access for interactive use: the line is sent without waiting
    /// for the response.
    pub async fn send_line(&mut self, line: &str) -> Result<(), CommError> {
        self.channel.send_line(line).await
    }

    /// Raw access for interactive use, with ACK and CR stripped.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String, CommError> {
        let raw = self.channel.read_line(timeout).await?;
        Ok(strip_control(&raw))
    }
}

fn strip_control(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ACK && *c != '\r')
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_device_error(line: &str) -> Option<GpasciiError> {
    let captures = DEVICE_ERROR.captures(line)?;
    let code = captures.get(1)?.as_str().parse().ok()?;
    let message = captures.get(2).map_or("", |m| m.as_str()).trim().to_string();
    Some(GpasciiError::Device { code, message })
}

/// Parses a controller value; `$`-prefixed values are hexadecimal.
pub fn parse_f64(value: &str) -> Option<f64> {
    let value = value.trim();
    match value.strip_prefix('$') {
        Some(hex) => u64::from_str_radix(hex, 16).ok().map(|v| v as f64),
        None => value.parse().ok(),
    }
}

pub fn parse_i64(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('$') {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }

    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }

    let v: f64 = value.parse().ok()?;
    (v.fract() == 0.0 && v.is_finite()).then_some(v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::Transport;

    async fn gpascii(mock: &MockTransport) -> Gpascii {
        let channel = mock.open_channel("gpascii -2").await.unwrap();
        Gpascii::start(channel, Duration::from_millis(200)).await.unwrap()
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_f64(" 1.5 "), Some(1.5));
        assert_eq!(parse_f64("$1F"), Some(31.0));
        assert_eq!(parse_f64("abc"), None);
        assert_eq!(parse_i64("42"), Some(42));
        assert_eq!(parse_i64("3.0"), Some(3));
        assert_eq!(parse_i64("3.5"), None);
        assert_eq!(parse_i64("$AAAAAAAA"), Some(0xAAAA_AAAA));
    }

    #[test]
    fn test_parse_device_error() {
        let err = parse_device_error("stdin:1:1: error #20: ILLEGAL CMD: motor[1].foo").unwrap();
        match err {
            GpasciiError::Device { code, message } => {
                assert_eq!(code, 20);
                assert_eq!(message, "ILLEGAL CMD: motor[1].foo");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_device_error("Motor[1].ActPos=0").is_none());
    }

    #[tokio::test]
    async fn test_get_and_set_variable() {
        let mock = MockTransport::new().with_variable("Motor[1].Servo.Kp", "10");
        let mut gp = gpascii(&mock).await;

        assert_eq!(gp.get_variable("Motor[1].Servo.Kp").await.unwrap(), "10");
        assert_eq!(gp.get_f64("motor[1].servo.kp").await.unwrap(), 10.0);

        let readback = gp.set_variable("Motor[1].Servo.Kp", 12.5).await.unwrap();
        assert_eq!(readback, "12.5");
        assert!(mock.commands().contains(&"Motor[1].Servo.Kp=12.5".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_variable_is_device_error() {
        let mock = MockTransport::new();
        let mut gp = gpascii(&mock).await;

        let err = gp.get_variable("Motor[1].Bogus").await.unwrap_err();
        assert!(matches!(err, GpasciiError::Device { code: 20, .. }));

        // channel stays aligned after an error
        mock.set_variable("Sys.ServoPeriod", "0.442673749446658");
        assert_eq!(
            gp.get_variable("Sys.ServoPeriod").await.unwrap(),
            "0.442673749446658"
        );
    }

    #[tokio::test]
    async fn test_program_start_and_stop() {
        let mock = MockTransport::new();
        let mut gp = gpascii(&mock).await;

        gp.program(1, 10, ProgramAction::Start).await.unwrap();
        gp.program(1, 10, ProgramAction::Stop).await.unwrap();
        assert_eq!(mock.commands(), vec!["&1b10r", "&1a"]);
    }

    /// Replays canned reads; `None` is a read that times out.
    struct ScriptedChannel {
        reads: std::collections::VecDeque<Option<&'static str>>,
    }

    #[async_trait::async_trait]
    impl LineChannel for ScriptedChannel {
        async fn send_line(&mut self, _line: &str) -> Result<(), CommError> {
            Ok(())
        }

        async fn read_line(&mut self, _timeout: Duration) -> Result<String, CommError> {
            match self.reads.pop_front().flatten() {
                Some(line) => Ok(line.to_string()),
                None => Err(CommError::Timeout("scripted read".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_late_response_is_not_taken_for_the_next() {
        let channel = ScriptedChannel {
            reads: [
                Some(READY_BANNER),
                None,
                Some("Motor[1].ActPos=111\x06"),
                Some("Motor[2].ActPos=222\x06"),
            ]
            .into_iter()
            .collect(),
        };
        let mut gp = Gpascii::start(Box::new(channel), Duration::from_millis(20))
            .await
            .unwrap();

        let err = gp.get_variable("Motor[1].ActPos").await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(gp.get_variable("Motor[2].ActPos").await.unwrap(), "222");
    }

    #[tokio::test]
    async fn test_close_ends_the_channel() {
        let mock = MockTransport::new();
        let gp = gpascii(&mock).await;
        gp.close().await.unwrap();
        assert_eq!(mock.closed_channels(), 1);
    }

    #[tokio::test]
    async fn test_start_times_out_without_banner() {
        let mock = MockTransport::new().without_banner();
        let channel = mock.open_channel("gpascii -2").await.unwrap();
        let err = Gpascii::start(channel, Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(err.is_timeout());
    }
}
