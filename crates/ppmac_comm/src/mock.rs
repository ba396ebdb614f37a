use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CommError;
use crate::gpascii::{ACK, READY_BANNER};
use crate::transport::{ExecOutput, LineChannel, Transport};

/// In-memory controller: a gpascii interpreter over a variable map, a
/// scripted shell and a small file system.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    variables: HashMap<String, String>,
    sequences: HashMap<String, VecDeque<String>>,
    errors: HashMap<String, (u32, String)>,
    files: HashMap<String, String>,
    shell_replies: HashMap<String, ExecOutput>,
    shell_delays: HashMap<String, Duration>,
    commands: Vec<String>,
    shell_commands: Vec<String>,
    closed_channels: usize,
    no_banner: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(self, name: &str, value: &str) -> Self {
        self.set_variable(name, value);
        self
    }

    /// Successive reads of `name` return `values` in order; the last one sticks.
    pub fn with_sequence(self, name: &str, values: &[&str]) -> Self {
        self.set_sequence(name, values);
        self
    }

    pub fn set_sequence(&self, name: &str, values: &[&str]) {
        self.state.lock().sequences.insert(
            name.to_ascii_lowercase(),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Requests equal to `line` are rejected with a device error.
    pub fn with_error(self, line: &str, code: u32, message: &str) -> Self {
        self.state
            .lock()
            .errors
            .insert(line.to_ascii_lowercase(), (code, message.to_string()));
        self
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.state
            .lock()
            .files
            .insert(path.to_string(), contents.to_string());
        self
    }

    pub fn with_shell_reply(self, command: &str, lines: &[&str], exit_status: u32) -> Self {
        self.state.lock().shell_replies.insert(
            command.to_string(),
            ExecOutput {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                exit_status: Some(exit_status),
            },
        );
        self
    }

    /// `command` takes `delay` to finish.
    pub fn with_shell_delay(self, command: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .shell_delays
            .insert(command.to_string(), delay);
        self
    }

    /// Channels never print the ready banner.
    pub fn without_banner(self) -> Self {
        self.state.lock().no_banner = true;
        self
    }

    pub fn set_variable(&self, name: &str, value: &str) {
        let mut state = self.state.lock();
        let key = name.to_ascii_lowercase();
        state.sequences.remove(&key);
        state.variables.insert(key, value.to_string());
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .variables
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    /// Every gpascii line received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn shell_commands(&self) -> Vec<String> {
        self.state.lock().shell_commands.clone()
    }

    /// How many line channels have been closed.
    pub fn closed_channels(&self) -> usize {
        self.state.lock().closed_channels
    }
}

impl MockState {
    fn respond(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        self.commands.push(line.to_string());
        let key = line.to_ascii_lowercase();

        if let Some((code, message)) = self.errors.get(&key) {
            return vec![device_error(*code, message)];
        }

        if let Some((name, value)) = line.split_once('=')
            && is_variable_name(name.trim())
        {
            let name_key = name.trim().to_ascii_lowercase();
            if let Some((code, message)) = self.errors.get(&name_key) {
                return vec![device_error(*code, message)];
            }
            self.sequences.remove(&name_key);
            self.variables.insert(name_key, value.trim().to_string());
            return Vec::new();
        }

        if self.is_known(&key) || (is_variable_name(line) && (line.contains('.') || line.contains('[')))
        {
            return match self.read(&key) {
                Some(value) => vec![format!("{}={}", line, value)],
                None => vec![device_error(20, &format!("ILLEGAL CMD: {}", line))],
            };
        }

        Vec::new()
    }

    fn is_known(&self, key: &str) -> bool {
        self.variables.contains_key(key) || self.sequences.contains_key(key)
    }

    fn read(&mut self, key: &str) -> Option<String> {
        if let Some(sequence) = self.sequences.get_mut(key) {
            if sequence.len() > 1 {
                return sequence.pop_front();
            }
            return sequence.front().cloned();
        }
        self.variables.get(key).cloned()
    }

    fn exec(&mut self, command: &str, input: Option<&[u8]>) -> ExecOutput {
        self.shell_commands.push(command.to_string());

        if let Some(reply) = self.shell_replies.get(command) {
            return reply.clone();
        }

        if let Some(path) = command.strip_prefix("cat > ") {
            let contents = input.map(|i| String::from_utf8_lossy(i).to_string());
            self.files
                .insert(unquote(path), contents.unwrap_or_default());
            return ok(Vec::new());
        }

        if let Some(path) = command.strip_prefix("cat ") {
            return match self.files.get(&unquote(path)) {
                Some(contents) => ok(contents.lines().map(|l| l.to_string()).collect()),
                None => ExecOutput {
                    lines: vec![format!("cat: {}: No such file or directory", unquote(path))],
                    exit_status: Some(1),
                },
            };
        }

        if let Some(path) = command.strip_prefix("rm -f ") {
            self.files.remove(&unquote(path));
        }

        ok(Vec::new())
    }
}

fn ok(lines: Vec<String>) -> ExecOutput {
    ExecOutput {
        lines,
        exit_status: Some(0),
    }
}

fn unquote(path: &str) -> String {
    path.trim().trim_matches('\'').to_string()
}

fn device_error(code: u32, message: &str) -> String {
    format!("stdin:1:1: error #{}: {}", code, message)
}

fn is_variable_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
}

#[async_trait]
impl Transport for MockTransport {
    async fn exec(
        &self,
        command: &str,
        input: Option<&[u8]>,
        _timeout: Option<Duration>,
    ) -> Result<ExecOutput, CommError> {
        let delay = self.state.lock().shell_delays.get(command).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().exec(command, input))
    }

    async fn open_channel(&self, _command: &str) -> Result<Box<dyn LineChannel>, CommError> {
        let mut pending = VecDeque::new();
        if !self.state.lock().no_banner {
            pending.push_back(READY_BANNER.to_string());
        }

        Ok(Box::new(MockChannel {
            state: self.state.clone(),
            pending,
        }))
    }
}

struct MockChannel {
    state: Arc<Mutex<MockState>>,
    pending: VecDeque<String>,
}

#[async_trait]
impl LineChannel for MockChannel {
    async fn send_line(&mut self, line: &str) -> Result<(), CommError> {
        let mut response = self.state.lock().respond(line);
        match response.last_mut() {
            Some(last) => last.push(ACK),
            None => response.push(ACK.to_string()),
        }
        self.pending.extend(response);
        Ok(())
    }

    async fn read_line(&mut self, _timeout: Duration) -> Result<String, CommError> {
        self.pending
            .pop_front()
            .ok_or_else(|| CommError::Timeout("mock response".to_string()))
    }

    async fn close(&mut self) -> Result<(), CommError> {
        self.pending.clear();
        self.state.lock().closed_channels += 1;
        Ok(())
    }
}
