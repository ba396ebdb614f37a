use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

enum Target {
    Stdout,
    Buffer(String),
}

/// Where command output goes. Long-running commands write lines here as
/// they happen; the rest return their output to the processor.
#[derive(Clone)]
pub struct Output {
    target: Arc<Mutex<Target>>,
}

impl Output {
    pub fn stdout() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Stdout)),
        }
    }

    /// Captures everything written, for tests and one-shot runs.
    pub fn buffer() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Buffer(String::new()))),
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        match &mut *self.target.lock() {
            Target::Stdout => {
                let mut stdout = io::stdout().lock();
                let _ = writeln!(stdout, "{}", text);
                let _ = stdout.flush();
            }
            Target::Buffer(buffer) => {
                buffer.push_str(text);
                buffer.push('\n');
            }
        }
    }

    /// Writes a command result unless it is empty.
    pub fn result(&self, text: &str) {
        if !text.is_empty() {
            self.line(text.trim_end_matches('\n'));
        }
    }

    /// Drains captured output; always empty for stdout.
    pub fn take(&self) -> String {
        match &mut *self.target.lock() {
            Target::Stdout => String::new(),
            Target::Buffer(buffer) => std::mem::take(buffer),
        }
    }
}
