use clap::Parser;
use std::collections::BTreeMap;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cli::format as fmt;
use crate::error::CommandError;
use ppmac_config::LogType;

pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }
    fn execute(&self, args: Vec<String>) -> CommandFuture;
}

pub type CommandFuture = std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send>>;
pub type CommandResult = String;

pub enum CommandMessage {
    /// The sender is notified once the command's output has been written.
    Execute(String, oneshot::Sender<()>),
    Shutdown,
}

/// Wraps a command body so that errors are rendered instead of returned.
pub fn run<F>(body: F) -> CommandFuture
where
    F: Future<Output = Result<String, CommandError>> + Send + 'static,
{
    Box::pin(async move {
        match body.await {
            Ok(output) => output,
            Err(CommandError::Usage(usage)) => usage.trim_end().to_string(),
            Err(e) => fmt::error(&e.to_string()),
        }
    })
}

/// Parses command arguments with clap; `name` stands in for argv[0].
pub fn parse_args<T: Parser>(name: &str, args: &[String]) -> Result<T, CommandError> {
    T::try_parse_from(std::iter::once(name.to_string()).chain(args.iter().cloned()))
        .map_err(|e| CommandError::Usage(e.render().to_string()))
}

/// Splits a command line on whitespace, honoring single and double quotes.
pub fn split_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    parts.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        parts.push(current);
    }
    parts
}

pub struct CommandProcessor {
    commands: BTreeMap<String, Arc<dyn Command>>,
    aliases: BTreeMap<String, String>,
    tx: mpsc::Sender<CommandMessage>,
}

impl CommandProcessor {
    pub fn new(commands: Vec<Arc<dyn Command>>) -> (Self, mpsc::Receiver<CommandMessage>) {
        let (tx, rx) = mpsc::channel(32);
        let mut processor = Self {
            commands: BTreeMap::new(),
            aliases: BTreeMap::new(),
            tx,
        };

        for cmd in commands {
            processor.register_command(cmd);
        }

        (processor, rx)
    }

    pub fn register_command(&mut self, command: Arc<dyn Command>) {
        for alias in command.aliases() {
            self.aliases
                .insert(alias.to_string(), command.name().to_string());
        }
        self.commands.insert(command.name().to_string(), command);
    }

    pub async fn process_command(&self, input: &str) -> CommandResult {
        let parts = split_line(input);
        if parts.is_empty() {
            return "No command entered".to_string();
        }

        let command_name = parts[0].to_lowercase();
        if command_name == "help" {
            return self.get_help();
        }

        let command_name = self
            .aliases
            .get(&command_name)
            .cloned()
            .unwrap_or(command_name);

        match self.commands.get(&command_name) {
            Some(cmd) => {
                debug!(
                    log_type = LogType::Console.as_str(),
                    "Executing {} with args: {:?}",
                    command_name,
                    &parts[1..]
                );
                cmd.execute(parts[1..].to_vec()).await
            }
            None => fmt::error(&format!("Unknown command: {}", command_name)),
        }
    }

    fn get_help(&self) -> String {
        let mut help = format!("{}\n\n", fmt::header("Available Commands"));

        for (name, cmd) in &self.commands {
            let mut names = name.clone();
            for alias in cmd.aliases() {
                names.push_str(&format!("/{}", alias));
            }
            help.push_str(&format!(
                "  {} - {}\n",
                fmt::entity(&names),
                fmt::secondary(cmd.description())
            ));
        }

        help.push_str(&format!(
            "  {} - {}\n",
            fmt::entity("help"),
            fmt::secondary("Show this help message")
        ));

        help.push_str(&format!(
            "  {} - {}",
            fmt::entity("exit/quit"),
            fmt::secondary("Exit the console")
        ));

        help
    }

    pub fn sender(&self) -> mpsc::Sender<CommandMessage> {
        self.tx.clone()
    }

    /// Reads stdin on a blocking thread and forwards each line. The prompt
    /// is printed only when a person is at the terminal.
    pub fn start_input_loop(&self) {
        let is_tty = console::user_attended();
        if !is_tty {
            debug!(
                log_type = LogType::Console.as_str(),
                "stdin is not a TTY, using simplified input handling"
            );
        }
        let tx = self.tx.clone();

        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut reader = io::BufReader::new(stdin);
            let mut buffer = String::new();

            loop {
                if is_tty {
                    print!("ppmac> ");
                    let _ = io::stdout().flush();
                }

                buffer.clear();
                match reader.read_line(&mut buffer) {
                    Ok(0) => {
                        let _ = futures::executor::block_on(tx.send(CommandMessage::Shutdown));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(
                            log_type = LogType::Console.as_str(),
                            "stdin read failed: {}", e
                        );
                        std::thread::sleep(std::time::Duration::from_millis(100));
                        continue;
                    }
                }

                let input = buffer.trim();
                if input.is_empty() {
                    continue;
                }

                if input == "exit" || input == "quit" {
                    let _ = futures::executor::block_on(tx.send(CommandMessage::Shutdown));
                    break;
                }

                let (done_tx, done_rx) = oneshot::channel();
                let message = CommandMessage::Execute(input.to_string(), done_tx);
                if futures::executor::block_on(tx.send(message)).is_err() {
                    break;
                }
                // the next prompt waits for the command's output
                let _ = done_rx.blocking_recv();
            }
        });
    }
}
