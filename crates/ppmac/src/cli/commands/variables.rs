use clap::Parser;
use std::sync::Arc;

use super::close_channel;
use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::session::Session;
use crate::util::{format_general, seconds};

/// Send a raw line on a new gpascii channel and print the response
#[derive(Parser, Debug)]
#[command(name = "gpascii", allow_negative_numbers = true)]
struct GpasciiArgs {
    /// Line to send
    #[arg(required = true, num_args = 1..)]
    cmd: Vec<String>,
    /// Seconds to wait for more output
    #[arg(short, long)]
    timeout: Option<f64>,
}

pub struct GpasciiCommand {
    session: Arc<Session>,
}

impl GpasciiCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for GpasciiCommand {
    fn name(&self) -> &'static str {
        "gpascii"
    }

    fn description(&self) -> &'static str {
        "Send a raw gpascii line. Usage: gpascii <cmd...> [-t timeout]"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["g"]
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: GpasciiArgs = parse_args("gpascii", &args)?;
            let comm = session.check_comm().await?;

            let timeout = match args.timeout {
                Some(t) => seconds(t.max(0.0))?,
                None => session.config().connection.raw_read_timeout(),
            };

            let mut gpascii = comm.gpascii_channel().await?;
            let mut interrupt = session.interrupt().subscribe();
            let result: Result<String, CommandError> = async {
                gpascii.send_line(&args.cmd.join(" ")).await?;
                loop {
                    tokio::select! {
                        _ = interrupt.recv() => break,
                        line = gpascii.read_line(timeout) => match line {
                            Ok(line) if line.is_empty() => {}
                            Ok(line) => session.output().line(line),
                            Err(e) if e.is_timeout() => break,
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Ok(String::new())
            }
            .await;

            close_channel(gpascii).await;
            result
        })
    }
}

/// Read a variable
#[derive(Parser, Debug)]
#[command(name = "get_var")]
struct GetVarArgs {
    variable: String,
}

pub struct GetVarCommand {
    session: Arc<Session>,
}

impl GetVarCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for GetVarCommand {
    fn name(&self) -> &'static str {
        "get_var"
    }

    fn description(&self) -> &'static str {
        "Read a variable. Usage: get_var <variable>"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: GetVarArgs = parse_args("get_var", &args)?;
            let comm = session.check_comm().await?;
            let value = comm.gpascii().await.get_variable(&args.variable).await?;
            Ok(format!("{}={}", args.variable, value))
        })
    }
}

/// Write a variable and print the value read back
#[derive(Parser, Debug)]
#[command(name = "set_var", allow_negative_numbers = true)]
struct SetVarArgs {
    variable: String,
    value: String,
}

pub struct SetVarCommand {
    session: Arc<Session>,
}

impl SetVarCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for SetVarCommand {
    fn name(&self) -> &'static str {
        "set_var"
    }

    fn description(&self) -> &'static str {
        "Write a variable. Usage: set_var <variable> <value>"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: SetVarArgs = parse_args("set_var", &args)?;
            let comm = session.check_comm().await?;
            let readback = comm
                .gpascii()
                .await
                .set_variable(&args.variable, &args.value)
                .await?;
            Ok(format!("{}={}", args.variable, readback))
        })
    }
}

/// Read a variable, or write it when a value is given
#[derive(Parser, Debug)]
#[command(name = "v", allow_negative_numbers = true)]
struct VArgs {
    /// `name` or `name=value`
    variable: String,
    value: Option<String>,
}

impl VArgs {
    fn split(self) -> (String, Option<String>) {
        match self.variable.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), Some(value.trim().to_string())),
            None => (self.variable, self.value),
        }
    }
}

pub struct VCommand {
    session: Arc<Session>,
}

impl VCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for VCommand {
    fn name(&self) -> &'static str {
        "v"
    }

    fn description(&self) -> &'static str {
        "Get or set a variable. Usage: v <variable>[=value] [value]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let (variable, value) = parse_args::<VArgs>("v", &args)?.split();
            let comm = session.check_comm().await?;
            let mut gpascii = comm.gpascii().await;

            let result = match value {
                Some(value) => gpascii.set_variable(&variable, value).await?,
                None => gpascii.get_variable(&variable).await?,
            };
            Ok(format!("{}={}", variable, result))
        })
    }
}

pub struct ShellCmdCommand {
    session: Arc<Session>,
}

impl ShellCmdCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ShellCmdCommand {
    fn name(&self) -> &'static str {
        "shell_cmd"
    }

    fn description(&self) -> &'static str {
        "Run a shell command on the controller. Usage: shell_cmd <command...>"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            if args.is_empty() {
                return Err(CommandError::Usage(
                    "Usage: shell_cmd <command...>".to_string(),
                ));
            }

            let comm = session.check_comm().await?;
            let output = comm.shell_output(&args.join(" "), None).await?;

            let mut lines: Vec<String> = output
                .lines
                .iter()
                .map(|l| l.trim_end().to_string())
                .collect();
            if let Some(status) = output.exit_status.filter(|s| *s != 0) {
                lines.push(fmt::warning(&format!("(exit status {})", status)));
            }
            Ok(lines.join("\n"))
        })
    }
}

/// Show motor positions relative to home
#[derive(Parser, Debug)]
#[command(name = "motors")]
struct MotorsArgs {
    #[arg(default_value_t = 1)]
    first_motor: u32,
    #[arg(default_value_t = 10)]
    nmotors: u32,
}

pub struct MotorsCommand {
    session: Arc<Session>,
}

impl MotorsCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for MotorsCommand {
    fn name(&self) -> &'static str {
        "motors"
    }

    fn description(&self) -> &'static str {
        "Show motor positions. Usage: motors [first=1] [count=10]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: MotorsArgs = parse_args("motors", &args)?;
            let comm = session.check_comm().await?;
            let mut gpascii = comm.gpascii().await;

            let end = args.first_motor.checked_add(args.nmotors).ok_or_else(|| {
                CommandError::Invalid(format!(
                    "Motor range {} + {} is out of bounds",
                    args.first_motor, args.nmotors
                ))
            })?;

            let mut lines = Vec::new();
            for motor in args.first_motor..end {
                let act = gpascii.get_f64(&format!("Motor[{}].ActPos", motor)).await;
                let home = gpascii.get_f64(&format!("Motor[{}].HomePos", motor)).await;

                let text = match (act, home) {
                    (Ok(act), Ok(home)) => format_general(act - home, 3),
                    (Err(e), _) | (_, Err(e)) => fmt::error(&format!("Error: {}", e)),
                };
                lines.push(format!("Motor {:2}: {}", motor, text));
            }
            Ok(lines.join("\n"))
        })
    }
}
