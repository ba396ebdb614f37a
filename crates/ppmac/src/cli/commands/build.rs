use clap::Parser;
use ppmac_comm::Comm;
use ppmac_config::LogType;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::output::Output;
use crate::session::Session;
use crate::util::util_makefile;

const MAKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a user utility on the controller
#[derive(Parser, Debug)]
#[command(name = "util_build")]
struct UtilBuildArgs {
    /// Executable name
    name: String,
    /// Local source files
    #[arg(required = true, num_args = 1..)]
    source_files: Vec<String>,
    /// Destination directory on the controller
    #[arg(short, long)]
    dest: Option<String>,
    /// Run the built program with these arguments
    #[arg(short, long, num_args = 0.., allow_hyphen_values = true)]
    run: Option<Vec<String>>,
}

pub struct UtilBuildCommand {
    session: Arc<Session>,
}

impl UtilBuildCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

fn file_name(local: &str) -> String {
    Path::new(local)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| local.to_string())
}

fn remote_name(dest: &str, local: &str) -> String {
    format!("{}/{}", dest.trim_end_matches('/'), file_name(local))
}

/// Prints a shell command's output and returns whether it succeeded.
async fn shell_verbose(
    comm: &Comm,
    output: &Output,
    command: &str,
    timeout: Option<Duration>,
) -> Result<bool, CommandError> {
    debug!(log_type = LogType::Console.as_str(), "-> {}", command);
    let result = comm.shell_output(command, timeout).await?;
    for line in &result.lines {
        output.line(line);
    }
    Ok(result.success())
}

impl Command for UtilBuildCommand {
    fn name(&self) -> &'static str {
        "util_build"
    }

    fn description(&self) -> &'static str {
        "Build a utility on the controller. Usage: util_build <name> <source...> [-d dest] [-r args...]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: UtilBuildArgs = parse_args("util_build", &args)?;
            let comm = session.check_comm().await?;
            let output = session.output();
            let dest = args
                .dest
                .unwrap_or_else(|| session.config().build.dest_path.clone());

            let mut sources = Vec::with_capacity(args.source_files.len());
            for local in &args.source_files {
                let text = tokio::fs::read_to_string(local)
                    .await
                    .map_err(|e| CommandError::io(local, e))?;
                sources.push((remote_name(&dest, local), text));
            }

            let file_names: Vec<String> =
                args.source_files.iter().map(|local| file_name(local)).collect();
            let makefile = format!("{}/Makefile", dest.trim_end_matches('/'));

            output.line("Sending Makefile");
            comm.send_file(&makefile, &util_makefile(&file_names, &args.name))
                .await?;
            for (remote, text) in &sources {
                output.line(format!("Sending {}", remote));
                comm.send_file(remote, text).await?;
            }

            output.line("Building...");
            info!(
                log_type = LogType::Console.as_str(),
                "Building {} in {}", args.name, dest
            );
            let build = comm
                .shell_output(&format!("cd {} && make", dest), Some(MAKE_TIMEOUT))
                .await?;
            for line in &build.lines {
                output.line(line);
            }

            output.line("Cleaning up...");
            for (remote, _) in &sources {
                comm.remove_file(remote).await?;
            }
            comm.remove_file(&makefile).await?;

            let errored = !build.success()
                || build
                    .lines
                    .iter()
                    .any(|line| line.to_lowercase().contains("error"));
            if errored {
                return Ok(fmt::error(&format!("Build of {} failed", args.name)));
            }

            if let Some(run_args) = args.run {
                let command = format!(
                    "{}/{} {}",
                    dest.trim_end_matches('/'),
                    args.name,
                    run_args.join(" ")
                );
                shell_verbose(&comm, output, command.trim_end(), None).await?;
            }

            Ok(fmt::success(&format!("Built {}", args.name)))
        })
    }
}

/// Load a user phase kernel module and register it for motors
#[derive(Parser, Debug)]
#[command(name = "userphase")]
struct UserPhaseArgs {
    /// Kernel module remote filename
    module: String,
    /// Phase function name
    name: String,
    #[arg(required = true, num_args = 1..)]
    motors: Vec<u32>,
    /// Unload the module first
    #[arg(short, long)]
    unload: bool,
}

pub struct UserPhaseCommand {
    session: Arc<Session>,
}

impl UserPhaseCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for UserPhaseCommand {
    fn name(&self) -> &'static str {
        "userphase"
    }

    fn description(&self) -> &'static str {
        "Register a user phase routine. Usage: userphase <module> <name> <motor...> [-u]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: UserPhaseArgs = parse_args("userphase", &args)?;
            let comm = session.check_comm().await?;
            let output = session.output();

            if args.unload {
                shell_verbose(&comm, output, &format!("rmmod {}", args.module), None).await?;
            }

            {
                let mut gpascii = comm.gpascii().await;
                for motor in &args.motors {
                    gpascii
                        .set_variable(&format!("Motor[{}].PhaseCtrl", motor), 0)
                        .await?;
                }
            }

            comm.shell_command(&format!("insmod {}", args.module), None)
                .await?;
            shell_verbose(
                &comm,
                output,
                &format!("lsmod | grep {}", args.module),
                None,
            )
            .await?;

            let loader = &session.config().build.userphase_command;
            for motor in &args.motors {
                comm.shell_command(&format!("{} -l {} {}", loader, motor, args.name), None)
                    .await?;
            }

            let mut gpascii = comm.gpascii().await;
            for motor in &args.motors {
                gpascii
                    .set_variable(&format!("Motor[{}].PhaseCtrl", motor), 1)
                    .await?;
            }

            Ok(fmt::success(&format!(
                "{} registered for {} motor(s)",
                args.name,
                args.motors.len()
            )))
        })
    }
}
