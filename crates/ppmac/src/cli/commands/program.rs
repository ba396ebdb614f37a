use clap::Parser;
use ppmac_comm::{Gpascii, GpasciiError, ProgramAction};
use ppmac_config::LogType;
use ppmac_gather::{
    GatherRequest, OnTimeout, ProgramRun, SERVO_COUNT_ADDRESS, address_of, run_program_gather,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::close_channel;
use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::monitor::read_values;
use crate::plot;
use crate::session::Session;
use crate::status::coord_error;
use crate::util::seconds;

const START_HINT: &str = "Are all motors in the coordinate system in closed loop?";

/// Starts a program, adding a hint for the usual reason a start is refused.
async fn start_program(
    gpascii: &mut Gpascii,
    coord: u32,
    program: u32,
) -> Result<(), CommandError> {
    match gpascii.program(coord, program, ProgramAction::Start).await {
        Ok(_) => Ok(()),
        Err(e @ GpasciiError::Device { .. }) if e.to_string().contains("READY TO RUN") => {
            Err(CommandError::Invalid(format!("{}\n{}", e, START_HINT)))
        }
        Err(e) => Err(e.into()),
    }
}

/// `Error: (name) text` for a non-zero `Coord[c].ErrorStatus`.
fn describe_error_status(code: i64) -> Option<String> {
    if code == 0 {
        return None;
    }
    Some(match coord_error(code) {
        Some((name, text)) => format!("Error: ({}) {}", name, text),
        None => format!("Error status {}", code),
    })
}

/// Run a motion program and print variable changes until it finishes
#[derive(Parser, Debug)]
#[command(name = "prog_run")]
struct ProgRunArgs {
    coord: u32,
    program: u32,
    /// Variables to print while running
    #[arg(num_args = 0..)]
    variables: Vec<String>,
}

pub struct ProgRunCommand {
    session: Arc<Session>,
}

impl ProgRunCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ProgRunCommand {
    fn name(&self) -> &'static str {
        "prog_run"
    }

    fn description(&self) -> &'static str {
        "Run a motion program. Usage: prog_run <coord> <program> [variable...]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: ProgRunArgs = parse_args("prog_run", &args)?;
            let comm = session.check_comm().await?;
            let output = session.output();
            let interval = session.config().monitor.poll_interval();

            let mut gpascii = comm.gpascii_channel().await?;
            let mut interrupt = session.interrupt().subscribe();
            let result: Result<String, CommandError> = async {
                start_program(&mut gpascii, args.coord, args.program).await?;

                output.line(format!("Coord {} Program {}", args.coord, args.program));
                let active_var = format!("Coord[{}].ProgActive", args.coord);

                let mut last = read_values(&comm, &args.variables).await;
                for (variable, value) in args.variables.iter().zip(&last) {
                    output.line(format!("{} = {}", variable, value));
                }

                loop {
                    if gpascii.get_i64(&active_var).await? == 0 {
                        break;
                    }

                    tokio::select! {
                        _ = interrupt.recv() => {
                            if gpascii.get_i64(&active_var).await? != 0 {
                                output.line("Aborting...");
                                warn!(
                                    log_type = LogType::Console.as_str(),
                                    "Aborting program {} in coord {}", args.program, args.coord
                                );
                                gpascii.program(args.coord, args.program, ProgramAction::Stop).await?;
                            }
                            break;
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }

                    let values = read_values(&comm, &args.variables).await;
                    for (variable, (old, new)) in args.variables.iter().zip(last.iter().zip(&values)) {
                        if old != new {
                            output.line(format!("{} = {}", variable, new));
                        }
                    }
                    last = values;
                }

                let active = gpascii.get_variable(&active_var).await?;
                let mut text = format!("Done ({} = {})", active_var, active);

                let status = gpascii
                    .get_i64(&format!("Coord[{}].ErrorStatus", args.coord))
                    .await?;
                if let Some(error) = describe_error_status(status) {
                    text.push('\n');
                    text.push_str(&fmt::error(&error));
                }
                Ok(text)
            }
            .await;

            close_channel(gpascii).await;
            result
        })
    }
}

/// Upload a motion program from a local file
#[derive(Parser, Debug)]
#[command(name = "prog_send")]
struct ProgSendArgs {
    /// Local motion program file
    script: String,
    /// Axis assignments, e.g. X=1
    #[arg(num_args = 0..)]
    motors: Vec<String>,
    #[arg(short, long)]
    coord: Option<u32>,
    #[arg(short, long)]
    program: Option<u32>,
    /// Run after uploading
    #[arg(short, long)]
    run: bool,
    /// Run while gathering the assigned motors' positions
    #[arg(short, long)]
    gather: bool,
    /// Longest time to wait for the program when gathering (s)
    #[arg(long, default_value_t = 10.0)]
    duration: f64,
}

/// `X=1` to `("X", 1)`.
fn parse_assignment(text: &str) -> Result<(String, u32), CommandError> {
    let invalid = || CommandError::Invalid(format!("Expected AXIS=MOTOR, got {}", text));
    let (axis, motor) = text.split_once('=').ok_or_else(invalid)?;
    let axis = axis.trim();
    if axis.is_empty() || !axis.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    let motor = motor.trim().parse().map_err(|_| invalid())?;
    Ok((axis.to_ascii_uppercase(), motor))
}

/// Program lines without comments or blank lines.
fn program_body(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with(';'))
        .map(str::to_string)
        .collect()
}

pub struct ProgSendCommand {
    session: Arc<Session>,
}

impl ProgSendCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ProgSendCommand {
    fn name(&self) -> &'static str {
        "prog_send"
    }

    fn description(&self) -> &'static str {
        "Upload a motion program. Usage: prog_send <script> [AXIS=motor...] [-c coord] [-p prog] [-r] [-g] [--duration s]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: ProgSendArgs = parse_args("prog_send", &args)?;
            let assignments = args
                .motors
                .iter()
                .map(|m| parse_assignment(m))
                .collect::<Result<Vec<_>, _>>()?;
            if args.gather && assignments.is_empty() {
                return Err(CommandError::Invalid(
                    "Gathering needs at least one AXIS=MOTOR assignment".to_string(),
                ));
            }

            let text = tokio::fs::read_to_string(&args.script)
                .await
                .map_err(|e| CommandError::io(&args.script, e))?;
            let body = program_body(&text);

            let tune = &session.config().tune;
            let coord = args.coord.unwrap_or(tune.coord_sys);
            let program = args.program.unwrap_or(tune.program);

            let duration = seconds(args.duration.max(0.1))?;

            let comm = session.check_comm().await?;
            let output = session.output();
            let mut gpascii = comm.gpascii_channel().await?;
            let result: Result<String, CommandError> = async {
                if !assignments.is_empty() {
                    gpascii.command(&format!("&{} undefine", coord)).await?;
                    for (axis, motor) in &assignments {
                        gpascii
                            .command(&format!("&{} #{}->{}", coord, motor, axis))
                            .await?;
                    }
                }

                info!(
                    log_type = LogType::Console.as_str(),
                    "Sending {} ({} lines) as program {}", args.script, body.len(), program
                );
                gpascii.command(&format!("open prog {}", program)).await?;
                for line in &body {
                    gpascii.command(line).await?;
                }
                gpascii.command("close").await?;
                output.line(format!("Sent {} as program {}", args.script, program));

                if args.gather {
                    let mut addresses = vec![SERVO_COUNT_ADDRESS.to_string()];
                    for (_, motor) in &assignments {
                        addresses.push(address_of(&format!("Motor[{}].DesPos", motor)));
                        addresses.push(address_of(&format!("Motor[{}].ActPos", motor)));
                    }

                    let request = GatherRequest::new(addresses, duration, 1)?;
                    let servo_period = session.servo_period(&comm).await;
                    let run = ProgramRun {
                        coord,
                        program,
                        timeout: duration,
                        on_timeout: OnTimeout::Collect,
                    };
                    let mut interrupt = session.interrupt().subscribe();
                    let gathered = run_program_gather(
                        &comm,
                        &mut gpascii,
                        &request,
                        &session.gather_files(),
                        servo_period,
                        &run,
                        &mut interrupt,
                    )
                    .await?;

                    if !gathered.finished {
                        output.line(fmt::warning(&format!(
                            "Program {} still running after {} s",
                            program,
                            duration.as_secs_f64()
                        )));
                    }
                    let table = gathered.table;
                    if table.is_empty() {
                        return Ok(fmt::warning("No data gathered?"));
                    }
                    let indices: Vec<usize> = (1..table.addresses.len()).collect();
                    return Ok(plot::summarize(&table, &indices, servo_period));
                }

                if args.run {
                    start_program(&mut gpascii, coord, program).await?;
                    return Ok(format!("Coord {} Program {} started", coord, program));
                }

                Ok(String::new())
            }
            .await;

            close_channel(gpascii).await;
            result
        })
    }
}
