use clap::{ArgAction, Parser};
use comfy_table::{Table, presets::UTF8_FULL};
use ppmac_gather::{
    TrajectoryKind, TrajectoryMove, TuneParams, TuneScript, custom_tune, range_values,
    run_tune_program, tune_range,
};
use std::sync::Arc;

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::plot;
use crate::session::Session;

/// Run a tuning move from a script and gather the result
#[derive(Parser, Debug)]
#[command(allow_negative_numbers = true)]
struct ScriptTuneArgs {
    motor1: u32,
    distance: f64,
    velocity: f64,
    #[arg(default_value_t = 1)]
    iterations: u32,
    /// Kill the motor afterwards
    #[arg(short, long)]
    kill: bool,
    /// Acceleration time (ms)
    #[arg(short, long, default_value_t = 1.0)]
    accel: f64,
    /// Dwell time (ms)
    #[arg(short, long, default_value_t = 1.0)]
    dwell: f64,
    /// S-curve time (ms)
    #[arg(short, long, default_value_t = 0.0)]
    scurve: f64,
    /// Additional addresses to gather
    #[arg(short, long, num_args = 1..)]
    gather: Vec<String>,
}

impl ScriptTuneArgs {
    fn params(&self, session: &Session) -> Result<TuneParams, CommandError> {
        let mut params = TuneParams::new(
            &session.config().tune,
            self.motor1,
            self.distance,
            self.velocity,
        );
        params.iterations = self.iterations;
        params.kill_after = self.kill;
        params.accel = self.accel;
        params.dwell = self.dwell;
        params.scurve = self.scurve;
        params.gather = self
            .gather
            .iter()
            .map(|g| session.canonical(g))
            .collect::<Result<_, _>>()?;
        Ok(params)
    }
}

fn load_script(session: &Session, name: &str) -> Result<TuneScript, CommandError> {
    Ok(TuneScript::load(
        name,
        session.config().tune.script_dir.as_deref(),
    )?)
}

/// `ramp` and `pyramid`: the built-in motion program scripts.
pub struct ScriptTuneCommand {
    session: Arc<Session>,
    script: &'static str,
    description: &'static str,
}

impl ScriptTuneCommand {
    pub fn ramp(session: Arc<Session>) -> Self {
        Self {
            session,
            script: "ramp",
            description: "Ramp move and back. Usage: ramp <motor> <distance> <velocity> [iterations] [-k] [-a accel] [-d dwell] [-g addr...]",
        }
    }

    pub fn pyramid(session: Arc<Session>) -> Self {
        Self {
            session,
            script: "pyramid",
            description: "Three steps out, one back. Usage: pyramid <motor> <distance> <velocity> [iterations] [-k] [-a accel] [-d dwell] [-g addr...]",
        }
    }
}

impl Command for ScriptTuneCommand {
    fn name(&self) -> &'static str {
        self.script
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        let name = self.script;
        command::run(async move {
            let args: ScriptTuneArgs = parse_args(name, &args)?;
            let comm = session.check_comm().await?;
            let script = load_script(&session, name)?;
            let params = args.params(&session)?;

            let estimate = script.estimate(&params)?;

            let servo_period = session.servo_period(&comm).await;
            session.output().line(fmt::info(&format!(
                "Running {} on motor {} (about {:.1} s)",
                name,
                params.motor1,
                estimate.as_secs_f64()
            )));

            let mut interrupt = session.interrupt().subscribe();
            let result = custom_tune(
                &comm,
                &script,
                &params,
                &session.gather_files(),
                servo_period,
                &mut interrupt,
            )
            .await?;

            let mut text = plot::tune_summary(&result.table, params.motor1, servo_period)?;
            text.push_str(&format!(
                "\nMax following error: {}",
                fmt::entity(&result.max_error.to_string())
            ));
            Ok(text)
        })
    }
}

/// Repeat a tuning script over a range of servo settings
#[derive(Parser, Debug)]
#[command(
    name = "tune_range",
    allow_negative_numbers = true,
    disable_help_flag = true
)]
struct TuneRangeArgs {
    /// Script name (ramp, pyramid or a file in the script directory)
    script: String,
    motor1: u32,
    distance: f64,
    velocity: f64,
    #[arg(default_value_t = 1)]
    iterations: u32,
    #[arg(short, long)]
    kill: bool,
    #[arg(short, long, default_value_t = 1.0)]
    accel: f64,
    #[arg(short, long, default_value_t = 1.0)]
    dwell: f64,
    /// Servo setting to vary, relative to Motor[n].Servo
    #[arg(short, long, default_value = "Kp")]
    variable: String,
    /// Explicit values to try
    #[arg(short = 'V', long, num_args = 1..)]
    values: Vec<f64>,
    #[arg(short, long)]
    low: Option<f64>,
    #[arg(short, long)]
    high: Option<f64>,
    #[arg(short, long)]
    step: Option<f64>,
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

pub struct TuneRangeCommand {
    session: Arc<Session>,
}

impl TuneRangeCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for TuneRangeCommand {
    fn name(&self) -> &'static str {
        "tune_range"
    }

    fn description(&self) -> &'static str {
        "Run a script for each value of a servo setting. Usage: tune_range <script> <motor> <distance> <velocity> [iterations] [-v var] (-V values... | -l low -h high -s step)"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: TuneRangeArgs = parse_args("tune_range", &args)?;

            let values = if !args.values.is_empty() {
                args.values.clone()
            } else if let (Some(low), Some(high), Some(step)) = (args.low, args.high, args.step) {
                range_values(low, high, step)?
            } else {
                return Err(CommandError::Invalid(
                    "Must set either --values or --low/--high/--step".to_string(),
                ));
            };

            let comm = session.check_comm().await?;
            let script = load_script(&session, &args.script)?;

            let mut params = TuneParams::new(
                &session.config().tune,
                args.motor1,
                args.distance,
                args.velocity,
            );
            params.iterations = args.iterations;
            params.kill_after = args.kill;
            params.accel = args.accel;
            params.dwell = args.dwell;

            let servo_period = session.servo_period(&comm).await;
            session.output().line(format!(
                "Trying {} values of Motor[{}].Servo.{}",
                values.len(),
                args.motor1,
                args.variable
            ));

            let mut interrupt = session.interrupt().subscribe();
            let result = tune_range(
                &comm,
                &script,
                &args.variable,
                &values,
                &params,
                &session.gather_files(),
                servo_period,
                &mut interrupt,
            )
            .await?;

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec![result.variable.as_str(), "RMS following error"]);
            for (value, rms) in result.values.iter().zip(&result.rms) {
                table.add_row(vec![value.to_string(), format!("{:.6}", rms)]);
            }

            let mut text = table.to_string();
            if let Some(best) = result.best() {
                text.push_str(&format!(
                    "\n{}: {} = {}",
                    fmt::label("Best"),
                    result.variable,
                    fmt::entity(&best.to_string())
                ));
            }
            Ok(text)
        })
    }
}

/// Move with the controller's trajectory binary and gather the result
#[derive(Parser, Debug)]
#[command(allow_negative_numbers = true)]
struct TrajectoryArgs {
    motor: u32,
    distance: f64,
    velocity: f64,
    #[arg(default_value_t = 1)]
    reps: u32,
    /// Leave the motor enabled afterwards
    #[arg(short = 'k', long = "no-kill")]
    no_kill: bool,
    /// Move only in the positive direction
    #[arg(short, long)]
    one_direction: bool,
    #[arg(short, long, default_value_t = 1.0)]
    accel: f64,
    #[arg(short, long, default_value_t = 0.0)]
    dwell: f64,
}

/// `dt_ramp`, `dt_trapezoid` and `dt_scurve`.
pub struct TrajectoryCommand {
    session: Arc<Session>,
    kind: TrajectoryKind,
}

impl TrajectoryCommand {
    pub fn new(session: Arc<Session>, kind: TrajectoryKind) -> Self {
        Self { session, kind }
    }
}

impl Command for TrajectoryCommand {
    fn name(&self) -> &'static str {
        match self.kind {
            TrajectoryKind::Ramp => "dt_ramp",
            TrajectoryKind::Trapezoid => "dt_trapezoid",
            TrajectoryKind::SCurve => "dt_scurve",
        }
    }

    fn description(&self) -> &'static str {
        match self.kind {
            TrajectoryKind::Ramp => {
                "Ramp trajectory. Usage: dt_ramp <motor> <distance> <velocity> [reps] [-k] [-o] [-a accel] [-d dwell]"
            }
            TrajectoryKind::Trapezoid => {
                "Trapezoidal trajectory. Usage: dt_trapezoid <motor> <distance> <velocity> [reps] [-k] [-o] [-a accel] [-d dwell]"
            }
            TrajectoryKind::SCurve => {
                "S-curve trajectory. Usage: dt_scurve <motor> <distance> <velocity> [reps] [-k] [-o] [-a accel] [-d dwell]"
            }
        }
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        let kind = self.kind;
        let name = self.name();
        command::run(async move {
            let args: TrajectoryArgs = parse_args(name, &args)?;
            let comm = session.check_comm().await?;

            let movement = TrajectoryMove {
                kind,
                motor: args.motor,
                distance: args.distance,
                velocity: args.velocity,
                accel: args.accel,
                dwell: args.dwell,
                reps: args.reps,
                one_direction: args.one_direction,
                kill: !args.no_kill,
            };

            session.output().line(fmt::info(&format!(
                "Running {} trajectory on motor {}",
                kind, args.motor
            )));
            let mut interrupt = session.interrupt().subscribe();
            let table = run_tune_program(
                &comm,
                &movement,
                &session.config().tune.other_trajectory_command,
                &session.gather_files(),
                &mut interrupt,
            )
            .await?;
            if table.is_empty() {
                return Ok(fmt::warning("No data gathered?"));
            }

            let servo_period = session.servo_period(&comm).await;
            plot::tune_summary(&table, args.motor, servo_period)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tune_range_args() {
        let args: TuneRangeArgs = parse_args(
            "tune_range",
            &[
                "ramp", "1", "10", "5", "-v", "Kvfb", "-l", "0", "-h", "10", "-s", "5",
            ]
            .map(String::from),
        )
        .unwrap();
        assert_eq!(args.variable, "Kvfb");
        assert_eq!(args.high, Some(10.0));
        assert!(args.values.is_empty());
    }

    #[test]
    fn test_trajectory_args_accept_negative_distance() {
        let args: TrajectoryArgs =
            parse_args("dt_ramp", &["3", "-100", "50", "-k"].map(String::from)).unwrap();
        assert_eq!(args.distance, -100.0);
        assert!(args.no_kill);
        assert_eq!(args.reps, 1);
    }
}
