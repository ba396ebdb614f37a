//! Servo tuning moves: a small motion program is uploaded and run while
//! the commanded and actual positions are gathered.

use ppmac_comm::{Comm, Gpascii, ProgramAction};
use ppmac_config::{LogType, TuneConfig};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::GatherError;
use crate::gather::{
    GatherFiles, GatherRequest, configure, duration_from_secs, get_results, interrupted,
};
use crate::table::{GatherTable, following_error, rms};
use crate::{SERVO_COUNT_ADDRESS, address_of};

const RAMP_SCRIPT: &str = include_str!("../scripts/ramp.txt");
const PYRAMID_SCRIPT: &str = include_str!("../scripts/pyramid.txt");

const PROGRAM_POLL: Duration = Duration::from_millis(50);
const TUNE_PROGRAM_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct TuneParams {
    pub motor1: u32,
    pub motor2: Option<u32>,
    /// Motor units per move
    pub distance: f64,
    /// Motor units per second
    pub velocity: f64,
    pub iterations: u32,
    /// Milliseconds
    pub dwell: f64,
    /// Milliseconds
    pub accel: f64,
    /// Milliseconds
    pub scurve: f64,
    pub prog: u32,
    pub coord_sys: u32,
    pub kill_after: bool,
    /// Extra addresses gathered during the move
    pub gather: Vec<String>,
}

impl TuneParams {
    pub fn new(config: &TuneConfig, motor1: u32, distance: f64, velocity: f64) -> Self {
        Self {
            motor1,
            motor2: None,
            distance,
            velocity,
            iterations: 1,
            dwell: 1.0,
            accel: 1.0,
            scurve: 0.0,
            prog: config.program,
            coord_sys: config.coord_sys,
            kill_after: false,
            gather: Vec::new(),
        }
    }

    fn placeholder(&self, name: &str) -> Option<String> {
        let value = match name {
            "motor1" => self.motor1.to_string(),
            "motor2" => self.motor2.unwrap_or(self.motor1).to_string(),
            "distance" => self.distance.to_string(),
            "velocity" => self.velocity.to_string(),
            "iterations" => self.iterations.to_string(),
            "dwell" => self.dwell.to_string(),
            "accel" => self.accel.to_string(),
            "scurve" => self.scurve.to_string(),
            "prog" => self.prog.to_string(),
            "coord_sys" => self.coord_sys.to_string(),
            _ => return None,
        };
        Some(value)
    }

    fn addresses(&self) -> Vec<String> {
        let mut addresses = vec![
            SERVO_COUNT_ADDRESS.to_string(),
            address_of(&format!("Motor[{}].DesPos", self.motor1)),
            address_of(&format!("Motor[{}].ActPos", self.motor1)),
        ];
        for extra in &self.gather {
            let address = address_of(extra);
            if !addresses.iter().any(|a| a.eq_ignore_ascii_case(&address)) {
                addresses.push(address);
            }
        }
        addresses
    }
}

/// Motion program body with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneScript {
    pub name: String,
    pub body: String,
}

impl TuneScript {
    pub fn builtin(name: &str) -> Option<Self> {
        let name = file_name(name);
        let body = match name.as_str() {
            "ramp.txt" => RAMP_SCRIPT,
            "pyramid.txt" => PYRAMID_SCRIPT,
            _ => return None,
        };
        Some(Self {
            name,
            body: body.to_string(),
        })
    }

    /// A file in `script_dir` takes precedence over a built-in script of
    /// the same name. A name without an extension gets `.txt`.
    pub fn load(name: &str, script_dir: Option<&str>) -> Result<Self, GatherError> {
        let name = file_name(name);
        if let Some(dir) = script_dir {
            let path = Path::new(dir).join(&name);
            if path.is_file() {
                let body = std::fs::read_to_string(&path).map_err(|source| GatherError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                debug!(
                    log_type = LogType::Tune.as_str(),
                    "Loaded tuning script {}",
                    path.display()
                );
                return Ok(Self { name, body });
            }
        }

        Self::builtin(&name).ok_or_else(|| {
            let location = match script_dir {
                Some(dir) => Path::new(dir).join(&name).display().to_string(),
                None => name.clone(),
            };
            GatherError::ScriptNotFound(location)
        })
    }

    /// Program lines with placeholders filled in, repeated `iterations`
    /// times. Comments and blank lines are dropped.
    pub fn render(&self, params: &TuneParams) -> Result<Vec<String>, GatherError> {
        let mut once = Vec::new();
        for line in self.body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") || line.starts_with(';') {
                continue;
            }
            once.push(self.substitute(line, params)?);
        }

        let mut lines = Vec::with_capacity(once.len() * params.iterations as usize);
        for _ in 0..params.iterations.max(1) {
            lines.extend(once.iter().cloned());
        }
        Ok(lines)
    }

    fn substitute(&self, line: &str, params: &TuneParams) -> Result<String, GatherError> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return Ok(out);
            };

            let name = &after[..close];
            let value = params
                .placeholder(name)
                .ok_or_else(|| GatherError::UnknownPlaceholder {
                    script: self.name.clone(),
                    name: name.to_string(),
                })?;
            out.push_str(&value);
            rest = &after[close + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Rough run time of the rendered program, used to size the gather
    /// buffer and bound the wait for completion.
    pub fn estimate(&self, params: &TuneParams) -> Result<Duration, GatherError> {
        let moves = self
            .body
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with(['X', 'x', 'Y', 'y']))
            .count();

        let travel = if params.velocity > 0.0 {
            params.distance.abs() / params.velocity
        } else {
            0.0
        };
        let per_move = travel + 2.0 * (params.accel + params.scurve) / 1000.0 + params.dwell / 1000.0;
        let total = per_move * moves as f64 * f64::from(params.iterations.max(1));

        duration_from_secs(total.max(0.0))
    }
}

fn file_name(name: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{}.txt", name)
    }
}

#[derive(Debug, Clone)]
pub struct TuneResult {
    pub table: GatherTable,
    pub rms: f64,
    pub max_error: f64,
}

impl TuneResult {
    fn from_table(table: GatherTable, motor: u32) -> Result<Self, GatherError> {
        if table.is_empty() {
            return Err(GatherError::NoData);
        }

        let desired = table.column_by_name(&format!("Motor[{}].DesPos", motor))?;
        let actual = table.column_by_name(&format!("Motor[{}].ActPos", motor))?;
        let error = following_error(&desired, &actual);
        let max_error = error.iter().fold(0.0f64, |m, e| m.max(e.abs()));

        Ok(Self {
            rms: rms(&error),
            max_error,
            table,
        })
    }
}

/// Uploads and runs `script` once on a dedicated gpascii channel. An
/// interrupt aborts the move.
pub async fn custom_tune(
    comm: &Comm,
    script: &TuneScript,
    params: &TuneParams,
    files: &GatherFiles,
    servo_period: f64,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<TuneResult, GatherError> {
    let mut gpascii = comm.gpascii_channel().await?;
    let result = run_tune(
        comm,
        &mut gpascii,
        script,
        params,
        files,
        servo_period,
        interrupt,
    )
    .await;
    close_channel(gpascii).await;
    result
}

async fn close_channel(gpascii: Gpascii) {
    if let Err(e) = gpascii.close().await {
        warn!(
            log_type = LogType::Tune.as_str(),
            "Unable to close gpascii channel: {}", e
        );
    }
}

async fn run_tune(
    comm: &Comm,
    gpascii: &mut Gpascii,
    script: &TuneScript,
    params: &TuneParams,
    files: &GatherFiles,
    servo_period: f64,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<TuneResult, GatherError> {
    let body = script.render(params)?;
    let cs = params.coord_sys;

    gpascii
        .command(&format!("&{} #{}->X", cs, params.motor1))
        .await?;
    if let Some(motor2) = params.motor2 {
        gpascii.command(&format!("&{} #{}->Y", cs, motor2)).await?;
    }

    gpascii.command(&format!("open prog {}", params.prog)).await?;
    for line in &body {
        gpascii.command(line).await?;
    }
    gpascii.command("close").await?;

    let estimate = script.estimate(params)?.as_secs_f64();
    let request = GatherRequest::new(
        params.addresses(),
        duration_from_secs(estimate * 1.2 + 0.5)?,
        1,
    )?;

    info!(
        log_type = LogType::Tune.as_str(),
        "Running {} on motor {} (about {:.2}s)", script.name, params.motor1, estimate
    );
    let run = ProgramRun {
        coord: cs,
        program: params.prog,
        timeout: duration_from_secs(estimate * 2.0 + 5.0)?,
        on_timeout: OnTimeout::Abort,
    };
    let gathered =
        run_program_gather(comm, gpascii, &request, files, servo_period, &run, interrupt).await?;

    if params.kill_after {
        gpascii.command(&format!("#{}k", params.motor1)).await?;
    }

    TuneResult::from_table(gathered.table, params.motor1)
}

/// What to do with a program that is still running when its time is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTimeout {
    /// Abort the program and fail with `GatherError::Timeout`.
    Abort,
    /// Stop gathering and return the samples; the program keeps running.
    Collect,
}

/// A motion program to run while gathering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramRun {
    pub coord: u32,
    pub program: u32,
    pub timeout: Duration,
    pub on_timeout: OnTimeout,
}

#[derive(Debug, Clone)]
pub struct ProgramGather {
    pub table: GatherTable,
    /// False when the program was still running at the time limit.
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramEnd {
    Finished,
    TimedOut,
    Interrupted,
}

/// Gathers `request` while `run` executes, until the program finishes,
/// its time limit passes or an interrupt arrives. Interrupted programs are
/// aborted.
pub async fn run_program_gather(
    comm: &Comm,
    gpascii: &mut Gpascii,
    request: &GatherRequest,
    files: &GatherFiles,
    servo_period: f64,
    run: &ProgramRun,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<ProgramGather, GatherError> {
    configure(comm, gpascii, request, files, servo_period).await?;
    gpascii.set_variable("Gather.Enable", 2).await?;
    gpascii
        .program(run.coord, run.program, ProgramAction::Start)
        .await?;

    // a limit too far out to represent means no limit
    let deadline = Instant::now().checked_add(run.timeout);
    let end = wait_for_program(gpascii, run.coord, deadline, interrupt).await;
    let disabled = gpascii.set_variable("Gather.Enable", 0).await;

    let end = match end {
        Ok(end) => end,
        Err(e) => {
            abort_program(gpascii, run).await;
            return Err(e);
        }
    };
    match (end, run.on_timeout) {
        (ProgramEnd::Finished, _) => {}
        (ProgramEnd::TimedOut, OnTimeout::Collect) => warn!(
            log_type = LogType::Tune.as_str(),
            "Program {} still running after {:.1}s",
            run.program,
            run.timeout.as_secs_f64()
        ),
        (ProgramEnd::TimedOut, OnTimeout::Abort) => {
            abort_program(gpascii, run).await;
            return Err(GatherError::Timeout(format!(
                "Coord[{}].ProgActive",
                run.coord
            )));
        }
        (ProgramEnd::Interrupted, _) => {
            abort_program(gpascii, run).await;
            return Err(GatherError::Interrupted);
        }
    }
    disabled?;

    let table = get_results(comm, files, None).await?;
    Ok(ProgramGather {
        table,
        finished: end == ProgramEnd::Finished,
    })
}

async fn abort_program(gpascii: &mut Gpascii, run: &ProgramRun) {
    warn!(
        log_type = LogType::Tune.as_str(),
        "Aborting program {} in coord {}", run.program, run.coord
    );
    if let Err(e) = gpascii
        .program(run.coord, run.program, ProgramAction::Stop)
        .await
    {
        warn!(
            log_type = LogType::Tune.as_str(),
            "Unable to abort program: {}", e
        );
    }
}

async fn wait_for_program(
    gpascii: &mut Gpascii,
    coord: u32,
    deadline: Option<Instant>,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<ProgramEnd, GatherError> {
    let variable = format!("Coord[{}].ProgActive", coord);
    loop {
        tokio::select! {
            _ = interrupted(interrupt) => return Ok(ProgramEnd::Interrupted),
            _ = tokio::time::sleep(PROGRAM_POLL) => {}
        }
        if gpascii.get_i64(&variable).await? == 0 {
            return Ok(ProgramEnd::Finished);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(ProgramEnd::TimedOut);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TuneRangeResult {
    pub variable: String,
    pub values: Vec<f64>,
    pub rms: Vec<f64>,
}

impl TuneRangeResult {
    /// The value with the lowest RMS following error.
    pub fn best(&self) -> Option<f64> {
        self.values
            .iter()
            .zip(&self.rms)
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(value, _)| *value)
    }
}

/// Values from `low` up to but excluding `high`.
pub fn range_values(low: f64, high: f64, step: f64) -> Result<Vec<f64>, GatherError> {
    if step <= 0.0 || !step.is_finite() {
        return Err(GatherError::InvalidRequest(
            "step must be positive".to_string(),
        ));
    }

    let count = ((high - low) / step).ceil().max(0.0) as usize;
    Ok((0..count).map(|i| low + step * i as f64).collect())
}

/// Runs the script once per value of `Motor[m].Servo.{variable}`, then
/// restores the original setting.
#[allow(clippy::too_many_arguments)]
pub async fn tune_range(
    comm: &Comm,
    script: &TuneScript,
    variable: &str,
    values: &[f64],
    params: &TuneParams,
    files: &GatherFiles,
    servo_period: f64,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<TuneRangeResult, GatherError> {
    let full_name = format!("Motor[{}].Servo.{}", params.motor1, variable);
    let mut gpascii = comm.gpascii_channel().await?;
    let result = sweep(
        comm,
        &mut gpascii,
        script,
        &full_name,
        values,
        params,
        files,
        servo_period,
        interrupt,
    )
    .await;
    close_channel(gpascii).await;
    result
}

#[allow(clippy::too_many_arguments)]
async fn sweep(
    comm: &Comm,
    gpascii: &mut Gpascii,
    script: &TuneScript,
    full_name: &str,
    values: &[f64],
    params: &TuneParams,
    files: &GatherFiles,
    servo_period: f64,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<TuneRangeResult, GatherError> {
    let original = gpascii.get_variable(full_name).await?;

    let mut result = TuneRangeResult {
        variable: full_name.to_string(),
        values: Vec::with_capacity(values.len()),
        rms: Vec::with_capacity(values.len()),
    };

    let mut outcome: Result<(), GatherError> = Ok(());
    for value in values {
        if let Err(e) = gpascii.set_variable(full_name, value).await {
            outcome = Err(e.into());
            break;
        }

        match run_tune(comm, gpascii, script, params, files, servo_period, interrupt).await {
            Ok(tune) => {
                info!(
                    log_type = LogType::Tune.as_str(),
                    "{}={} rms={}", full_name, value, tune.rms
                );
                result.values.push(*value);
                result.rms.push(tune.rms);
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    let restored = gpascii.set_variable(full_name, &original).await;
    debug!(
        log_type = LogType::Tune.as_str(),
        "Restored {}={}", full_name, original
    );

    outcome?;
    restored?;
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryKind {
    Ramp,
    Trapezoid,
    SCurve,
}

impl TrajectoryKind {
    fn code(self) -> u32 {
        match self {
            TrajectoryKind::Ramp => 0,
            TrajectoryKind::Trapezoid => 1,
            TrajectoryKind::SCurve => 2,
        }
    }
}

impl fmt::Display for TrajectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrajectoryKind::Ramp => "ramp",
            TrajectoryKind::Trapezoid => "trapezoid",
            TrajectoryKind::SCurve => "s-curve",
        };
        f.write_str(name)
    }
}

/// A move executed by the controller's own tuning binary.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryMove {
    pub kind: TrajectoryKind,
    pub motor: u32,
    pub distance: f64,
    pub velocity: f64,
    pub accel: f64,
    pub dwell: f64,
    pub reps: u32,
    pub one_direction: bool,
    pub kill: bool,
}

impl TrajectoryMove {
    pub fn command_line(&self, program: &str) -> String {
        format!(
            "{} {} {} {} {} {} {} {} {} {}",
            program,
            self.kind.code(),
            self.motor,
            self.distance,
            self.velocity,
            self.accel,
            self.dwell,
            self.reps,
            u8::from(self.one_direction),
            u8::from(self.kill)
        )
    }
}

/// Runs a tuning binary on the controller; it leaves its samples in the
/// gather output file. An interrupt kills the motor (`#{motor}k`) and
/// stops waiting for the binary.
pub async fn run_tune_program(
    comm: &Comm,
    motion: &TrajectoryMove,
    program: &str,
    files: &GatherFiles,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<GatherTable, GatherError> {
    let command = motion.command_line(program);
    info!(log_type = LogType::Tune.as_str(), "Running {}", command);
    let output = tokio::select! {
        _ = interrupted(interrupt) => {
            warn!(
                log_type = LogType::Tune.as_str(),
                "Interrupted, killing motor {}", motion.motor
            );
            comm.gpascii()
                .await
                .command(&format!("#{}k", motion.motor))
                .await?;
            return Err(GatherError::Interrupted);
        }
        output = comm.shell_command(&command, Some(TUNE_PROGRAM_TIMEOUT)) => output?,
    };
    for line in &output {
        debug!(log_type = LogType::Tune.as_str(), "{}", line);
    }
    get_results(comm, files, None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppmac_comm::{CommSettings, MockTransport};
    use ppmac_config::GatherConfig;
    use std::sync::Arc;

    fn no_interrupt() -> broadcast::Receiver<()> {
        broadcast::channel(1).1
    }

    /// A receiver with an interrupt already waiting.
    fn pending_interrupt() -> broadcast::Receiver<()> {
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();
        rx
    }

    fn params() -> TuneParams {
        let mut params = TuneParams::new(&TuneConfig::default(), 3, 10.0, 100.0);
        params.iterations = 2;
        params
    }

    async fn comm(mock: &MockTransport) -> Comm {
        Comm::open(Arc::new(mock.clone()), CommSettings::default())
            .await
            .unwrap()
    }

    fn with_results(mock: MockTransport, files: &GatherFiles, data: &str) -> MockTransport {
        let upload = format!("{} {}", files.upload_command, files.output_file);
        mock.with_shell_reply(&upload, &[], 0)
            .with_file(&files.output_file, data)
    }

    #[test]
    fn test_render_builtin_ramp() {
        let script = TuneScript::builtin("ramp.txt").unwrap();
        let lines = script.render(&params()).unwrap();

        assert!(lines.iter().all(|l| !l.starts_with("//")));
        assert!(lines.contains(&"X(10)".to_string()));
        assert!(lines.contains(&"X(-(10))".to_string()));
        assert!(lines.contains(&"F(100)".to_string()));
        assert_eq!(lines.len() % 2, 0);
        assert_eq!(lines[..lines.len() / 2], lines[lines.len() / 2..]);
    }

    #[test]
    fn test_unknown_placeholder() {
        let script = TuneScript {
            name: "bad.txt".into(),
            body: "X({distance}) F({speed})".into(),
        };
        let err = script.render(&params()).unwrap_err();
        assert!(matches!(err, GatherError::UnknownPlaceholder { ref name, .. } if name == "speed"));
    }

    #[test]
    fn test_load_prefers_script_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ramp.txt"), "X({distance})\n").unwrap();
        let dir_name = dir.path().to_str().unwrap();

        let script = TuneScript::load("ramp.txt", Some(dir_name)).unwrap();
        assert_eq!(script.body, "X({distance})\n");

        let script = TuneScript::load("pyramid.txt", Some(dir_name)).unwrap();
        assert!(script.body.contains("X(-3*({distance}))"));

        assert!(matches!(
            TuneScript::load("missing.txt", Some(dir_name)),
            Err(GatherError::ScriptNotFound(_))
        ));
    }

    #[test]
    fn test_load_without_extension() {
        let script = TuneScript::load("ramp", None).unwrap();
        assert_eq!(script.name, "ramp.txt");
        assert_eq!(script, TuneScript::builtin("ramp.txt").unwrap());
        assert_eq!(TuneScript::builtin("pyramid").unwrap().name, "pyramid.txt");

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("step.txt"), "X({distance})\n").unwrap();
        let script = TuneScript::load("step", dir.path().to_str()).unwrap();
        assert_eq!(script.name, "step.txt");

        assert!(matches!(
            TuneScript::load("missing", None),
            Err(GatherError::ScriptNotFound(ref name)) if name == "missing.txt"
        ));
    }

    #[test]
    fn test_estimate() {
        let script = TuneScript {
            name: "t".into(),
            body: "X({distance})\ndwell({dwell})\nX(-({distance}))".into(),
        };
        let mut params = params();
        params.accel = 0.0;
        params.dwell = 0.0;
        // two moves of 0.1s, twice
        assert!((script.estimate(&params).unwrap().as_secs_f64() - 0.4).abs() < 1e-9);

        params.distance = 1e300;
        params.velocity = 1e-300;
        assert!(matches!(
            script.estimate(&params),
            Err(GatherError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_range_values() {
        assert_eq!(range_values(0.0, 1.0, 0.25).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
        assert!(range_values(1.0, 0.0, 0.5).unwrap().is_empty());
        assert!(range_values(0.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_best_value() {
        let result = TuneRangeResult {
            variable: "Motor[1].Servo.Kp".into(),
            values: vec![1.0, 2.0, 3.0],
            rms: vec![0.5, 0.1, 0.3],
        };
        assert_eq!(result.best(), Some(2.0));

        let empty = TuneRangeResult {
            variable: "Motor[1].Servo.Kp".into(),
            values: vec![],
            rms: vec![],
        };
        assert_eq!(empty.best(), None);
    }

    #[test]
    fn test_trajectory_command_line() {
        let motion = TrajectoryMove {
            kind: TrajectoryKind::SCurve,
            motor: 2,
            distance: 1000.0,
            velocity: 50.5,
            accel: 1.0,
            dwell: 10.0,
            reps: 3,
            one_direction: true,
            kill: false,
        };
        assert_eq!(
            motion.command_line("/opt/ppmac/tune/othertrajectory"),
            "/opt/ppmac/tune/othertrajectory 2 2 1000 50.5 1 10 3 1 0"
        );
    }

    #[tokio::test]
    async fn test_custom_tune() {
        let files = GatherFiles::from(&GatherConfig::default());
        let mock = MockTransport::new().with_sequence("Coord[0].ProgActive", &["1", "0"]);
        let mock = with_results(mock, &files, "1 0 0\n2 1 0.5\n3 2 2.5\n");
        let comm = comm(&mock).await;

        let mut params = params();
        params.kill_after = true;
        params.gather = vec!["Motor[3].DacOut".into()];
        let script = TuneScript::builtin("ramp.txt").unwrap();

        let err = custom_tune(&comm, &script, &params, &files, 1e-3, &mut no_interrupt())
            .await
            .unwrap_err();
        // four addresses gathered, the canned output only has three columns
        assert!(matches!(err, GatherError::NoData));

        let commands = mock.commands();
        assert!(commands.contains(&"&0 #3->X".to_string()));
        assert!(commands.contains(&"open prog 999".to_string()));
        assert!(commands.contains(&"&0b999r".to_string()));
        assert!(commands.contains(&"#3k".to_string()));
        assert_eq!(
            mock.variable("Gather.Addr[3]").as_deref(),
            Some("Motor[3].DacOut.a")
        );
        assert_eq!(mock.closed_channels(), 1);
    }

    #[tokio::test]
    async fn test_custom_tune_interrupted() {
        let files = GatherFiles::from(&GatherConfig::default());
        let mock = MockTransport::new().with_variable("Coord[0].ProgActive", "1");
        let comm = comm(&mock).await;

        let script = TuneScript::builtin("ramp.txt").unwrap();
        let err = custom_tune(&comm, &script, &params(), &files, 1e-3, &mut pending_interrupt())
            .await
            .unwrap_err();

        assert!(matches!(err, GatherError::Interrupted));
        let commands = mock.commands();
        assert!(commands.contains(&"&0b999r".to_string()));
        assert_eq!(commands.last().map(String::as_str), Some("&0a"));
        assert_eq!(mock.variable("Gather.Enable").as_deref(), Some("0"));
        assert_eq!(mock.closed_channels(), 1);
    }

    fn program_run(on_timeout: OnTimeout) -> ProgramRun {
        ProgramRun {
            coord: 1,
            program: 10,
            timeout: Duration::from_millis(120),
            on_timeout,
        }
    }

    #[tokio::test]
    async fn test_program_gather_collects_at_time_limit() {
        let files = GatherFiles::from(&GatherConfig::default());
        let mock = MockTransport::new().with_variable("Coord[1].ProgActive", "1");
        let mock = with_results(mock, &files, "1 0 0\n2 1 1\n");
        let comm = comm(&mock).await;
        let mut gpascii = comm.gpascii_channel().await.unwrap();

        let request = GatherRequest::new(params().addresses(), Duration::from_millis(100), 1)
            .unwrap();
        let gathered = run_program_gather(
            &comm,
            &mut gpascii,
            &request,
            &files,
            1e-3,
            &program_run(OnTimeout::Collect),
            &mut no_interrupt(),
        )
        .await
        .unwrap();

        assert!(!gathered.finished);
        assert_eq!(gathered.table.len(), 2);
        assert!(!mock.commands().contains(&"&1a".to_string()));
        assert_eq!(mock.variable("Gather.Enable").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_program_gather_aborts_at_time_limit() {
        let files = GatherFiles::from(&GatherConfig::default());
        let mock = MockTransport::new().with_variable("Coord[1].ProgActive", "1");
        let mock = with_results(mock, &files, "1 0 0\n");
        let comm = comm(&mock).await;
        let mut gpascii = comm.gpascii_channel().await.unwrap();

        let request = GatherRequest::new(params().addresses(), Duration::from_millis(100), 1)
            .unwrap();
        let err = run_program_gather(
            &comm,
            &mut gpascii,
            &request,
            &files,
            1e-3,
            &program_run(OnTimeout::Abort),
            &mut no_interrupt(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatherError::Timeout(ref v) if v == "Coord[1].ProgActive"));
        assert!(mock.commands().contains(&"&1a".to_string()));
        assert!(mock.shell_commands().iter().all(|c| !c.starts_with("gather")));
    }

    #[tokio::test]
    async fn test_custom_tune_rms() {
        let files = GatherFiles::from(&GatherConfig::default());
        let mock = MockTransport::new().with_sequence("Coord[0].ProgActive", &["0"]);
        let mock = with_results(mock, &files, "1 0 0\n2 1 0.5\n3 2 2.5\n");
        let comm = comm(&mock).await;

        let script = TuneScript::builtin("pyramid.txt").unwrap();
        let result = custom_tune(&comm, &script, &params(), &files, 1e-3, &mut no_interrupt())
            .await
            .unwrap();

        // errors 0, 0.5, -0.5
        assert!((result.rms - (0.5f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(result.max_error, 0.5);
        assert!(!mock.commands().contains(&"#3k".to_string()));
    }

    #[tokio::test]
    async fn test_tune_range_restores_setting() {
        let files = GatherFiles::from(&GatherConfig::default());
        let mock = MockTransport::new()
            .with_variable("Motor[3].Servo.Kp", "12.5")
            .with_variable("Coord[0].ProgActive", "0");
        let mock = with_results(mock, &files, "1 0 0\n2 1 0.5\n");
        let comm = comm(&mock).await;

        let script = TuneScript::builtin("ramp.txt").unwrap();
        let result = tune_range(
            &comm,
            &script,
            "Kp",
            &[1.0, 2.0],
            &params(),
            &files,
            1e-3,
            &mut no_interrupt(),
        )
        .await
        .unwrap();

        assert_eq!(result.values, vec![1.0, 2.0]);
        assert_eq!(result.rms.len(), 2);
        assert_eq!(result.variable, "Motor[3].Servo.Kp");
        assert!(mock.commands().contains(&"Motor[3].Servo.Kp=2".to_string()));
        assert_eq!(mock.variable("Motor[3].Servo.Kp").as_deref(), Some("12.5"));
        assert_eq!(mock.closed_channels(), 1);
    }

    const TRAJECTORY: &str = "/opt/ppmac/tune/othertrajectory";

    fn trajectory() -> TrajectoryMove {
        TrajectoryMove {
            kind: TrajectoryKind::Ramp,
            motor: 2,
            distance: 1.0,
            velocity: 1.0,
            accel: 1.0,
            dwell: 1.0,
            reps: 1,
            one_direction: false,
            kill: true,
        }
    }

    #[tokio::test]
    async fn test_run_tune_program() {
        let files = GatherFiles::from(&GatherConfig::default());
        let settings = "gather.addr[0]=Sys.ServoCount.a\ngather.addr[1]=Motor[2].ActPos.a\n";
        let command = "/opt/ppmac/tune/othertrajectory 0 2 1 1 1 1 1 0 1";
        let mock = MockTransport::new()
            .with_file(&files.settings_file, settings)
            .with_shell_reply(command, &["done"], 0);
        let mock = with_results(mock, &files, "10 1.5\n11 1.75\n");
        let comm = comm(&mock).await;

        let table = run_tune_program(&comm, &trajectory(), TRAJECTORY, &files, &mut no_interrupt())
            .await
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_by_name("motor[2].actpos").unwrap(), vec![1.5, 1.75]);
        assert_eq!(mock.shell_commands()[0], command);
    }

    #[tokio::test]
    async fn test_run_tune_program_interrupted() {
        let files = GatherFiles::from(&GatherConfig::default());
        let command = trajectory().command_line(TRAJECTORY);
        let mock = MockTransport::new().with_shell_delay(&command, Duration::from_secs(60));
        let comm = comm(&mock).await;

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run_tune_program(&comm, &trajectory(), TRAJECTORY, &files, &mut pending_interrupt()),
        )
        .await
        .expect("interrupt should end the wait")
        .unwrap_err();

        assert!(matches!(err, GatherError::Interrupted));
        assert!(mock.commands().contains(&"#2k".to_string()));
    }
}
