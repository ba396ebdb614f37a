use clap::Parser;
use ppmac_gather::{
    GatherRequest, GatherTable, SERVO_COUNT_ADDRESS, address_of, get_results, run_gather,
};
use std::sync::Arc;

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::plot;
use crate::session::Session;
use crate::util::seconds;

/// `\t` and friends as typed at the prompt.
pub(crate) fn unescape_delimiter(delimiter: &str) -> String {
    delimiter
        .replace("\\t", "\t")
        .replace("\\n", "\n")
}

/// Gather data for a time
#[derive(Parser, Debug)]
#[command(name = "gather")]
struct GatherArgs {
    /// Seconds to gather
    duration: f64,
    /// Servo cycles per sample
    period: u32,
    /// Addresses to gather
    #[arg(required = true, num_args = 1..)]
    addresses: Vec<String>,
    /// Also save the samples to this local file
    #[arg(short, long)]
    save: Option<String>,
}

pub struct GatherCommand {
    session: Arc<Session>,
}

impl GatherCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for GatherCommand {
    fn name(&self) -> &'static str {
        "gather"
    }

    fn description(&self) -> &'static str {
        "Gather data. Usage: gather <duration> <period> <address...> [-s file]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: GatherArgs = parse_args("gather", &args)?;
            if !args.duration.is_finite() || args.duration <= 0.0 {
                return Err(CommandError::Invalid(
                    "duration must be positive".to_string(),
                ));
            }

            let comm = session.check_comm().await?;

            let mut addresses = Vec::with_capacity(args.addresses.len() + 1);
            for address in &args.addresses {
                let trimmed = address.strip_suffix(".a").unwrap_or(address);
                addresses.push(address_of(&session.canonical(trimmed)?));
            }
            if !addresses
                .iter()
                .any(|a| a.eq_ignore_ascii_case(SERVO_COUNT_ADDRESS))
            {
                addresses.insert(0, SERVO_COUNT_ADDRESS.to_string());
            }

            let request =
                GatherRequest::new(addresses, seconds(args.duration)?, args.period)?;
            let servo_period = session.servo_period(&comm).await;
            session.output().line(format!(
                "Gathering {} addresses for {} s ({} lines)",
                request.addresses.len(),
                args.duration,
                request.lines(servo_period)
            ));

            let mut interrupt = session.interrupt().subscribe();
            let table = run_gather(
                &comm,
                &request,
                &session.gather_files(),
                servo_period,
                &mut interrupt,
            )
            .await?;
            if table.is_empty() {
                return Ok(fmt::warning("No data gathered?"));
            }

            let indices: Vec<usize> = (1..table.addresses.len()).collect();
            let mut text = plot::summarize(&table, &indices, servo_period);
            if let Some(path) = args.save {
                table.save(&path, "\t")?;
                text.push_str(&format!("\nSaved to {}", fmt::entity(&path)));
            }
            Ok(text)
        })
    }
}

/// Save the most recent gather to a file, or print it
#[derive(Parser, Debug)]
#[command(name = "gather_save")]
struct GatherSaveArgs {
    /// Local file to save to; printed when omitted
    save_to: Option<String>,
    /// Gather settings file on the controller
    settings_file: Option<String>,
    /// Column separator
    #[arg(default_value = "\t")]
    delimiter: String,
}

pub struct GatherSaveCommand {
    session: Arc<Session>,
}

impl GatherSaveCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for GatherSaveCommand {
    fn name(&self) -> &'static str {
        "gather_save"
    }

    fn description(&self) -> &'static str {
        "Save gather data. Usage: gather_save [save_to] [settings_file] [delimiter]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: GatherSaveArgs = parse_args("gather_save", &args)?;
            let comm = session.check_comm().await?;
            let table = get_results(&comm, &session.gather_files(), args.settings_file.as_deref()).await?;

            match args.save_to {
                Some(path) => {
                    session.output().line(format!("Saving to {}", path));
                    table.save(&path, &unescape_delimiter(&args.delimiter))?;
                    Ok(fmt::success(&format!("Saved {} samples", table.len())))
                }
                None => Ok(columns(&table)),
            }
        })
    }
}

fn columns(table: &GatherTable) -> String {
    let mut lines = Vec::with_capacity(table.len() + 1);
    lines.push(
        table
            .addresses
            .iter()
            .map(|a| format!("{:>20}", a))
            .collect::<Vec<_>>()
            .join(" "),
    );
    for row in &table.rows {
        lines.push(
            row.iter()
                .map(|v| format!("{:>20}", v))
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    lines.join("\n")
}

/// Print the gather settings file
#[derive(Parser, Debug)]
#[command(name = "gather_config")]
struct GatherConfigArgs {
    filename: Option<String>,
}

pub struct GatherConfigCommand {
    session: Arc<Session>,
}

impl GatherConfigCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for GatherConfigCommand {
    fn name(&self) -> &'static str {
        "gather_config"
    }

    fn description(&self) -> &'static str {
        "Show the gather settings file. Usage: gather_config [filename]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: GatherConfigArgs = parse_args("gather_config", &args)?;
            let comm = session.check_comm().await?;
            let filename = args
                .filename
                .unwrap_or_else(|| session.config().gather.config_file.clone());
            Ok(comm.read_file(&filename).await?.join("\n"))
        })
    }
}

/// Summarize columns of the most recent gather
#[derive(Parser, Debug)]
#[command(name = "gather_plot", allow_negative_numbers = true)]
struct GatherPlotArgs {
    /// Use every column, split between the two axes
    #[arg(short, long)]
    all: bool,
    /// Address or index for the x axis
    #[arg(short, long = "x-axis")]
    x_axis: Option<String>,
    /// Left axis addresses or indices
    #[arg(short, long, num_args = 0..)]
    left: Vec<String>,
    /// Right axis addresses or indices
    #[arg(short, long, num_args = 0..)]
    right: Vec<String>,
    #[arg(short = 'L', long, default_value_t = 1.0)]
    left_scale: f64,
    #[arg(short = 'R', long, default_value_t = 1.0)]
    right_scale: f64,
    /// Write the plotted columns to a local file
    #[arg(short, long)]
    export: Option<String>,
    #[arg(short, long, default_value = "\t")]
    delimiter: String,
    settings_file: Option<String>,
}

pub struct GatherPlotCommand {
    session: Arc<Session>,
}

impl GatherPlotCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

fn column_index(table: &GatherTable, address: &str) -> Result<usize, CommandError> {
    if let Ok(index) = address.parse::<usize>() {
        return if index < table.addresses.len() {
            Ok(index)
        } else {
            Err(CommandError::Invalid(format!("No column {}", index)))
        };
    }

    table
        .index_of(address)
        .ok_or_else(|| CommandError::Invalid(format!("Address not gathered: {}", address)))
}

impl Command for GatherPlotCommand {
    fn name(&self) -> &'static str {
        "gather_plot"
    }

    fn description(&self) -> &'static str {
        "Summarize gathered columns. Usage: gather_plot [-a] [-x X] [-l L...] [-r R...] [-L scale] [-R scale] [-e file] [settings_file]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: GatherPlotArgs = parse_args("gather_plot", &args)?;
            let comm = session.check_comm().await?;
            let mut table =
                get_results(&comm, &session.gather_files(), args.settings_file.as_deref()).await?;

            let output = session.output();
            output.line("Available addresses:");
            for (i, address) in table.addresses.iter().enumerate() {
                output.line(format!("\t{}: {}", i, address));
            }

            let x_index = match &args.x_axis {
                Some(x) => column_index(&table, x).unwrap_or_else(|e| {
                    output.line(fmt::warning(&format!("{}; using column 0 for the x axis", e)));
                    0
                }),
                None => 0,
            };

            let (left, right): (Vec<usize>, Vec<usize>) = if args.all {
                let half = table.addresses.len() / 2;
                let left = (0..half).filter(|i| *i != x_index).collect();
                let right = (half..table.addresses.len())
                    .filter(|i| *i != x_index)
                    .collect();
                (left, right)
            } else {
                let left = args
                    .left
                    .iter()
                    .map(|a| column_index(&table, a))
                    .collect::<Result<Vec<_>, _>>()?;
                let right = args
                    .right
                    .iter()
                    .map(|a| column_index(&table, a))
                    .collect::<Result<Vec<_>, _>>()?;
                (left, right)
            };

            if left.is_empty() && right.is_empty() {
                return Err(CommandError::Invalid(
                    "Nothing to plot; use -a, -l or -r".to_string(),
                ));
            }

            for &index in &left {
                table.scale_column(index, args.left_scale);
            }
            for &index in &right {
                table.scale_column(index, args.right_scale);
            }

            let servo_period = session.servo_period(&comm).await;
            let mut text = format!(
                "{}: {}",
                fmt::label("X axis"),
                table.addresses.get(x_index).map_or("", String::as_str)
            );
            for (name, indices) in [("Left axis", &left), ("Right axis", &right)] {
                if !indices.is_empty() {
                    text.push_str(&format!(
                        "\n{}\n{}",
                        fmt::sub_header(name),
                        plot::summarize(&table, indices, servo_period)
                    ));
                }
            }

            if let Some(path) = args.export {
                let mut indices = vec![x_index];
                indices.extend(left.iter().chain(&right).copied());
                plot::export(&table, &indices, &path, &unescape_delimiter(&args.delimiter))?;
                text.push_str(&format!("\nExported to {}", fmt::entity(&path)));
            }

            Ok(text)
        })
    }
}

/// Desired vs. actual position of one motor from the most recent gather
#[derive(Parser, Debug)]
#[command(name = "tune_plot")]
struct TunePlotArgs {
    motor: u32,
    settings_file: Option<String>,
}

pub struct TunePlotCommand {
    session: Arc<Session>,
}

impl TunePlotCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for TunePlotCommand {
    fn name(&self) -> &'static str {
        "tune_plot"
    }

    fn description(&self) -> &'static str {
        "Summarize a motor's following error. Usage: tune_plot <motor> [settings_file]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: TunePlotArgs = parse_args("tune_plot", &args)?;
            let comm = session.check_comm().await?;
            let table =
                get_results(&comm, &session.gather_files(), args.settings_file.as_deref()).await?;

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
    fn test_unescape_delimiter() {
        assert_eq!(unescape_delimiter("\\t"), "\t");
        assert_eq!(unescape_delimiter(","), ",");
    }

    #[test]
    fn test_column_index() {
        let table = GatherTable {
            addresses: vec!["Sys.ServoCount.a".into(), "Motor[1].ActPos.a".into()],
            rows: vec![],
        };
        assert_eq!(column_index(&table, "1").unwrap(), 1);
        assert_eq!(column_index(&table, "motor[1].actpos").unwrap(), 1);
        assert!(column_index(&table, "5").is_err());
        assert!(column_index(&table, "Motor[2].ActPos").is_err());
    }
}
