use clap::Parser;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::monitor::{MonitorOptions, monitor_variables, print_values};
use crate::session::Session;
use crate::status::{COORD_STATUS, MOTOR_STATUS, StatusFilter, StatusVar, status_variables};

fn options(session: &Session, count: Option<u64>) -> MonitorOptions {
    MonitorOptions {
        interval: session.config().monitor.poll_interval(),
        count,
        show_initial: true,
    }
}

/// Print variables whenever they change
#[derive(Parser, Debug)]
#[command(name = "monitor")]
struct MonitorArgs {
    #[arg(required = true, num_args = 1..)]
    variables: Vec<String>,
    /// Stop after this many polls
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

pub struct MonitorCommand {
    session: Arc<Session>,
}

impl MonitorCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for MonitorCommand {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn description(&self) -> &'static str {
        "Print variables as they change. Usage: monitor <variable...> [-n count]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: MonitorArgs = parse_args("monitor", &args)?;
            let comm = session.check_comm().await?;
            let variables = args
                .variables
                .iter()
                .map(|v| session.canonical(v))
                .collect::<Result<Vec<_>, _>>()?;

            monitor_variables(
                &session,
                &comm,
                &variables,
                options(&session, args.count),
                |_, value| Some(value.to_string()),
            )
            .await;
            Ok(String::new())
        })
    }
}

/// Monitor every element of a structure, e.g. `Motor[1]`
#[derive(Parser, Debug)]
#[command(name = "monitorc")]
struct MonitorcArgs {
    base: String,
    /// Elements to leave out
    #[arg(num_args = 0..)]
    ignore: Vec<String>,
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

pub struct MonitorcCommand {
    session: Arc<Session>,
}

impl MonitorcCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for MonitorcCommand {
    fn name(&self) -> &'static str {
        "monitorc"
    }

    fn description(&self) -> &'static str {
        "Monitor all elements of a structure. Usage: monitorc <base> [ignore...] [-n count]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: MonitorcArgs = parse_args("monitorc", &args)?;
            let comm = session.check_comm().await?;
            let catalog = session.require_catalog()?;

            let base = catalog.canonical(&args.base)?;
            let variables: Vec<String> = catalog
                .attributes(&base)?
                .into_iter()
                .filter(|attr| {
                    !args.ignore.iter().any(|i| {
                        i.eq_ignore_ascii_case(attr)
                            || i.eq_ignore_ascii_case(&format!("{}.{}", base, attr))
                    })
                })
                .map(|attr| format!("{}.{}", base, attr))
                .collect();

            let output = session.output();
            output.line("Initial values:");
            let changed = monitor_variables(
                &session,
                &comm,
                &variables,
                options(&session, args.count),
                |_, value| Some(value.to_string()),
            )
            .await;

            Ok(changed_summary(&changed))
        })
    }
}

/// The sorted list of variables that changed, or nothing when none did.
fn changed_summary(changed: &BTreeSet<String>) -> String {
    if changed.is_empty() {
        return String::new();
    }

    let mut text = String::from("Variables changed:");
    for variable in changed {
        text.push_str(&format!("\n{}", variable));
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Motor,
    Coord,
}

impl StatusKind {
    fn base(self, number: u32) -> String {
        match self {
            StatusKind::Motor => format!("Motor[{}]", number),
            StatusKind::Coord => format!("Coord[{}]", number),
        }
    }

    fn standard(self) -> &'static [StatusVar] {
        match self {
            StatusKind::Motor => MOTOR_STATUS,
            StatusKind::Coord => COORD_STATUS,
        }
    }
}

/// Show status elements that are not at their normal value
#[derive(Parser, Debug)]
struct StatusArgs {
    /// Motor or coordinate system number
    number: u32,
    /// Extra elements to always show
    #[arg(num_args = 0..)]
    additional: Vec<String>,
    /// Standard elements to leave out
    #[arg(short, long, num_args = 1..)]
    ignore: Vec<String>,
    /// Show every element
    #[arg(short, long)]
    all: bool,
    /// Keep polling and print changes
    #[arg(short, long)]
    monitor: bool,
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

/// `mstatus` and `cstatus`.
pub struct StatusCommand {
    session: Arc<Session>,
    kind: StatusKind,
}

impl StatusCommand {
    pub fn new(session: Arc<Session>, kind: StatusKind) -> Self {
        Self { session, kind }
    }
}

impl Command for StatusCommand {
    fn name(&self) -> &'static str {
        match self.kind {
            StatusKind::Motor => "mstatus",
            StatusKind::Coord => "cstatus",
        }
    }

    fn description(&self) -> &'static str {
        match self.kind {
            StatusKind::Motor => {
                "Motor status. Usage: mstatus <motor> [extra...] [-i ignore...] [-a] [-m] [-n count]"
            }
            StatusKind::Coord => {
                "Coordinate system status. Usage: cstatus <coord> [extra...] [-i ignore...] [-a] [-m] [-n count]"
            }
        }
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        let kind = self.kind;
        let name = self.name();
        command::run(async move {
            let args: StatusArgs = parse_args(name, &args)?;
            let comm = session.check_comm().await?;

            let standard = kind.standard();
            let variables = status_variables(
                &kind.base(args.number),
                standard,
                &args.additional,
                &args.ignore,
            );
            let mut filter = StatusFilter::new(standard, &args.additional, args.all);

            if args.monitor {
                monitor_variables(
                    &session,
                    &comm,
                    &variables,
                    options(&session, args.count),
                    |variable, value| filter.filter(variable, value),
                )
                .await;
            } else {
                print_values(&comm, &variables, session.output(), |variable, value| {
                    filter.filter(variable, value)
                })
                .await;
            }
            Ok(String::new())
        })
    }
}
