use clap::Parser;
use ppmac_config::LogType;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::session::Session;
use crate::util::{SERVO_SETTINGS, tracking_filter};

/// Servo element names with their descriptions, from the catalog when one
/// is loaded.
fn servo_elements(session: &Session, motor: u32) -> Vec<(String, Option<String>)> {
    let base = format!("Motor[{}].Servo", motor);
    if let Some(catalog) = session.catalog()
        && let Ok(attributes) = catalog.attributes(&base)
    {
        return attributes
            .into_iter()
            .map(|attr| {
                let description = catalog.description(&format!("{}.{}", base, attr));
                (attr, description)
            })
            .collect();
    }

    SERVO_SETTINGS
        .iter()
        .map(|name| (name.to_string(), None))
        .collect()
}

/// Show servo settings of a motor
#[derive(Parser, Debug)]
#[command(name = "servo")]
struct ServoArgs {
    motor: u32,
    /// Only show settings whose name or description contains this text
    #[arg(num_args = 0..)]
    text: Vec<String>,
}

pub struct ServoCommand {
    session: Arc<Session>,
}

impl ServoCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ServoCommand {
    fn name(&self) -> &'static str {
        "servo"
    }

    fn description(&self) -> &'static str {
        "Show a motor's servo settings. Usage: servo <motor> [text...]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: ServoArgs = parse_args("servo", &args)?;
            let comm = session.check_comm().await?;
            let filter = args.text.join(" ").to_lowercase();

            let mut gpascii = comm.gpascii().await;
            let mut lines = Vec::new();
            for (name, description) in servo_elements(&session, args.motor) {
                if !filter.is_empty() {
                    let haystack = format!(
                        "{} {}",
                        name,
                        description.as_deref().unwrap_or_default()
                    )
                    .to_lowercase();
                    if !haystack.contains(&filter) {
                        continue;
                    }
                }

                let variable = format!("Motor[{}].Servo.{}", args.motor, name);
                let value = match gpascii.get_variable(&variable).await {
                    Ok(value) => value,
                    Err(e) => fmt::error(&e.to_string()),
                };
                lines.push(match description {
                    Some(description) => format!(
                        "{:>15} = {:<30} [{}]",
                        name,
                        value,
                        fmt::secondary(&description)
                    ),
                    None => format!("{:>15} = {}", name, value),
                });
            }

            Ok(lines.join("\n"))
        })
    }
}

/// Copy servo settings from one motor to another
#[derive(Parser, Debug)]
#[command(name = "servo_copy")]
struct ServoCopyArgs {
    from: u32,
    to: u32,
}

pub struct ServoCopyCommand {
    session: Arc<Session>,
}

impl ServoCopyCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ServoCopyCommand {
    fn name(&self) -> &'static str {
        "servo_copy"
    }

    fn description(&self) -> &'static str {
        "Copy servo settings between motors. Usage: servo_copy <from> <to>"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: ServoCopyArgs = parse_args("servo_copy", &args)?;
            if args.from == args.to {
                return Err(CommandError::Invalid(
                    "Destination motor should be different from source motor".to_string(),
                ));
            }

            let comm = session.check_comm().await?;
            let mut gpascii = comm.gpascii().await;
            let output = session.output();

            info!(
                log_type = LogType::Console.as_str(),
                "Copying servo settings from motor {} to motor {}", args.from, args.to
            );

            let mut copied = 0;
            for (name, _) in servo_elements(&session, args.from) {
                let source = format!("Motor[{}].Servo.{}", args.from, name);
                let dest = format!("Motor[{}].Servo.{}", args.to, name);

                let value = match gpascii.get_variable(&source).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(log_type = LogType::Console.as_str(), "{}: {}", source, e);
                        output.line(fmt::error(&format!("{}: {}", source, e)));
                        continue;
                    }
                };

                match gpascii.set_variable(&dest, &value).await {
                    Ok(readback) => {
                        output.line(format!("{} = {}", dest, readback));
                        copied += 1;
                    }
                    Err(e) => output.line(fmt::error(&format!("{}: {}", dest, e))),
                }
            }

            Ok(fmt::success(&format!("Copied {} settings", copied)))
        })
    }
}

/// Set up the encoder table tracking filter
#[derive(Parser, Debug)]
#[command(name = "enc_filter")]
struct EncFilterArgs {
    /// Encoder table entry
    num: u32,
    /// Cutoff frequency (Hz)
    cutoff: f64,
    #[arg(default_value_t = 0.7)]
    damping: f64,
}

pub struct EncFilterCommand {
    session: Arc<Session>,
}

impl EncFilterCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for EncFilterCommand {
    fn name(&self) -> &'static str {
        "enc_filter"
    }

    fn description(&self) -> &'static str {
        "Set an encoder tracking filter. Usage: enc_filter <num> <cutoff Hz> [damping]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: EncFilterArgs = parse_args("enc_filter", &args)?;
            let comm = session.check_comm().await?;
            let servo_period = session.servo_period(&comm).await;
            let (index1, index2) = tracking_filter(args.cutoff, args.damping, servo_period);

            let mut gpascii = comm.gpascii().await;
            let mut lines = Vec::with_capacity(2);
            for (element, value) in [("index1", index1), ("index2", index2)] {
                let variable = format!("EncTable[{}].{}", args.num, element);
                let readback = gpascii.set_variable(&variable, value).await?;
                lines.push(format!("{} = {}", variable, readback));
            }
            Ok(lines.join("\n"))
        })
    }
}

/// Enable or disable writes to protected system elements
#[derive(Parser, Debug)]
#[command(name = "wpkey")]
struct WpKeyArgs {
    /// Disable instead of enable
    #[arg(short, long)]
    disable: bool,
}

pub struct WpKeyCommand {
    session: Arc<Session>,
}

impl WpKeyCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for WpKeyCommand {
    fn name(&self) -> &'static str {
        "wpkey"
    }

    fn description(&self) -> &'static str {
        "Set the system write-protect key. Usage: wpkey [-d]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: WpKeyArgs = parse_args("wpkey", &args)?;
            let comm = session.check_comm().await?;

            let (message, value) = if args.disable {
                ("Disabling", "0")
            } else {
                ("Enabling", "$AAAAAAAA")
            };
            session.output().line(message);

            let readback = comm.gpascii().await.set_variable("Sys.WpKey", value).await?;
            Ok(format!("Sys.WpKey = {}", readback))
        })
    }
}
