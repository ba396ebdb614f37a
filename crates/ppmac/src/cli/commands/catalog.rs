use clap::Parser;
use std::sync::Arc;

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::session::Session;

/// Search the variable catalog
#[derive(Parser, Debug)]
#[command(name = "search")]
struct SearchArgs {
    /// Where to start, e.g. Motor[1].Servo
    variable: String,
    /// Text to look for in names and descriptions
    text: String,
}

pub struct SearchCommand {
    session: Arc<Session>,
}

impl SearchCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for SearchCommand {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search the variable catalog. Usage: search <variable> <text>"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: SearchArgs = parse_args("search", &args)?;
            let catalog = session.require_catalog()?;
            let matches = catalog.search(&args.variable, &args.text)?;

            if matches.is_empty() {
                return Ok(fmt::secondary("No matches"));
            }

            Ok(matches
                .iter()
                .map(|(key, metadata)| {
                    let values = metadata.values().map(String::as_str).collect::<Vec<_>>();
                    format!("{}: {}", fmt::entity(key), values.join(" | "))
                })
                .collect::<Vec<_>>()
                .join("\n"))
        })
    }
}

/// Complete a partial variable name
#[derive(Parser, Debug)]
#[command(name = "complete")]
struct CompleteArgs {
    partial: String,
}

pub struct CompleteCommand {
    session: Arc<Session>,
}

impl CompleteCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for CompleteCommand {
    fn name(&self) -> &'static str {
        "complete"
    }

    fn description(&self) -> &'static str {
        "List completions of a partial variable name. Usage: complete <partial>"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: CompleteArgs = parse_args("complete", &args)?;
            let catalog = session.require_catalog()?;
            Ok(catalog.complete(&args.partial).join("\n"))
        })
    }
}
