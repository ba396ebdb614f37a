use clap::{ArgAction, Parser};
use ppmac_config::ConnectionOverrides;
use std::sync::Arc;

use crate::cli::command::{self, Command, CommandFuture, parse_args};
use crate::cli::format as fmt;
use crate::error::CommandError;
use crate::session::Session;

/// Connect to the controller over SSH
#[derive(Parser, Debug)]
#[command(name = "connect", disable_help_flag = true)]
struct ConnectArgs {
    /// Controller host
    #[arg(short = 'h', long)]
    host: Option<String>,
    /// SSH port
    #[arg(short = 'P', long)]
    port: Option<u16>,
    #[arg(short, long)]
    user: Option<String>,
    #[arg(short, long)]
    password: Option<String>,
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

pub struct ConnectCommand {
    session: Arc<Session>,
}

impl ConnectCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ConnectCommand {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn description(&self) -> &'static str {
        "Connect to the controller. Usage: connect [-h host] [-P port] [-u user] [-p password]"
    }

    fn execute(&self, args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let args: ConnectArgs = parse_args("connect", &args)?;
            let overrides = ConnectionOverrides {
                host: args.host,
                port: args.port,
                user: args.user,
                password: args.password,
            };

            session.connect(&overrides).await?;
            let host = overrides
                .host
                .unwrap_or_else(|| session.config().connection.host.clone());
            Ok(fmt::success(&format!("Connected to {}", host)))
        })
    }
}

pub struct ConfigCommand {
    session: Arc<Session>,
}

impl ConfigCommand {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl Command for ConfigCommand {
    fn name(&self) -> &'static str {
        "config"
    }

    fn description(&self) -> &'static str {
        "Show the effective configuration"
    }

    fn execute(&self, _args: Vec<String>) -> CommandFuture {
        let session = self.session.clone();
        command::run(async move {
            let yaml = session
                .config()
                .redacted()
                .to_yaml()
                .map_err(|e| CommandError::Invalid(e.to_string()))?;

            let state = match session.comm() {
                Some(_) => fmt::success("connected"),
                None => fmt::secondary("not connected"),
            };
            let catalog = match session.catalog() {
                Some(catalog) => format!("{} variables", catalog.len()),
                None => "not loaded".to_string(),
            };

            Ok(format!(
                "{}\n\n{}\n{}: {}\n{}: {}",
                fmt::header("Configuration"),
                yaml.trim_end(),
                fmt::label("Connection"),
                state,
                fmt::label("Completer"),
                catalog
            ))
        })
    }
}
