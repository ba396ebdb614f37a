//! ppmac - Power PMAC operator console
//!
//! Interactive command line for a Power PMAC controller reached over SSH.

use anyhow::Context;
use clap::Parser;
use ppmac::cli::format;
use ppmac::{
    CommandMessage, CommandProcessor, InterruptController, Output, Session, SshConnector,
    get_all_commands, telemetry,
};
use ppmac_config::{ConnectionOverrides, FileProvider, LogType};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "ppmac.yaml")]
    config: String,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Only connect when `connect` is run
    #[arg(long)]
    no_auto_connect: bool,

    #[arg(long)]
    debug: bool,

    /// Run one command and exit
    #[arg(short, long)]
    command: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = FileProvider::try_load_config(Some(&args.config))
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    let overrides = ConnectionOverrides {
        host: args.host,
        port: args.port,
        user: args.user,
        password: args.password,
    };
    config.merge(&overrides, args.no_auto_connect.then_some(false), args.debug);

    telemetry::init_subscriber(&config.logging).context("Failed to initialize logging")?;
    format::set_color(config.logging.use_color && console::user_attended());

    info!(
        log_type = LogType::Console.as_str(),
        "Starting ppmac console (controller {}:{})", config.connection.host, config.connection.port
    );

    let interrupt = InterruptController::new();
    interrupt.listen_for_ctrl_c();

    let session = Arc::new(Session::new(
        config,
        Arc::new(SshConnector),
        Output::stdout(),
        interrupt,
    ));
    session.load_catalog();

    let (processor, mut rx) = CommandProcessor::new(get_all_commands(session.clone()));

    if let Some(command) = args.command {
        let result = processor.process_command(&command).await;
        session.output().result(&result);
        session.disconnect().await;
        return Ok(());
    }

    println!("{}", format::header("ppmac console"));
    println!("{}", format::secondary("Type 'help' for a list of commands"));
    processor.start_input_loop();

    while let Some(message) = rx.recv().await {
        match message {
            CommandMessage::Execute(line, done) => {
                let result = processor.process_command(&line).await;
                session.output().result(&result);
                let _ = done.send(());
            }
            CommandMessage::Shutdown => {
                debug!(log_type = LogType::Console.as_str(), "Console shutting down");
                break;
            }
        }
    }

    session.disconnect().await;
    info!(log_type = LogType::Console.as_str(), "Bye");
    Ok(())
}
